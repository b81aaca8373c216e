//! Converts post bodies from markdown to HTML. This is a thin wrapper over
//! `pulldown-cmark`; the only transformation of our own is demoting
//! headings. The site template owns `<h1>` (the site title) and `<h2>` (the
//! post title), so a `#` heading in a post body becomes `<h3>`.

use pulldown_cmark::{html, Event, Options, Parser, Tag};

/// Renders `markdown` to an HTML fragment.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let events = Parser::new_ext(markdown, options).map(demote_heading);
    let mut rendered = String::new();
    html::push_html(&mut rendered, events);
    rendered
}

fn demote_heading(event: Event) -> Event {
    match event {
        Event::Start(Tag::Heading(level)) => {
            Event::Start(Tag::Heading(level + 2))
        }
        Event::End(Tag::Heading(level)) => Event::End(Tag::Heading(level + 2)),
        _ => event,
    }
}
