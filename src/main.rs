use anyhow::{anyhow, Result};
use bylines::build::build_site;
use bylines::config::Config;
use bylines::environment::Classification;
use clap::{crate_version, App, Arg};
use std::path::{Path, PathBuf};

fn main() {
    tracing_subscriber::fmt::init();
    if let Err(err) = run() {
        eprintln!("bylines: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = App::new("bylines")
        .version(crate_version!())
        .about(
            "Builds the site: resolves post dates from the git history and \
             renders posts, index, and feed",
        )
        .arg(
            Arg::with_name("project")
                .long("project")
                .short("p")
                .takes_value(true)
                .help(
                    "Directory to search (upward) for bylines.yaml; defaults \
                     to the current directory",
                ),
        )
        .arg(
            Arg::with_name("output")
                .long("output")
                .short("o")
                .takes_value(true)
                .default_value("_site")
                .help("Output directory"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .takes_value(true)
                .help("Number of content-reader threads; defaults to the CPU count"),
        )
        .get_matches();

    let project_directory = match matches.value_of("project") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    let output_directory = Path::new(
        matches
            .value_of("output")
            .expect("`output` has a default value"),
    );
    let threads = match matches.value_of("threads") {
        None => None,
        Some(threads) => Some(
            threads
                .parse::<usize>()
                .map_err(|e| anyhow!("Invalid --threads value `{}`: {}", threads, e))?,
        ),
    };

    let config =
        Config::from_directory(&project_directory, output_directory, threads)?;
    let environment = Classification::detect()?;
    build_site(config, environment)?;
    Ok(())
}
