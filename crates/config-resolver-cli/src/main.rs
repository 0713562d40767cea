//! Command-line front-end for resolving a layered [`config_resolver`] database from a directory
//! of `defaults.yml`/`defaults.json` files.

use std::{path::PathBuf, process};

use anstyle::{AnsiColor, Color, Style};
use clap::{Parser, Subcommand};
use config_resolver::{database::Layer, ConfigDatabase};
use indexmap::IndexMap;

const SECTION: Style = Style::new().bold();
const ERROR_LABEL: Style = Style::new().bold().bg_color(Some(Color::Ansi(AnsiColor::Red)));
const JSON_FILE: Style = Style::new().bg_color(Some(Color::Ansi(AnsiColor::Cyan)));
const YAML_FILE: Style = Style::new().bg_color(Some(Color::Ansi(AnsiColor::Green)));
const DERIVED: Style = Style::new().bg_color(Some(Color::Ansi(AnsiColor::Magenta)));

#[derive(Debug, Parser)]
#[command(name = "config-resolver", about = "Resolve a layered configuration database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Loads `<dir>/defaults.yml` and `<dir>/defaults.json`, resolves them, and prints the
    /// sorted/indented JSON dump.
    Dump {
        dir: PathBuf,
        /// Fail instead of treating a missing defaults file as empty.
        #[arg(long)]
        strict: bool,
    },
    /// Like `dump`, but prints each resolved setting next to the file it was last set in.
    Debug {
        dir: PathBuf,
        /// Fail instead of treating a missing defaults file as empty.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    Yaml,
    Json,
}

impl Origin {
    fn style(self) -> Style {
        match self {
            Origin::Yaml => YAML_FILE,
            Origin::Json => JSON_FILE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Origin::Yaml => "yaml",
            Origin::Json => "json",
        }
    }
}

fn print_error(err: impl std::fmt::Display) -> ! {
    anstream::eprintln!("{ERROR_LABEL}error:{ERROR_LABEL:#} {err}");
    process::exit(1);
}

fn is_visible_key(key: &str) -> bool {
    key != "_config_path" && key != "_next_free_index" && !key.ends_with("_meta")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Dump { dir, strict } => {
            let mut db = ConfigDatabase::new();
            let providers = config_resolver::load_from_defaults(&dir, strict)
                .unwrap_or_else(|err| print_error(err));
            for provider in providers {
                db.add_provider(Layer::Project, provider);
            }
            match db.dump_json() {
                Ok(json) => println!("{json}"),
                Err(err) => print_error(err),
            }
        }
        Command::Debug { dir, strict } => {
            let mut db = ConfigDatabase::new();
            let mut origins: IndexMap<String, Origin> = IndexMap::new();

            for (path, origin) in [
                (dir.join("defaults.yml"), Origin::Yaml),
                (dir.join("defaults.json"), Origin::Json),
            ] {
                let provider = config_resolver::load_from_file(&path, strict)
                    .unwrap_or_else(|err| print_error(err));
                for key in provider.keys().filter(|key| is_visible_key(key.as_str())) {
                    origins.insert(key.clone(), origin);
                }
                db.add_provider(Layer::Project, provider);
            }

            let resolved = db.resolve().unwrap_or_else(|err| print_error(err)).clone();

            println!("{SECTION}Configuration sources:{SECTION:#}");
            println!("- {YAML_FILE}yaml{YAML_FILE:#}: {}", dir.join("defaults.yml").display());
            println!("- {JSON_FILE}json{JSON_FILE:#}: {}", dir.join("defaults.json").display());
            println!();
            println!("{SECTION}Values:{SECTION:#}");
            for (key, value) in &resolved {
                let (style, label) = match origins.get(key) {
                    Some(origin) => (origin.style(), origin.label()),
                    // The directive pipeline produced this setting itself (e.g. an `append`
                    // target or a self-reference rename), rather than either source file.
                    None => (DERIVED, "derived"),
                };
                println!("{key} = {value}");
                println!("  Origin: {style}{label}{style:#}");
            }
        }
    }
}
