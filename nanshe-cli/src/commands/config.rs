//! Inspect the merged configuration and where it comes from.

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use nanshe_engine::EngineConfig;

use crate::config::{ConfigLoader, ENV_OVERRIDES};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective settings as TOML
    Show {
        /// Only this table
        #[arg(long)]
        section: Option<Section>,
    },
    /// List config layers, the database file and active overrides
    Sources,
}

/// Top-level tables of the engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Section {
    Embedding,
    Xp,
    Coach,
    Classifier,
    Llm,
    Storage,
}

impl Section {
    fn key(self) -> &'static str {
        match self {
            Section::Embedding => "embedding",
            Section::Xp => "xp",
            Section::Coach => "coach",
            Section::Classifier => "classifier",
            Section::Llm => "llm",
            Section::Storage => "storage",
        }
    }
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show { section } => {
            let config = ConfigLoader::load()?;
            println!("{}", render(&config, section)?);
            Ok(())
        }
        ConfigCommands::Sources => {
            print_sources();
            Ok(())
        }
    }
}

fn render(config: &EngineConfig, section: Option<Section>) -> Result<String> {
    let Some(section) = section else {
        return Ok(toml::to_string_pretty(config)?);
    };
    let value = toml::Value::try_from(config)?;
    let table = value
        .get(section.key())
        .and_then(toml::Value::as_table)
        .with_context(|| format!("no [{}] table in the configuration", section.key()))?;
    Ok(format!("[{}]\n{}", section.key(), toml::to_string_pretty(table)?))
}

fn print_sources() {
    for (label, path) in [
        ("user", ConfigLoader::user_config_path()),
        ("project", ConfigLoader::project_config_path()),
    ] {
        let state = if path.exists() { "loaded" } else { "absent" };
        println!("{label:<8} {state:<7} {}", path.display());
    }
    match ConfigLoader::load() {
        Ok(config) => println!("database         {}", config.storage.db_path.display()),
        Err(e) => println!("database         unknown ({e:#})"),
    }
    let active: Vec<String> = ENV_OVERRIDES
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| format!("{key}={value}")))
        .collect();
    if active.is_empty() {
        println!("env              none");
    } else {
        for entry in active {
            println!("env              {entry}");
        }
    }
}
