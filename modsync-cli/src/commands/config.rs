//! `config` commands: read and edit `~/.modsync/config.ini`.

use clap::Subcommand;
use modsync::config::{config_file_path, ConfigFile, ConfigKey};

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Setting as section.key, e.g. sync.catalog_url
        key: String,
    },

    /// Change one setting and save the file
    Set {
        /// Setting as section.key, e.g. sync.timeout_secs
        key: String,

        /// New value
        value: String,
    },

    /// Print every setting
    List,

    /// Print the location of config.ini
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            println!("{}", display_value(&key.get(&load_config())));
            Ok(())
        }
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => {
            print_settings(&load_config());
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "unknown setting '{}'. Run 'modsync config list' for the available settings.",
            key
        ))
    })
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let mut config = load_config();
    key.set(&mut config, value)?;
    config.save()?;

    println!("{} = {}", key.name(), display_value(&key.get(&config)));
    Ok(())
}

fn print_settings(config: &ConfigFile) {
    println!("# {}", config_file_path().display());

    let mut section = "";
    for key in ConfigKey::all() {
        if key.section() != section {
            section = key.section();
            println!();
            println!("[{}]", section);
        }
        println!("{} = {}", key.key_name(), display_value(&key.get(config)));
    }
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_accepts_section_key() {
        assert!(parse_key("sync.catalog_url").is_ok());
    }

    #[test]
    fn test_parse_key_rejects_unknown() {
        let err = parse_key("sync.nope").unwrap_err();
        assert!(err.to_string().contains("modsync config list"));
    }

    #[test]
    fn test_display_value_marks_empty() {
        assert_eq!(display_value(""), "(not set)");
        assert_eq!(display_value("30"), "30");
    }
}
