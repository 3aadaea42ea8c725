//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the demo binary using
//! the `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `logroute.toml` file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Routes sample events for every configured application into per-severity files.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base directory for applications without an explicit log path.
    #[arg(long, value_name = "DIR")]
    pub log_path: Option<String>,

    /// Filter for logroute's own diagnostics (e.g. "debug").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Number of sample rounds to emit per application.
    #[arg(long, value_name = "COUNT", default_value_t = 1)]
    pub events: usize,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(path) = &self.log_path {
            let mut defaults = Dict::new();
            defaults.insert("log_path".into(), Value::from(path.clone()));
            dict.insert("defaults".into(), Value::Dict(Tag::Default, defaults));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
