//! trellis - module resolution from pattern based repositories
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Thin command line front end over `trellis-core`.
//!
//! # Settings
//!
//! Resolvers and the cache are described by a TOML settings file, read from
//! `--settings` or `$TRELLIS_HOME/settings.toml` (`~/.trellis/settings.toml`
//! when `TRELLIS_HOME` is unset).

pub mod cmd;
pub mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use trellis_core::{Engine, Settings, SettingsFile};

#[derive(Debug, Parser)]
#[command(name = "trellis")]
#[command(author, version, about = "trellis - resolve, download and publish modules")]
pub struct Cli {
    /// Settings file
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Cache directory, overriding the settings
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Log resolution details (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve a module: org#module;revision
    Resolve {
        coordinate: String,
        /// Resolver to use instead of the default one
        #[arg(long)]
        resolver: Option<String>,
        /// Also resolve declared dependencies
        #[arg(long)]
        transitive: bool,
        /// Only accept modules published before this RFC 3339 date
        #[arg(long, value_parser = parse_date)]
        date: Option<DateTime<Utc>>,
        /// Revalidate the module even when it is cached
        #[arg(long)]
        changing: bool,
    },
    /// Resolve a module and download its artifacts
    Download {
        coordinate: String,
        #[arg(long)]
        resolver: Option<String>,
        /// Configurations to download (all artifacts when absent)
        #[arg(long = "conf")]
        confs: Vec<String>,
    },
    /// Publish artifacts of a module
    Publish {
        coordinate: String,
        #[arg(long)]
        resolver: String,
        /// name:type:ext=path (ext defaults to type)
        #[arg(long = "artifact", required = true)]
        artifacts: Vec<String>,
        /// Replace existing files
        #[arg(long)]
        overwrite: bool,
    },
    /// List the modules of an organisation, or the revisions of a module
    List {
        organisation: String,
        module: Option<String>,
        #[arg(long)]
        resolver: Option<String>,
    },
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 date: {e}"))
}

/// Load settings and build the engine.
pub fn engine(settings: Option<&Path>, cache: Option<&Path>) -> Result<Engine> {
    let path = match settings {
        Some(path) => path.to_path_buf(),
        None => trellis_core::default_settings_path()
            .context("could not determine home directory; pass --settings")?,
    };
    tracing::debug!("loading settings from {}", path.display());
    let mut file =
        SettingsFile::load(&path).with_context(|| format!("failed to load settings {}", path.display()))?;
    if let Some(cache) = cache {
        file.cache.dir = Some(cache.to_path_buf());
    }
    let settings = Settings::build(file).context("invalid settings")?;
    Ok(Engine::new(settings).with_reporter(std::sync::Arc::new(ui::ConsoleReporter)))
}
