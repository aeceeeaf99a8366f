//! glance: browse folders with cached image thumbnails.
//!
//! This binary loads the user's config, opens the preview cache, and runs
//! one subcommand. Logs go to stderr (filtered by `GLANCE_LOG`) so stdout
//! only carries results.

mod app;
mod background;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use glance_core::{Config, CoreError};
use tracing_subscriber::EnvFilter;

use crate::app::{format_entry, App};
use crate::background::{cache_path, config_path};

#[derive(Parser, Debug)]
#[command(name = "glance", version, about = "Folder browser with cached image thumbnails")]
struct Cli {
    /// Config file (defaults to ~/.config/glance/config.toml)
    #[arg(long, global = true, env = "GLANCE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a folder and resolve image previews
    Browse {
        /// Folder to list (defaults to the current directory)
        dir: Option<PathBuf>,

        /// Print the base64 preview data after each image
        #[arg(long)]
        data: bool,
    },
    /// Rename a file or folder in place
    Rename { path: PathBuf, new_name: String },
    /// Delete a file or folder (recursively)
    Delete { path: PathBuf },
    /// Copy a file or folder into a target folder
    Paste { source: PathBuf, target_dir: PathBuf },
    /// Inspect or reset the preview cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print the approximate cache size in bytes
    Size,
    /// Remove every cached preview
    Clear,
}

fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = explicit.clone().unwrap_or_else(config_path);
    match Config::load(&path) {
        Ok(config) => Ok(config),
        Err(CoreError::NotFound(_)) if explicit.is_none() => Ok(Config::default()),
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GLANCE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let app = App::new(config, &cache_path());

    match cli.command {
        Command::Browse { dir, data } => {
            let dir = match dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            for entry in app.browse(&dir).await? {
                println!("{}", format_entry(&entry));
                if data {
                    if let Some(preview) = entry.preview() {
                        println!("{preview}");
                    }
                }
            }
        }
        Command::Rename { path, new_name } => {
            let renamed = app.rename(&path, &new_name)?;
            println!("{}", renamed.path().display());
        }
        Command::Delete { path } => {
            app.delete(&path)?;
        }
        Command::Paste { source, target_dir } => {
            let pasted = app.paste(&source, &target_dir)?;
            println!("{}", pasted.path().display());
        }
        Command::Cache { action } => match action {
            CacheAction::Size => println!("{}", app.cache_size()?),
            CacheAction::Clear => app.clear_cache()?,
        },
    }

    Ok(())
}
