//! Config Commands

use anyhow::{Context, Result};
use clap::Args;
use rendergrid_common::GridConfig;
use std::path::{Path, PathBuf};

use crate::output::{print_status, Status};

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the configuration to this file instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Ignore the loaded file and emit built-in defaults
    #[arg(long)]
    pub defaults: bool,
}

pub fn execute(args: ConfigArgs, config_path: &Path) -> Result<()> {
    let config = if args.defaults {
        GridConfig::default()
    } else {
        GridConfig::load(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    };

    match args.output {
        Some(path) => {
            config
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_status(
                Status::Success,
                &format!("Configuration written to {}", path.display()),
            );
        }
        None => {
            if !args.defaults && !config_path.exists() {
                print_status(
                    Status::Info,
                    &format!("{} not found, showing defaults", config_path.display()),
                );
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_defaults() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("grid.toml");

        execute(
            ConfigArgs {
                output: Some(out.clone()),
                defaults: true,
            },
            &dir.path().join("missing.toml"),
        )
        .unwrap();

        assert_eq!(GridConfig::load(&out).unwrap(), GridConfig::default());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grid.toml");
        std::fs::write(&path, "render_concurrency = 0\n").unwrap();

        let result = execute(
            ConfigArgs {
                output: None,
                defaults: false,
            },
            &path,
        );
        assert!(result.is_err());
    }
}
