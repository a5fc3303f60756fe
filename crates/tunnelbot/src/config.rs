//! Config loading for commands: resolve `bot.toml`, then build the core
//! `Backend` from it.

use std::path::PathBuf;

use tunnelbot_config::{BotConfig, load_config, resolve_config_path};
use tunnelbot_core::Backend;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// A loaded config and the file it came from.
#[derive(Debug)]
pub struct Loaded {
    pub path: PathBuf,
    pub config: BotConfig,
}

pub fn load(global: &GlobalOpts) -> Result<Loaded, CliError> {
    let path = resolve_config_path(global.config.as_deref());
    let config = load_config(&path)?;
    tracing::debug!(path = %path.display(), exists = path.is_file(), "config loaded");
    Ok(Loaded { path, config })
}

impl Loaded {
    /// Wire the stores, exporter and reconciler.
    pub fn backend(&self) -> Result<Backend, CliError> {
        if self.config.credentials_file.is_none() && !self.path.is_file() {
            return Err(CliError::NoConfig {
                path: self.path.display().to_string(),
            });
        }
        let service = self.config.to_service_config()?;
        Ok(Backend::new(service)?)
    }
}
