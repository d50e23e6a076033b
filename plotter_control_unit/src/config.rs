//! Configuration loading for the control unit.
//!
//! Loads `PlotterConfig` from TOML (or uses the built-in defaults when no
//! file is given), applies command-line overrides and validates the merged
//! result. A file that is only complete together with its overrides (e.g.
//! `kind = "tcp"` without an address, plus `--tcp`) is accepted.

use std::path::{Path, PathBuf};

use plotter_common::config::{ConfigError, ConfigLoader, LinkKind, PlotterConfig};
use tracing::info;

/// Link selection given on the command line. Takes precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct LinkOverrides {
    pub port: Option<PathBuf>,
    pub baud: Option<u32>,
    pub stdio: bool,
    pub tcp: Option<String>,
    pub tcp_listen: Option<String>,
}

impl LinkOverrides {
    /// Apply onto `config`. `stdio` wins over `tcp_listen`, then `tcp`, then
    /// `port`.
    pub fn apply(&self, config: &mut PlotterConfig) {
        if let Some(port) = &self.port {
            config.link.kind = LinkKind::Serial;
            config.link.path = port.display().to_string();
        }
        if let Some(baud) = self.baud {
            config.link.baud = baud;
        }
        if let Some(address) = &self.tcp {
            config.link.kind = LinkKind::Tcp;
            config.link.address = Some(address.clone());
        }
        if let Some(address) = &self.tcp_listen {
            config.link.kind = LinkKind::TcpListen;
            config.link.address = Some(address.clone());
        }
        if self.stdio {
            config.link.kind = LinkKind::Stdio;
        }
    }
}

/// Load the configuration without validating it.
///
/// `None` means built-in defaults. Pass the result through
/// [`finalize_config`] before use.
pub fn load_config(path: Option<&Path>) -> Result<PlotterConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let config = PlotterConfig::load(path)?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        None => {
            info!("No configuration file given, using defaults");
            PlotterConfig::default()
        }
    };
    Ok(config)
}

/// Apply `overrides` and validate the merged configuration.
pub fn finalize_config(
    mut config: PlotterConfig,
    overrides: &LinkOverrides,
) -> Result<PlotterConfig, ConfigError> {
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Parse and validate a configuration held in memory.
pub fn load_config_from_str(content: &str) -> Result<PlotterConfig, ConfigError> {
    let config = PlotterConfig::from_toml(content)?;
    config.validate()?;
    Ok(config)
}
