//! Configuration loading

use anyhow::Result;
use tracing::info;

use crate::Config;

const CONFIG_PATH_ENV: &str = "STRMWARP_CONFIG_PATH";

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. `STRMWARP_CONFIG_PATH` environment variable (explicit path)
/// 2. ./config.yaml (current working directory)
/// 3. /config/config.yaml (container mount path)
/// 4. Fall back to environment variables only
pub fn load_config() -> Result<Config> {
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|p| std::path::Path::new(p).exists())
        .or_else(|| {
            ["config.yaml", "/config/config.yaml"]
                .into_iter()
                .find(|p| std::path::Path::new(p).exists())
                .map(str::to_string)
        });

    // Logging is not up yet, so progress goes to stderr.
    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        Config::from_file(&path).map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}");
            eprintln!("Using default configuration");
            Config::default()
        })
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}

/// Log the effective settings once logging is initialised
pub fn log_summary(config: &Config) {
    info!("Configuration loaded and validated successfully");
    info!("HTTP address: {}", config.http_address());
    info!(
        kind = ?config.media_server.kind,
        addr = %config.media_server.addr,
        "Media server backend"
    );
    info!(
        http_strm = config.http_strm.enable,
        alist_strm = config.alist_strm.enable,
        gateways = config.alist_strm.list.len(),
        "Strm handling"
    );
}
