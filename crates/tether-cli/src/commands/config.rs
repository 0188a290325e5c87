//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use tether_core::config::{self, ClientConfig};

fn resolve_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Load the client configuration, falling back to defaults when no file exists
pub fn load_client_config(config_path: Option<&PathBuf>) -> Result<ClientConfig> {
    let path = resolve_path(config_path);

    if !path.exists() {
        tracing::debug!("No config file at {:?}, using defaults", path);
        return Ok(ClientConfig::default());
    }

    config::load_config(&path).with_context(|| format!("Failed to load config file: {:?}", path))
}

/// Show current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve_path(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'tether config init' to create one");
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    println!("{}", content);

    Ok(())
}

/// Initialize default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let config_file = resolve_path(config_path);
    let config_dir = config_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_dir);

    if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
        print_success(&format!("Created config directory: {:?}", config_dir));
    }

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    let content = generate_default_config()?;
    std::fs::write(&config_file, content)
        .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

    print_success(&format!("Created configuration file: {:?}", config_file));
    Ok(())
}

/// Print the configuration file path
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}

/// Generate default configuration content
fn generate_default_config() -> Result<String> {
    let body = toml::to_string_pretty(&ClientConfig::default())
        .context("Failed to serialize default configuration")?;

    Ok(format!(
        "# tether configuration\n\
         #\n\
         # working_directory: directory holding the service's command socket\n\
         # log_max_lines: log lines kept in memory\n\
         # status_interval, handshake_timeout and retry delays are in milliseconds\n\
         \n\
         {}",
        body
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips() {
        let content = generate_default_config().unwrap();
        assert!(content.starts_with("# tether configuration"));

        let parsed: ClientConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.log_max_lines, 300);
        assert_eq!(parsed.retry.max_attempts, 10);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let config = load_client_config(Some(&path)).unwrap();
        assert_eq!(config.log_max_lines, 300);
    }

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        config_init(Some(&path), false).unwrap();
        assert!(path.exists());

        let config = load_client_config(Some(&path)).unwrap();
        assert_eq!(config.status_interval.as_millis(), 2000);
    }
}
