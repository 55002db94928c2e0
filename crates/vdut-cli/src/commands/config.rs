//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use vdut_core::config::{self, TestbedConfig};

fn resolve_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Load the effective configuration
///
/// An explicit `--config` path must exist; the default path falls back to
/// built-in defaults when absent.
pub fn load_testbed(config_path: Option<&PathBuf>) -> Result<TestbedConfig> {
    if let Some(path) = config_path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        config::load_config(&default_path)
            .with_context(|| format!("Failed to load config from {:?}", default_path))
    } else {
        tracing::debug!("No config at {:?}, using defaults", default_path);
        Ok(TestbedConfig::default())
    }
}

/// Show the effective configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve_path(config_path);
    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Showing built-in defaults; run 'vdut config init' to write them");
    }
    println!();

    let config = if path.exists() {
        config::load_config::<TestbedConfig>(&path)
            .with_context(|| format!("Failed to load config from {:?}", path))?
    } else {
        TestbedConfig::default()
    };
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn config_path(config_path: Option<&PathBuf>) {
    println!("{}", resolve_path(config_path).display());
}

/// Write the default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve_path(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &TestbedConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    print_success(&format!("Created configuration file: {:?}", path));

    let key = TestbedConfig::default().connection.private_key_path;
    if !key.exists() {
        print_info("No SSH key found for device access. Generate one with:");
        print_info(&format!("  ssh-keygen -t ed25519 -f {:?} -N ''", key));
    }
    print_images_hint(&path);
    Ok(())
}

fn print_images_hint(path: &Path) {
    print_info(&format!(
        "Set [device].work_dir in {:?} to the directory holding the disk and OVMF images",
        path
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(load_testbed(Some(&path)).is_err());
    }

    #[test]
    fn test_init_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        config_init(Some(&path), false).unwrap();
        let config = load_testbed(Some(&path)).unwrap();
        assert_eq!(config.device.name, TestbedConfig::default().device.name);

        // A second init without --force leaves the file alone
        std::fs::write(&path, "keep_on_failure = true\n").unwrap();
        config_init(Some(&path), false).unwrap();
        assert!(load_testbed(Some(&path)).unwrap().keep_on_failure);
    }
}
