//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use tt_core::config::{self, ShellConfig};

fn resolve(config_path: Option<&PathBuf>) -> PathBuf {
    config_path.cloned().unwrap_or_else(config::default_config_path)
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

/// Get a config value by key
pub fn config_get(config_path: Option<&PathBuf>, key: &str) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_error(&format!("Config file not found: {:?}", path));
        print_info("Run 'tether config init' to create one");
        return Ok(());
    }

    let table = read_table(&path)?;
    let Some(value) = lookup(&table, key) else {
        print_error(&format!("Key not found: {}", key));
        return Ok(());
    };

    match value {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Integer(i) => println!("{}", i),
        toml::Value::Float(f) => println!("{}", f),
        toml::Value::Boolean(b) => println!("{}", b),
        toml::Value::Array(a) => {
            for item in a {
                println!("{}", item);
            }
        }
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(value)?),
        toml::Value::Datetime(d) => println!("{}", d),
    }

    Ok(())
}

/// Walk a dotted key path through nested tables
fn lookup<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut parts = key.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

/// Set a config value by key
pub fn config_set(config_path: Option<&PathBuf>, key: &str, value: &str) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_info("Creating default configuration...");
        config_init(config_path, false)?;
    }

    let mut table = read_table(&path)?;
    table.insert(key.to_string(), parse_value(value));

    // Reject values the client could not load back
    let _: ShellConfig = toml::Value::Table(table.clone())
        .try_into()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;

    std::fs::write(&path, toml::to_string_pretty(&table)?)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn parse_value(value: &str) -> toml::Value {
    if value == "true" {
        toml::Value::Boolean(true)
    } else if value == "false" {
        toml::Value::Boolean(false)
    } else if let Ok(i) = value.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = value.parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(value.to_string())
    }
}

/// Show current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve(config_path);

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
    let config_file = resolve(config_path);
    let config_dir = config_file
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_dir);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
        print_success(&format!("Created config directory: {:?}", config_dir));
    }

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    std::fs::write(&config_file, generate_default_config()?)
        .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

    print_success(&format!("Created configuration file: {:?}", config_file));

    let defaults = ShellConfig::default();
    if !defaults.private_key_path.exists() {
        print_info("SSH transport needs a key pair, for example:");
        print_info(&format!(
            "  ssh-keygen -t ed25519 -f {:?} -N ''",
            defaults.private_key_path
        ));
    }

    Ok(())
}

/// Open config in editor
pub fn config_edit(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_error(&format!("Config file not found: {:?}", path));
        print_info("Run 'tether config init' to create one");
        return Ok(());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| {
            if cfg!(windows) {
                "notepad".to_string()
            } else {
                "vi".to_string()
            }
        });

    print_info(&format!("Opening config with: {}", editor));

    std::process::Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to open editor: {}", editor))?;

    Ok(())
}

fn generate_default_config() -> Result<String> {
    let body = toml::to_string_pretty(&ShellConfig::default())?;
    Ok(format!(
        "# tether configuration\n\
         #\n\
         # connect_timeout is in seconds, refresh_interval in milliseconds.\n\
         # transport is \"tcp\" or \"ssh\".\n\n{}",
        body
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips() {
        let text = generate_default_config().unwrap();
        let parsed: ShellConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.default_port, 5555);
    }

    #[test]
    fn test_lookup_nested_key() {
        let table: toml::Table = toml::from_str("a = 1\n[b]\nc = \"x\"").unwrap();
        assert_eq!(lookup(&table, "a"), Some(&toml::Value::Integer(1)));
        assert_eq!(
            lookup(&table, "b.c"),
            Some(&toml::Value::String("x".to_string()))
        );
        assert!(lookup(&table, "a.c").is_none());
        assert!(lookup(&table, "missing").is_none());
    }

    #[test]
    fn test_set_rejects_invalid_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        config_init(Some(&path), false).unwrap();

        assert!(config_set(Some(&path), "transport", "carrier-pigeon").is_err());
        config_set(Some(&path), "default_port", "5037").unwrap();

        let loaded: ShellConfig = config::load_config(&path).unwrap();
        assert_eq!(loaded.default_port, 5037);
    }
}
