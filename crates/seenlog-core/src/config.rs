use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use seenlog_catalog::CatalogConfig;
use seenlog_store::StoreConfig;
use serde::{Deserialize, Serialize};

fn default_bus_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenlogConfig {
    /// Owner of the seen records
    pub user_id: String,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

fn resolve_config_env(config: &mut SeenlogConfig) {
    config.user_id = resolve_env_var(&config.user_id);
    config.catalog.base_url = resolve_env_var(&config.catalog.base_url);
    config.store.path = resolve_env_var(&config.store.path);
}

/// Read `<root>/main.yaml`, expand `${VAR}` placeholders and validate.
pub fn load_config(root: &Path) -> Result<SeenlogConfig> {
    let path = root.join("main.yaml");
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))?;
    resolve_config_env(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<SeenlogConfig> {
    Ok(serde_yaml::from_str(content)?)
}

pub fn validate_config(config: &SeenlogConfig) -> Result<()> {
    if config.user_id.trim().is_empty() {
        return Err(anyhow!("user_id must not be empty"));
    }

    let base = &config.catalog.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(anyhow!("catalog.base_url must be an http(s) url: {base}"));
    }

    if config.catalog.timeout_secs == 0 {
        return Err(anyhow!("catalog.timeout_secs must be greater than zero"));
    }

    if config.bus_capacity == 0 {
        return Err(anyhow!("bus_capacity must be greater than zero"));
    }

    Ok(())
}
