use std::path::Path;

use satchel_core::util::is_http_endpoint;

use crate::config::CliConfig;
use crate::error::CliError;

#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub student: Option<String>,
    pub max_retries: Option<u32>,
}

pub fn apply_config_update(
    mut config: CliConfig,
    update: ConfigUpdate,
) -> Result<CliConfig, CliError> {
    if let Some(url) = update.url {
        if !is_http_endpoint(&url) {
            return Err(CliError::Config(
                "remote URL must include http:// or https://".to_string(),
            ));
        }
        config.remote.rest_url = Some(url);
    }
    if let Some(anon_key) = update.anon_key {
        config.remote.anon_key = Some(anon_key);
    }
    if let Some(student) = update.student {
        config.engine = config.engine.with_owner(student);
    }
    if let Some(max_retries) = update.max_retries {
        config.engine.max_retries = max_retries;
    }

    config.remote = config.remote.normalized();
    config.engine.validate()?;
    Ok(config)
}

pub fn run_config_show(path: &Path) -> Result<(), CliError> {
    let config = CliConfig::load_from_path(path).map_err(CliError::Config)?;
    println!("# {}", path.display());

    // Keys stay out of the terminal
    let mut shown = config;
    if shown.remote.anon_key.is_some() {
        shown.remote.anon_key = Some("[REDACTED]".to_string());
    }
    if shown.remote.access_token.is_some() {
        shown.remote.access_token = Some("[REDACTED]".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

pub fn run_config_set(path: &Path, update: ConfigUpdate) -> Result<(), CliError> {
    let config = CliConfig::load_from_path(path).map_err(CliError::Config)?;
    let updated = apply_config_update(config, update)?;
    updated.save_to_path(path).map_err(CliError::Config)?;
    println!("Saved {}", path.display());
    Ok(())
}
