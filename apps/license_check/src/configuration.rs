use std::{
    env,
    fs::{self, File},
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use grdlic::{sim::SimConfig, VendorCodes, Visibility};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{check::Settings, server};

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "LICENSE_CHECK_CONFIG";

fn default_vendor_codes() -> VendorCodes {
    VendorCodes::new(0x5191_75b7, 0x5191_7645)
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default = "default_vendor_codes")]
    pub vendor_codes: VendorCodes,
    #[serde(default)]
    pub feature_number: Option<u32>,
    #[serde(default)]
    pub web: server::Config,
    #[serde(default)]
    pub backend: SimConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            visibility: Visibility::default(),
            vendor_codes: default_vendor_codes(),
            feature_number: None,
            web: server::Config::default(),
            backend: SimConfig::default(),
        }
    }
}

impl From<&AppConfig> for Settings {
    fn from(config: &AppConfig) -> Self {
        Self {
            visibility: config.visibility,
            vendor_codes: config.vendor_codes,
            feature_number: config.feature_number,
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    env::var_os(CONFIG_PATH_VAR).map(PathBuf::from)
}

pub fn read_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let Some(path) = path else {
        info!("{CONFIG_PATH_VAR} is not set, using default config");
        return Ok(AppConfig::default());
    };
    let Ok(file) = File::open(path) else {
        info!("No config file found at {path:?}, using default config");
        return Ok(AppConfig::default());
    };
    let reader = BufReader::new(file);
    let result: AppConfig = serde_json::from_reader(reader)
        .with_context(|| format!("Could not parse config file {path:?}"))?;
    info!("Loaded config: {:?}", result);
    Ok(result)
}

pub fn write_config(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let staged = path.with_extension("json.tmp");
    let mut file = File::create(&staged)?;
    let content = serde_json::to_string_pretty(config)?;
    file.write_all(content.as_bytes())?;
    fs::rename(staged, path)?;
    Ok(())
}
