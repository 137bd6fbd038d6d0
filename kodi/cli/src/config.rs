use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use kodi_app::AppConfig;

use crate::db::DbConfig;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub app: AppConfig,
}

pub struct EnvOverride {
    pub pg_con: String,
}

impl Config {
    pub fn load(
        path: Option<impl AsRef<Path>>,
        EnvOverride { pg_con }: EnvOverride,
    ) -> anyhow::Result<Self> {
        let mut config: Config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path.as_ref()).context(format!(
                    "Couldn't read config file {}",
                    path.as_ref().display()
                ))?;
                serde_yaml::from_str(&raw).context("Couldn't parse config file")?
            }
            None => Default::default(),
        };
        config.db.pg_con = pg_con;
        Ok(config)
    }
}
