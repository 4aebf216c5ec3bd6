use std::{env, fs::File, io::Read, path::PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct AuthConfig {
    pub sk: String,
    pub pk: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub db_url: String,
    /// Root directory for uploaded attachments.
    pub base_dir: PathBuf,
}

impl AppConfig {
    /// First readable of `./app.yml`, `/etc/config/app.yml`, then the
    /// file named by `TUTOR_CONFIG`.
    pub fn load() -> Result<Self> {
        let mut candidates = vec![
            PathBuf::from("./app.yml"),
            PathBuf::from("/etc/config/app.yml"),
        ];
        if let Ok(path) = env::var("TUTOR_CONFIG") {
            candidates.push(PathBuf::from(path));
        }
        for path in &candidates {
            if let Ok(file) = File::open(path) {
                return Self::load_from_reader(file)
                    .with_context(|| format!("parse config {:?} failed", path));
            }
        }
        bail!("no config file found in {:?}", candidates)
    }

    pub fn load_from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_yaml::from_reader(reader)?)
    }
}
