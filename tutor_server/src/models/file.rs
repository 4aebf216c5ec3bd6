use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use sha1::{Digest, Sha1};

use crate::error::AppError;

use super::StoredFile;

const URL_PREFIX: &str = "/files/";

impl StoredFile {
    pub fn new(filename: &str, data: &[u8]) -> Self {
        let hash = Sha1::digest(data);
        // the extension ends up in a path, keep it to [A-Za-z0-9]+
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("txt");
        Self {
            ext: ext.to_string(),
            hash: hex::encode(hash),
        }
    }

    pub fn url(&self) -> String {
        format!("{URL_PREFIX}{}", self.hash_to_path())
    }

    pub fn path(&self, base_dir: impl AsRef<Path>) -> PathBuf {
        base_dir.as_ref().join(self.hash_to_path())
    }

    pub fn hash_to_path(&self) -> String {
        let (first, remain) = self.hash.split_at(3);
        let (second, third) = remain.split_at(3);
        let ext = &self.ext;
        format!("{first}/{second}/{third}.{ext}")
    }
}

impl FromStr for StoredFile {
    type Err = AppError;

    // parse /files/2aa/e6c/35c94fcfb415dbe95f408b9ce91ee846ed.txt
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(s) = s.strip_prefix(URL_PREFIX) else {
            return Err(AppError::InvalidInput("file path".to_string()));
        };
        let parts: Vec<&str> = s.split('/').collect();
        let [first, second, last] = parts.as_slice() else {
            return Err(AppError::InvalidInput("file path".to_string()));
        };
        let Some((third, ext)) = last.split_once('.') else {
            return Err(AppError::InvalidInput("file path".to_string()));
        };
        let hash = format!("{first}{second}{third}");
        if hash.len() != 40
            || !hash.chars().all(|c| c.is_ascii_hexdigit())
            || ext.is_empty()
            || !ext.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(AppError::InvalidInput("file path".to_string()));
        }
        Ok(Self {
            ext: ext.to_string(),
            hash,
        })
    }
}
