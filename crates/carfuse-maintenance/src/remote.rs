//! HTTP remote storage client for backup artifacts.
//!
//! Talks to whatever object-storage gateway the deployment fronts its cloud
//! provider with: PUT uploads, HEAD existence checks.

use async_trait::async_trait;

use carfuse_core::config::CloudStorageConfig;
use carfuse_core::error::{CarFuseError, Result};
use carfuse_core::traits::RemoteStorage;

pub struct HttpRemoteStorage {
    config: CloudStorageConfig,
    client: reqwest::Client,
}

impl HttpRemoteStorage {
    pub fn new(config: CloudStorageConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, remote_path: &str) -> String {
        format!("{}/{remote_path}", self.config.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl RemoteStorage for HttpRemoteStorage {
    async fn put(&self, remote_path: &str, bytes: &[u8]) -> Result<()> {
        let resp = self
            .client
            .put(self.url(remote_path))
            .bearer_auth(&self.config.api_key)
            .body(bytes.to_vec())
            .timeout(std::time::Duration::from_secs(120))
            .send()
            .await
            .map_err(|e| CarFuseError::Io(std::io::Error::other(format!("upload: {e}"))))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(CarFuseError::Io(std::io::Error::other(format!(
                "upload of {remote_path} rejected: {}",
                resp.status()
            ))))
        }
    }

    async fn exists(&self, remote_path: &str) -> Result<bool> {
        let resp = self
            .client
            .head(self.url(remote_path))
            .bearer_auth(&self.config.api_key)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| CarFuseError::Io(std::io::Error::other(format!("head: {e}"))))?;
        Ok(resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let storage = HttpRemoteStorage::new(CloudStorageConfig {
            url: "https://storage.example.com/".into(),
            ..CloudStorageConfig::default()
        });
        assert_eq!(
            storage.url("carfuse-backups/db-full-1.sql"),
            "https://storage.example.com/carfuse-backups/db-full-1.sql"
        );
    }
}
