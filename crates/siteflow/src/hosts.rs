//! hosts ファイルのエントリ管理

use crate::error::{ProvisionError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOOPBACK: &str = "127.0.0.1";

/// サイト用の hosts エントリ（`127.0.0.1 <url>`）
#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry(url: &str) -> String {
        format!("{}\t{}", LOOPBACK, url)
    }

    fn is_entry(line: &str, url: &str) -> bool {
        let mut parts = line.split_whitespace();
        parts.next() == Some(LOOPBACK) && parts.next() == Some(url) && parts.next().is_none()
    }

    async fn read(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(ProvisionError::config_write(&self.path, e)),
        }
    }

    /// エントリを追加（既にあれば何もしない）
    pub async fn add(&self, url: &str) -> Result<bool> {
        let mut content = self.read().await?;
        if content.lines().any(|line| Self::is_entry(line, url)) {
            return Ok(false);
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&Self::entry(url));
        content.push('\n');
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| ProvisionError::config_write(&self.path, e))?;
        debug!(url, "Added hosts entry");
        Ok(true)
    }

    /// エントリを削除（なければ何もしない）
    pub async fn remove(&self, url: &str) -> Result<bool> {
        let content = self.read().await?;
        let kept: Vec<&str> = content
            .lines()
            .filter(|line| !Self::is_entry(line, url))
            .collect();
        if kept.len() == content.lines().count() {
            return Ok(false);
        }
        let mut updated = kept.join("\n");
        updated.push('\n');
        tokio::fs::write(&self.path, updated)
            .await
            .map_err(|e| ProvisionError::config_write(&self.path, e))?;
        debug!(url, "Removed hosts entry");
        Ok(true)
    }

    pub async fn contains(&self, url: &str) -> Result<bool> {
        Ok(self.read().await?.lines().any(|line| Self::is_entry(line, url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_add_and_remove_only_own_entry() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("hosts");
        std::fs::write(&path, "127.0.0.1 localhost\n127.0.0.1\tother.test").unwrap();
        let hosts = HostsFile::new(&path);

        assert!(hosts.add("demo.test").await.unwrap());
        assert!(!hosts.add("demo.test").await.unwrap());
        assert!(hosts.contains("demo.test").await.unwrap());

        assert!(hosts.remove("demo.test").await.unwrap());
        assert!(!hosts.remove("demo.test").await.unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "127.0.0.1 localhost\n127.0.0.1\tother.test\n");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = tempdir().unwrap();
        let hosts = HostsFile::new(temp_dir.path().join("hosts"));
        assert!(!hosts.remove("demo.test").await.unwrap());
        assert!(hosts.add("demo.test").await.unwrap());
        assert!(hosts.contains("demo.test").await.unwrap());
    }
}
