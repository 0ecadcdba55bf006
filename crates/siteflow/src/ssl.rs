//! SSL 証明書の配置
//!
//! 証明書はリバースプロキシの certs ディレクトリに `<url>.crt` / `<url>.key`
//! として置きます。

use crate::error::{ProvisionError, Result};
use crate::materialize::write_file;
use async_trait::async_trait;
use siteflow_container::{ContainerDriver, OneShot, run_command};
use siteflow_core::{SiteConfig, SslMode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 証明書の発行と削除
#[async_trait]
pub trait CertIssuer: Send + Sync {
    /// SSL 種別に応じた証明書を用意し、新しく作成したファイルを返す
    async fn issue(&self, config: &SiteConfig) -> Result<Vec<PathBuf>>;

    /// サイトの証明書を削除（存在しなければ何もしない）
    async fn remove(&self, url: &str) -> Result<Vec<PathBuf>>;
}

/// 証明書関連のディレクトリ
#[derive(Debug, Clone)]
pub struct CertDirs {
    /// リバースプロキシの certs
    pub certs: PathBuf,
    /// リバースプロキシの vhost.d
    pub vhost: PathBuf,
    /// acme.sh の状態
    pub acme: PathBuf,
    /// ACME チャレンジの webroot
    pub challenge: PathBuf,
}

impl CertDirs {
    pub fn cert_file(&self, url: &str) -> PathBuf {
        self.certs.join(format!("{}.crt", url))
    }

    pub fn key_file(&self, url: &str) -> PathBuf {
        self.certs.join(format!("{}.key", url))
    }

    pub fn challenge_include(&self, url: &str) -> PathBuf {
        self.vhost.join(url)
    }

    /// サイトごとに配置するファイル
    pub fn site_files(&self, url: &str) -> [PathBuf; 3] {
        [
            self.cert_file(url),
            self.key_file(url),
            self.challenge_include(url),
        ]
    }
}

/// リバースプロキシ向けの証明書発行
pub struct ProxyCertIssuer {
    driver: Arc<dyn ContainerDriver>,
    dirs: CertDirs,
    acme_image: String,
    acme_email: Option<String>,
}

impl ProxyCertIssuer {
    pub fn new(
        driver: Arc<dyn ContainerDriver>,
        dirs: CertDirs,
        acme_image: impl Into<String>,
        acme_email: Option<String>,
    ) -> Self {
        Self {
            driver,
            dirs,
            acme_image: acme_image.into(),
            acme_email,
        }
    }

    async fn issue_managed(&self, config: &SiteConfig) -> Result<()> {
        write_file(
            &self.dirs.challenge_include(&config.url),
            "location ^~ /.well-known/acme-challenge/ {\n    auth_basic off;\n    root /usr/share/nginx/html;\n}\n",
        )
        .await?;

        let mut issue = vec!["--issue".to_string(), "--server".to_string(), "letsencrypt".to_string()];
        for domain in config.alias_domains.iter() {
            if domain.starts_with("*.") && !config.wildcard_cert {
                continue;
            }
            issue.push("-d".to_string());
            issue.push(domain.to_string());
        }
        if config.wildcard_cert {
            // ワイルドカードは HTTP チャレンジでは検証できない
            issue.push("--dns".to_string());
            issue.push("dns_cf".to_string());
        } else {
            issue.push("-w".to_string());
            issue.push("/var/www/acme".to_string());
        }
        if let Some(email) = &self.acme_email {
            issue.push("--accountemail".to_string());
            issue.push(email.clone());
        }

        let run = OneShot::new(&self.acme_image, issue)
            .volume(&self.dirs.acme, "/acme.sh")
            .volume(&self.dirs.challenge, "/var/www/acme");
        self.run(&run).await?;

        let install = OneShot::new(
            &self.acme_image,
            [
                "--install-cert".to_string(),
                "-d".to_string(),
                config.url.clone(),
                "--key-file".to_string(),
                format!("/certs/{}.key", config.url),
                "--fullchain-file".to_string(),
                format!("/certs/{}.crt", config.url),
            ],
        )
        .volume(&self.dirs.acme, "/acme.sh")
        .volume(&self.dirs.certs, "/certs");
        self.run(&install).await
    }

    async fn issue_self_signed(&self, config: &SiteConfig) -> Result<()> {
        let mut san = format!("subjectAltName=DNS:{}", config.url);
        if config.wildcard_cert {
            san.push_str(&format!(",DNS:*.{}", config.url));
        }
        let args: Vec<String> = [
            "req",
            "-x509",
            "-nodes",
            "-newkey",
            "rsa:2048",
            "-days",
            "3650",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([
            "-subj".to_string(),
            format!("/CN={}", config.url),
            "-addext".to_string(),
            san,
            "-keyout".to_string(),
            self.dirs.key_file(&config.url).display().to_string(),
            "-out".to_string(),
            self.dirs.cert_file(&config.url).display().to_string(),
        ])
        .collect();

        let display = args.join(" ");
        run_command("openssl", &args, None, &display)
            .await?
            .into_result(format!("openssl {}", display))
            .map_err(|e| ProvisionError::Certificate(e.to_string()))?;
        Ok(())
    }

    async fn install_files(&self, url: &str, key: &Path, crt: &Path) -> Result<()> {
        for (from, to) in [(key, self.dirs.key_file(url)), (crt, self.dirs.cert_file(url))] {
            if !from.is_file() {
                return Err(ProvisionError::Certificate(format!(
                    "証明書ファイルが見つかりません: {}",
                    from.display()
                )));
            }
            tokio::fs::copy(from, &to)
                .await
                .map_err(|e| ProvisionError::config_write(&to, e))?;
        }
        Ok(())
    }

    async fn install(&self, config: &SiteConfig) -> Result<()> {
        match config.ssl_mode {
            SslMode::None => {}
            SslMode::ManagedCert => self.issue_managed(config).await?,
            SslMode::SelfSigned => self.issue_self_signed(config).await?,
            SslMode::InheritParent => {
                let parent = parent_domain(&config.url).ok_or_else(|| {
                    ProvisionError::Certificate(format!("親ドメインがありません: {}", config.url))
                })?;
                let key = self.dirs.key_file(parent);
                let crt = self.dirs.cert_file(parent);
                self.install_files(&config.url, &key, &crt).await?;
            }
            SslMode::CustomCert => {
                let paths = config.custom_cert.as_ref().ok_or_else(|| {
                    ProvisionError::Certificate("カスタム証明書が指定されていません".to_string())
                })?;
                self.install_files(&config.url, &paths.key, &paths.crt).await?;
            }
        }
        Ok(())
    }

    async fn run(&self, probe: &OneShot) -> Result<()> {
        self.driver
            .run_once(probe)
            .await?
            .into_result(probe)
            .map_err(|e| ProvisionError::Certificate(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl CertIssuer for ProxyCertIssuer {
    #[instrument(skip_all, fields(url = %config.url, ssl = %config.ssl_mode))]
    async fn issue(&self, config: &SiteConfig) -> Result<Vec<PathBuf>> {
        if !config.ssl_mode.is_enabled() {
            return Ok(Vec::new());
        }
        tokio::fs::create_dir_all(&self.dirs.certs)
            .await
            .map_err(|e| ProvisionError::config_write(&self.dirs.certs, e))?;

        // 失敗時はこの発行で新しくできたファイルだけを消す
        let targets = self.dirs.site_files(&config.url);
        let mut existed = Vec::new();
        for path in &targets {
            existed.push(tokio::fs::try_exists(path).await.unwrap_or(true));
        }

        let fresh: Vec<PathBuf> = targets
            .into_iter()
            .zip(existed)
            .filter_map(|(path, existed)| (!existed).then_some(path))
            .collect();

        if let Err(e) = self.install(config).await {
            for path in &fresh {
                if tokio::fs::remove_file(path).await.is_ok() {
                    debug!(path = %path.display(), "Removed partial certificate file");
                }
            }
            return Err(e);
        }

        info!("Certificate installed");
        let mut created = Vec::new();
        for path in fresh {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                created.push(path);
            }
        }
        Ok(created)
    }

    async fn remove(&self, url: &str) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in self.dirs.site_files(url) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed certificate file");
                    removed.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ProvisionError::config_write(&path, e)),
            }
        }
        Ok(removed)
    }
}

/// `a.example.com` → `example.com`
pub fn parent_domain(url: &str) -> Option<&str> {
    url.split_once('.')
        .map(|(_, parent)| parent)
        .filter(|parent| parent.contains('.'))
}
