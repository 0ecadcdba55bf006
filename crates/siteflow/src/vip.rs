//! WordPress VIP Go 向けの wp-content 構成

use crate::error::{ProvisionError, Result};
use siteflow_container::run_command;
use siteflow_core::SiteError;
use std::path::Path;
use tracing::{info, warn};

pub const VIP_GO_SKELETON: &str = "https://github.com/Automattic/vip-go-skeleton.git";
pub const VIP_GO_MU_PLUGINS: &str = "https://github.com/Automattic/vip-go-mu-plugins-built";

/// アクセス確認を試すリポジトリURLの候補
///
/// `user/repo` 形式は SSH、HTTPS の順に GitHub のURLとして試します。
pub fn repo_candidates(repo: &str) -> Vec<String> {
    if repo.starts_with("git@") || repo.contains("://") {
        return vec![repo.to_string()];
    }
    vec![
        format!("git@github.com:{}.git", repo),
        format!("https://github.com/{}.git", repo),
    ]
}

async fn git(args: &[&str], workdir: Option<&Path>) -> Result<bool> {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let output = run_command("git", &args, workdir, &args.join(" ")).await?;
    Ok(output.success())
}

/// リポジトリにアクセスできるか確認し、使用するURLを返す
pub async fn check_repo_access(repo: &str) -> Result<String> {
    info!(repo, "Checking VIP repo access");
    for candidate in repo_candidates(repo) {
        if git(&["ls-remote", "--exit-code", "-h", &candidate], None).await? {
            return Ok(candidate);
        }
    }
    Err(SiteError::VipRepoUnreachable(repo.to_string()).into())
}

/// wp-content をリポジトリの内容で置き換え、VIP mu-plugins を配置
///
/// clone に失敗した場合は元の wp-content に戻して警告のみ出します。
pub async fn setup(wp_root: &Path, repo_url: &str) -> Result<()> {
    info!(repo = repo_url, "Setting up VIP Go environment");

    let content = wp_root.join("wp-content");
    let backup = wp_root.join("wp-content-bkp");
    if content.exists() {
        tokio::fs::rename(&content, &backup)
            .await
            .map_err(|e| ProvisionError::config_write(&content, e))?;
    }

    if !git(&["clone", repo_url, "wp-content"], Some(wp_root)).await? {
        warn!(repo = repo_url, "Git clone failed, restoring wp-content");
        let _ = tokio::fs::remove_dir_all(&content).await;
        if backup.exists() {
            tokio::fs::rename(&backup, &content)
                .await
                .map_err(|e| ProvisionError::config_write(&content, e))?;
        }
        return Ok(());
    }
    if backup.exists() {
        let _ = tokio::fs::remove_dir_all(&backup).await;
    }

    let mu_plugins = content.join("mu-plugins");
    if mu_plugins.exists() {
        warn!("Repository already has mu-plugins, skipping VIP mu-plugins. Move them to client-mu-plugins to use VIP mu-plugins.");
        return Ok(());
    }

    // wp-content の外で clone してから移動する
    let staging = wp_root.join("mu-plugins");
    if git(&["clone", "--depth=1", VIP_GO_MU_PLUGINS, "mu-plugins"], Some(wp_root)).await? {
        tokio::fs::rename(&staging, &mu_plugins)
            .await
            .map_err(|e| ProvisionError::config_write(&mu_plugins, e))?;
    } else {
        warn!(repo = VIP_GO_MU_PLUGINS, "VIP mu-plugins clone failed");
        let _ = tokio::fs::remove_dir_all(&staging).await;
    }
    Ok(())
}
