//! 設定ファイルの生成
//!
//! compose ファイル、.env、nginx vhost、PHP ini、postfix 設定、ユーザー用の
//! 追加設定をこの順で書き出します。途中で失敗しても書きかけのファイルは
//! 残したまま返り、後始末はロールバック側が行います。

use crate::error::{ProvisionError, Result};
use crate::layout::{SiteLayout, ensure_dir};
use serde_json::json;
use siteflow_core::{ComposeSpec, MultisiteMode, SiteConfig, TemplateId, TemplateRenderer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// コンテナ内プロセスに渡すホスト側のユーザー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostUser {
    pub uid: u32,
    pub gid: u32,
}

impl HostUser {
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
}

pub struct Materializer {
    renderer: Arc<TemplateRenderer>,
    owner: HostUser,
}

impl Materializer {
    pub fn new(renderer: Arc<TemplateRenderer>, owner: HostUser) -> Self {
        Self { renderer, owner }
    }

    /// サイトの設定ファイル一式を書き出す
    ///
    /// 返り値は書き込んだファイルの一覧（書き込み順）。
    #[instrument(skip_all, fields(url = %config.url))]
    pub async fn materialize(
        &self,
        config: &SiteConfig,
        layout: &SiteLayout,
        spec: &ComposeSpec,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        written.push(self.write_compose(layout, spec).await?);

        let env = self.render(
            TemplateId::Env,
            &json!({
                "url": config.url,
                "project": spec.project,
                "local_db": spec.local_db,
                "db_root_password": config.db.root_password.as_deref().unwrap_or_default(),
                "db_name": config.db.name,
                "db_user": config.db.user,
                "db_password": config.db.password,
                "user_id": self.owner.uid,
                "group_id": self.owner.gid,
            }),
        )?;
        written.push(write_file(&layout.env_file(), &env).await?);

        let multisite = match config.multisite_mode {
            MultisiteMode::None => "",
            mode => mode.as_site_type(),
        };
        let vhost = self.render(
            TemplateId::NginxVhost,
            &json!({
                "url": config.url,
                "server_names": config.alias_domains.iter().collect::<Vec<_>>().join(" "),
                "document_root": config.container_root(),
                "multisite": multisite,
            }),
        )?;
        written.push(write_file(&layout.nginx_vhost(), &vhost).await?);

        let ini = self.render(
            TemplateId::PhpIni,
            &json!({
                "url": config.url,
                "legacy": config.php_version.is_legacy(),
                "mail_from": config.admin.email,
            }),
        )?;
        written.push(write_file(&layout.php_ini(), &ini).await?);

        let postfix = self.render(TemplateId::PostfixMain, &json!({ "url": config.url }))?;
        written.push(write_file(&layout.postfix_main(), &postfix).await?);

        // ユーザーが編集するファイルは既存の内容を残す
        let custom = layout.nginx_custom();
        if !custom.exists() {
            let stub = self.render(TemplateId::NginxCustom, &json!({ "url": config.url }))?;
            written.push(write_file(&custom, &stub).await?);
        }

        if let Some(public_dir) = &config.public_dir {
            let wp_cli = self.render(TemplateId::WpCli, &json!({ "public_dir": public_dir }))?;
            written.push(write_file(&layout.wp_cli_yml(), &wp_cli).await?);
        }

        // コンテナがマウントするパスは起動前にすべて存在している必要がある
        for mount in spec
            .services
            .iter()
            .flat_map(|service| service.volumes.iter())
            .filter_map(|entry| bind_source(entry))
        {
            if !mount.exists() {
                ensure_dir(&mount).await?;
            }
        }

        info!(files = written.len(), "Site configuration written");
        Ok(written)
    }

    /// compose ファイルのみを書き出す
    pub async fn write_compose(&self, layout: &SiteLayout, spec: &ComposeSpec) -> Result<PathBuf> {
        let compose = self
            .renderer
            .render_compose(spec)
            .map_err(ProvisionError::template)?;
        write_file(&layout.compose_file(), &compose).await
    }

    fn render(&self, id: TemplateId, data: &serde_json::Value) -> Result<String> {
        self.renderer
            .render(id, data)
            .map_err(ProvisionError::template)
    }
}

/// compose のボリューム指定からバインドマウントのホスト側パスを取り出す
fn bind_source(entry: &str) -> Option<PathBuf> {
    let source = entry.split(':').next()?;
    source.starts_with('/').then(|| PathBuf::from(source))
}

pub(crate) async fn write_file(path: &Path, content: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| ProvisionError::config_write(path, e))?;
    debug!(path = %path.display(), "Wrote file");
    Ok(path.to_path_buf())
}
