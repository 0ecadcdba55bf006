//! テンプレート展開機能
//!
//! Teraを使用して設定ファイル（compose, .env, nginx, php, postfix）を生成します。
//! テンプレートはバイナリに埋め込まれており、外部ファイルには依存しません。

use crate::error::{Result, SiteError};
use crate::model::{ComposeSpec, NetworkAttachment, NetworkSpec, ServiceSpec, VolumeSpec};
use serde::Serialize;
use std::collections::BTreeMap;
use tera::{Context, Tera};
use tracing::debug;

/// テンプレート識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    Compose,
    Env,
    NginxVhost,
    NginxCustom,
    PhpIni,
    PostfixMain,
    WpCli,
    ProxyCachePath,
    ProxyCacheLocation,
}

impl TemplateId {
    pub const ALL: [TemplateId; 9] = [
        TemplateId::Compose,
        TemplateId::Env,
        TemplateId::NginxVhost,
        TemplateId::NginxCustom,
        TemplateId::PhpIni,
        TemplateId::PostfixMain,
        TemplateId::WpCli,
        TemplateId::ProxyCachePath,
        TemplateId::ProxyCacheLocation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Compose => "docker-compose.yml",
            Self::Env => "env",
            Self::NginxVhost => "nginx/main.conf",
            Self::NginxCustom => "nginx/custom.conf",
            Self::PhpIni => "php/custom.ini",
            Self::PostfixMain => "postfix/main.cf",
            Self::WpCli => "wp-cli.yml",
            Self::ProxyCachePath => "proxy/cache-path.conf",
            Self::ProxyCacheLocation => "proxy/cache-location.conf",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::Compose => include_str!("../templates/docker-compose.yml.tera"),
            Self::Env => include_str!("../templates/env.tera"),
            Self::NginxVhost => include_str!("../templates/nginx/main.conf.tera"),
            Self::NginxCustom => include_str!("../templates/nginx/custom.conf.tera"),
            Self::PhpIni => include_str!("../templates/php/custom.ini.tera"),
            Self::PostfixMain => include_str!("../templates/postfix/main.cf.tera"),
            Self::WpCli => include_str!("../templates/wp-cli.yml.tera"),
            Self::ProxyCachePath => include_str!("../templates/proxy/cache-path.conf.tera"),
            Self::ProxyCacheLocation => {
                include_str!("../templates/proxy/cache-location.conf.tera")
            }
        }
    }
}

/// テンプレートレンダラー
///
/// 同じテンプレートと入力からは常に同じテキストを返す純粋な変換です。
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// 埋め込みテンプレートを登録したレンダラーを作成
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        for id in TemplateId::ALL {
            tera.add_raw_template(id.name(), id.source())
                .map_err(|e| SiteError::template(id.name(), &e))?;
        }
        Ok(Self { tera })
    }

    /// テンプレートを展開
    pub fn render<T: Serialize>(&self, id: TemplateId, data: &T) -> Result<String> {
        let context =
            Context::from_serialize(data).map_err(|e| SiteError::template(id.name(), &e))?;
        debug!(template = id.name(), "Rendering template");
        self.tera
            .render(id.name(), &context)
            .map_err(|e| SiteError::template(id.name(), &e))
    }

    /// `ComposeSpec` を compose ファイルに変換
    pub fn render_compose(&self, spec: &ComposeSpec) -> Result<String> {
        self.render(TemplateId::Compose, &ComposeView::from(spec))
    }
}

/// compose テンプレート用のビュー（環境変数を "KEY=value" に展開済み）
#[derive(Serialize)]
struct ComposeView<'a> {
    project: &'a str,
    services: Vec<ServiceView<'a>>,
    volumes: &'a [VolumeSpec],
    networks: &'a [NetworkSpec],
}

#[derive(Serialize)]
struct ServiceView<'a> {
    name: &'a str,
    image: &'a str,
    restart: &'static str,
    hostname: Option<&'a str>,
    command: Option<&'a [String]>,
    depends_on: &'a [String],
    volumes: &'a [String],
    environment: Vec<String>,
    labels: &'a BTreeMap<String, String>,
    networks: &'a [NetworkAttachment],
}

impl<'a> From<&'a ServiceSpec> for ServiceView<'a> {
    fn from(service: &'a ServiceSpec) -> Self {
        Self {
            name: &service.name,
            image: &service.image,
            restart: service.restart.as_compose_str(),
            hostname: service.hostname.as_deref(),
            command: service.command.as_deref(),
            depends_on: &service.depends_on,
            volumes: &service.volumes,
            environment: service
                .environment
                .iter()
                .map(|env| match &env.value {
                    Some(value) => format!("{}={}", env.key, value),
                    // .env からの値を展開させる
                    None => format!("{}=${{{}}}", env.key, env.key),
                })
                .collect(),
            labels: &service.labels,
            networks: &service.networks,
        }
    }
}

impl<'a> From<&'a ComposeSpec> for ComposeView<'a> {
    fn from(spec: &'a ComposeSpec) -> Self {
        Self {
            project: &spec.project,
            services: spec.services.iter().map(ServiceView::from).collect(),
            volumes: &spec.volumes,
            networks: &spec.networks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ComposeBuilder;
    use crate::model::{DatabaseMode, VolumeMount, VolumeMountSet};
    use crate::testing::sample_config;
    use serde_json::json;

    #[test]
    fn test_all_templates_register() {
        assert!(TemplateRenderer::new().is_ok());
    }

    #[test]
    fn test_render_env_for_local_db() {
        let renderer = TemplateRenderer::new().unwrap();
        let text = renderer
            .render(
                TemplateId::Env,
                &json!({
                    "url": "demo.test",
                    "project": "demotest",
                    "local_db": true,
                    "db_root_password": "rootpw",
                    "db_name": "demo_test",
                    "db_user": "demo",
                    "db_password": "pw",
                    "user_id": 1000,
                    "group_id": 1000,
                }),
            )
            .unwrap();

        assert!(text.contains("MYSQL_ROOT_PASSWORD=rootpw\n"));
        assert!(text.contains("WORDPRESS_DB_PASSWORD=pw\n"));
    }

    #[test]
    fn test_missing_variable_is_template_error() {
        let renderer = TemplateRenderer::new().unwrap();
        let err = renderer
            .render(TemplateId::WpCli, &json!({ "unrelated": 1 }))
            .unwrap_err();
        assert!(matches!(err, SiteError::TemplateError { template, .. } if template == "wp-cli.yml"));
    }

    #[test]
    fn test_render_compose() {
        let mut config = sample_config("demo.test");
        config.database_mode = DatabaseMode::LocalContainer;
        let mut volumes = VolumeMountSet::new();
        volumes.insert("db", VolumeMount::named("db_data", "/var/lib/mysql"));
        let spec = ComposeBuilder::default().build(&config, &volumes);

        let text = TemplateRenderer::new()
            .unwrap()
            .render_compose(&spec)
            .unwrap();

        assert!(text.starts_with("# siteflow"));
        assert!(text.contains("name: demotest\n"));
        assert!(text.contains("  db:\n    image: "));
        assert!(text.contains(r#"- "MYSQL_PASSWORD=${MYSQL_PASSWORD}""#));
        assert!(text.contains(r#"- "WORDPRESS_DB_HOST=db""#));
        assert!(text.contains(r#"siteflow.site: "demo.test""#));
        assert!(text.contains("  db_data:\n"));
        assert!(text.contains("    external: true"));
    }
}
