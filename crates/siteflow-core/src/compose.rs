//! composeトポロジー生成
//!
//! `SiteConfig` とマウント一覧からサイトのサービス構成を組み立てます。
//! I/O は一切行わず、同じ入力からは常に同じ `ComposeSpec` を返します。

use crate::model::{
    CacheHostMode, ComposeSpec, DatabaseMode, EnvVar, LOCAL_CACHE_HOST, LOCAL_DB_HOST,
    MountSource, NetworkAttachment, NetworkSpec, RestartPolicy, ServiceSpec, SiteConfig,
    VolumeMountSet, VolumeSpec,
};
use std::collections::BTreeMap;

/// サイト所属を示すラベル（クリーンアップ時の検索キー）
pub const SITE_LABEL: &str = "siteflow.site";
/// サービス名ラベル
pub const SERVICE_LABEL: &str = "siteflow.service";
/// サイト専用ネットワーク名
pub const SITE_NETWORK: &str = "site-network";

/// 各サービスのイメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    pub nginx: String,
    /// タグなしのリポジトリ名（タグはPHPバージョン）
    pub php: String,
    pub db: String,
    pub redis: String,
    pub postfix: String,
}

impl Default for ImageSet {
    fn default() -> Self {
        Self {
            nginx: "easyengine/nginx:v4.1.4".to_string(),
            php: "easyengine/php".to_string(),
            db: "easyengine/mariadb:v4.1.3".to_string(),
            redis: "easyengine/redis:v4.1.0".to_string(),
            postfix: "easyengine/postfix:v4.1.0".to_string(),
        }
    }
}

/// グローバル環境側の前提（ネットワーク名など）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub images: ImageSet,
    pub frontend_network: String,
    pub backend_network: String,
    pub default_ssl_policy: String,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            images: ImageSet::default(),
            frontend_network: "global-frontend-network".to_string(),
            backend_network: "global-backend-network".to_string(),
            default_ssl_policy: "Mozilla-Intermediate".to_string(),
        }
    }
}

/// composeトポロジービルダー
#[derive(Debug, Clone, Default)]
pub struct ComposeBuilder {
    topology: Topology,
}

impl ComposeBuilder {
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// SSL種別に応じたトポロジーを生成
    ///
    /// SSLなしのサイトはHTTPSリダイレクトを無効化します。
    pub fn build(&self, config: &SiteConfig, volumes: &VolumeMountSet) -> ComposeSpec {
        self.build_with(config, volumes, !config.ssl_mode.is_enabled())
    }

    /// HTTPSリダイレクト無効化フラグを明示してトポロジーを生成
    ///
    /// 証明書発行前の初回起動では `https_bypass = true` で生成します。
    pub fn build_with(
        &self,
        config: &SiteConfig,
        volumes: &VolumeMountSet,
        https_bypass: bool,
    ) -> ComposeSpec {
        let local_db = config.database_mode.is_local();
        let local_cache =
            config.cache_enabled && config.cache_host_mode == CacheHostMode::LocalContainer;

        let mut services = Vec::new();
        if local_db {
            services.push(self.db_service(config, volumes));
        }
        services.push(self.php_service(config, volumes));
        services.push(self.nginx_service(config, volumes, https_bypass));
        services.push(self.postfix_service(config, volumes));
        if local_cache {
            services.push(self.redis_service(config, volumes));
        }

        // 実際に含まれるサービスが参照する名前付きボリュームのみ宣言する
        let mut named: Vec<String> = services
            .iter()
            .flat_map(|s| volumes.for_service(&s.name))
            .filter_map(|m| match &m.source {
                MountSource::Named(name) => Some(name.clone()),
                MountSource::Bind(_) => None,
            })
            .collect();
        named.sort();
        named.dedup();
        let volume_specs = named
            .into_iter()
            .map(|name| VolumeSpec {
                name,
                labels: site_labels(&config.url),
            })
            .collect();

        let networks = vec![
            NetworkSpec {
                name: SITE_NETWORK.to_string(),
                external: false,
                labels: site_labels(&config.url),
            },
            NetworkSpec {
                name: self.topology.frontend_network.clone(),
                external: true,
                labels: BTreeMap::new(),
            },
            NetworkSpec {
                name: self.topology.backend_network.clone(),
                external: true,
                labels: BTreeMap::new(),
            },
        ];

        ComposeSpec {
            project: config.project_name(),
            services,
            volumes: volume_specs,
            networks,
            local_db,
            https_bypass,
        }
    }

    fn db_service(&self, config: &SiteConfig, volumes: &VolumeMountSet) -> ServiceSpec {
        ServiceSpec {
            name: LOCAL_DB_HOST.to_string(),
            image: self.topology.images.db.clone(),
            restart: RestartPolicy::Always,
            volumes: mount_entries(volumes, LOCAL_DB_HOST),
            environment: vec![
                EnvVar::inherit("MYSQL_ROOT_PASSWORD"),
                EnvVar::inherit("MYSQL_DATABASE"),
                EnvVar::inherit("MYSQL_USER"),
                EnvVar::inherit("MYSQL_PASSWORD"),
            ],
            networks: vec![NetworkAttachment::new(SITE_NETWORK)],
            labels: service_labels(&config.url, LOCAL_DB_HOST),
            ..Default::default()
        }
    }

    fn php_service(&self, config: &SiteConfig, volumes: &VolumeMountSet) -> ServiceSpec {
        let db_host = match config.database_mode {
            DatabaseMode::LocalContainer => LOCAL_DB_HOST.to_string(),
            DatabaseMode::SharedGlobal | DatabaseMode::Remote => config.db.host_port(),
        };

        let mut environment = vec![
            EnvVar::new("WORDPRESS_DB_HOST", db_host),
            EnvVar::inherit("WORDPRESS_DB_USER"),
            EnvVar::inherit("WORDPRESS_DB_PASSWORD"),
            EnvVar::inherit("USER_ID"),
            EnvVar::inherit("GROUP_ID"),
            EnvVar::new("VIRTUAL_HOST", config.url.clone()),
        ];
        if config.cache_enabled {
            environment.push(EnvVar::new("REDIS_HOST", config.cache_host.clone()));
        }

        let mut networks =
            vec![NetworkAttachment::new(SITE_NETWORK).with_alias(format!("{}_php", config.url))];
        if self.needs_backend(config) {
            networks.push(NetworkAttachment::new(&self.topology.backend_network));
        }

        ServiceSpec {
            name: "php".to_string(),
            image: format!(
                "{}:{}",
                self.topology.images.php,
                config.php_version.image_tag()
            ),
            depends_on: if config.database_mode.is_local() {
                vec![LOCAL_DB_HOST.to_string()]
            } else {
                Vec::new()
            },
            restart: RestartPolicy::Always,
            volumes: mount_entries(volumes, "php"),
            environment,
            networks,
            labels: service_labels(&config.url, "php"),
            hostname: Some(format!("{}_php", config.project_name())),
            command: None,
        }
    }

    fn nginx_service(
        &self,
        config: &SiteConfig,
        volumes: &VolumeMountSet,
        https_bypass: bool,
    ) -> ServiceSpec {
        let mut environment = vec![
            EnvVar::new("VIRTUAL_HOST", config.alias_domains.joined()),
            EnvVar::new("VIRTUAL_PATH", "/"),
            EnvVar::new("HSTS", "off"),
        ];
        if https_bypass {
            environment.push(EnvVar::new("HTTPS_METHOD", "nohttps"));
        }
        if let Some(policy) = &config.ssl_policy
            && policy != &self.topology.default_ssl_policy
        {
            environment.push(EnvVar::new("SSL_POLICY", policy.clone()));
        }

        let mut networks = vec![
            NetworkAttachment::new(SITE_NETWORK).with_alias(config.url.clone()),
            NetworkAttachment::new(&self.topology.frontend_network),
        ];
        if config.cache_enabled && config.cache_host_mode == CacheHostMode::SharedGlobal {
            networks.push(NetworkAttachment::new(&self.topology.backend_network));
        }

        ServiceSpec {
            name: "nginx".to_string(),
            image: self.topology.images.nginx.clone(),
            depends_on: vec!["php".to_string()],
            restart: RestartPolicy::Always,
            volumes: mount_entries(volumes, "nginx"),
            environment,
            networks,
            labels: service_labels(&config.url, "nginx"),
            ..Default::default()
        }
    }

    fn postfix_service(&self, config: &SiteConfig, volumes: &VolumeMountSet) -> ServiceSpec {
        ServiceSpec {
            name: "postfix".to_string(),
            image: self.topology.images.postfix.clone(),
            restart: RestartPolicy::Always,
            volumes: mount_entries(volumes, "postfix"),
            networks: vec![NetworkAttachment::new(SITE_NETWORK)],
            labels: service_labels(&config.url, "postfix"),
            ..Default::default()
        }
    }

    fn redis_service(&self, config: &SiteConfig, volumes: &VolumeMountSet) -> ServiceSpec {
        ServiceSpec {
            name: LOCAL_CACHE_HOST.to_string(),
            image: self.topology.images.redis.clone(),
            restart: RestartPolicy::Always,
            volumes: mount_entries(volumes, LOCAL_CACHE_HOST),
            networks: vec![NetworkAttachment::new(SITE_NETWORK)],
            labels: service_labels(&config.url, LOCAL_CACHE_HOST),
            ..Default::default()
        }
    }

    /// 共有DB/共有キャッシュを使う場合はバックエンドネットワークに参加する
    fn needs_backend(&self, config: &SiteConfig) -> bool {
        config.database_mode == DatabaseMode::SharedGlobal
            || (config.cache_enabled && config.cache_host_mode == CacheHostMode::SharedGlobal)
    }
}

fn mount_entries(volumes: &VolumeMountSet, service: &str) -> Vec<String> {
    volumes
        .for_service(service)
        .iter()
        .map(|m| m.to_compose_entry())
        .collect()
}

/// サイト所属ラベル
pub fn site_labels(url: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(SITE_LABEL.to_string(), url.to_string());
    labels
}

fn service_labels(url: &str, service: &str) -> BTreeMap<String, String> {
    let mut labels = site_labels(url);
    labels.insert(SERVICE_LABEL.to_string(), service.to_string());
    labels
}

/// ラベルフィルタ文字列 ("key=value")
pub fn site_label_filter(url: &str) -> String {
    format!("{}={}", SITE_LABEL, url)
}
