//! WordPress 操作のコマンド定義
//!
//! すべて php コンテナ内で www-data として wp-cli を実行する構造化コマンドです。

use siteflow_container::ServiceCommand;
use siteflow_core::{MultisiteMode, SiteConfig};

pub const PHP_SERVICE: &str = "php";
const WWW_USER: &str = "www-data";
const PERMALINK_STRUCTURE: &str = "/%year%/%monthnum%/%day%/%postname%/";

fn wp(config: &SiteConfig) -> ServiceCommand {
    ServiceCommand::new(PHP_SERVICE, ["wp"])
        .user(WWW_USER)
        .workdir(config.container_root())
}

/// 公開ディレクトリの作成（`--public-dir` 指定時）
pub fn make_public_dir(config: &SiteConfig) -> ServiceCommand {
    ServiceCommand::new(PHP_SERVICE, ["mkdir", "-p"])
        .user(WWW_USER)
        .arg(config.container_root())
}

/// `/var/www` 以下の所有者を揃える
pub fn normalize_ownership(path: &str) -> ServiceCommand {
    ServiceCommand::new(PHP_SERVICE, ["chown", "-R", "www-data:", path]).user("root")
}

pub fn core_download(config: &SiteConfig) -> ServiceCommand {
    let options = &config.wordpress;
    let mut command = wp(config)
        .arg("core")
        .arg("download")
        .arg(format!("--locale={}", options.locale));
    if let Some(version) = &options.version {
        command = command.arg(format!("--version={}", version));
    }
    if options.skip_content {
        command = command.arg("--skip-content");
    }
    command
}

/// `wp-config.php` に追記する PHP
pub fn extra_php(config: &SiteConfig) -> String {
    let mut php = String::from(
        "if ( isset( $_SERVER['HTTP_X_FORWARDED_PROTO'] ) && $_SERVER['HTTP_X_FORWARDED_PROTO'] == 'https' ) {\n\
         \t$_SERVER['HTTPS'] = 'on';\n\
         }\n\
         define( 'WP_DEBUG', false );\n\
         define( 'WP_DEBUG_LOG', false );\n\
         define( 'WP_DEBUG_DISPLAY', false );\n",
    );
    if config.multisite_mode.is_multisite() {
        php.push_str("define( 'COOKIE_DOMAIN', false );\n");
    }
    if config.vip_repo.is_some() {
        php.push_str(
            "if ( file_exists( ABSPATH . '/wp-content/vip-config/vip-config.php' ) ) {\n\
             \trequire_once( ABSPATH . '/wp-content/vip-config/vip-config.php' );\n\
             }\n",
        );
    }
    php
}

/// `wp config create`（追加PHPは標準入力から渡す）
pub fn config_create(config: &SiteConfig) -> ServiceCommand {
    let options = &config.wordpress;
    let mut params = vec![
        extra_php(config),
        format!("--dbname={}", config.db.name),
        format!("--dbuser={}", config.db.user),
        format!("--dbpass={}", config.db.password),
        format!("--dbhost={}", db_host(config)),
        format!("--dbprefix={}", options.db_prefix),
        format!("--dbcharset={}", options.db_charset),
    ];
    if let Some(collate) = &options.db_collate {
        params.push(format!("--dbcollate={}", collate));
    }
    if options.skip_check {
        params.push("--skip-check".to_string());
    }

    ServiceCommand::shell(
        PHP_SERVICE,
        r#"extra="$1"; shift; printf '%s\n' "$extra" | wp config create --extra-php "$@""#,
        params,
    )
    .user(WWW_USER)
    .workdir(config.container_root())
    .redact(format!("--dbpass={}", config.db.password))
}

/// `wp-config.php` を WordPress ルートの一つ上に移動
pub fn move_wp_config(config: &SiteConfig) -> ServiceCommand {
    let root = config.container_root();
    let parent = root
        .rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_default();
    ServiceCommand::new(
        PHP_SERVICE,
        [
            "mv".to_string(),
            format!("{}/wp-config.php", root),
            format!("{}/wp-config.php", parent),
        ],
    )
    .user(WWW_USER)
}

pub fn core_install(config: &SiteConfig) -> ServiceCommand {
    let subcommand = if config.multisite_mode.is_multisite() {
        "multisite-install"
    } else {
        "install"
    };
    let admin = &config.admin;
    let mut command = wp(config)
        .arg("core")
        .arg(subcommand)
        .arg(format!("--url={}", config.url))
        .arg(format!("--title={}", admin.site_title))
        .arg(format!("--admin_user={}", admin.username))
        .secret_arg(format!("--admin_password={}", admin.password))
        .arg(format!("--admin_email={}", admin.email));
    if config.multisite_mode == MultisiteMode::Subdomain {
        command = command.arg("--subdomains");
    }
    command.arg("--skip-email")
}

pub fn rewrite_structure(config: &SiteConfig) -> ServiceCommand {
    wp(config)
        .arg("rewrite")
        .arg("structure")
        .arg(PERMALINK_STRUCTURE)
        .arg("--hard")
}

/// php コンテナから見た DB ホスト
fn db_host(config: &SiteConfig) -> String {
    if config.database_mode.is_local() {
        config.db.host.clone()
    } else {
        config.db.host_port()
    }
}
