use crate::context::AppContext;
use clap::Args;
use colored::Colorize;
use siteflow::vip::VIP_GO_SKELETON;
use siteflow_core::{CreateOptions, SiteRecord};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// サイトのURL（例: example.com）
    pub url: String,

    /// サイトのタイトル
    #[arg(long)]
    pub title: Option<String>,
    /// 管理者ユーザー名（未指定ならランダム）
    #[arg(long)]
    pub admin_user: Option<String>,
    /// 管理者パスワード（未指定ならランダム）
    #[arg(long)]
    pub admin_pass: Option<String>,
    /// 管理者メールアドレス
    #[arg(long, env = "SITEFLOW_WP_MAIL")]
    pub admin_email: Option<String>,

    /// マルチサイト（subdir / subdom）
    #[arg(long)]
    pub mu: Option<String>,
    /// 追加ドメイン（カンマ区切り）
    #[arg(long)]
    pub alias_domains: Option<String>,

    /// Redis によるキャッシュを有効化
    #[arg(long)]
    pub cache: bool,
    /// サイト専用の Redis コンテナを使う
    #[arg(long)]
    pub with_local_redis: bool,
    /// リバースプロキシのキャッシュ（on / off）
    #[arg(long)]
    pub proxy_cache: Option<String>,
    #[arg(long)]
    pub proxy_cache_max_size: Option<String>,
    #[arg(long)]
    pub proxy_cache_max_time: Option<String>,

    /// サイト専用の DB コンテナを使う
    #[arg(long)]
    pub local_db: bool,
    /// PHP バージョン
    #[arg(long)]
    pub php: Option<String>,
    #[arg(long)]
    pub dbname: Option<String>,
    #[arg(long)]
    pub dbuser: Option<String>,
    #[arg(long)]
    pub dbpass: Option<String>,
    /// DB ホスト（host[:port]）
    #[arg(long)]
    pub dbhost: Option<String>,
    #[arg(long)]
    pub dbprefix: Option<String>,
    #[arg(long)]
    pub dbcharset: Option<String>,
    #[arg(long)]
    pub dbcollate: Option<String>,
    /// `wp config create` の DB 接続確認を省略
    #[arg(long)]
    pub skip_check: bool,

    /// WordPress のバージョン
    #[arg(long = "version")]
    pub wp_version: Option<String>,
    /// デフォルトのテーマとプラグインを含めない
    #[arg(long)]
    pub skip_content: bool,
    #[arg(long)]
    pub locale: Option<String>,
    /// WordPress を置くサブディレクトリ
    #[arg(long)]
    pub public_dir: Option<String>,

    /// SSL（le / self / inherit / custom）
    #[arg(long)]
    pub ssl: Option<String>,
    #[arg(long)]
    pub ssl_key: Option<PathBuf>,
    #[arg(long)]
    pub ssl_crt: Option<PathBuf>,
    /// ワイルドカード証明書
    #[arg(long)]
    pub wildcard: bool,

    /// VIP Go リポジトリ（URL または user/repo）
    #[arg(long, num_args = 0..=1, default_missing_value = VIP_GO_SKELETON)]
    pub vip: Option<String>,
    /// WordPress のインストールを行わない
    #[arg(long)]
    pub skip_install: bool,
    /// サイトの到達確認を行わない
    #[arg(long)]
    pub skip_status_check: bool,
    /// 既存のリモートDBを削除して作り直す
    #[arg(long)]
    pub force: bool,
}

impl From<CreateArgs> for CreateOptions {
    fn from(args: CreateArgs) -> Self {
        CreateOptions {
            url: args.url,
            title: args.title,
            admin_user: args.admin_user,
            admin_pass: args.admin_pass,
            admin_email: args.admin_email,
            mu: args.mu,
            alias_domains: args.alias_domains,
            cache: args.cache,
            with_local_redis: args.with_local_redis,
            proxy_cache: args.proxy_cache,
            proxy_cache_max_size: args.proxy_cache_max_size,
            proxy_cache_max_time: args.proxy_cache_max_time,
            local_db: args.local_db,
            php: args.php,
            dbname: args.dbname,
            dbuser: args.dbuser,
            dbpass: args.dbpass,
            dbhost: args.dbhost,
            dbprefix: args.dbprefix,
            dbcharset: args.dbcharset,
            dbcollate: args.dbcollate,
            skip_check: args.skip_check,
            wp_version: args.wp_version,
            skip_content: args.skip_content,
            locale: args.locale,
            public_dir: args.public_dir,
            ssl: args.ssl,
            ssl_key: args.ssl_key,
            ssl_crt: args.ssl_crt,
            wildcard: args.wildcard,
            vip: args.vip,
            skip_install: args.skip_install,
            skip_status_check: args.skip_status_check,
            force: args.force,
        }
    }
}

pub async fn handle(
    ctx: &AppContext,
    args: CreateArgs,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let options = CreateOptions::from(args);
    let config = options.into_config(&ctx.config.site_defaults())?;

    println!("{} {}", "サイトを作成中:".blue(), config.url.cyan());
    let provisioner = ctx.provisioner(cancel).await?;

    match provisioner.create(&config).await {
        Ok(record) => {
            print_summary(&record);
            Ok(())
        }
        Err(e) if e.is_validation() => Err(e.into()),
        Err(e) => {
            eprintln!(
                "{} サイト {} の作成に失敗したため、作成途中のリソースを削除しました",
                "✗".red().bold(),
                config.url.cyan()
            );
            Err(e.into())
        }
    }
}

fn print_summary(record: &SiteRecord) {
    println!();
    println!(
        "{} サイト {} を作成しました",
        "✓".green().bold(),
        record.site_url.cyan()
    );
    println!("  サイトルート: {}", record.site_fs_path.display());
    if record.installed {
        println!("  管理画面: {}", record.app_admin_url.cyan());
        println!("  ユーザー名: {}", record.app_admin_username);
        println!("  パスワード: {}", record.app_admin_password);
    } else {
        println!(
            "  {} WordPress のインストールは行っていません",
            "⚠".yellow()
        );
    }
}
