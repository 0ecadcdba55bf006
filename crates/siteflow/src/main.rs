mod commands;
mod context;

use clap::{Parser, Subcommand};
use commands::create::CreateArgs;
use commands::info::InfoFormat;
use context::AppContext;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(name = "siteflow")]
#[command(about = "Docker 上の WordPress サイトを作成・管理する", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// WordPress サイトを作成
    Create(Box<CreateArgs>),
    /// サイトの情報を表示
    Info {
        /// サイトのURL
        url: String,
        /// 出力形式
        #[arg(long, value_enum, default_value_t = InfoFormat::Table)]
        format: InfoFormat,
    },
    /// サイトのサービスを再起動
    Restart {
        /// サイトのURL
        url: String,
        /// 対象サービス（nginx, php, db）。未指定なら全て
        #[arg(short, long = "service", value_delimiter = ',')]
        services: Vec<String>,
    },
    /// サイトのサービス設定を再読み込み
    Reload {
        /// サイトのURL
        url: String,
        /// 対象サービス（nginx, php）。未指定なら全て
        #[arg(short, long = "service", value_delimiter = ',')]
        services: Vec<String>,
    },
    /// バージョン情報を表示
    Version,
}

/// 終了系シグナルを受けたら作成処理を中断させる
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let kinds = [
            SignalKind::interrupt(),
            SignalKind::terminate(),
            SignalKind::hangup(),
            SignalKind::user_defined1(),
        ];
        let mut streams = Vec::new();
        for kind in kinds {
            match signal(kind) {
                Ok(stream) => streams.push(stream),
                Err(e) => warn!(error = %e, "Failed to install signal handler"),
            }
        }
        if streams.is_empty() {
            return;
        }

        let waits = streams.iter_mut().map(|s| Box::pin(s.recv()));
        futures_util::future::select_all(waits).await;
        warn!("Signal received, aborting");
        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrへ（RUST_LOG 未指定時は info）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    siteflow::install_panic_hook();

    match cli.command {
        // Versionコマンドは設定ファイル不要
        Commands::Version => {
            println!("siteflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Create(args) => {
            let ctx = AppContext::load()?;
            let cancel = CancellationToken::new();
            spawn_signal_listener(cancel.clone());
            commands::create::handle(&ctx, *args, cancel).await?;
        }
        Commands::Info { url, format } => {
            let ctx = AppContext::load()?;
            commands::info::handle(&ctx, &url, format).await?;
        }
        Commands::Restart { url, services } => {
            let ctx = AppContext::load()?;
            commands::restart::handle(&ctx, &url, &services).await?;
        }
        Commands::Reload { url, services } => {
            let ctx = AppContext::load()?;
            commands::reload::handle(&ctx, &url, &services).await?;
        }
    }

    Ok(())
}
