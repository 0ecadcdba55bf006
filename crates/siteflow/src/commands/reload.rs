use crate::context::AppContext;
use colored::Colorize;
use siteflow::lifecycle;

pub async fn handle(ctx: &AppContext, url: &str, services: &[String]) -> anyhow::Result<()> {
    let driver = ctx.connect_driver().await?;
    println!("{} {}", "設定を再読み込み中:".blue(), url.cyan());

    let reloaded = lifecycle::reload(driver.as_ref(), ctx.store.as_ref(), url, services).await?;
    for service in reloaded {
        println!("  {} {}", "✓".green(), service);
    }
    Ok(())
}
