use crate::context::AppContext;
use colored::Colorize;
use siteflow::lifecycle;

pub async fn handle(ctx: &AppContext, url: &str, services: &[String]) -> anyhow::Result<()> {
    let driver = ctx.connect_driver().await?;
    println!("{} {}", "サービスを再起動中:".blue(), url.cyan());

    let restarted = lifecycle::restart(driver.as_ref(), ctx.store.as_ref(), url, services).await?;
    for service in restarted {
        println!("  {} {}", "✓".green(), service);
    }
    Ok(())
}
