use crate::context::AppContext;
use clap::ValueEnum;
use colored::Colorize;
use siteflow::lifecycle;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum InfoFormat {
    #[default]
    Table,
    Json,
}

pub async fn handle(ctx: &AppContext, url: &str, format: InfoFormat) -> anyhow::Result<()> {
    let record = lifecycle::find_site(ctx.store.as_ref(), url).await?;

    match format {
        InfoFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        InfoFormat::Table => {
            let rows = lifecycle::info_rows(&record);
            let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
            println!();
            for (label, value) in rows {
                println!("  {}  {}", format!("{:width$}", label).bold(), value);
            }
            println!();
        }
    }
    Ok(())
}
