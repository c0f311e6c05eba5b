//! Quota command - Show drive owner and storage usage

use anyhow::{Context, Result};
use clap::Args;

use cloudbackup_core::config::Config;

use crate::output::{get_formatter, human_bytes, OutputFormat};

#[derive(Debug, Args)]
pub struct QuotaCommand {}

impl QuotaCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);

        let client = super::connect(config).await?;
        let drive = client
            .get_drive_info()
            .await
            .context("Failed to read drive information")?;

        if format == OutputFormat::Json {
            formatter.print_json(&serde_json::to_value(&drive)?);
            return Ok(());
        }

        formatter.success(&format!("Owner: {}", drive.owner));
        formatter.info(&format!("Total:     {}", human_bytes(drive.total)));
        formatter.info(&format!(
            "Used:      {} ({:.1}%)",
            human_bytes(drive.used),
            percent(drive.used, drive.total)
        ));
        formatter.info(&format!("Remaining: {}", human_bytes(drive.remaining)));
        Ok(())
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 * 100.0 / total as f64
    }
}
