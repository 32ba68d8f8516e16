use crate::error::{Result, ScraperError};
use crate::parsers::ScheduleParser;
use crate::types::{ExternalConfig, ParserConfig, ScheduleEntry, SiteConfig};
use async_trait::async_trait;
use tracing::info;

/// Delegates to a separately deployed binary that prints schedule rows as
/// CSV on stdout. Nonzero exit or unparsable output is fatal for the
/// site's run.
pub struct ExternalParser;

#[async_trait]
impl ScheduleParser for ExternalParser {
    async fn execute(
        &self,
        site: &SiteConfig,
        config: &ParserConfig,
        month: u32,
        year: i32,
    ) -> Result<Vec<ScheduleEntry>> {
        let cfg = match config {
            ParserConfig::External(cfg) => cfg,
            _ => {
                return Err(ScraperError::ConfigParse(format!(
                    "site '{}': expected external configuration",
                    site.site_name
                )))
            }
        };

        let output = run_binary(cfg, month, year).await?;
        let entries = parse_csv_output(site, cfg, &output)?;
        info!(site = %site.site_name, rows = entries.len(), "external binary run complete");
        Ok(entries)
    }
}

async fn run_binary(cfg: &ExternalConfig, month: u32, year: i32) -> Result<Vec<u8>> {
    let output = tokio::process::Command::new(&cfg.binary_path)
        .arg("--month")
        .arg(month.to_string())
        .arg("--year")
        .arg(year.to_string())
        .args(&cfg.extra_args)
        .output()
        .await
        .map_err(|e| {
            ScraperError::ExternalBinary(format!("failed to run {}: {}", cfg.binary_path, e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ScraperError::ExternalBinary(format!(
            "{} exited with {}: {}",
            cfg.binary_path,
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

fn parse_csv_output(
    site: &SiteConfig,
    cfg: &ExternalConfig,
    stdout: &[u8],
) -> Result<Vec<ScheduleEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(stdout);

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            ScraperError::ExternalBinary(format!(
                "unparsable CSV from {}: {}",
                cfg.binary_path, e
            ))
        })?;
        if record.len() != 7 {
            return Err(ScraperError::ExternalBinary(format!(
                "expected 7 columns from {}, got {}",
                cfg.binary_path,
                record.len()
            )));
        }
        entries.push(ScheduleEntry {
            datetime: record[0].to_string(),
            // The binary's own site column is ignored; rows belong to the
            // site that invoked it.
            site: site.site_name.clone(),
            home_team: record[2].to_string(),
            guest_team: record[3].to_string(),
            location: record[4].to_string(),
            division: record[5].to_string(),
            address: record[6].to_string(),
        });
    }
    Ok(entries)
}
