use crate::error::{Result, ScraperError};
use crate::http::HttpClient;
use crate::parsers::{fetch_page, render_url, ScheduleParser};
use crate::types::{MonthBasedConfig, ParserConfig, ScheduleEntry, SiteConfig, TeamParseStrategy};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{info, warn};

static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2}:\d{2})\s*$").unwrap());

/// Month-grid layout: one cell per day, event text lines inside. Home vs.
/// away is read from the text per the configured team-parse strategy.
pub struct MonthBasedParser {
    http: Arc<dyn HttpClient>,
}

impl MonthBasedParser {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ScheduleParser for MonthBasedParser {
    async fn execute(
        &self,
        site: &SiteConfig,
        config: &ParserConfig,
        month: u32,
        year: i32,
    ) -> Result<Vec<ScheduleEntry>> {
        let cfg = match config {
            ParserConfig::MonthBased(cfg) => cfg,
            _ => {
                return Err(ScraperError::ConfigParse(format!(
                    "site '{}': expected month_based configuration",
                    site.site_name
                )))
            }
        };

        let url = render_url(&cfg.url_template, month, year);
        let body = fetch_page(self.http.as_ref(), &url).await?;
        let entries = extract_month_grid(site, cfg, &body, &url)?;
        info!(site = %site.site_name, rows = entries.len(), "month grid extraction complete");
        Ok(entries)
    }
}

fn extract_month_grid(
    site: &SiteConfig,
    cfg: &MonthBasedConfig,
    body: &str,
    page_url: &str,
) -> Result<Vec<ScheduleEntry>> {
    let cell_selector = parse_selector(site, &cfg.cell_selector)?;
    let event_selector = parse_selector(site, &cfg.event_selector)?;

    let document = Html::parse_document(body);
    let cells: Vec<ElementRef> = document.select(&cell_selector).collect();
    if cells.is_empty() {
        return Err(ScraperError::ElementNotFound(format!(
            "no day cells on {}",
            page_url
        )));
    }

    let mut entries = Vec::new();
    for cell in cells {
        let date = match cell
            .value()
            .attr("data-date")
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        {
            Some(date) => date,
            None => continue, // grid padding cells carry no date
        };

        for event in cell.select(&event_selector) {
            let text = event.text().collect::<String>();
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match parse_event_text(site, text, cfg.team_parse_strategy) {
                Ok((is_home, opponent, time)) => {
                    let (home_team, guest_team) = if is_home {
                        (site.home_team.clone(), opponent)
                    } else {
                        (opponent, site.home_team.clone())
                    };
                    entries.push(ScheduleEntry {
                        datetime: format!("{} {}", date.format("%Y-%m-%d"), time.format("%H:%M")),
                        site: site.site_name.clone(),
                        home_team,
                        guest_team,
                        location: String::new(),
                        division: String::new(),
                        address: String::new(),
                    });
                }
                Err(e) => {
                    warn!(site = %site.site_name, date = %date, text, "skipping event: {}", e);
                }
            }
        }
    }
    Ok(entries)
}

/// Split an event line like "vs Eagles 18:30" or "Eagles 18:30 - away" into
/// side, opponent and start time.
fn parse_event_text(
    site: &SiteConfig,
    text: &str,
    strategy: TeamParseStrategy,
) -> Result<(bool, String, NaiveTime)> {
    let (is_home, rest) = match strategy {
        TeamParseStrategy::PrefixVsAt => {
            if let Some(rest) = text.strip_prefix("vs ") {
                (true, rest.to_string())
            } else if let Some(rest) = text.strip_prefix("@ ") {
                (false, rest.to_string())
            } else {
                return Err(ScraperError::MissingField(format!(
                    "site '{}': no 'vs '/'@ ' prefix in '{}'",
                    site.site_name, text
                )));
            }
        }
        TeamParseStrategy::SuffixHomeAway => {
            if let Some(rest) = strip_suffix_ci(text.trim_end(), "- home") {
                (true, rest.to_string())
            } else if let Some(rest) = strip_suffix_ci(text.trim_end(), "- away") {
                (false, rest.to_string())
            } else {
                return Err(ScraperError::MissingField(format!(
                    "site '{}': no home/away suffix in '{}'",
                    site.site_name, text
                )));
            }
        }
    };
    let rest = rest.trim().to_string();

    let time_match = TIME_RE
        .captures(&rest)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| {
            ScraperError::MissingField(format!(
                "site '{}': no start time in '{}'",
                site.site_name, text
            ))
        })?;
    let time = NaiveTime::parse_from_str(time_match.as_str(), "%H:%M").map_err(|_| {
        ScraperError::MissingField(format!(
            "site '{}': unparsable time '{}'",
            site.site_name,
            time_match.as_str()
        ))
    })?;

    let opponent = rest[..time_match.start()].trim().to_string();
    if opponent.is_empty() {
        return Err(ScraperError::MissingField(format!(
            "site '{}': no opponent in '{}'",
            site.site_name, text
        )));
    }
    Ok((is_home, opponent, time))
}

/// ASCII case-insensitive suffix strip that leaves multibyte team names
/// intact.
fn strip_suffix_ci<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    if text.len() < suffix.len() {
        return None;
    }
    let split = text.len() - suffix.len();
    if !text.is_char_boundary(split) {
        return None;
    }
    if text[split..].eq_ignore_ascii_case(suffix) {
        Some(&text[..split])
    } else {
        None
    }
}

fn parse_selector(site: &SiteConfig, selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| {
        ScraperError::ConfigParse(format!(
            "site '{}': invalid selector '{}': {:?}",
            site.site_name, selector, e
        ))
    })
}
