use crate::error::{Result, ScraperError};
use crate::http::HttpClient;
use crate::parsers::{fetch_page, render_url, ScheduleParser};
use crate::resolver::VenueAddressResolver;
use crate::types::{DayDetailsConfig, ParserConfig, ScheduleEntry, SiteConfig};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_HOME_MARKER: &str = "Home Game";
const DEFAULT_AWAY_MARKER: &str = "Away Game";

/// How an event's marker text decides home/away assignment and which
/// non-game entries get filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeAwayRule {
    /// Exact match against the configured marker strings.
    ExactMarker,
    /// Case-insensitive containment of "home game" / "away game".
    FuzzyMarker,
    /// Exact match, with tournaments and practices dropped quietly.
    ExactMarkerFiltered,
}

enum Classification {
    Home,
    Away,
    Filtered,
    Unknown,
}

/// A row extracted from the page, possibly still waiting for its venue
/// address lookup.
pub(crate) struct PendingRow {
    pub entry: ScheduleEntry,
    pub venue_url: Option<String>,
}

/// Calendar layout with one container element per day, each holding event
/// detail elements.
pub struct DayDetailsParser {
    http: Arc<dyn HttpClient>,
    resolver: Arc<VenueAddressResolver>,
    rule: HomeAwayRule,
}

impl DayDetailsParser {
    pub fn new(
        http: Arc<dyn HttpClient>,
        resolver: Arc<VenueAddressResolver>,
        rule: HomeAwayRule,
    ) -> Self {
        Self {
            http,
            resolver,
            rule,
        }
    }
}

#[async_trait]
impl ScheduleParser for DayDetailsParser {
    async fn execute(
        &self,
        site: &SiteConfig,
        config: &ParserConfig,
        month: u32,
        year: i32,
    ) -> Result<Vec<ScheduleEntry>> {
        let cfg = match config {
            ParserConfig::DayDetails(cfg) => cfg,
            _ => {
                return Err(ScraperError::ConfigParse(format!(
                    "site '{}': expected day_details configuration",
                    site.site_name
                )))
            }
        };

        let url = render_url(&cfg.url_template, month, year);
        let body = fetch_page(self.http.as_ref(), &url).await?;
        let rows = extract_day_details(site, cfg, &body, &url, self.rule, None)?;
        let entries = join_venue_addresses(&self.resolver, cfg, rows).await;
        info!(site = %site.site_name, rows = entries.len(), "day details extraction complete");
        Ok(entries)
    }
}

/// Fan out venue lookups for every row that links to a detail page, then
/// join the addresses in. Returns only once every lookup for the page has
/// completed, so no partial rows escape.
pub(crate) async fn join_venue_addresses(
    resolver: &Arc<VenueAddressResolver>,
    cfg: &DayDetailsConfig,
    rows: Vec<PendingRow>,
) -> Vec<ScheduleEntry> {
    let class = cfg.venue_class.clone().unwrap_or_default();
    let requests: Vec<(String, String)> = rows
        .iter()
        .filter_map(|row| row.venue_url.clone())
        .map(|url| (url, class.clone()))
        .collect();

    if requests.is_empty() {
        return rows.into_iter().map(|row| row.entry).collect();
    }

    let (addresses, failures) = Arc::clone(resolver).fetch_multiple(&requests).await;
    if !failures.is_empty() {
        warn!(failed = failures.len(), "some venue addresses could not be resolved");
    }

    rows.into_iter()
        .map(|row| {
            let mut entry = row.entry;
            if let Some(url) = row.venue_url {
                if let Some(address) = addresses.get(&url) {
                    entry.address = address.clone();
                }
            }
            entry
        })
        .collect()
}

/// Extract pending rows from one calendar page. A page without any day
/// containers is fatal; a malformed single event is skipped with a logged
/// reason.
pub(crate) fn extract_day_details(
    site: &SiteConfig,
    cfg: &DayDetailsConfig,
    body: &str,
    page_url: &str,
    rule: HomeAwayRule,
    division_override: Option<&str>,
) -> Result<Vec<PendingRow>> {
    let day_selector = parse_selector(site, &cfg.day_container_selector)?;
    let event_selector = parse_selector(site, &cfg.event_selector)?;
    let venue_link_selector = match &cfg.venue_link_selector {
        Some(sel) => Some(parse_selector(site, sel)?),
        None => None,
    };

    let document = Html::parse_document(body);
    let containers: Vec<ElementRef> = document.select(&day_selector).collect();
    if containers.is_empty() {
        return Err(ScraperError::ElementNotFound(format!(
            "no day containers on {}",
            page_url
        )));
    }

    let mut rows = Vec::new();
    for container in containers {
        let date = match container.value().attr("data-date") {
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => date,
                Err(e) => {
                    warn!(site = %site.site_name, raw, "skipping day with malformed date: {}", e);
                    continue;
                }
            },
            None => {
                warn!(site = %site.site_name, "skipping day container without data-date");
                continue;
            }
        };

        for event in container.select(&event_selector) {
            match extract_event(
                site,
                cfg,
                &event,
                date,
                rule,
                venue_link_selector.as_ref(),
                division_override,
            ) {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {}
                Err(e) => {
                    warn!(site = %site.site_name, date = %date, "skipping event: {}", e);
                }
            }
        }
    }
    Ok(rows)
}

fn extract_event(
    site: &SiteConfig,
    cfg: &DayDetailsConfig,
    event: &ElementRef,
    date: NaiveDate,
    rule: HomeAwayRule,
    venue_link_selector: Option<&Selector>,
    division_override: Option<&str>,
) -> Result<Option<PendingRow>> {
    let time_text = child_text(event, ".time")
        .ok_or_else(|| ScraperError::MissingField("time".to_string()))?;
    let time = NaiveTime::parse_from_str(time_text.trim(), "%H:%M")
        .map_err(|_| ScraperError::MissingField(format!("unparsable time '{}'", time_text)))?;

    let opponent = child_text(event, ".opponent")
        .ok_or_else(|| ScraperError::MissingField("opponent".to_string()))?;

    let marker = child_text(event, ".event-type").unwrap_or_default();
    let is_home = match classify(&marker, cfg, rule) {
        Classification::Home => true,
        Classification::Away => false,
        Classification::Filtered => {
            debug!(site = %site.site_name, marker, "filtered non-game event");
            return Ok(None);
        }
        Classification::Unknown => {
            debug!(site = %site.site_name, marker, "skipping event with unrecognized marker");
            return Ok(None);
        }
    };

    let (home_team, guest_team) = if is_home {
        (site.home_team.clone(), opponent)
    } else {
        (opponent, site.home_team.clone())
    };

    let division = division_override
        .map(str::to_string)
        .or_else(|| child_text(event, ".division"))
        .unwrap_or_default();
    let location = child_text(event, ".location").unwrap_or_default();

    let venue_url = venue_link_selector
        .and_then(|sel| event.select(sel).next())
        .and_then(|a| a.value().attr("href"))
        .map(|href| absolute_url(&site.base_url, href));

    Ok(Some(PendingRow {
        entry: ScheduleEntry {
            datetime: format!("{} {}", date.format("%Y-%m-%d"), time.format("%H:%M")),
            site: site.site_name.clone(),
            home_team,
            guest_team,
            location,
            division,
            address: String::new(),
        },
        venue_url,
    }))
}

fn classify(marker: &str, cfg: &DayDetailsConfig, rule: HomeAwayRule) -> Classification {
    let marker = marker.trim();
    let home_marker = cfg.home_marker.as_deref().unwrap_or(DEFAULT_HOME_MARKER);
    let away_marker = cfg.away_marker.as_deref().unwrap_or(DEFAULT_AWAY_MARKER);
    match rule {
        HomeAwayRule::ExactMarker => {
            if marker == home_marker {
                Classification::Home
            } else if marker == away_marker {
                Classification::Away
            } else {
                Classification::Unknown
            }
        }
        HomeAwayRule::FuzzyMarker => {
            let lower = marker.to_lowercase();
            if lower.contains("home game") {
                Classification::Home
            } else if lower.contains("away game") {
                Classification::Away
            } else {
                Classification::Unknown
            }
        }
        HomeAwayRule::ExactMarkerFiltered => {
            if marker == home_marker {
                Classification::Home
            } else if marker == away_marker {
                Classification::Away
            } else if marker.eq_ignore_ascii_case("tournament")
                || marker.eq_ignore_ascii_case("practice")
            {
                Classification::Filtered
            } else {
                Classification::Unknown
            }
        }
    }
}

fn child_text(event: &ElementRef, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).unwrap();
    event.select(&sel).next().map(|el| {
        el.text().collect::<String>().trim().to_string()
    }).filter(|text| !text.is_empty())
}

fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            href.trim_start_matches('/')
        )
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

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DayDetailsConfig {
        DayDetailsConfig {
            url_template: "https://example.test/cal?m={month}&y={year}".to_string(),
            day_container_selector: "div.day".to_string(),
            event_selector: "div.event".to_string(),
            home_marker: None,
            away_marker: None,
            venue_link_selector: None,
            venue_class: None,
        }
    }

    #[test]
    fn exact_rule_requires_exact_marker() {
        let cfg = cfg();
        assert!(matches!(
            classify("Home Game", &cfg, HomeAwayRule::ExactMarker),
            Classification::Home
        ));
        assert!(matches!(
            classify("home game", &cfg, HomeAwayRule::ExactMarker),
            Classification::Unknown
        ));
    }

    #[test]
    fn fuzzy_rule_matches_case_insensitively() {
        let cfg = cfg();
        assert!(matches!(
            classify("HOME GAME (rescheduled)", &cfg, HomeAwayRule::FuzzyMarker),
            Classification::Home
        ));
        assert!(matches!(
            classify("Away Game", &cfg, HomeAwayRule::FuzzyMarker),
            Classification::Away
        ));
    }

    #[test]
    fn filtered_rule_drops_tournaments_and_practices() {
        let cfg = cfg();
        assert!(matches!(
            classify("Tournament", &cfg, HomeAwayRule::ExactMarkerFiltered),
            Classification::Filtered
        ));
        assert!(matches!(
            classify("Practice", &cfg, HomeAwayRule::ExactMarkerFiltered),
            Classification::Filtered
        ));
    }

    #[test]
    fn absolute_url_joins_relative_hrefs() {
        assert_eq!(
            absolute_url("https://example.test/", "/venues/3"),
            "https://example.test/venues/3"
        );
        assert_eq!(
            absolute_url("https://example.test", "https://other.test/v/1"),
            "https://other.test/v/1"
        );
    }
}
