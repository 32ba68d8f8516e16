use crate::error::{Result, ScraperError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One parsed event/game row. `datetime` is the fixed-width
/// "YYYY-MM-DD HH:MM" form, so lexicographic order equals chronological
/// order. `division` and `address` may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub datetime: String,
    pub site: String,
    pub home_team: String,
    pub guest_team: String,
    pub location: String,
    pub division: String,
    pub address: String,
}

/// Closed set of parsing algorithms a site can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserType {
    DayDetails,
    DayDetailsVariant1,
    DayDetailsVariant2,
    MonthBased,
    GroupBased,
    External,
}

impl ParserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserType::DayDetails => "day_details",
            ParserType::DayDetailsVariant1 => "day_details_variant1",
            ParserType::DayDetailsVariant2 => "day_details_variant2",
            ParserType::MonthBased => "month_based",
            ParserType::GroupBased => "group_based",
            ParserType::External => "external",
        }
    }
}

/// Persisted definition of one external schedule source. Created and edited
/// by the admin layer; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub id: i64,
    pub site_name: String,
    pub display_name: String,
    pub base_url: String,
    pub home_team: String,
    pub parser_type: ParserType,
    /// Opaque per-variant configuration; materialized into a typed
    /// `ParserConfig` before any network call.
    pub parser_config: serde_json::Value,
    pub enabled: bool,
    #[serde(default)]
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub scrape_frequency_hours: i64,
    #[serde(default)]
    pub notes: String,
}

/// How month-grid event text encodes home vs. away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamParseStrategy {
    /// "vs Opponent 18:30" is home, "@ Opponent 18:30" is away.
    PrefixVsAt,
    /// "Opponent 18:30 - home" / "Opponent 18:30 - away".
    SuffixHomeAway,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayDetailsConfig {
    /// Calendar page URL with `{month}` and `{year}` placeholders.
    pub url_template: String,
    pub day_container_selector: String,
    pub event_selector: String,
    #[serde(default)]
    pub home_marker: Option<String>,
    #[serde(default)]
    pub away_marker: Option<String>,
    /// Selector for an event's venue detail link; lookups are skipped when
    /// absent.
    #[serde(default)]
    pub venue_link_selector: Option<String>,
    /// Extraction class for venue detail pages: "remote" or "local".
    #[serde(default)]
    pub venue_class: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthBasedConfig {
    pub url_template: String,
    pub cell_selector: String,
    pub event_selector: String,
    pub team_parse_strategy: TeamParseStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBasedConfig {
    /// Index page listing one link per division group.
    pub groups_url_template: String,
    pub group_link_selector: String,
    /// Per-group calendar URL with `{group}`, `{month}` and `{year}`
    /// placeholders.
    pub group_url_template: String,
    #[serde(flatten)]
    pub day_details: DayDetailsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub binary_path: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Typed per-variant configuration, materialized from a SiteConfig's opaque
/// blob. Missing required fields surface as `ConfigParse` before any
/// network call.
#[derive(Debug, Clone)]
pub enum ParserConfig {
    DayDetails(DayDetailsConfig),
    MonthBased(MonthBasedConfig),
    GroupBased(GroupBasedConfig),
    External(ExternalConfig),
}

impl SiteConfig {
    /// Parse the opaque blob into the shape required by the bound
    /// parser_type.
    pub fn parser_config(&self) -> Result<ParserConfig> {
        let blob = self.parser_config.clone();
        let config = match self.parser_type {
            ParserType::DayDetails
            | ParserType::DayDetailsVariant1
            | ParserType::DayDetailsVariant2 => {
                let cfg: DayDetailsConfig = from_blob(&self.site_name, blob)?;
                validate_selector(&self.site_name, &cfg.day_container_selector)?;
                validate_selector(&self.site_name, &cfg.event_selector)?;
                if let Some(sel) = &cfg.venue_link_selector {
                    validate_selector(&self.site_name, sel)?;
                }
                ParserConfig::DayDetails(cfg)
            }
            ParserType::MonthBased => {
                let cfg: MonthBasedConfig = from_blob(&self.site_name, blob)?;
                validate_selector(&self.site_name, &cfg.cell_selector)?;
                validate_selector(&self.site_name, &cfg.event_selector)?;
                ParserConfig::MonthBased(cfg)
            }
            ParserType::GroupBased => {
                let cfg: GroupBasedConfig = from_blob(&self.site_name, blob)?;
                validate_selector(&self.site_name, &cfg.group_link_selector)?;
                validate_selector(&self.site_name, &cfg.day_details.day_container_selector)?;
                validate_selector(&self.site_name, &cfg.day_details.event_selector)?;
                ParserConfig::GroupBased(cfg)
            }
            ParserType::External => {
                let cfg: ExternalConfig = from_blob(&self.site_name, blob)?;
                if cfg.binary_path.trim().is_empty() {
                    return Err(ScraperError::ConfigParse(format!(
                        "site '{}': binary_path must not be empty",
                        self.site_name
                    )));
                }
                ParserConfig::External(cfg)
            }
        };
        Ok(config)
    }
}

fn from_blob<T: serde::de::DeserializeOwned>(
    site_name: &str,
    blob: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(blob)
        .map_err(|e| ScraperError::ConfigParse(format!("site '{}': {}", site_name, e)))
}

fn validate_selector(site_name: &str, selector: &str) -> Result<()> {
    scraper::Selector::parse(selector).map_err(|e| {
        ScraperError::ConfigParse(format!(
            "site '{}': invalid selector '{}': {:?}",
            site_name, selector, e
        ))
    })?;
    Ok(())
}

/// Sort one site's rows ascending by datetime. The fixed-width datetime
/// string makes string order chronological.
pub fn sort_entries(entries: &mut [ScheduleEntry]) {
    entries.sort_by(|a, b| a.datetime.cmp(&b.datetime));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(datetime: &str) -> ScheduleEntry {
        ScheduleEntry {
            datetime: datetime.to_string(),
            site: "test".to_string(),
            home_team: "Us".to_string(),
            guest_team: "Them".to_string(),
            location: String::new(),
            division: String::new(),
            address: String::new(),
        }
    }

    fn site_with(parser_type: ParserType, blob: serde_json::Value) -> SiteConfig {
        SiteConfig {
            id: 1,
            site_name: "test".to_string(),
            display_name: "Test".to_string(),
            base_url: "https://example.test".to_string(),
            home_team: "Us".to_string(),
            parser_type,
            parser_config: blob,
            enabled: true,
            last_scraped_at: None,
            scrape_frequency_hours: 24,
            notes: String::new(),
        }
    }

    #[test]
    fn entries_sort_ascending_by_datetime() {
        let mut rows = vec![entry("2024-03-01 10:00"), entry("2024-02-20 09:00")];
        sort_entries(&mut rows);
        assert_eq!(rows[0].datetime, "2024-02-20 09:00");
        assert_eq!(rows[1].datetime, "2024-03-01 10:00");
    }

    #[test]
    fn unknown_parser_type_is_rejected() {
        let result: std::result::Result<ParserType, _> =
            serde_json::from_value(json!("definitely_not_a_parser"));
        assert!(result.is_err());
    }

    #[test]
    fn day_details_config_requires_selectors() {
        let site = site_with(
            ParserType::DayDetails,
            json!({ "url_template": "https://example.test/cal?m={month}&y={year}" }),
        );
        let err = site.parser_config().unwrap_err();
        assert!(matches!(err, ScraperError::ConfigParse(_)));
    }

    #[test]
    fn invalid_selector_fails_config_parse() {
        let site = site_with(
            ParserType::DayDetails,
            json!({
                "url_template": "https://example.test/cal",
                "day_container_selector": "div..broken[",
                "event_selector": "div.event"
            }),
        );
        let err = site.parser_config().unwrap_err();
        assert!(matches!(err, ScraperError::ConfigParse(_)));
    }

    #[test]
    fn external_config_parses() {
        let site = site_with(
            ParserType::External,
            json!({ "binary_path": "/usr/local/bin/fetch-schedule", "extra_args": ["--league", "north"] }),
        );
        match site.parser_config().unwrap() {
            ParserConfig::External(cfg) => {
                assert_eq!(cfg.binary_path, "/usr/local/bin/fetch-schedule");
                assert_eq!(cfg.extra_args.len(), 2);
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }
}
