use crate::error::{Result, ScraperError};
use crate::http::HttpClient;
use crate::resolver::VenueAddressResolver;
use crate::types::{ParserConfig, ParserType, ScheduleEntry, SiteConfig};
use async_trait::async_trait;
use std::sync::Arc;

pub mod day_details;
pub mod external;
pub mod group_based;
pub mod month_based;

pub use day_details::{DayDetailsParser, HomeAwayRule};
pub use external::ExternalParser;
pub use group_based::GroupBasedParser;
pub use month_based::MonthBasedParser;

/// Common contract for all parsing algorithms. Implementations return rows
/// in page order; the dispatcher applies the final datetime sort.
#[async_trait]
pub trait ScheduleParser: Send + Sync {
    async fn execute(
        &self,
        site: &SiteConfig,
        config: &ParserConfig,
        month: u32,
        year: i32,
    ) -> Result<Vec<ScheduleEntry>>;
}

/// Maps a parser_type tag to its algorithm. Swappable so tests can verify
/// which variant a site drives.
pub trait ParserFactory: Send + Sync {
    fn for_type(&self, parser_type: ParserType) -> Box<dyn ScheduleParser>;
}

pub struct DefaultParserFactory {
    http: Arc<dyn HttpClient>,
    resolver: Arc<VenueAddressResolver>,
}

impl DefaultParserFactory {
    pub fn new(http: Arc<dyn HttpClient>, resolver: Arc<VenueAddressResolver>) -> Self {
        Self { http, resolver }
    }
}

impl ParserFactory for DefaultParserFactory {
    fn for_type(&self, parser_type: ParserType) -> Box<dyn ScheduleParser> {
        let http = Arc::clone(&self.http);
        let resolver = Arc::clone(&self.resolver);
        match parser_type {
            ParserType::DayDetails => {
                Box::new(DayDetailsParser::new(http, resolver, HomeAwayRule::ExactMarker))
            }
            ParserType::DayDetailsVariant1 => {
                Box::new(DayDetailsParser::new(http, resolver, HomeAwayRule::FuzzyMarker))
            }
            ParserType::DayDetailsVariant2 => Box::new(DayDetailsParser::new(
                http,
                resolver,
                HomeAwayRule::ExactMarkerFiltered,
            )),
            ParserType::MonthBased => Box::new(MonthBasedParser::new(http)),
            ParserType::GroupBased => Box::new(GroupBasedParser::new(http, resolver)),
            ParserType::External => Box::new(ExternalParser),
        }
    }
}

/// Selects and runs the parsing algorithm bound to a site's parser_type,
/// returning rows sorted ascending by datetime.
pub struct Dispatcher {
    factory: Arc<dyn ParserFactory>,
}

impl Dispatcher {
    pub fn new(http: Arc<dyn HttpClient>, resolver: Arc<VenueAddressResolver>) -> Self {
        Self {
            factory: Arc::new(DefaultParserFactory::new(http, resolver)),
        }
    }

    pub fn with_factory(factory: Arc<dyn ParserFactory>) -> Self {
        Self { factory }
    }

    pub async fn execute(
        &self,
        site: &SiteConfig,
        month: u32,
        year: i32,
    ) -> Result<Vec<ScheduleEntry>> {
        // Config is materialized and validated before any network call.
        let config = site.parser_config()?;
        let parser = self.factory.for_type(site.parser_type);
        let mut rows = parser.execute(site, &config, month, year).await?;
        crate::types::sort_entries(&mut rows);
        Ok(rows)
    }
}

/// GET one site page; non-2xx is fatal for the site's run (no retry here,
/// unlike venue lookups).
pub(crate) async fn fetch_page(http: &dyn HttpClient, url: &str) -> Result<String> {
    let resp = http.get(url).await?;
    if !resp.is_success() {
        return Err(ScraperError::Fetch(format!(
            "{} returned status {}",
            url, resp.status
        )));
    }
    Ok(resp.body)
}

/// Substitute `{month}` and `{year}` placeholders in a URL template.
pub(crate) fn render_url(template: &str, month: u32, year: i32) -> String {
    template
        .replace("{month}", &month.to_string())
        .replace("{year}", &year.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_url_substitutes_placeholders() {
        let url = render_url("https://x/cal?m={month}&y={year}", 3, 2024);
        assert_eq!(url, "https://x/cal?m=3&y=2024");
    }
}
