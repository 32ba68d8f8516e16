use crate::error::{Result, ScraperError};
use crate::http::HttpClient;
use crate::parsers::day_details::{extract_day_details, join_venue_addresses, HomeAwayRule};
use crate::parsers::{fetch_page, render_url, ScheduleParser};
use crate::resolver::VenueAddressResolver;
use crate::types::{GroupBasedConfig, ParserConfig, ScheduleEntry, SiteConfig};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{info, warn};

/// Sites that publish one calendar per division group: a groups index page
/// maps division names to group ids, then each group's calendar re-enters
/// the day-details extraction with the division name tagged on.
pub struct GroupBasedParser {
    http: Arc<dyn HttpClient>,
    resolver: Arc<VenueAddressResolver>,
}

impl GroupBasedParser {
    pub fn new(http: Arc<dyn HttpClient>, resolver: Arc<VenueAddressResolver>) -> Self {
        Self { http, resolver }
    }
}

#[async_trait]
impl ScheduleParser for GroupBasedParser {
    async fn execute(
        &self,
        site: &SiteConfig,
        config: &ParserConfig,
        month: u32,
        year: i32,
    ) -> Result<Vec<ScheduleEntry>> {
        let cfg = match config {
            ParserConfig::GroupBased(cfg) => cfg,
            _ => {
                return Err(ScraperError::ConfigParse(format!(
                    "site '{}': expected group_based configuration",
                    site.site_name
                )))
            }
        };

        let groups_url = render_url(&cfg.groups_url_template, month, year);
        let index_body = fetch_page(self.http.as_ref(), &groups_url).await?;
        let groups = extract_groups(site, cfg, &index_body, &groups_url)?;
        info!(site = %site.site_name, groups = groups.len(), "resolved division groups");

        let mut pending = Vec::new();
        for (division, group_id) in groups {
            let url = render_url(&cfg.group_url_template.replace("{group}", &group_id), month, year);
            // A failed group fetch or a group page without day containers
            // sinks the whole site, same as the day-details path.
            let body = fetch_page(self.http.as_ref(), &url).await?;
            let rows = extract_day_details(
                site,
                &cfg.day_details,
                &body,
                &url,
                HomeAwayRule::ExactMarker,
                Some(&division),
            )?;
            pending.extend(rows);
        }

        let entries = join_venue_addresses(&self.resolver, &cfg.day_details, pending).await;
        info!(site = %site.site_name, rows = entries.len(), "group based extraction complete");
        Ok(entries)
    }
}

/// Pull (division name, group id) pairs from the index page. An index with
/// no group links at all is fatal for the site's run.
fn extract_groups(
    site: &SiteConfig,
    cfg: &GroupBasedConfig,
    body: &str,
    page_url: &str,
) -> Result<Vec<(String, String)>> {
    let link_selector = Selector::parse(&cfg.group_link_selector).map_err(|e| {
        ScraperError::ConfigParse(format!(
            "site '{}': invalid selector '{}': {:?}",
            site.site_name, cfg.group_link_selector, e
        ))
    })?;

    let document = Html::parse_document(body);
    let mut groups = Vec::new();
    for link in document.select(&link_selector) {
        let name = link.text().collect::<String>().trim().to_string();
        let href = link.value().attr("href").unwrap_or_default();
        let group_id = group_id_from_href(href);
        if name.is_empty() || group_id.is_empty() {
            warn!(site = %site.site_name, href, "skipping group link without name or id");
            continue;
        }
        groups.push((name, group_id));
    }

    if groups.is_empty() {
        return Err(ScraperError::ElementNotFound(format!(
            "no group links on {}",
            page_url
        )));
    }
    Ok(groups)
}

/// Group id from either a `?group=ID` query or the last path segment.
fn group_id_from_href(href: &str) -> String {
    if let Some(idx) = href.find("group=") {
        let rest = &href[idx + "group=".len()..];
        return rest
            .split(&['&', '#'][..])
            .next()
            .unwrap_or_default()
            .to_string();
    }
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_prefers_query_parameter() {
        assert_eq!(group_id_from_href("/schedule?group=u12&view=m"), "u12");
        assert_eq!(group_id_from_href("/groups/442/"), "442");
        assert_eq!(group_id_from_href(""), "");
    }
}
