use crate::error::{Result, ScraperError};
use crate::types::SiteConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Read access to persisted site definitions, plus the two narrow writes
/// the scrape run performs (scrape timestamps, observed locations).
#[async_trait]
pub trait SiteRegistry: Send + Sync {
    async fn get_site(&self, name: &str) -> Result<Option<SiteConfig>>;
    async fn get_all_enabled(&self) -> Result<Vec<SiteConfig>>;
    /// Enabled sites never scraped, or scraped longer ago than their
    /// configured frequency.
    async fn get_due_for_scraping(&self, now: DateTime<Utc>) -> Result<Vec<SiteConfig>>;
    async fn update_last_scraped(&self, id: i64, timestamp: DateTime<Utc>) -> Result<()>;
    /// Store newly observed location strings for later address mapping.
    async fn record_locations(&self, site_name: &str, locations: &[String]) -> Result<()>;
}

/// A location string observed during a scrape, waiting for address mapping
/// by the admin layer.
#[derive(Debug, Clone)]
pub struct LocationRecord {
    pub id: Uuid,
    pub site_name: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory registry backing both tests and the TOML-file CLI path.
#[derive(Debug)]
pub struct InMemoryRegistry {
    sites: Mutex<HashMap<i64, SiteConfig>>,
    locations: Mutex<Vec<LocationRecord>>,
}

#[derive(Deserialize)]
struct SitesFile {
    #[serde(default)]
    sites: Vec<SiteConfig>,
}

impl InMemoryRegistry {
    /// Build a registry, enforcing unique site names and eagerly validating
    /// each site's parser configuration so malformed sites are rejected
    /// before any scrape attempt.
    pub fn with_sites(sites: Vec<SiteConfig>) -> Result<Self> {
        let mut by_id = HashMap::new();
        let mut names = HashSet::new();
        for site in sites {
            if !names.insert(site.site_name.clone()) {
                return Err(ScraperError::ConfigParse(format!(
                    "duplicate site_name '{}'",
                    site.site_name
                )));
            }
            site.parser_config()?;
            by_id.insert(site.id, site);
        }
        Ok(Self {
            sites: Mutex::new(by_id),
            locations: Mutex::new(Vec::new()),
        })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: SitesFile = toml::from_str(&content)?;
        Self::with_sites(file.sites)
    }

    pub fn locations(&self) -> Vec<LocationRecord> {
        self.locations.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteRegistry for InMemoryRegistry {
    async fn get_site(&self, name: &str) -> Result<Option<SiteConfig>> {
        let sites = self.sites.lock().unwrap();
        Ok(sites.values().find(|s| s.site_name == name).cloned())
    }

    async fn get_all_enabled(&self) -> Result<Vec<SiteConfig>> {
        let sites = self.sites.lock().unwrap();
        let mut enabled: Vec<SiteConfig> = sites.values().filter(|s| s.enabled).cloned().collect();
        enabled.sort_by(|a, b| a.site_name.cmp(&b.site_name));
        Ok(enabled)
    }

    async fn get_due_for_scraping(&self, now: DateTime<Utc>) -> Result<Vec<SiteConfig>> {
        let sites = self.sites.lock().unwrap();
        let mut due: Vec<SiteConfig> = sites
            .values()
            .filter(|s| s.enabled)
            .filter(|s| match s.last_scraped_at {
                None => true,
                Some(last) => now - last >= Duration::hours(s.scrape_frequency_hours),
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.site_name.cmp(&b.site_name));
        Ok(due)
    }

    async fn update_last_scraped(&self, id: i64, timestamp: DateTime<Utc>) -> Result<()> {
        let mut sites = self.sites.lock().unwrap();
        match sites.get_mut(&id) {
            Some(site) => {
                site.last_scraped_at = Some(timestamp);
                debug!(site = %site.site_name, "updated last_scraped_at");
                Ok(())
            }
            None => Err(ScraperError::MissingField(format!(
                "no site with id {}",
                id
            ))),
        }
    }

    async fn record_locations(&self, site_name: &str, locations: &[String]) -> Result<()> {
        let mut stored = self.locations.lock().unwrap();
        for name in locations {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let already_known = stored
                .iter()
                .any(|r| r.site_name == site_name && r.name == name);
            if already_known {
                continue;
            }
            debug!(site = site_name, location = name, "recording new location");
            stored.push(LocationRecord {
                id: Uuid::new_v4(),
                site_name: site_name.to_string(),
                name: name.to_string(),
                created_at: Utc::now(),
            });
        }
        Ok(())
    }
}
