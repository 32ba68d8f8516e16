use schedule_scraper::error::ScraperError;
use schedule_scraper::registry::{InMemoryRegistry, SiteRegistry};
use schedule_scraper::types::ParserType;
use std::io::Write;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn sites_load_from_toml_with_typed_parser_config() -> anyhow::Result<()> {
    let file = write_config(
        r#"
[[sites]]
id = 1
site_name = "north_league"
display_name = "North League"
base_url = "https://north.example"
home_team = "Grizzlies"
parser_type = "day_details"
enabled = true
scrape_frequency_hours = 24

[sites.parser_config]
url_template = "https://north.example/cal?m={month}&y={year}"
day_container_selector = "div.day"
event_selector = "div.event"

[[sites]]
id = 2
site_name = "external_feed"
display_name = "External Feed"
base_url = "https://feed.example"
home_team = "Grizzlies"
parser_type = "external"
enabled = false
scrape_frequency_hours = 168

[sites.parser_config]
binary_path = "/usr/local/bin/fetch-schedule"
extra_args = ["--league", "north"]
"#,
    );

    let registry = InMemoryRegistry::from_toml_file(file.path())?;

    let north = registry
        .get_site("north_league")
        .await?
        .expect("site should be present");
    assert_eq!(north.parser_type, ParserType::DayDetails);
    assert!(north.last_scraped_at.is_none());

    let enabled = registry.get_all_enabled().await?;
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].site_name, "north_league");
    Ok(())
}

#[tokio::test]
async fn unknown_parser_type_is_rejected_at_load() {
    let file = write_config(
        r#"
[[sites]]
id = 1
site_name = "bad"
display_name = "Bad"
base_url = "https://bad.example"
home_team = "Grizzlies"
parser_type = "csv_over_carrier_pigeon"
enabled = true
scrape_frequency_hours = 24

[sites.parser_config]
anything = true
"#,
    );

    let err = InMemoryRegistry::from_toml_file(file.path()).unwrap_err();
    assert!(matches!(err, ScraperError::Toml(_)));
}

#[tokio::test]
async fn missing_required_parser_fields_are_rejected_at_load() {
    let file = write_config(
        r#"
[[sites]]
id = 1
site_name = "incomplete"
display_name = "Incomplete"
base_url = "https://x.example"
home_team = "Grizzlies"
parser_type = "month_based"
enabled = true
scrape_frequency_hours = 24

[sites.parser_config]
url_template = "https://x.example/grid"
"#,
    );

    let err = InMemoryRegistry::from_toml_file(file.path()).unwrap_err();
    assert!(matches!(err, ScraperError::ConfigParse(_)));
}
