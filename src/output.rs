use crate::error::Result;
use crate::types::ScheduleEntry;
use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

const CSV_HEADER: [&str; 7] = [
    "datetime", "site", "home", "guest", "location", "division", "address",
];

/// Destination for a site's finished rows. Workers call this concurrently,
/// one site's batch at a time.
#[async_trait]
pub trait ScheduleSink: Send + Sync {
    async fn write(&self, rows: &[ScheduleEntry]) -> Result<()>;
}

/// 7-column CSV output to a file or stdout. The header row is written once
/// at construction.
pub struct CsvSink {
    writer: Mutex<csv::Writer<Box<dyn Write + Send>>>,
}

impl CsvSink {
    fn new(inner: Box<dyn Write + Send>) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    pub fn to_path(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(Box::new(file))
    }

    pub fn to_stdout() -> Result<Self> {
        Self::new(Box::new(std::io::stdout()))
    }
}

#[async_trait]
impl ScheduleSink for CsvSink {
    async fn write(&self, rows: &[ScheduleEntry]) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        for row in rows {
            writer.write_record([
                row.datetime.as_str(),
                row.site.as_str(),
                row.home_team.as_str(),
                row.guest_team.as_str(),
                row.location.as_str(),
                row.division.as_str(),
                row.address.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Distinct non-empty location strings in first-seen order, for the
/// location import step.
pub fn distinct_locations(rows: &[ScheduleEntry]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut locations = Vec::new();
    for row in rows {
        let location = row.location.trim();
        if location.is_empty() {
            continue;
        }
        if seen.insert(location.to_string()) {
            locations.push(location.to_string());
        }
    }
    locations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(datetime: &str, location: &str) -> ScheduleEntry {
        ScheduleEntry {
            datetime: datetime.to_string(),
            site: "test".to_string(),
            home_team: "Us".to_string(),
            guest_team: "Them".to_string(),
            location: location.to_string(),
            division: String::new(),
            address: String::new(),
        }
    }

    #[tokio::test]
    async fn csv_file_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvSink::to_path(&path).unwrap();
        sink.write(&[entry("2024-02-20 09:00", "Rink 1")])
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "datetime,site,home,guest,location,division,address");
        assert_eq!(lines[1], "2024-02-20 09:00,test,Us,Them,Rink 1,,");
    }

    #[test]
    fn distinct_locations_dedupe_and_skip_empty() {
        let rows = vec![
            entry("2024-02-20 09:00", "Rink 1"),
            entry("2024-02-21 09:00", ""),
            entry("2024-02-22 09:00", "Rink 2"),
            entry("2024-02-23 09:00", "Rink 1"),
        ];
        assert_eq!(distinct_locations(&rows), vec!["Rink 1", "Rink 2"]);
    }
}
