use crate::error::{AppError, Result};
use crate::sources::traits::{EolSource, Row};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub const SEVEN_ZIP_HISTORY_URL: &str = "https://www.7-zip.org/history.txt";

/// Width of the trailing `YYYY-MM-DD` column in history.txt
const DATE_WIDTH: usize = 10;

/// 7-Zip release history
///
/// Each release's end of life is the release date of the next newer entry;
/// the newest release has none.
pub struct SevenZipSource {
    client: Client,
    url: String,
    version_pattern: Regex,
}

impl SevenZipSource {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        Self::with_url(SEVEN_ZIP_HISTORY_URL, timeout_secs)
    }

    pub fn with_url(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        let version_pattern = Regex::new(r"(([.]*\d+)*)")
            .map_err(|e| AppError::Internal(format!("Invalid version pattern: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            version_pattern,
        })
    }

    /// Leading dotted number of `text` with a `.x` suffix
    fn normalize_version(&self, text: &str) -> String {
        let version = self
            .version_pattern
            .find(text)
            .map(|m| m.as_str())
            .unwrap_or_default();
        format!("{}.x", version)
    }

    /// Turn history.txt into rows, newest first
    pub fn parse_history(&self, text: &str) -> Vec<Row> {
        let releases: Vec<(&str, &str)> = text
            .lines()
            .map(str::trim_end)
            .filter(|line| line.starts_with(|c: char| c.is_ascii_digit()))
            .filter(|line| line.len() >= DATE_WIDTH && line.is_char_boundary(line.len() - DATE_WIDTH))
            .map(|line| {
                let (version, date) = line.split_at(line.len() - DATE_WIDTH);
                (version.trim(), date)
            })
            .collect();

        let mut seen = HashSet::new();
        let mut rows = Vec::new();

        for (index, (version, release_date)) in releases.iter().enumerate() {
            let version = self.normalize_version(version);
            if !seen.insert(version.clone()) {
                continue;
            }

            let eol_date = index
                .checked_sub(1)
                .map(|newer| Value::String(releases[newer].1.to_string()))
                .unwrap_or(Value::Null);

            let mut row = Row::new();
            row.insert("originalName".to_string(), Value::String("7-Zip".to_string()));
            row.insert("originalVersion".to_string(), Value::String(version));
            row.insert("releaseDate".to_string(), Value::String(release_date.to_string()));
            row.insert("originalEOLDate".to_string(), eol_date);
            row.insert("originalEolSource".to_string(), Value::String(self.url.clone()));
            rows.push(row);
        }

        rows
    }
}

#[async_trait]
impl EolSource for SevenZipSource {
    fn name(&self) -> &str {
        "seven_zip"
    }

    fn display_name(&self) -> &str {
        "7-ZIP"
    }

    fn extra_date_fields(&self) -> &[&'static str] {
        &["releaseDate"]
    }

    async fn collect(&self) -> Result<Vec<Row>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::Source {
                source_name: self.name().to_string(),
                message: format!("failed to fetch {}: {}", self.url, e),
            })?
            .text()
            .await?;

        let rows = self.parse_history(&body);
        debug!(url = %self.url, rows = rows.len(), "Parsed 7-Zip release history");
        Ok(rows)
    }
}
