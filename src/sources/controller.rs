use crate::config::SourcesConfig;
use crate::error::{AppError, Result};
use crate::publisher::{DeliveryReport, DeliveryService};
use crate::sources::formatter::FeedFormatter;
use crate::sources::seven_zip::SevenZipSource;
use crate::sources::traits::{EolSource, Row};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Registered sources by name
#[derive(Default, Clone)]
pub struct SourceCatalog {
    sources: BTreeMap<String, Arc<dyn EolSource>>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in source
    pub fn builtin(config: &SourcesConfig) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.register(Arc::new(SevenZipSource::new(config.fetch_timeout_secs)?));
        Ok(catalog)
    }

    pub fn register(&mut self, source: Arc<dyn EolSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EolSource>> {
        self.sources.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// Sources matching `names`, or all of them when `names` is empty
    ///
    /// Unknown names are logged and skipped.
    pub fn select(&self, names: &[String]) -> Vec<Arc<dyn EolSource>> {
        if names.is_empty() {
            return self.sources.values().cloned().collect();
        }

        names
            .iter()
            .filter_map(|name| {
                let source = self.get(name);
                if source.is_none() {
                    warn!(
                        source = %name,
                        available = ?self.names(),
                        "Source is not available in this integrator version"
                    );
                }
                source
            })
            .collect()
    }
}

/// Where collected data goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Format each feed and publish it as software data
    Publish,
    /// Write raw rows to `<output_dir>/<name>_eol_data.json`
    Test,
}

/// Outcome of running one source
#[derive(Debug)]
pub struct SourceRun {
    pub name: String,
    pub rows: usize,
    pub delivery: Option<DeliveryReport>,
    pub output_file: Option<PathBuf>,
}

/// Runs catalog sources and routes their rows
pub struct ScraperController {
    catalog: SourceCatalog,
    delivery: Option<Arc<DeliveryService>>,
    output_dir: PathBuf,
}

impl ScraperController {
    pub fn new(catalog: SourceCatalog, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            delivery: None,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_delivery(mut self, delivery: Arc<DeliveryService>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    /// Run the named sources (all when empty) in catalog order
    pub async fn run(&self, names: &[String], mode: RunMode) -> Result<Vec<SourceRun>> {
        let delivery = match mode {
            RunMode::Publish => Some(self.delivery.as_ref().ok_or_else(|| {
                AppError::Configuration("Publish mode requires a delivery service".to_string())
            })?),
            RunMode::Test => None,
        };

        let mut runs = Vec::new();
        for source in self.catalog.select(names) {
            let name = source.name().to_string();
            info!(source = %name, mode = ?mode, "Fetching data for source");

            let rows = source.collect().await?;
            let row_count = rows.len();

            let run = match delivery {
                Some(delivery) => {
                    let report = Self::publish_rows(delivery, source.as_ref(), rows).await?;
                    SourceRun {
                        name: name.clone(),
                        rows: row_count,
                        delivery: Some(report),
                        output_file: None,
                    }
                }
                None => {
                    let path = write_rows(&self.output_dir, &name, &rows).await?;
                    SourceRun {
                        name: name.clone(),
                        rows: row_count,
                        delivery: None,
                        output_file: Some(path),
                    }
                }
            };

            info!(source = %name, rows = row_count, "Source ran successfully");
            runs.push(run);
        }

        Ok(runs)
    }

    async fn publish_rows(
        delivery: &DeliveryService,
        source: &dyn EolSource,
        rows: Vec<Row>,
    ) -> Result<DeliveryReport> {
        let formatter = FeedFormatter::for_source(source, Uuid::new_v4().to_string());
        let feed = formatter.format(rows).into_iter().map(Value::Object).collect();

        let report = delivery.publish_software_data(Value::Array(feed)).await?;
        if !report.is_fully_delivered() {
            warn!(
                source = %source.name(),
                request_id = %report.request_id,
                escalated = report.escalated.len(),
                "Feed was not delivered"
            );
        }
        Ok(report)
    }
}

/// Write rows as a JSON array to `<dir>/<name>_eol_data.json`
pub async fn write_rows(dir: &Path, name: &str, rows: &[Row]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}_eol_data.json", name));
    let content = serde_json::to_vec(rows)?;
    tokio::fs::write(&path, content).await?;
    Ok(path)
}
