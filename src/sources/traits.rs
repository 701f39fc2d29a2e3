use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One scraped row, column name to value
pub type Row = Map<String, Value>;

/// A producer of raw EOL rows
#[async_trait]
pub trait EolSource: Send + Sync {
    /// Catalog name used on the command line (e.g. `seven_zip`)
    fn name(&self) -> &str;

    /// Display name stamped on formatted rows as `scraperName`
    fn display_name(&self) -> &str {
        self.name()
    }

    /// Columns kept under `extraDates` when the feed is formatted
    fn extra_date_fields(&self) -> &[&'static str] {
        &[]
    }

    /// Source column renames applied before formatting
    fn column_mapping(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    /// Collect raw rows
    async fn collect(&self) -> Result<Vec<Row>>;
}
