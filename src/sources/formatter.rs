use crate::sources::traits::{EolSource, Row};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Fields forwarded at the top level of every feed row
pub const MAIN_FIELDS: [&str; 7] = [
    "originalName",
    "originalVersion",
    "originalBuild",
    "originalVariant",
    "originalEOLDate",
    "originalExtendedEOLDate",
    "originalEolSource",
];

/// Shapes raw rows into the feed format consumed downstream
///
/// Columns are renamed through `mapping` first. Main fields stay at the top
/// level, configured date columns are folded into `extraDates`, and anything
/// else lands in `extraFields`. Each row is stamped with the scraper's name and
/// run id.
#[derive(Debug, Clone)]
pub struct FeedFormatter {
    scraper_name: String,
    scraper_id: String,
    mapping: HashMap<String, String>,
    extra_date_fields: Vec<String>,
}

impl FeedFormatter {
    pub fn new(scraper_name: impl Into<String>, scraper_id: impl Into<String>) -> Self {
        Self {
            scraper_name: scraper_name.into(),
            scraper_id: scraper_id.into(),
            mapping: HashMap::new(),
            extra_date_fields: Vec::new(),
        }
    }

    /// Formatter configured from a source's own mapping and date columns
    pub fn for_source(source: &dyn EolSource, scraper_id: impl Into<String>) -> Self {
        Self::new(source.display_name(), scraper_id)
            .with_mapping(source.column_mapping().iter().copied())
            .with_extra_date_fields(source.extra_date_fields().iter().copied())
    }

    pub fn with_mapping<'a>(mut self, mapping: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.mapping = mapping
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        self
    }

    pub fn with_extra_date_fields<'a>(mut self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        self.extra_date_fields = fields.into_iter().map(str::to_string).collect();
        self
    }

    pub fn format(&self, rows: Vec<Row>) -> Vec<Row> {
        rows.into_iter().map(|row| self.format_row(row)).collect()
    }

    fn format_row(&self, row: Row) -> Row {
        let mut main = Map::new();
        let mut extra_dates = Map::new();
        let mut extra_fields = Map::new();

        for (column, value) in row {
            let column = self.mapping.get(&column).cloned().unwrap_or(column);

            if MAIN_FIELDS.contains(&column.as_str()) {
                main.insert(column, value);
            } else if self.extra_date_fields.contains(&column) {
                extra_dates.insert(column, value);
            } else {
                extra_fields.insert(column, value);
            }
        }

        if !extra_dates.is_empty() {
            main.insert("extraDates".to_string(), Value::Object(extra_dates));
        }
        if !extra_fields.is_empty() {
            main.insert("extraFields".to_string(), Value::Object(extra_fields));
        }

        main.insert("scraperName".to_string(), Value::String(self.scraper_name.clone()));
        main.insert("scraperId".to_string(), Value::String(self.scraper_id.clone()));
        main
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_format_splits_columns() {
        let formatter = FeedFormatter::new("7-ZIP", "run-1").with_extra_date_fields(["releaseDate"]);

        let formatted = formatter.format(vec![row(json!({
            "originalName": "7-Zip",
            "originalVersion": "23.01.x",
            "releaseDate": "2023-06-20",
            "notes": "bugfix"
        }))]);

        assert_eq!(
            Value::Object(formatted[0].clone()),
            json!({
                "originalName": "7-Zip",
                "originalVersion": "23.01.x",
                "extraDates": {"releaseDate": "2023-06-20"},
                "extraFields": {"notes": "bugfix"},
                "scraperName": "7-ZIP",
                "scraperId": "run-1"
            })
        );
    }

    #[test]
    fn test_mapping_applies_before_split() {
        let formatter = FeedFormatter::new("vendor", "run-2")
            .with_mapping([("Product", "originalName"), ("End of Support", "originalEOLDate")]);

        let formatted = formatter.format(vec![row(json!({
            "Product": "Widget",
            "End of Support": "2025-01-31"
        }))]);

        assert_eq!(formatted[0]["originalName"], "Widget");
        assert_eq!(formatted[0]["originalEOLDate"], "2025-01-31");
        assert!(!formatted[0].contains_key("extraFields"));
        assert!(!formatted[0].contains_key("extraDates"));
    }

    #[test]
    fn test_formatters_do_not_share_mapping() {
        let mapped = FeedFormatter::new("a", "1").with_mapping([("Name", "originalName")]);
        let plain = FeedFormatter::new("b", "2");

        let input = row(json!({"Name": "x"}));
        assert!(mapped.format(vec![input.clone()])[0].contains_key("originalName"));
        assert_eq!(plain.format(vec![input])[0]["extraFields"]["Name"], "x");
    }
}
