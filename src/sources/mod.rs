//! EOL data producers
//!
//! Sources collect raw rows; the controller either formats and publishes them
//! through the delivery facade or writes them to disk for inspection.

mod controller;
mod formatter;
mod json_file;
mod seven_zip;
mod traits;

pub use controller::{write_rows, RunMode, ScraperController, SourceCatalog, SourceRun};
pub use formatter::{FeedFormatter, MAIN_FIELDS};
pub use json_file::JsonFileSource;
pub use seven_zip::{SevenZipSource, SEVEN_ZIP_HISTORY_URL};
pub use traits::{EolSource, Row};
