//! CSV export for the aggregated datasets.
//!
//! Quoting follows RFC 4180: a field containing a comma, a double quote, CR
//! or LF is wrapped in double quotes with inner quotes doubled. Absent
//! values are written as empty fields.

use itertools::Itertools;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// A type that can be written as one CSV line.
pub trait CsvRow {
    /// Column names, in the order [`CsvRow::record`] returns values.
    fn header() -> &'static [&'static str];
    fn record(&self) -> Vec<String>;
}

pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render a header line plus one line per row.
pub fn to_csv<R: CsvRow>(rows: &[R]) -> String {
    let mut out = String::new();
    out.push_str(&R::header().iter().map(|h| escape_field(h)).join(","));
    out.push('\n');
    for row in rows {
        out.push_str(&row.record().iter().map(|f| escape_field(f)).join(","));
        out.push('\n');
    }
    out
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_csv<R: CsvRow>(rows: &[R], path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, to_csv(rows)).await?;
    info!(rows = rows.len(), "Wrote CSV");
    Ok(())
}

/// Optional number as a CSV field.
pub fn opt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Optional text as a CSV field.
pub fn opt_text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}
