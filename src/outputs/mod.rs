//! Output generation for article records and aggregated datasets.
//!
//! # Submodules
//!
//! - [`json`]: Writes one [`ArticleRecord`](crate::models::ArticleRecord) per file
//! - [`csv`]: Writes the bias results and article datasets as CSV
//!
//! # Output Structure
//!
//! ```text
//! app/webdata/
//! ├── 28812345.json
//! └── ...
//!
//! bias_data.csv      # one row per (model, run, article)
//! web_data.csv       # one row per article
//! ```

pub mod csv;
pub mod json;
