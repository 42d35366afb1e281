//! Productivity reports for call-center remark files.
//!
//! The pipeline is load → filter → group → aggregate → format/export:
//! [`loader`] turns a spreadsheet into [`types::CallRecord`]s, [`filter`]
//! drops excluded rows and selects a date range, [`metrics`] computes the
//! per-group figures, [`reports`] assembles the tables and [`output`]
//! prints or exports them.
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod metrics;
pub mod output;
pub mod reports;
pub mod session;
pub mod types;
pub mod util;

pub use config::ReportConfig;
pub use error::{ReportError, Result};
pub use session::Session;
