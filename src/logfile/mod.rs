//! On-disk outputs: the CSV sample log and the plain-text run log.
//!
//! - [`csv_log`]: header management, torn-tail repair and durable row appends
//! - [`run_log`]: lazily created, timestamped error lines

pub mod csv_log;
pub mod run_log;

pub use csv_log::{append_row, ensure_header, HeaderStatus, Row, HEADER};
pub use run_log::RunLog;
