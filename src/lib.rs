// Country Profile Dashboard - Core Library
// CSV datasets on international IP activity → schema check → filter → rollups.
// Shared by the CLI/TUI binary and the HTTP server.

pub mod records;    // Record Layer - the five dataset row kinds
pub mod schema;     // Shape Layer - column descriptors + validation
pub mod loader;     // CSV files/uploads in, filtered CSV out
pub mod filter;     // Filter Engine - year range + ip types
pub mod aggregate;  // Aggregator - rollups per tab
pub mod dashboard;  // Session state + tab views
pub mod config;
pub mod report;

// Re-export commonly used types
pub use records::{
    CountryPair, Direction, FlowRecord, GenderSplitRecord, ImportanceRecord, IpType, PphRecord,
    TopFilerRecord,
};
pub use schema::{
    ColumnSpec, ColumnType, DatasetKind, ParseError, Record, SchemaError, SchemaValidator,
    Validated,
};
pub use loader::{
    load_bytes, load_path, to_csv_bytes, to_csv_bytes_with_header, DataSource, Dataset, LoadError,
};
pub use filter::{apply, FilterState, Filterable, YearRange};
pub use aggregate::{Ratio, Route};
pub use dashboard::{
    DashboardView, DatasetStatus, FilterUpdate, Notice, NoticeLevel, Session, Tab, UploadOutcome,
};
pub use config::DashboardConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
