// 📐 Shape Layer - Schema Validation
// Every dataset kind carries an explicit column descriptor; uploads are
// checked against it before any typed record is built.

use crate::records::{
    Direction, FlowRecord, GenderSplitRecord, ImportanceRecord, IpType, PphRecord, TopFilerRecord,
};
use chrono::{Datelike, Utc};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use thiserror::Error;

/// Earliest year a row may carry.
pub const MIN_PLAUSIBLE_YEAR: i32 = 1800;
/// How far past the current year a row may reach (forecast rows).
pub const FUTURE_YEAR_SLACK: i32 = 5;

// ============================================================================
// DATASET KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Flows,
    TopFilers,
    GenderSplit,
    Pph,
    Importance,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::Flows,
        DatasetKind::TopFilers,
        DatasetKind::GenderSplit,
        DatasetKind::Pph,
        DatasetKind::Importance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Flows => "flows",
            DatasetKind::TopFilers => "top_filers",
            DatasetKind::GenderSplit => "gender_split",
            DatasetKind::Pph => "pph",
            DatasetKind::Importance => "importance",
        }
    }

    /// Uploader caption
    pub fn label(&self) -> &'static str {
        match self {
            DatasetKind::Flows => "IP activity between two countries",
            DatasetKind::TopFilers => "Top filers (origin → destination)",
            DatasetKind::GenderSplit => "Gender inventors split",
            DatasetKind::Pph => "PPH requests",
            DatasetKind::Importance => "Patent importance (by jurisdiction)",
        }
    }

    /// Accepts the snake_case name plus a few short aliases.
    pub fn parse(value: &str) -> Option<DatasetKind> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "flows" | "flow" => Some(DatasetKind::Flows),
            "top_filers" | "topfilers" | "filers" => Some(DatasetKind::TopFilers),
            "gender_split" | "gender" => Some(DatasetKind::GenderSplit),
            "pph" => Some(DatasetKind::Pph),
            "importance" => Some(DatasetKind::Importance),
            _ => None,
        }
    }

    pub fn columns(&self) -> &'static [ColumnSpec] {
        match self {
            DatasetKind::Flows => FLOW_COLUMNS,
            DatasetKind::TopFilers => TOP_FILER_COLUMNS,
            DatasetKind::GenderSplit => GENDER_COLUMNS,
            DatasetKind::Pph => PPH_COLUMNS,
            DatasetKind::Importance => IMPORTANCE_COLUMNS,
        }
    }

    /// Uploader tooltip: "Required cols: a, b, c"
    pub fn required_columns_hint(&self) -> String {
        let names: Vec<&str> = self.columns().iter().map(|c| c.name).collect();
        format!("Required cols: {}", names.join(", "))
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// COLUMN DESCRIPTORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Text,
    /// patent | trademark | design, case-insensitive
    IpType,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => f.write_str("int"),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Text => f.write_str("string"),
            ColumnType::IpType => {
                let names: Vec<&str> = IpType::ALL.iter().map(|t| t.as_str()).collect();
                write!(f, "one of {}", names.join("|"))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        ColumnSpec { name, ty }
    }
}


const FLOW_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("year", ColumnType::Int),
    ColumnSpec::new("origin_country", ColumnType::Text),
    ColumnSpec::new("dest_country", ColumnType::Text),
    ColumnSpec::new("ip_type", ColumnType::IpType),
    ColumnSpec::new("applications", ColumnType::Int),
];

const TOP_FILER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("filer", ColumnType::Text),
    ColumnSpec::new("origin_country", ColumnType::Text),
    ColumnSpec::new("dest_country", ColumnType::Text),
    ColumnSpec::new("ip_type", ColumnType::Text),
    ColumnSpec::new("filings", ColumnType::Int),
];

const GENDER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("year", ColumnType::Int),
    ColumnSpec::new("origin_country", ColumnType::Text),
    ColumnSpec::new("dest_country", ColumnType::Text),
    ColumnSpec::new("female_inventors", ColumnType::Int),
    ColumnSpec::new("male_inventors", ColumnType::Int),
];

const PPH_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("year", ColumnType::Int),
    ColumnSpec::new("direction", ColumnType::Text),
    ColumnSpec::new("requests", ColumnType::Int),
];

const IMPORTANCE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("year", ColumnType::Int),
    ColumnSpec::new("jurisdiction", ColumnType::Text),
    ColumnSpec::new("importance_score", ColumnType::Float),
];

// ============================================================================
// ERRORS
// ============================================================================

/// Blocks loading of one dataset. Other datasets are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("{kind}: missing required column(s): {}", .missing.join(", "))]
    MissingColumns {
        kind: DatasetKind,
        missing: Vec<String>,
    },

    #[error("{kind}: line {line}, column `{column}`: expected {expected}, found {value:?}")]
    Mistyped {
        kind: DatasetKind,
        line: u64,
        column: String,
        expected: String,
        value: String,
    },

    #[error("{kind}: unreadable header row: {reason}")]
    MalformedHeader { kind: DatasetKind, reason: String },
}

impl SchemaError {
    pub fn kind(&self) -> DatasetKind {
        match self {
            SchemaError::MissingColumns { kind, .. }
            | SchemaError::Mistyped { kind, .. }
            | SchemaError::MalformedHeader { kind, .. } => *kind,
        }
    }
}

/// One malformed row. The row is skipped; the rest of the file still loads.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    pub line: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub reason: String,
}

impl ParseError {
    pub fn new(line: u64, reason: impl Into<String>) -> Self {
        ParseError {
            line,
            column: None,
            reason: reason.into(),
        }
    }

    pub fn in_column(line: u64, column: &str, reason: impl Into<String>) -> Self {
        ParseError {
            line,
            column: Some(column.to_string()),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// COERCED ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    IpType(IpType),
}

/// A row whose declared columns have all been coerced to their types.
#[derive(Debug, Clone)]
pub struct ValidatedRow {
    kind: DatasetKind,
    line: u64,
    cells: Vec<Cell>,
    min_year: i32,
    max_year: i32,
}

impl ValidatedRow {
    pub fn line(&self) -> u64 {
        self.line
    }

    fn cell(&self, column: &str) -> Result<&Cell, ParseError> {
        self.kind
            .columns()
            .iter()
            .position(|c| c.name == column)
            .and_then(|i| self.cells.get(i))
            .ok_or_else(|| ParseError::in_column(self.line, column, "column not declared"))
    }

    pub fn int(&self, column: &str) -> Result<i64, ParseError> {
        match self.cell(column)? {
            Cell::Int(v) => Ok(*v),
            _ => Err(ParseError::in_column(self.line, column, "not an int column")),
        }
    }

    pub fn float(&self, column: &str) -> Result<f64, ParseError> {
        match self.cell(column)? {
            Cell::Float(v) => Ok(*v),
            Cell::Int(v) => Ok(*v as f64),
            _ => Err(ParseError::in_column(self.line, column, "not a float column")),
        }
    }

    pub fn text(&self, column: &str) -> Result<&str, ParseError> {
        match self.cell(column)? {
            Cell::Text(v) => Ok(v),
            _ => Err(ParseError::in_column(self.line, column, "not a string column")),
        }
    }

    pub fn ip_type(&self, column: &str) -> Result<IpType, ParseError> {
        match self.cell(column)? {
            Cell::IpType(v) => Ok(*v),
            _ => Err(ParseError::in_column(self.line, column, "not an ip_type column")),
        }
    }

    /// Non-negative count
    pub fn count(&self, column: &str) -> Result<u64, ParseError> {
        let value = self.int(column)?;
        u64::try_from(value).map_err(|_| {
            ParseError::in_column(self.line, column, format!("must be non-negative, got {}", value))
        })
    }

    /// Calendar year inside the plausible window
    pub fn year(&self) -> Result<i32, ParseError> {
        let value = self.int("year")?;
        match i32::try_from(value) {
            Ok(year) if (self.min_year..=self.max_year).contains(&year) => Ok(year),
            _ => Err(ParseError::in_column(
                self.line,
                "year",
                format!(
                    "year {} outside plausible range {}..={}",
                    value, self.min_year, self.max_year
                ),
            )),
        }
    }
}

// ============================================================================
// RECORD BINDING
// ============================================================================

/// A typed row kind that can be built from a validated CSV row.
pub trait Record: Sized + Clone + Serialize {
    const KIND: DatasetKind;

    /// Row-level invariants are checked here. An `Err` skips the row.
    fn from_row(row: &ValidatedRow) -> Result<Self, ParseError>;
}

impl Record for FlowRecord {
    const KIND: DatasetKind = DatasetKind::Flows;

    fn from_row(row: &ValidatedRow) -> Result<Self, ParseError> {
        Ok(FlowRecord {
            year: row.year()?,
            origin_country: row.text("origin_country")?.to_string(),
            dest_country: row.text("dest_country")?.to_string(),
            ip_type: row.ip_type("ip_type")?,
            applications: row.count("applications")?,
        })
    }
}

impl Record for TopFilerRecord {
    const KIND: DatasetKind = DatasetKind::TopFilers;

    fn from_row(row: &ValidatedRow) -> Result<Self, ParseError> {
        Ok(TopFilerRecord {
            filer: row.text("filer")?.to_string(),
            origin_country: row.text("origin_country")?.to_string(),
            dest_country: row.text("dest_country")?.to_string(),
            ip_type: row.text("ip_type")?.to_string(),
            filings: row.count("filings")?,
        })
    }
}

impl Record for GenderSplitRecord {
    const KIND: DatasetKind = DatasetKind::GenderSplit;

    fn from_row(row: &ValidatedRow) -> Result<Self, ParseError> {
        Ok(GenderSplitRecord {
            year: row.year()?,
            origin_country: row.text("origin_country")?.to_string(),
            dest_country: row.text("dest_country")?.to_string(),
            female_inventors: row.count("female_inventors")?,
            male_inventors: row.count("male_inventors")?,
        })
    }
}

impl Record for PphRecord {
    const KIND: DatasetKind = DatasetKind::Pph;

    fn from_row(row: &ValidatedRow) -> Result<Self, ParseError> {
        let raw = row.text("direction")?;
        let direction = Direction::parse(raw).ok_or_else(|| {
            ParseError::in_column(
                row.line(),
                "direction",
                format!("expected \"A→B\", got {:?}", raw),
            )
        })?;

        Ok(PphRecord {
            year: row.year()?,
            direction,
            requests: row.count("requests")?,
        })
    }
}

impl Record for ImportanceRecord {
    const KIND: DatasetKind = DatasetKind::Importance;

    fn from_row(row: &ValidatedRow) -> Result<Self, ParseError> {
        let score = row.float("importance_score")?;
        if !score.is_finite() {
            return Err(ParseError::in_column(
                row.line(),
                "importance_score",
                format!("score must be finite, got {}", score),
            ));
        }

        Ok(ImportanceRecord {
            year: row.year()?,
            jurisdiction: row.text("jurisdiction")?.to_string(),
            importance_score: score,
        })
    }
}

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

/// Outcome of validating one CSV: typed records plus the rows that were skipped.
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub records: Vec<T>,
    pub skipped: Vec<ParseError>,
}

impl<T> Validated<T> {
    pub fn rows_read(&self) -> usize {
        self.records.len() + self.skipped.len()
    }
}

pub struct SchemaValidator {
    min_year: i32,
    max_year: i32,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        SchemaValidator {
            min_year: MIN_PLAUSIBLE_YEAR,
            max_year: Utc::now().year() + FUTURE_YEAR_SLACK,
        }
    }

    pub fn with_year_bounds(min_year: i32, max_year: i32) -> Self {
        SchemaValidator { min_year, max_year }
    }

    /// Resolve each declared column to its position in the header row.
    /// Names match exactly and case-sensitively; extra columns are ignored.
    pub fn check_header(
        &self,
        kind: DatasetKind,
        headers: &StringRecord,
    ) -> Result<Vec<usize>, SchemaError> {
        let mut positions = Vec::with_capacity(kind.columns().len());
        let mut missing = Vec::new();

        for spec in kind.columns() {
            match headers.iter().position(|h| h == spec.name) {
                Some(pos) => positions.push(pos),
                None => missing.push(spec.name.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(positions)
        } else {
            Err(SchemaError::MissingColumns { kind, missing })
        }
    }

    fn coerce(
        kind: DatasetKind,
        spec: &ColumnSpec,
        line: u64,
        raw: &str,
    ) -> Result<Cell, SchemaError> {
        let mistyped = || SchemaError::Mistyped {
            kind,
            line,
            column: spec.name.to_string(),
            expected: spec.ty.to_string(),
            value: raw.to_string(),
        };

        match spec.ty {
            ColumnType::Int => raw.parse::<i64>().map(Cell::Int).map_err(|_| mistyped()),
            ColumnType::Float => raw.parse::<f64>().map(Cell::Float).map_err(|_| mistyped()),
            ColumnType::Text => Ok(Cell::Text(raw.to_string())),
            ColumnType::IpType => IpType::parse(raw).map(Cell::IpType).ok_or_else(mistyped),
        }
    }

    /// Validate a whole CSV stream for record kind `T`.
    ///
    /// Missing columns and values that cannot be coerced to their declared
    /// type fail the dataset. Unreadable rows and rows breaking a record
    /// invariant are skipped and returned in `skipped`.
    pub fn validate<T: Record, R: Read>(&self, reader: R) -> Result<Validated<T>, SchemaError> {
        let kind = T::KIND;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Fields)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| SchemaError::MalformedHeader {
                kind,
                reason: e.to_string(),
            })?
            .clone();
        let positions = self.check_header(kind, &headers)?;

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        let mut fallback_line: u64 = 1;

        for result in rdr.records() {
            fallback_line += 1;

            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    let line = e
                        .position()
                        .map(|p| p.line())
                        .unwrap_or(fallback_line);
                    skipped.push(ParseError::new(line, format!("unreadable row: {}", e)));
                    continue;
                }
            };
            let line = row.position().map(|p| p.line()).unwrap_or(fallback_line);

            if row.len() != headers.len() {
                skipped.push(ParseError::new(
                    line,
                    format!("expected {} fields, found {}", headers.len(), row.len()),
                ));
                continue;
            }

            let mut cells = Vec::with_capacity(positions.len());
            for (spec, &pos) in kind.columns().iter().zip(&positions) {
                let raw = row.get(pos).unwrap_or("");
                cells.push(Self::coerce(kind, spec, line, raw)?);
            }

            let validated = ValidatedRow {
                kind,
                line,
                cells,
                min_year: self.min_year,
                max_year: self.max_year,
            };

            match T::from_row(&validated) {
                Ok(record) => records.push(record),
                Err(issue) => skipped.push(issue),
            }
        }

        Ok(Validated { records, skipped })
    }
}

// ============================================================================
// TESTS
// ============================================================================
