// 🔎 Filter Engine - year range + ip_type selection
// Produces new sequences; source records are never touched.

use crate::records::{
    FlowRecord, GenderSplitRecord, ImportanceRecord, IpType, PphRecord, TopFilerRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// YEAR RANGE
// ============================================================================

/// Inclusive `[lo, hi]`. `lo > hi` is an empty range, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub lo: i32,
    pub hi: i32,
}

impl YearRange {
    pub fn new(lo: i32, hi: i32) -> Self {
        YearRange { lo, hi }
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    pub fn contains(&self, year: i32) -> bool {
        self.lo <= year && year <= self.hi
    }

    pub fn intersect(&self, other: &YearRange) -> YearRange {
        YearRange::new(self.lo.max(other.lo), self.hi.min(other.hi))
    }

    /// Clamp each end into `bounds` on its own; an inverted range stays inverted.
    pub fn clamp_to(&self, bounds: &YearRange) -> YearRange {
        if bounds.is_empty() {
            return *self;
        }
        YearRange::new(
            self.lo.clamp(bounds.lo, bounds.hi),
            self.hi.clamp(bounds.lo, bounds.hi),
        )
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.lo..=self.hi
    }

    /// Smallest range covering every year, or `None` for no years.
    pub fn spanning(years: impl IntoIterator<Item = i32>) -> Option<YearRange> {
        years.into_iter().fold(None, |acc, y| match acc {
            None => Some(YearRange::new(y, y)),
            Some(r) => Some(YearRange::new(r.lo.min(y), r.hi.max(y))),
        })
    }
}

impl std::fmt::Display for YearRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}–{}", self.lo, self.hi)
    }
}

// ============================================================================
// FILTERABLE RECORDS
// ============================================================================

/// What the filter engine needs to know about a record kind.
pub trait Filterable {
    /// `None` for kinds without a year column; those pass the year test.
    fn year(&self) -> Option<i32>;

    /// `None` for kinds without an ip_type column; those pass the type test.
    fn ip_type_label(&self) -> Option<&str>;
}

impl Filterable for FlowRecord {
    fn year(&self) -> Option<i32> {
        Some(self.year)
    }

    fn ip_type_label(&self) -> Option<&str> {
        Some(self.ip_type.as_str())
    }
}

impl Filterable for TopFilerRecord {
    fn year(&self) -> Option<i32> {
        None
    }

    fn ip_type_label(&self) -> Option<&str> {
        Some(&self.ip_type)
    }
}

impl Filterable for GenderSplitRecord {
    fn year(&self) -> Option<i32> {
        Some(self.year)
    }

    fn ip_type_label(&self) -> Option<&str> {
        None
    }
}

impl Filterable for PphRecord {
    fn year(&self) -> Option<i32> {
        Some(self.year)
    }

    fn ip_type_label(&self) -> Option<&str> {
        None
    }
}

impl Filterable for ImportanceRecord {
    fn year(&self) -> Option<i32> {
        Some(self.year)
    }

    fn ip_type_label(&self) -> Option<&str> {
        None
    }
}

// ============================================================================
// FILTER STATE
// ============================================================================

/// Sidebar selection: year range plus accepted ip types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub years: YearRange,
    pub ip_types: BTreeSet<IpType>,
}

impl FilterState {
    pub fn new(years: YearRange, ip_types: impl IntoIterator<Item = IpType>) -> Self {
        FilterState {
            years,
            ip_types: ip_types.into_iter().collect(),
        }
    }

    /// Every ip type selected
    pub fn all_types(years: YearRange) -> Self {
        FilterState::new(years, IpType::ALL)
    }

    pub fn accepts_type(&self, label: &str) -> bool {
        IpType::parse(label).is_some_and(|t| self.ip_types.contains(&t))
    }

    pub fn toggle_type(&mut self, ip_type: IpType) {
        if !self.ip_types.remove(&ip_type) {
            self.ip_types.insert(ip_type);
        }
    }

    pub fn matches<T: Filterable>(&self, record: &T) -> bool {
        if self.years.is_empty() {
            return false;
        }

        let year_ok = record.year().map_or(true, |y| self.years.contains(y));
        let type_ok = record
            .ip_type_label()
            .map_or(true, |label| self.accepts_type(label));

        year_ok && type_ok
    }

    /// Sorted, comma separated ip types for headers.
    pub fn ip_types_label(&self) -> String {
        if self.ip_types.is_empty() {
            return "none".to_string();
        }
        self.ip_types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Order-preserving subsequence of `records` accepted by `filter`.
pub fn apply<T: Filterable + Clone>(records: &[T], filter: &FilterState) -> Vec<T> {
    records
        .iter()
        .filter(|r| filter.matches(*r))
        .cloned()
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
