// 📊 Aggregator - rollups over filtered records
// Every function here is a pure transform of its input slice.

use crate::filter::YearRange;
use crate::records::{
    CountryPair, Direction, FlowRecord, GenderSplitRecord, ImportanceRecord, IpType, PphRecord,
    TopFilerRecord,
};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Counts are `u64`; sums stop at `u64::MAX` instead of wrapping.
fn add_to(total: &mut u64, count: u64) {
    *total = total.saturating_add(count);
}

// ============================================================================
// ROUTES
// ============================================================================

/// Records that travel from an origin country to a destination country.
pub trait Route {
    fn origin(&self) -> &str;
    fn destination(&self) -> &str;
}

impl Route for FlowRecord {
    fn origin(&self) -> &str {
        &self.origin_country
    }
    fn destination(&self) -> &str {
        &self.dest_country
    }
}

impl Route for TopFilerRecord {
    fn origin(&self) -> &str {
        &self.origin_country
    }
    fn destination(&self) -> &str {
        &self.dest_country
    }
}

impl Route for GenderSplitRecord {
    fn origin(&self) -> &str {
        &self.origin_country
    }
    fn destination(&self) -> &str {
        &self.dest_country
    }
}

/// origin → destination rows only
pub fn outbound<T: Route + Clone>(rows: &[T], pair: &CountryPair) -> Vec<T> {
    rows.iter()
        .filter(|r| pair.is_outbound(r.origin(), r.destination()))
        .cloned()
        .collect()
}

/// Rows in either direction between the pair
pub fn between<T: Route + Clone>(rows: &[T], pair: &CountryPair) -> Vec<T> {
    rows.iter()
        .filter(|r| pair.connects(r.origin(), r.destination()))
        .cloned()
        .collect()
}

// ============================================================================
// SELECTOR OPTIONS
// ============================================================================

/// Sorted union of flow origins and destinations
pub fn countries(flows: &[FlowRecord]) -> Vec<String> {
    let set: BTreeSet<&str> = flows
        .iter()
        .flat_map(|f| [f.origin_country.as_str(), f.dest_country.as_str()])
        .collect();
    set.into_iter().map(String::from).collect()
}

/// ip types present in flows, sorted
pub fn ip_options(flows: &[FlowRecord]) -> Vec<IpType> {
    let set: BTreeSet<IpType> = flows.iter().map(|f| f.ip_type).collect();
    set.into_iter().collect()
}

pub fn jurisdictions(rows: &[ImportanceRecord]) -> Vec<String> {
    let set: BTreeSet<&str> = rows.iter().map(|r| r.jurisdiction.as_str()).collect();
    set.into_iter().map(String::from).collect()
}

pub fn year_bounds(flows: &[FlowRecord]) -> Option<YearRange> {
    YearRange::spanning(flows.iter().map(|f| f.year))
}

/// `preferred` when both countries exist, else the first two (or the only one twice).
pub fn default_pair(countries: &[String], preferred: &CountryPair) -> Option<CountryPair> {
    let has = |c: &str| countries.iter().any(|x| x == c);
    if has(&preferred.origin) && has(&preferred.destination) {
        return Some(preferred.clone());
    }

    let first = countries.first()?;
    let second = countries.get(1).unwrap_or(first);
    Some(CountryPair::new(first.clone(), second.clone()))
}

// ============================================================================
// FLOW ROLLUPS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyTotal {
    pub year: i32,
    pub ip_type: IpType,
    pub applications: u64,
}

/// Applications summed per (year, ip_type).
///
/// Every year of `years` and every type in `ip_types` gets a row, zero when
/// nothing matched, so an empty input still yields a full zero grid.
pub fn yearly_totals(
    flows: &[FlowRecord],
    years: YearRange,
    ip_types: &BTreeSet<IpType>,
) -> Vec<YearlyTotal> {
    let mut sums: BTreeMap<(i32, IpType), u64> = BTreeMap::new();
    for year in years.years() {
        for ip_type in ip_types {
            sums.insert((year, *ip_type), 0);
        }
    }

    for flow in flows {
        if let Some(total) = sums.get_mut(&(flow.year, flow.ip_type)) {
            add_to(total, flow.applications);
        }
    }

    sums.into_iter()
        .map(|((year, ip_type), applications)| YearlyTotal {
            year,
            ip_type,
            applications,
        })
        .collect()
}

/// Applications origin → destination, all years and types in `flows`
pub fn pair_total(flows: &[FlowRecord], pair: &CountryPair) -> u64 {
    flows
        .iter()
        .filter(|f| pair.is_outbound(&f.origin_country, &f.dest_country))
        .fold(0, |total, f| total.saturating_add(f.applications))
}

/// Percent change of origin → destination applications from `end_year - 1` to `end_year`.
///
/// `None` when either year has no rows or the earlier total is zero.
pub fn yoy_change(flows: &[FlowRecord], pair: &CountryPair, end_year: i32) -> Option<f64> {
    let mut per_year: BTreeMap<i32, u64> = BTreeMap::new();
    for flow in flows
        .iter()
        .filter(|f| pair.is_outbound(&f.origin_country, &f.dest_country))
    {
        add_to(per_year.entry(flow.year).or_insert(0), flow.applications);
    }

    let current = *per_year.get(&end_year)? as f64;
    let previous = *per_year.get(&(end_year - 1))? as f64;
    if previous == 0.0 {
        return None;
    }

    Some(100.0 * (current - previous) / previous)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeTotal {
    pub origin_country: String,
    pub ip_type: IpType,
    pub applications: u64,
}

/// Both directions of the pair in a single year, summed per (origin, ip_type).
/// The pair's origin comes first.
pub fn latest_by_type(flows: &[FlowRecord], pair: &CountryPair, year: i32) -> Vec<TypeTotal> {
    let mut sums: BTreeMap<(bool, String, IpType), u64> = BTreeMap::new();

    for flow in flows
        .iter()
        .filter(|f| f.year == year && pair.connects(&f.origin_country, &f.dest_country))
    {
        let reverse = flow.origin_country != pair.origin;
        add_to(
            sums.entry((reverse, flow.origin_country.clone(), flow.ip_type))
                .or_insert(0),
            flow.applications,
        );
    }

    sums.into_iter()
        .map(|((_, origin_country, ip_type), applications)| TypeTotal {
            origin_country,
            ip_type,
            applications,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowLink {
    pub origin_country: String,
    pub dest_country: String,
    pub ip_type: IpType,
    pub applications: u64,
}

impl FlowLink {
    pub fn label(&self) -> String {
        format!("{}→{} ({})", self.origin_country, self.dest_country, self.ip_type)
    }
}

/// Origin → destination links for both directions of the pair, per ip type.
pub fn flow_links(flows: &[FlowRecord], pair: &CountryPair) -> Vec<FlowLink> {
    let mut sums: BTreeMap<(bool, IpType), u64> = BTreeMap::new();

    for flow in flows
        .iter()
        .filter(|f| pair.connects(&f.origin_country, &f.dest_country))
    {
        let reverse = flow.origin_country != pair.origin;
        add_to(sums.entry((reverse, flow.ip_type)).or_insert(0), flow.applications);
    }

    sums.into_iter()
        .map(|((reverse, ip_type), applications)| {
            let route = if reverse { pair.reversed() } else { pair.clone() };
            FlowLink {
                origin_country: route.origin,
                dest_country: route.destination,
                ip_type,
                applications,
            }
        })
        .collect()
}

// ============================================================================
// PPH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PphTotal {
    pub year: i32,
    pub direction: Direction,
    pub requests: u64,
}

/// Requests per year for "origin→destination" and "destination→origin".
pub fn pph_by_direction(rows: &[PphRecord], pair: &CountryPair) -> Vec<PphTotal> {
    let forward = pair.forward_direction();
    let backward = pair.backward_direction();
    let mut sums: BTreeMap<(i32, bool), u64> = BTreeMap::new();

    for row in rows {
        let reverse = if row.direction == forward {
            false
        } else if row.direction == backward {
            true
        } else {
            continue;
        };
        add_to(sums.entry((row.year, reverse)).or_insert(0), row.requests);
    }

    sums.into_iter()
        .map(|((year, reverse), requests)| PphTotal {
            year,
            direction: if reverse { backward.clone() } else { forward.clone() },
            requests,
        })
        .collect()
}

// ============================================================================
// TOP FILERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFiler {
    pub rank: usize,
    pub filer: String,
    pub ip_type: String,
    pub filings: u64,
}

/// Top `n` rows by filings descending; ties by filer name ascending.
pub fn top_filers(rows: &[TopFilerRecord], n: usize) -> Vec<RankedFiler> {
    let mut sorted: Vec<&TopFilerRecord> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        b.filings
            .cmp(&a.filings)
            .then_with(|| a.filer.cmp(&b.filer))
            .then_with(|| a.ip_type.cmp(&b.ip_type))
    });

    sorted
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, r)| RankedFiler {
            rank: i + 1,
            filer: r.filer.clone(),
            ip_type: r.ip_type.clone(),
            filings: r.filings,
        })
        .collect()
}

// ============================================================================
// GENDER
// ============================================================================

/// A quotient that may have a zero denominator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ratio {
    Defined(f64),
    Undefined,
}

impl Ratio {
    pub fn of(numerator: u64, denominator: u64) -> Ratio {
        if denominator == 0 {
            Ratio::Undefined
        } else {
            Ratio::Defined(numerator as f64 / denominator as f64)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(*v),
            Ratio::Undefined => None,
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ratio::Defined(v) => write!(f, "{:.3}", v),
            Ratio::Undefined => f.write_str("undefined"),
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Ratio::Defined(v) => serializer.serialize_f64(*v),
            Ratio::Undefined => serializer.serialize_str("undefined"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenderYear {
    pub year: i32,
    pub female_inventors: u64,
    pub male_inventors: u64,
    pub total: u64,
    /// female / male
    pub female_to_male: Ratio,
    /// female / (female + male)
    pub female_share: Ratio,
}

/// Inventor counts summed per year, ascending by year.
pub fn gender_by_year(rows: &[GenderSplitRecord]) -> Vec<GenderYear> {
    let mut sums: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
    for row in rows {
        let entry = sums.entry(row.year).or_insert((0, 0));
        add_to(&mut entry.0, row.female_inventors);
        add_to(&mut entry.1, row.male_inventors);
    }

    sums.into_iter()
        .map(|(year, (female, male))| GenderYear {
            year,
            female_inventors: female,
            male_inventors: male,
            total: female.saturating_add(male),
            female_to_male: Ratio::of(female, male),
            female_share: Ratio::of(female, female.saturating_add(male)),
        })
        .collect()
}

/// Female share of the most recent year, `None` without rows.
pub fn latest_female_share(years: &[GenderYear]) -> Option<Ratio> {
    years.iter().max_by_key(|g| g.year).map(|g| g.female_share)
}

// ============================================================================
// IMPORTANCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub year: i32,
    pub importance_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JurisdictionTrend {
    pub jurisdiction: String,
    pub points: Vec<TrendPoint>,
}

/// Scores passed through per selected jurisdiction, points sorted by year
/// (stable, so same-year rows keep input order). Jurisdictions sorted by name.
pub fn importance_trend(rows: &[ImportanceRecord], selected: &[String]) -> Vec<JurisdictionTrend> {
    let mut grouped: BTreeMap<&str, Vec<TrendPoint>> = BTreeMap::new();

    for row in rows
        .iter()
        .filter(|r| selected.iter().any(|s| s == &r.jurisdiction))
    {
        grouped
            .entry(row.jurisdiction.as_str())
            .or_default()
            .push(TrendPoint {
                year: row.year,
                importance_score: row.importance_score,
            });
    }

    grouped
        .into_iter()
        .map(|(jurisdiction, mut points)| {
            points.sort_by_key(|p| p.year);
            JurisdictionTrend {
                jurisdiction: jurisdiction.to_string(),
                points,
            }
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
