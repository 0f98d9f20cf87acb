// 🌐 Record Layer - the five dataset row kinds
// Rows are built once at load time and never mutated afterwards

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

// ============================================================================
// IP TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    Patent,
    Trademark,
    Design,
}

impl IpType {
    pub const ALL: [IpType; 3] = [IpType::Patent, IpType::Trademark, IpType::Design];

    pub fn as_str(&self) -> &'static str {
        match self {
            IpType::Patent => "patent",
            IpType::Trademark => "trademark",
            IpType::Design => "design",
        }
    }

    /// Case-insensitive; surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Option<IpType> {
        let value = value.trim();
        IpType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for IpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PPH DIRECTION
// ============================================================================

pub const DIRECTION_ARROW: &str = "→";

/// "A→B" pair of jurisdiction codes. `->` is accepted on input, output always uses `→`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Direction {
    pub from: String,
    pub to: String,
}

impl Direction {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Direction {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn parse(value: &str) -> Option<Direction> {
        let (from, to) = value
            .split_once(DIRECTION_ARROW)
            .or_else(|| value.split_once("->"))?;
        let (from, to) = (from.trim(), to.trim());

        if from.is_empty() || to.is_empty() || to.contains(DIRECTION_ARROW) || to.contains("->") {
            return None;
        }

        Some(Direction::new(from, to))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.from, DIRECTION_ARROW, self.to)
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// RECORDS
// ============================================================================
// Field names double as the CSV header names when serializing back out.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    pub year: i32,
    pub origin_country: String,
    pub dest_country: String,
    pub ip_type: IpType,
    pub applications: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopFilerRecord {
    pub filer: String,
    pub origin_country: String,
    pub dest_country: String,
    pub ip_type: String,
    pub filings: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenderSplitRecord {
    pub year: i32,
    pub origin_country: String,
    pub dest_country: String,
    pub female_inventors: u64,
    pub male_inventors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PphRecord {
    pub year: i32,
    pub direction: Direction,
    pub requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportanceRecord {
    pub year: i32,
    pub jurisdiction: String,
    pub importance_score: f64,
}

// ============================================================================
// COUNTRY PAIR
// ============================================================================

/// The origin/destination pair picked in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryPair {
    pub origin: String,
    pub destination: String,
}

impl CountryPair {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        CountryPair {
            origin: origin.into(),
            destination: destination.into(),
        }
    }

    pub fn reversed(&self) -> CountryPair {
        CountryPair::new(self.destination.clone(), self.origin.clone())
    }

    /// origin → destination only
    pub fn is_outbound(&self, origin: &str, dest: &str) -> bool {
        self.origin == origin && self.destination == dest
    }

    /// Either direction between the two countries
    pub fn connects(&self, origin: &str, dest: &str) -> bool {
        self.is_outbound(origin, dest) || (self.destination == origin && self.origin == dest)
    }

    pub fn forward_direction(&self) -> Direction {
        Direction::new(self.origin.clone(), self.destination.clone())
    }

    pub fn backward_direction(&self) -> Direction {
        Direction::new(self.destination.clone(), self.origin.clone())
    }
}

impl fmt::Display for CountryPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.origin, DIRECTION_ARROW, self.destination)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_type_parse_is_case_insensitive() {
        assert_eq!(IpType::parse("Patent"), Some(IpType::Patent));
        assert_eq!(IpType::parse(" TRADEMARK "), Some(IpType::Trademark));
        assert_eq!(IpType::parse("design"), Some(IpType::Design));
        assert_eq!(IpType::parse("utility model"), None);
    }

    #[test]
    fn test_direction_parse_arrow() {
        let dir = Direction::parse("CIPO→JPO").unwrap();
        assert_eq!(dir.from, "CIPO");
        assert_eq!(dir.to, "JPO");
        assert_eq!(dir.to_string(), "CIPO→JPO");
    }

    #[test]
    fn test_direction_parse_ascii_arrow() {
        let dir = Direction::parse("Canada -> Japan").unwrap();
        assert_eq!(dir, Direction::new("Canada", "Japan"));
    }

    #[test]
    fn test_direction_rejects_malformed() {
        assert!(Direction::parse("CIPO").is_none());
        assert!(Direction::parse("→JPO").is_none());
        assert!(Direction::parse("CIPO→").is_none());
        assert!(Direction::parse("A→B→C").is_none());
    }

    #[test]
    fn test_country_pair_directions() {
        let pair = CountryPair::new("Canada", "Japan");

        assert!(pair.is_outbound("Canada", "Japan"));
        assert!(!pair.is_outbound("Japan", "Canada"));
        assert!(pair.connects("Japan", "Canada"));
        assert!(!pair.connects("Canada", "France"));
        assert_eq!(pair.reversed(), CountryPair::new("Japan", "Canada"));
        assert_eq!(pair.backward_direction().to_string(), "Japan→Canada");
    }
}
