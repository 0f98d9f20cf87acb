// ⚙️ Dashboard configuration
// Optional TOML file; every field has a default so an empty file is valid.

use crate::records::CountryPair;
use crate::schema::DatasetKind;
use crate::filter::YearRange;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const MIN_TOP_N: usize = 5;
pub const MAX_TOP_N: usize = 20;

/// File names of the built-in sample datasets, relative to `data_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SampleFiles {
    pub flows: String,
    pub top_filers: String,
    pub gender_split: String,
    pub pph: String,
    pub importance: String,
}

impl Default for SampleFiles {
    fn default() -> Self {
        SampleFiles {
            flows: "flows.csv".to_string(),
            top_filers: "top_filers.csv".to_string(),
            gender_split: "gender_split.csv".to_string(),
            pph: "pph.csv".to_string(),
            importance: "importance.csv".to_string(),
        }
    }
}

impl SampleFiles {
    pub fn file_name(&self, kind: DatasetKind) -> &str {
        match kind {
            DatasetKind::Flows => &self.flows,
            DatasetKind::TopFilers => &self.top_filers,
            DatasetKind::GenderSplit => &self.gender_split,
            DatasetKind::Pph => &self.pph,
            DatasetKind::Importance => &self.importance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub data_dir: PathBuf,
    pub files: SampleFiles,
    pub default_origin: String,
    pub default_destination: String,
    /// Slider bounds when no flow rows are loaded
    pub fallback_years: [i32; 2],
    pub top_n: usize,
    pub annex_default_jurisdictions: usize,
    pub server_addr: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            data_dir: PathBuf::from("sample_data"),
            files: SampleFiles::default(),
            default_origin: "Canada".to_string(),
            default_destination: "Japan".to_string(),
            fallback_years: [2019, 2024],
            top_n: 10,
            annex_default_jurisdictions: 4,
            server_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl DashboardConfig {
    /// Read `path` when given, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: DashboardConfig = toml::from_str(text).context("Failed to parse TOML")?;
        config.top_n = clamp_top_n(config.top_n);

        let [first, last] = config.fallback_years;
        if first > last {
            bail!("fallback_years must be ascending, got [{}, {}]", first, last);
        }
        Ok(config)
    }

    pub fn sample_path(&self, kind: DatasetKind) -> PathBuf {
        self.data_dir.join(self.files.file_name(kind))
    }

    pub fn preferred_pair(&self) -> CountryPair {
        CountryPair::new(self.default_origin.clone(), self.default_destination.clone())
    }

    pub fn fallback_range(&self) -> YearRange {
        YearRange::new(self.fallback_years[0], self.fallback_years[1])
    }
}

pub fn clamp_top_n(n: usize) -> usize {
    n.clamp(MIN_TOP_N, MAX_TOP_N)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::load(None).unwrap();

        assert_eq!(config.top_n, 10);
        assert_eq!(config.preferred_pair(), CountryPair::new("Canada", "Japan"));
        assert_eq!(config.fallback_range(), YearRange::new(2019, 2024));
        assert_eq!(
            config.sample_path(DatasetKind::GenderSplit),
            PathBuf::from("sample_data").join("gender_split.csv")
        );
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = DashboardConfig::from_toml(
            r#"
            data_dir = "/srv/ip"
            default_origin = "Korea"
            top_n = 50

            [files]
            pph = "pph_requests.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/ip"));
        assert_eq!(config.default_origin, "Korea");
        assert_eq!(config.default_destination, "Japan");
        assert_eq!(config.top_n, MAX_TOP_N);
        assert_eq!(config.files.pph, "pph_requests.csv");
        assert_eq!(config.files.flows, "flows.csv");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fallback_years = [2010, 2015]").unwrap();

        let config = DashboardConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.fallback_range(), YearRange::new(2010, 2015));
    }

    #[test]
    fn test_inverted_fallback_years_are_rejected() {
        let err = DashboardConfig::from_toml("fallback_years = [2024, 2019]").unwrap_err();
        assert!(err.to_string().contains("fallback_years must be ascending"));

        let single = DashboardConfig::from_toml("fallback_years = [2020, 2020]").unwrap();
        assert_eq!(single.fallback_range(), YearRange::new(2020, 2020));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(DashboardConfig::from_toml("top_n = \"many\"").is_err());
    }
}
