// 🖥️ Dashboard Session - loaded datasets + sidebar state → tab views
// Each session owns its own copy of the data. Every selection change re-runs
// Filter → Aggregate over the currently loaded datasets.

use crate::aggregate::{
    self, FlowLink, GenderYear, JurisdictionTrend, PphTotal, RankedFiler, Ratio, TypeTotal,
    YearlyTotal,
};
use crate::config::{clamp_top_n, DashboardConfig};
use crate::filter::{apply, FilterState, Filterable, YearRange};
use crate::loader::{self, DataSource, Dataset, LoadError};
use crate::records::{
    CountryPair, FlowRecord, GenderSplitRecord, ImportanceRecord, IpType, PphRecord,
    TopFilerRecord,
};
use crate::schema::{DatasetKind, Record, SchemaValidator};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

pub const TITLE: &str = "Country Profile — Interactive One-Pager";

// ============================================================================
// TABS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    Overview,
    FlowsPph,
    TopFilers,
    Gender,
    Annex,
}

impl Tab {
    pub const ALL: [Tab; 5] = [Tab::Overview, Tab::FlowsPph, Tab::TopFilers, Tab::Gender, Tab::Annex];

    pub fn next(&self) -> Self {
        match self {
            Tab::Overview => Tab::FlowsPph,
            Tab::FlowsPph => Tab::TopFilers,
            Tab::TopFilers => Tab::Gender,
            Tab::Gender => Tab::Annex,
            Tab::Annex => Tab::Overview,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Tab::Overview => Tab::Annex,
            Tab::FlowsPph => Tab::Overview,
            Tab::TopFilers => Tab::FlowsPph,
            Tab::Gender => Tab::TopFilers,
            Tab::Annex => Tab::Gender,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Tab::Overview => "Overview",
            Tab::FlowsPph => "Flows & PPH",
            Tab::TopFilers => "Top Filers",
            Tab::Gender => "Gender",
            Tab::Annex => "Annex",
        }
    }

    /// The tab that shows a dataset
    pub fn for_dataset(kind: DatasetKind) -> Tab {
        match kind {
            DatasetKind::Flows => Tab::Overview,
            DatasetKind::TopFilers => Tab::TopFilers,
            DatasetKind::GenderSplit => Tab::Gender,
            DatasetKind::Pph => Tab::FlowsPph,
            DatasetKind::Importance => Tab::Annex,
        }
    }
}

// ============================================================================
// DATASET SLOTS
// ============================================================================

#[derive(Debug)]
pub enum Slot<T> {
    Empty,
    Ready(Dataset<T>),
    Failed(LoadError),
}

impl<T> Slot<T> {
    pub fn records(&self) -> &[T] {
        match self {
            Slot::Ready(dataset) => &dataset.records,
            _ => &[],
        }
    }

    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            Slot::Ready(dataset) => Some(&dataset.fingerprint),
            _ => None,
        }
    }

    fn status(&self, kind: DatasetKind) -> DatasetStatus {
        match self {
            Slot::Empty => DatasetStatus {
                kind,
                state: SlotState::Empty,
                records: 0,
                skipped: 0,
                source: None,
                error: None,
            },
            Slot::Ready(dataset) => DatasetStatus {
                kind,
                state: SlotState::Ready,
                records: dataset.records.len(),
                skipped: dataset.skipped.len(),
                source: Some(dataset.source.to_string()),
                error: None,
            },
            Slot::Failed(err) => DatasetStatus {
                kind,
                state: SlotState::Failed,
                records: 0,
                skipped: 0,
                source: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Empty,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStatus {
    pub kind: DatasetKind,
    pub state: SlotState,
    pub records: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of handing an upload to the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// Same bytes as the dataset already loaded
    Unchanged { kind: DatasetKind },
    Loaded {
        kind: DatasetKind,
        records: usize,
        skipped: usize,
    },
    Rejected { kind: DatasetKind, error: String },
}

// ============================================================================
// NOTICES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Non-fatal conditions shown next to the affected tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    SchemaFailed {
        dataset: DatasetKind,
        message: String,
    },
    RowsSkipped {
        dataset: DatasetKind,
        count: usize,
        first: String,
    },
    /// Filter combination left nothing to show
    EmptyResult {
        dataset: DatasetKind,
        tab: Tab,
        message: String,
    },
    MissingDataset {
        dataset: DatasetKind,
    },
}

impl Notice {
    pub fn tab(&self) -> Tab {
        match self {
            Notice::EmptyResult { tab, .. } => *tab,
            Notice::SchemaFailed { dataset, .. }
            | Notice::RowsSkipped { dataset, .. }
            | Notice::MissingDataset { dataset } => Tab::for_dataset(*dataset),
        }
    }

    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::SchemaFailed { .. } => NoticeLevel::Error,
            Notice::RowsSkipped { .. } | Notice::MissingDataset { .. } => NoticeLevel::Warning,
            Notice::EmptyResult { .. } => NoticeLevel::Info,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notice::SchemaFailed { message, .. } => message.clone(),
            Notice::RowsSkipped {
                dataset,
                count,
                first,
            } => format!("{}: skipped {} malformed row(s) ({})", dataset, count, first),
            Notice::EmptyResult { message, .. } => message.clone(),
            Notice::MissingDataset { dataset } => format!(
                "No {} data loaded. {}",
                dataset,
                dataset.required_columns_hint()
            ),
        }
    }
}

// ============================================================================
// VIEW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub outbound_applications: u64,
    pub inbound_applications: u64,
    pub outbound_yoy: Option<f64>,
    pub inbound_yoy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub title: String,
    pub pair: Option<CountryPair>,
    pub years: YearRange,
    pub ip_types: Vec<IpType>,
    pub kpis: Kpis,
    pub datasets: Vec<DatasetStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewTab {
    pub outbound: Vec<YearlyTotal>,
    pub inbound: Vec<YearlyTotal>,
    pub latest_year: i32,
    pub latest_by_type: Vec<TypeTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowsPphTab {
    pub links: Vec<FlowLink>,
    pub pph: Vec<PphTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopFilersTab {
    pub top_n: usize,
    pub rows: Vec<RankedFiler>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenderTab {
    pub years: Vec<GenderYear>,
    pub latest_female_share: Option<Ratio>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnexTab {
    pub available: Vec<String>,
    pub selected: Vec<String>,
    pub trends: Vec<JurisdictionTrend>,
}

/// Everything the presentation layer renders for one selection state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub header: Header,
    pub overview: OverviewTab,
    pub flows_pph: FlowsPphTab,
    pub top_filers: TopFilersTab,
    pub gender: GenderTab,
    pub annex: AnnexTab,
    pub notices: Vec<Notice>,
}

impl DashboardView {
    pub fn notices_for(&self, tab: Tab) -> Vec<&Notice> {
        self.notices.iter().filter(|n| n.tab() == tab).collect()
    }
}

/// Partial selection change; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterUpdate {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub ip_types: Option<Vec<IpType>>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub top_n: Option<usize>,
    pub jurisdictions: Option<Vec<String>>,
}

// ============================================================================
// SESSION
// ============================================================================

pub struct Session {
    pub id: Uuid,
    config: DashboardConfig,
    validator: SchemaValidator,
    flows: Slot<FlowRecord>,
    top_filers: Slot<TopFilerRecord>,
    gender: Slot<GenderSplitRecord>,
    pph: Slot<PphRecord>,
    importance: Slot<ImportanceRecord>,
    filter: FilterState,
    pair: Option<CountryPair>,
    top_n: usize,
    jurisdictions: Vec<String>,
}

impl Session {
    /// A session with nothing loaded
    pub fn new(config: DashboardConfig) -> Self {
        let filter = FilterState::all_types(config.fallback_range());
        let top_n = clamp_top_n(config.top_n);

        Session {
            id: Uuid::new_v4(),
            config,
            validator: SchemaValidator::new(),
            flows: Slot::Empty,
            top_filers: Slot::Empty,
            gender: Slot::Empty,
            pph: Slot::Empty,
            importance: Slot::Empty,
            filter,
            pair: None,
            top_n,
            jurisdictions: Vec::new(),
        }
    }

    /// A session preloaded with the sample datasets from `data_dir`
    pub fn with_samples(config: DashboardConfig) -> Self {
        let mut session = Session::new(config);
        session.load_samples();
        session
    }

    pub fn with_validator(mut self, validator: SchemaValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Load every sample file that exists. Missing files leave the slot empty.
    pub fn load_samples(&mut self) {
        for kind in DatasetKind::ALL {
            let path = self.config.sample_path(kind);
            if !path.exists() {
                info!(dataset = %kind, path = %path.display(), "no sample file, slot left empty");
                continue;
            }

            match kind {
                DatasetKind::Flows => {
                    self.flows = into_slot(loader::load_path(&self.validator, &path))
                }
                DatasetKind::TopFilers => {
                    self.top_filers = into_slot(loader::load_path(&self.validator, &path))
                }
                DatasetKind::GenderSplit => {
                    self.gender = into_slot(loader::load_path(&self.validator, &path))
                }
                DatasetKind::Pph => self.pph = into_slot(loader::load_path(&self.validator, &path)),
                DatasetKind::Importance => {
                    self.importance = into_slot(loader::load_path(&self.validator, &path))
                }
            }
        }

        self.reset_filters();
        self.reset_jurisdictions();
    }

    /// Replace one dataset wholesale with uploaded CSV bytes.
    pub fn upload(&mut self, kind: DatasetKind, name: &str, bytes: &[u8]) -> UploadOutcome {
        let fingerprint = loader::fingerprint(bytes);
        if self.fingerprint(kind) == Some(fingerprint.as_str()) {
            info!(dataset = %kind, upload = name, "upload unchanged, keeping loaded dataset");
            return UploadOutcome::Unchanged { kind };
        }

        let source = DataSource::Upload {
            name: name.to_string(),
        };
        let outcome = match kind {
            DatasetKind::Flows => replace(&mut self.flows, &self.validator, source, bytes),
            DatasetKind::TopFilers => replace(&mut self.top_filers, &self.validator, source, bytes),
            DatasetKind::GenderSplit => replace(&mut self.gender, &self.validator, source, bytes),
            DatasetKind::Pph => replace(&mut self.pph, &self.validator, source, bytes),
            DatasetKind::Importance => replace(&mut self.importance, &self.validator, source, bytes),
        };

        match kind {
            DatasetKind::Flows => self.reset_filters(),
            DatasetKind::Importance => self.reset_jurisdictions(),
            _ => {}
        }

        outcome
    }

    fn fingerprint(&self, kind: DatasetKind) -> Option<&str> {
        match kind {
            DatasetKind::Flows => self.flows.fingerprint(),
            DatasetKind::TopFilers => self.top_filers.fingerprint(),
            DatasetKind::GenderSplit => self.gender.fingerprint(),
            DatasetKind::Pph => self.pph.fingerprint(),
            DatasetKind::Importance => self.importance.fingerprint(),
        }
    }

    pub fn statuses(&self) -> Vec<DatasetStatus> {
        vec![
            self.flows.status(DatasetKind::Flows),
            self.top_filers.status(DatasetKind::TopFilers),
            self.gender.status(DatasetKind::GenderSplit),
            self.pph.status(DatasetKind::Pph),
            self.importance.status(DatasetKind::Importance),
        ]
    }

    // ------------------------------------------------------------------------
    // Selection state
    // ------------------------------------------------------------------------

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn pair(&self) -> Option<&CountryPair> {
        self.pair.as_ref()
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn countries(&self) -> Vec<String> {
        aggregate::countries(self.flows.records())
    }

    /// ip types offered in the sidebar
    pub fn ip_options(&self) -> Vec<IpType> {
        let options = aggregate::ip_options(self.flows.records());
        if options.is_empty() {
            IpType::ALL.to_vec()
        } else {
            options
        }
    }

    /// Slider bounds: flow years, or the configured fallback
    pub fn year_bounds(&self) -> YearRange {
        aggregate::year_bounds(self.flows.records()).unwrap_or_else(|| self.config.fallback_range())
    }

    pub fn available_jurisdictions(&self) -> Vec<String> {
        aggregate::jurisdictions(self.importance.records())
    }

    pub fn selected_jurisdictions(&self) -> &[String] {
        &self.jurisdictions
    }

    /// Full year range, every offered ip type, default country pair.
    pub fn reset_filters(&mut self) {
        self.filter = FilterState::new(self.year_bounds(), self.ip_options());
        self.pair = aggregate::default_pair(&self.countries(), &self.config.preferred_pair());
    }

    fn reset_jurisdictions(&mut self) {
        self.jurisdictions = self
            .available_jurisdictions()
            .into_iter()
            .take(self.config.annex_default_jurisdictions)
            .collect();
    }

    // ------------------------------------------------------------------------
    // Change notifications. Each returns the recomputed view.
    // ------------------------------------------------------------------------

    pub fn set_year_range(&mut self, years: YearRange) -> DashboardView {
        self.filter.years = years.clamp_to(&self.year_bounds());
        self.view()
    }

    pub fn set_ip_types(&mut self, ip_types: impl IntoIterator<Item = IpType>) -> DashboardView {
        self.filter.ip_types = ip_types.into_iter().collect();
        self.view()
    }

    pub fn toggle_ip_type(&mut self, ip_type: IpType) -> DashboardView {
        self.filter.toggle_type(ip_type);
        self.view()
    }

    pub fn set_pair(&mut self, pair: CountryPair) -> DashboardView {
        self.pair = Some(pair);
        self.view()
    }

    pub fn set_top_n(&mut self, n: usize) -> DashboardView {
        self.top_n = clamp_top_n(n);
        self.view()
    }

    pub fn set_jurisdictions(&mut self, jurisdictions: Vec<String>) -> DashboardView {
        self.jurisdictions = jurisdictions;
        self.view()
    }

    pub fn apply_update(&mut self, update: FilterUpdate) -> DashboardView {
        if update.year_from.is_some() || update.year_to.is_some() {
            let years = YearRange::new(
                update.year_from.unwrap_or(self.filter.years.lo),
                update.year_to.unwrap_or(self.filter.years.hi),
            );
            self.filter.years = years.clamp_to(&self.year_bounds());
        }
        if let Some(ip_types) = update.ip_types {
            self.filter.ip_types = ip_types.into_iter().collect();
        }
        if update.origin.is_some() || update.destination.is_some() {
            let current = self.pair.clone().unwrap_or_else(|| self.config.preferred_pair());
            self.pair = Some(CountryPair::new(
                update.origin.unwrap_or(current.origin),
                update.destination.unwrap_or(current.destination),
            ));
        }
        if let Some(n) = update.top_n {
            self.top_n = clamp_top_n(n);
        }
        if let Some(jurisdictions) = update.jurisdictions {
            self.jurisdictions = jurisdictions;
        }

        self.view()
    }

    // ------------------------------------------------------------------------
    // Filtered data + downloads
    // ------------------------------------------------------------------------

    pub fn filtered_flows(&self) -> Vec<FlowRecord> {
        apply(self.flows.records(), &self.filter)
    }

    pub fn filtered_top_filers(&self) -> Vec<TopFilerRecord> {
        apply(self.top_filers.records(), &self.filter)
    }

    pub fn filtered_gender(&self) -> Vec<GenderSplitRecord> {
        apply(self.gender.records(), &self.filter)
    }

    pub fn filtered_pph(&self) -> Vec<PphRecord> {
        apply(self.pph.records(), &self.filter)
    }

    pub fn filtered_importance(&self) -> Vec<ImportanceRecord> {
        apply(self.importance.records(), &self.filter)
    }

    /// Currently filtered rows of `kind` as CSV bytes
    pub fn download(&self, kind: DatasetKind) -> Result<Vec<u8>> {
        match kind {
            DatasetKind::Flows => csv_of(self.flows.records(), &self.filter),
            DatasetKind::TopFilers => csv_of(self.top_filers.records(), &self.filter),
            DatasetKind::GenderSplit => csv_of(self.gender.records(), &self.filter),
            DatasetKind::Pph => csv_of(self.pph.records(), &self.filter),
            DatasetKind::Importance => csv_of(self.importance.records(), &self.filter),
        }
    }

    pub fn download_file_name(kind: DatasetKind) -> String {
        format!("{}_filtered.csv", kind)
    }

    // ------------------------------------------------------------------------
    // Filter → Aggregate
    // ------------------------------------------------------------------------

    pub fn view(&self) -> DashboardView {
        debug!(
            session = %self.id,
            years = %self.filter.years,
            ip_types = %self.filter.ip_types_label(),
            "recomputing dashboard view"
        );

        let flows = self.filtered_flows();
        let top_filers = self.filtered_top_filers();
        let gender = self.filtered_gender();
        let pph = self.filtered_pph();
        let importance = self.filtered_importance();

        let mut notices = self.load_notices();
        let years = self.filter.years;

        let (overview, flows_pph, top, gender_tab, kpis) = match &self.pair {
            Some(pair) => {
                let pair_flows = aggregate::between(&flows, pair);
                let outbound = aggregate::outbound(&flows, pair);
                let inbound = aggregate::outbound(&flows, &pair.reversed());

                let overview = OverviewTab {
                    outbound: aggregate::yearly_totals(&outbound, years, &self.filter.ip_types),
                    inbound: aggregate::yearly_totals(&inbound, years, &self.filter.ip_types),
                    latest_year: years.hi,
                    latest_by_type: aggregate::latest_by_type(&flows, pair, years.hi),
                };
                let flows_pph = FlowsPphTab {
                    links: aggregate::flow_links(&flows, pair),
                    pph: aggregate::pph_by_direction(&pph, pair),
                };
                let top = TopFilersTab {
                    top_n: self.top_n,
                    rows: aggregate::top_filers(&aggregate::outbound(&top_filers, pair), self.top_n),
                };
                let gender_years = aggregate::gender_by_year(&aggregate::outbound(&gender, pair));
                let gender_tab = GenderTab {
                    latest_female_share: aggregate::latest_female_share(&gender_years),
                    years: gender_years,
                };
                let kpis = Kpis {
                    outbound_applications: aggregate::pair_total(&flows, pair),
                    inbound_applications: aggregate::pair_total(&flows, &pair.reversed()),
                    outbound_yoy: aggregate::yoy_change(&flows, pair, years.hi),
                    inbound_yoy: aggregate::yoy_change(&flows, &pair.reversed(), years.hi),
                };

                self.empty_notices(&mut notices, pair, &pair_flows, &flows_pph, &top, &gender_tab);
                (overview, flows_pph, top, gender_tab, kpis)
            }
            None => {
                self.no_pair_notices(&mut notices);
                (
                    OverviewTab {
                        outbound: Vec::new(),
                        inbound: Vec::new(),
                        latest_year: years.hi,
                        latest_by_type: Vec::new(),
                    },
                    FlowsPphTab {
                        links: Vec::new(),
                        pph: Vec::new(),
                    },
                    TopFilersTab {
                        top_n: self.top_n,
                        rows: Vec::new(),
                    },
                    GenderTab {
                        years: Vec::new(),
                        latest_female_share: None,
                    },
                    Kpis {
                        outbound_applications: 0,
                        inbound_applications: 0,
                        outbound_yoy: None,
                        inbound_yoy: None,
                    },
                )
            }
        };

        let annex = AnnexTab {
            available: self.available_jurisdictions(),
            selected: self.jurisdictions.clone(),
            trends: aggregate::importance_trend(&importance, &self.jurisdictions),
        };
        if matches!(self.importance, Slot::Ready(_)) && annex.trends.is_empty() {
            notices.push(Notice::EmptyResult {
                dataset: DatasetKind::Importance,
                tab: Tab::Annex,
                message: "No importance data.".to_string(),
            });
        }

        DashboardView {
            header: Header {
                title: TITLE.to_string(),
                pair: self.pair.clone(),
                years,
                ip_types: self.filter.ip_types.iter().copied().collect(),
                kpis,
                datasets: self.statuses(),
            },
            overview,
            flows_pph,
            top_filers: top,
            gender: gender_tab,
            annex,
            notices,
        }
    }

    fn load_notices(&self) -> Vec<Notice> {
        let mut notices = Vec::new();

        for status in self.statuses() {
            match status.state {
                SlotState::Empty => notices.push(Notice::MissingDataset {
                    dataset: status.kind,
                }),
                SlotState::Failed => notices.push(Notice::SchemaFailed {
                    dataset: status.kind,
                    message: status.error.unwrap_or_default(),
                }),
                SlotState::Ready => {}
            }
        }

        skipped_notice(&mut notices, &self.flows);
        skipped_notice(&mut notices, &self.top_filers);
        skipped_notice(&mut notices, &self.gender);
        skipped_notice(&mut notices, &self.pph);
        skipped_notice(&mut notices, &self.importance);

        notices
    }

    /// Flow rows decide the country pair. Without any, every pair-based
    /// tab with loaded data still gets a message.
    fn no_pair_notices(&self, notices: &mut Vec<Notice>) {
        let flows_ready = matches!(self.flows, Slot::Ready(_));
        let no_flows = "No flow data for the chosen filters.";
        let no_pair = "No country pair available: the loaded flows have no rows.";

        let checks = [
            (flows_ready, DatasetKind::Flows, Tab::Overview, no_flows),
            (flows_ready, DatasetKind::Flows, Tab::FlowsPph, no_flows),
            (matches!(self.pph, Slot::Ready(_)), DatasetKind::Pph, Tab::FlowsPph, no_pair),
            (
                matches!(self.top_filers, Slot::Ready(_)),
                DatasetKind::TopFilers,
                Tab::TopFilers,
                no_pair,
            ),
            (
                matches!(self.gender, Slot::Ready(_)),
                DatasetKind::GenderSplit,
                Tab::Gender,
                no_pair,
            ),
        ];

        for (ready, dataset, tab, message) in checks {
            if ready {
                notices.push(Notice::EmptyResult {
                    dataset,
                    tab,
                    message: message.to_string(),
                });
            }
        }
    }

    fn empty_notices(
        &self,
        notices: &mut Vec<Notice>,
        pair: &CountryPair,
        pair_flows: &[FlowRecord],
        flows_pph: &FlowsPphTab,
        top: &TopFilersTab,
        gender: &GenderTab,
    ) {
        let mut empty = |ready: bool, dataset: DatasetKind, tab: Tab, is_empty: bool, message: String| {
            if ready && is_empty {
                notices.push(Notice::EmptyResult {
                    dataset,
                    tab,
                    message,
                });
            }
        };

        let flows_ready = matches!(self.flows, Slot::Ready(_));
        empty(
            flows_ready,
            DatasetKind::Flows,
            Tab::Overview,
            pair_flows.is_empty(),
            "No flow data for the chosen filters.".to_string(),
        );
        empty(
            flows_ready,
            DatasetKind::Flows,
            Tab::FlowsPph,
            flows_pph.links.is_empty(),
            "No flow data for the chosen filters.".to_string(),
        );
        empty(
            matches!(self.pph, Slot::Ready(_)),
            DatasetKind::Pph,
            Tab::FlowsPph,
            flows_pph.pph.is_empty(),
            format!("No PPH data for {}.", pair),
        );
        empty(
            matches!(self.top_filers, Slot::Ready(_)),
            DatasetKind::TopFilers,
            Tab::TopFilers,
            top.rows.is_empty(),
            format!(
                "No filers from {} to {} for the selected filters.",
                pair.origin, pair.destination
            ),
        );
        empty(
            matches!(self.gender, Slot::Ready(_)),
            DatasetKind::GenderSplit,
            Tab::Gender,
            gender.years.is_empty(),
            "No gender data for this pair.".to_string(),
        );
    }
}

fn into_slot<T>(result: Result<Dataset<T>, LoadError>) -> Slot<T> {
    match result {
        Ok(dataset) => Slot::Ready(dataset),
        Err(err) => Slot::Failed(err),
    }
}

fn replace<T: Record>(
    slot: &mut Slot<T>,
    validator: &SchemaValidator,
    source: DataSource,
    bytes: &[u8],
) -> UploadOutcome {
    let kind = T::KIND;
    *slot = into_slot(loader::load_bytes(validator, source, bytes));

    match slot {
        Slot::Ready(dataset) => UploadOutcome::Loaded {
            kind,
            records: dataset.records.len(),
            skipped: dataset.skipped.len(),
        },
        Slot::Failed(err) => UploadOutcome::Rejected {
            kind,
            error: err.to_string(),
        },
        Slot::Empty => UploadOutcome::Rejected {
            kind,
            error: "nothing loaded".to_string(),
        },
    }
}

fn skipped_notice<T: Record>(notices: &mut Vec<Notice>, slot: &Slot<T>) {
    if let Slot::Ready(dataset) = slot {
        if let Some(first) = dataset.skipped.first() {
            notices.push(Notice::RowsSkipped {
                dataset: T::KIND,
                count: dataset.skipped.len(),
                first: first.to_string(),
            });
        }
    }
}

fn csv_of<T: Record + Filterable>(records: &[T], filter: &FilterState) -> Result<Vec<u8>> {
    loader::to_csv_bytes_with_header(&apply(records, filter))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const FLOWS: &str = "year,origin_country,dest_country,ip_type,applications\n\
                         2020,Canada,Japan,patent,10\n\
                         2021,Canada,Japan,patent,12\n\
                         2021,Canada,Japan,trademark,5\n\
                         2021,Japan,Canada,patent,8\n\
                         2022,Japan,Canada,design,2\n";

    const FILERS: &str = "filer,origin_country,dest_country,ip_type,filings\n\
                          Acme,Canada,Japan,patent,40\n\
                          Borealis,Canada,Japan,trademark,60\n\
                          Kaiju,Japan,Canada,patent,90\n";

    const GENDER: &str = "year,origin_country,dest_country,female_inventors,male_inventors\n\
                          2021,Canada,Japan,3,9\n\
                          2022,Canada,Japan,0,0\n";

    const PPH: &str = "year,direction,requests\n\
                       2021,Canada→Japan,14\n\
                       2021,bogus,1\n\
                       2022,Japan→Canada,9\n";

    const IMPORTANCE: &str = "year,jurisdiction,importance_score\n\
                              2021,JP,1.1\n\
                              2020,JP,0.9\n\
                              2021,CA,0.7\n\
                              2021,US,1.4\n\
                              2021,KR,1.0\n\
                              2021,EP,1.2\n";

    fn session() -> Session {
        let mut session = Session::new(DashboardConfig::default())
            .with_validator(SchemaValidator::with_year_bounds(1900, 2100));
        session.upload(DatasetKind::Flows, "flows.csv", FLOWS.as_bytes());
        session.upload(DatasetKind::TopFilers, "top_filers.csv", FILERS.as_bytes());
        session.upload(DatasetKind::GenderSplit, "gender_split.csv", GENDER.as_bytes());
        session.upload(DatasetKind::Pph, "pph.csv", PPH.as_bytes());
        session.upload(DatasetKind::Importance, "importance.csv", IMPORTANCE.as_bytes());
        session
    }

    #[test]
    fn test_defaults_after_flows_upload() {
        let session = session();

        assert_eq!(session.filter().years, YearRange::new(2020, 2022));
        assert_eq!(session.ip_options(), IpType::ALL.to_vec());
        assert_eq!(session.pair(), Some(&CountryPair::new("Canada", "Japan")));
        assert_eq!(session.selected_jurisdictions(), &["CA", "EP", "JP", "KR"]);
    }

    #[test]
    fn test_full_view() {
        let view = session().view();

        assert_eq!(view.header.kpis.outbound_applications, 27);
        assert_eq!(view.header.kpis.inbound_applications, 10);
        assert_eq!(view.header.kpis.outbound_yoy, None);

        assert_eq!(view.overview.outbound.len(), 9);
        assert_eq!(view.overview.latest_year, 2022);
        assert_eq!(view.overview.latest_by_type.len(), 1);

        assert_eq!(view.flows_pph.pph.len(), 2);
        assert_eq!(view.top_filers.rows[0].filer, "Borealis");
        assert_eq!(view.top_filers.rows.len(), 2);

        assert_eq!(view.gender.years.len(), 2);
        assert_eq!(view.gender.latest_female_share, Some(Ratio::Undefined));

        assert_eq!(view.annex.trends.len(), 4);
        assert_eq!(view.annex.trends[2].jurisdiction, "JP");
        assert_eq!(view.annex.trends[2].points[0].year, 2020);
    }

    #[test]
    fn test_skipped_rows_surface_as_notice() {
        let view = session().view();

        let skipped: Vec<&Notice> = view
            .notices
            .iter()
            .filter(|n| matches!(n, Notice::RowsSkipped { .. }))
            .collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].tab(), Tab::FlowsPph);
        assert!(skipped[0].message().contains("skipped 1 malformed row"));
    }

    #[test]
    fn test_year_change_recomputes() {
        let mut session = session();
        let view = session.set_year_range(YearRange::new(2020, 2021));

        assert_eq!(view.header.years, YearRange::new(2020, 2021));
        assert_eq!(view.header.kpis.inbound_applications, 8);
        let yoy = view.header.kpis.outbound_yoy.unwrap();
        assert!((yoy - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_type_selection_gives_empty_result_notices() {
        let mut session = session();
        let view = session.set_ip_types(Vec::<IpType>::new());

        assert!(view.overview.outbound.is_empty());
        assert!(view.top_filers.rows.is_empty());
        assert!(view
            .notices_for(Tab::TopFilers)
            .iter()
            .any(|n| n.level() == NoticeLevel::Info));
        // gender rows carry no ip_type
        assert_eq!(view.gender.years.len(), 2);
    }

    #[test]
    fn test_inverted_range_is_not_an_error() {
        let mut session = session();
        let view = session.set_year_range(YearRange::new(2022, 2020));

        assert!(view.header.years.is_empty());
        assert!(view.overview.outbound.is_empty());
        assert!(view.gender.years.is_empty());
        assert_eq!(view.header.kpis.outbound_applications, 0);
    }

    #[test]
    fn test_schema_failure_blocks_only_that_dataset() {
        let mut session = session();
        let outcome = session.upload(DatasetKind::GenderSplit, "bad.csv", b"year,female\n2020,1\n");

        assert!(matches!(outcome, UploadOutcome::Rejected { .. }));

        let view = session.view();
        assert!(view.gender.years.is_empty());
        assert_eq!(view.header.kpis.outbound_applications, 27);
        let failed: Vec<&Notice> = view.notices_for(Tab::Gender);
        assert!(failed.iter().any(|n| n.level() == NoticeLevel::Error
            && n.message().contains("female_inventors")));
    }

    #[test]
    fn test_identical_upload_is_unchanged() {
        let mut session = session();
        session.set_year_range(YearRange::new(2021, 2021));

        let outcome = session.upload(DatasetKind::Flows, "again.csv", FLOWS.as_bytes());

        assert_eq!(outcome, UploadOutcome::Unchanged { kind: DatasetKind::Flows });
        assert_eq!(session.filter().years, YearRange::new(2021, 2021));
    }

    #[test]
    fn test_download_filtered_flows() {
        let mut session = session();
        session.set_ip_types([IpType::Patent]);
        session.set_year_range(YearRange::new(2021, 2022));

        let text = String::from_utf8(session.download(DatasetKind::Flows).unwrap()).unwrap();

        assert_eq!(
            text,
            "year,origin_country,dest_country,ip_type,applications\n\
             2021,Canada,Japan,patent,12\n\
             2021,Japan,Canada,patent,8\n"
        );
        assert_eq!(Session::download_file_name(DatasetKind::Flows), "flows_filtered.csv");
    }

    #[test]
    fn test_apply_update_partial() {
        let mut session = session();
        let view = session.apply_update(FilterUpdate {
            origin: Some("Japan".to_string()),
            destination: Some("Canada".to_string()),
            top_n: Some(1),
            ..FilterUpdate::default()
        });

        assert_eq!(view.header.pair, Some(CountryPair::new("Japan", "Canada")));
        assert_eq!(view.top_filers.top_n, 5);
        assert_eq!(view.top_filers.rows[0].filer, "Kaiju");
        assert_eq!(view.header.years, YearRange::new(2020, 2022));
    }

    #[test]
    fn test_empty_session_view() {
        let session = Session::new(DashboardConfig::default());
        let view = session.view();

        assert_eq!(view.header.pair, None);
        assert_eq!(view.header.years, YearRange::new(2019, 2024));
        assert_eq!(
            view.notices
                .iter()
                .filter(|n| matches!(n, Notice::MissingDataset { .. }))
                .count(),
            5
        );
    }

    #[test]
    fn test_load_samples_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("flows.csv"), FLOWS).unwrap();
        fs::write(dir.path().join("pph.csv"), "year,requests\n2020,1\n").unwrap();

        let config = DashboardConfig {
            data_dir: dir.path().to_path_buf(),
            ..DashboardConfig::default()
        };
        let session = Session::with_samples(config);
        let statuses = session.statuses();

        assert_eq!(statuses[0].state, SlotState::Ready);
        assert_eq!(statuses[0].records, 5);
        assert_eq!(statuses[1].state, SlotState::Empty);
        assert_eq!(statuses[3].state, SlotState::Failed);
        assert_eq!(session.countries(), vec!["Canada", "Japan"]);
    }

    #[test]
    fn test_header_only_flows_leave_messages_on_pair_tabs() {
        let mut session = session();
        session.upload(
            DatasetKind::Flows,
            "empty_flows.csv",
            b"year,origin_country,dest_country,ip_type,applications\n",
        );

        let view = session.view();

        assert_eq!(view.header.pair, None);
        for tab in [Tab::Overview, Tab::FlowsPph, Tab::TopFilers, Tab::Gender] {
            let notices = view.notices_for(tab);
            assert!(!notices.is_empty(), "no notice on {:?}", tab);
            assert!(notices
                .iter()
                .any(|n| matches!(n, Notice::EmptyResult { .. })));
        }
        assert!(view.notices_for(Tab::Annex).is_empty());
    }

    #[test]
    fn test_counts_at_type_limit_keep_view_alive() {
        let big = i64::MAX;
        let csv = format!(
            "year,origin_country,dest_country,ip_type,applications\n\
             2020,Canada,Japan,patent,{big}\n\
             2020,Canada,Japan,patent,{big}\n\
             2020,Canada,Japan,patent,{big}\n"
        );
        let mut session = Session::new(DashboardConfig::default());
        let outcome = session.upload(DatasetKind::Flows, "big.csv", csv.as_bytes());
        assert!(matches!(outcome, UploadOutcome::Loaded { records: 3, .. }));

        let view = session.view();

        assert_eq!(view.header.kpis.outbound_applications, u64::MAX);
        assert_eq!(view.overview.outbound[0].applications, u64::MAX);
        assert_eq!(view.flows_pph.links[0].applications, u64::MAX);
    }

    #[test]
    fn test_tab_cycle() {
        let mut tab = Tab::Overview;
        for _ in 0..Tab::ALL.len() {
            tab = tab.next();
        }
        assert_eq!(tab, Tab::Overview);
        assert_eq!(Tab::Overview.previous(), Tab::Annex);
        assert_eq!(Tab::FlowsPph.title(), "Flows & PPH");
    }

    #[test]
    fn test_view_serializes_to_json() {
        let json = serde_json::to_value(session().view()).unwrap();

        assert_eq!(json["header"]["pair"]["origin"], "Canada");
        assert_eq!(json["gender"]["years"][1]["female_to_male"], "undefined");
        assert_eq!(json["flows_pph"]["pph"][0]["direction"], "Canada→Japan");
    }
}
