// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use country_profile::report::render_summary;
use country_profile::{
    DashboardConfig, DatasetKind, FilterUpdate, IpType, Session, UploadOutcome,
};

#[derive(Parser)]
#[command(name = "country-profile")]
#[command(about = "Country profile dashboard for international IP activity", version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the sample CSV files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Replace a dataset with a CSV file, e.g. `--upload flows=my_flows.csv`
    #[arg(long = "upload", global = true, value_name = "KIND=PATH")]
    uploads: Vec<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive terminal dashboard (default)
    Tui,
    /// Print every tab as text (or JSON)
    Summary {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    /// Write the filtered rows of one dataset as CSV
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        /// flows, top_filers, gender_split, pph or importance
        #[arg(long, default_value = "flows")]
        kind: String,
        /// Output file; defaults to `<kind>_filtered.csv`
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a CSV against the schema of a dataset kind
    Validate { kind: String, path: PathBuf },
}

#[derive(Args, Default)]
struct FilterArgs {
    #[arg(long)]
    from: Option<i32>,
    #[arg(long)]
    to: Option<i32>,
    /// Comma separated: patent,trademark,design
    #[arg(long, value_delimiter = ',')]
    ip: Option<Vec<String>>,
    #[arg(long)]
    origin: Option<String>,
    #[arg(long)]
    dest: Option<String>,
    #[arg(long)]
    top: Option<usize>,
    /// Comma separated jurisdictions for the annex
    #[arg(long, value_delimiter = ',')]
    jurisdictions: Option<Vec<String>>,
}

impl FilterArgs {
    fn into_update(self) -> Result<FilterUpdate> {
        let ip_types = match self.ip {
            Some(labels) => Some(
                labels
                    .iter()
                    .map(|l| IpType::parse(l).with_context(|| format!("Unknown ip type {:?}", l)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        Ok(FilterUpdate {
            year_from: self.from,
            year_to: self.to,
            ip_types,
            origin: self.origin,
            destination: self.dest,
            top_n: self.top,
            jurisdictions: self.jurisdictions,
        })
    }
}

fn parse_kind(value: &str) -> Result<DatasetKind> {
    DatasetKind::parse(value).with_context(|| format!("Unknown dataset kind {:?}", value))
}

fn init_logging(interactive: bool) {
    // The TUI owns the terminal, so stay quiet unless RUST_LOG asks otherwise
    let default = if interactive { "off" } else { "country_profile=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let interactive = matches!(cli.command, None | Some(Command::Tui));
    init_logging(interactive);

    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let mut session = Session::with_samples(config);
    for upload in &cli.uploads {
        upload_file(&mut session, upload)?;
    }

    match cli.command {
        None | Some(Command::Tui) => run_ui_mode(session),
        Some(Command::Summary { filters, json }) => run_summary(session, filters, json),
        Some(Command::Export { filters, kind, out }) => run_export(session, filters, &kind, out),
        Some(Command::Validate { kind, path }) => run_validate(&kind, path),
    }
}

fn upload_file(session: &mut Session, arg: &str) -> Result<()> {
    let Some((kind, path)) = arg.split_once('=') else {
        bail!("Expected KIND=PATH, got {:?}", arg);
    };
    let kind = parse_kind(kind)?;
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path))?;

    match session.upload(kind, path, &bytes) {
        UploadOutcome::Rejected { error, .. } => eprintln!("❌ {}", error),
        UploadOutcome::Loaded { records, skipped, .. } => {
            eprintln!("✓ {} ← {} ({} rows, {} skipped)", kind, path, records, skipped)
        }
        UploadOutcome::Unchanged { .. } => {}
    }
    Ok(())
}

fn run_summary(mut session: Session, filters: FilterArgs, json: bool) -> Result<()> {
    let view = session.apply_update(filters.into_update()?);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", render_summary(&view));
    }
    Ok(())
}

fn run_export(
    mut session: Session,
    filters: FilterArgs,
    kind: &str,
    out: Option<PathBuf>,
) -> Result<()> {
    let kind = parse_kind(kind)?;
    session.apply_update(filters.into_update()?);

    let bytes = session.download(kind)?;
    let out = out.unwrap_or_else(|| PathBuf::from(Session::download_file_name(kind)));
    fs::write(&out, &bytes).with_context(|| format!("Failed to write {}", out.display()))?;

    println!("⬇️  Wrote filtered {} to {}", kind, out.display());
    Ok(())
}

fn run_validate(kind: &str, path: PathBuf) -> Result<()> {
    let kind = parse_kind(kind)?;
    let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;

    println!("🔍 Validating {} as {}", path.display(), kind);
    println!("   {}", kind.required_columns_hint());

    let mut session = Session::new(DashboardConfig::default());
    match session.upload(kind, &path.to_string_lossy(), &bytes) {
        UploadOutcome::Loaded { records, skipped, .. } => {
            println!("✓ {} valid rows, {} skipped", records, skipped);
            for notice in session.view().notices.iter().filter(|n| {
                matches!(n, country_profile::Notice::RowsSkipped { dataset, .. } if *dataset == kind)
            }) {
                println!("  ⚠️  {}", notice.message());
            }
            Ok(())
        }
        UploadOutcome::Rejected { error, .. } => bail!("{}", error),
        UploadOutcome::Unchanged { .. } => Ok(()),
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(session: Session) -> Result<()> {
    let mut app = ui::App::new(session);
    ui::run_ui(&mut app)?;

    println!("\n✅ Dashboard closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_session: Session) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: country-profile summary");
    std::process::exit(1);
}
