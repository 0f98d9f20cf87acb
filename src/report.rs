// 📝 Plain-text rendering of a dashboard view (CLI summary, TUI cells)

use crate::aggregate::Ratio;
use crate::dashboard::{DashboardView, NoticeLevel, Tab};
use std::fmt::Write;

pub const PLACEHOLDER: &str = "—";

/// 1234567 → "1,234,567"
pub fn fmt_int(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out
}

/// Signed percent with one decimal, placeholder when absent
pub fn fmt_change(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.1}%", v),
        None => PLACEHOLDER.to_string(),
    }
}

/// Share as a percent, placeholder when undefined or absent
pub fn fmt_share(value: Option<Ratio>) -> String {
    match value.and_then(|r| r.value()) {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => PLACEHOLDER.to_string(),
    }
}

fn level_icon(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Info => "ℹ️ ",
        NoticeLevel::Warning => "⚠️ ",
        NoticeLevel::Error => "❌",
    }
}

/// Multi-line summary of every tab.
pub fn render_summary(view: &DashboardView) -> String {
    let mut out = String::new();
    let header = &view.header;

    let _ = writeln!(out, "📊 {}", header.title);
    let _ = writeln!(out, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let ip_types: Vec<&str> = header.ip_types.iter().map(|t| t.as_str()).collect();
    let _ = writeln!(
        out,
        "Years: {}   IP types: {}",
        header.years,
        if ip_types.is_empty() { "none".to_string() } else { ip_types.join(", ") }
    );

    for status in &header.datasets {
        let _ = writeln!(
            out,
            "  {:<13} {:?} ({} rows, {} skipped)",
            status.kind.name(),
            status.state,
            status.records,
            status.skipped
        );
    }

    let Some(pair) = &header.pair else {
        let _ = writeln!(out, "\nNo country pair available (no flow data).");
        render_notices(&mut out, view);
        return out;
    };
    let back = pair.reversed();

    let _ = writeln!(out, "\n[KPIs]");
    let _ = writeln!(
        out,
        "  {} applications: {}   YoY: {}",
        pair,
        fmt_int(header.kpis.outbound_applications),
        fmt_change(header.kpis.outbound_yoy)
    );
    let _ = writeln!(
        out,
        "  {} applications: {}   YoY: {}",
        back,
        fmt_int(header.kpis.inbound_applications),
        fmt_change(header.kpis.inbound_yoy)
    );

    let _ = writeln!(out, "\n[{}] By IP type ({})", Tab::Overview.title(), view.overview.latest_year);
    for row in &view.overview.latest_by_type {
        let _ = writeln!(
            out,
            "  {:<20} {:<10} {:>12}",
            row.origin_country,
            row.ip_type.as_str(),
            fmt_int(row.applications)
        );
    }

    let _ = writeln!(out, "\n[{}]", Tab::FlowsPph.title());
    for link in &view.flows_pph.links {
        let _ = writeln!(out, "  {:<40} {:>12}", link.label(), fmt_int(link.applications));
    }
    for row in &view.flows_pph.pph {
        let _ = writeln!(
            out,
            "  PPH {} {:<30} {:>8}",
            row.year,
            row.direction.to_string(),
            fmt_int(row.requests)
        );
    }

    let _ = writeln!(out, "\n[{}] top {}", Tab::TopFilers.title(), view.top_filers.top_n);
    for row in &view.top_filers.rows {
        let _ = writeln!(
            out,
            "  {:>2}. {:<30} {:<10} {:>10}",
            row.rank,
            row.filer,
            row.ip_type,
            fmt_int(row.filings)
        );
    }

    let _ = writeln!(
        out,
        "\n[{}] female share (latest year): {}",
        Tab::Gender.title(),
        fmt_share(view.gender.latest_female_share)
    );
    for year in &view.gender.years {
        let _ = writeln!(
            out,
            "  {}  female {:>8}  male {:>8}  f/m {}",
            year.year,
            fmt_int(year.female_inventors),
            fmt_int(year.male_inventors),
            year.female_to_male
        );
    }

    let _ = writeln!(out, "\n[{}]", Tab::Annex.title());
    for trend in &view.annex.trends {
        let points: Vec<String> = trend
            .points
            .iter()
            .map(|p| format!("{}: {:.2}", p.year, p.importance_score))
            .collect();
        let _ = writeln!(out, "  {:<6} {}", trend.jurisdiction, points.join(", "));
    }

    render_notices(&mut out, view);
    out
}

fn render_notices(out: &mut String, view: &DashboardView) {
    if view.notices.is_empty() {
        return;
    }

    let _ = writeln!(out, "\n[Notices]");
    for notice in &view.notices {
        let _ = writeln!(
            out,
            "  {} {}: {}",
            level_icon(notice.level()),
            notice.tab().title(),
            notice.message()
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use crate::dashboard::Session;
    use crate::schema::DatasetKind;

    #[test]
    fn test_fmt_int_groups_thousands() {
        assert_eq!(fmt_int(0), "0");
        assert_eq!(fmt_int(999), "999");
        assert_eq!(fmt_int(1000), "1,000");
        assert_eq!(fmt_int(1234567), "1,234,567");
    }

    #[test]
    fn test_fmt_change_and_share() {
        assert_eq!(fmt_change(Some(12.345)), "+12.3%");
        assert_eq!(fmt_change(Some(-4.0)), "-4.0%");
        assert_eq!(fmt_change(None), PLACEHOLDER);
        assert_eq!(fmt_share(Some(Ratio::Defined(0.25))), "25.0%");
        assert_eq!(fmt_share(Some(Ratio::Undefined)), PLACEHOLDER);
    }

    #[test]
    fn test_summary_mentions_pair_and_notices() {
        let mut session = Session::new(DashboardConfig::default());
        session.upload(
            DatasetKind::Flows,
            "flows.csv",
            b"year,origin_country,dest_country,ip_type,applications\n2021,Canada,Japan,patent,1200\n",
        );

        let text = render_summary(&session.view());

        assert!(text.contains("Canada → Japan applications: 1,200"));
        assert!(text.contains("[Notices]"));
        assert!(text.contains("No pph data loaded"));
    }

    #[test]
    fn test_summary_without_flows() {
        let text = render_summary(&Session::new(DashboardConfig::default()).view());
        assert!(text.contains("No country pair available"));
    }
}
