use anyhow::Result;
use country_profile::dashboard::{DashboardView, Notice, NoticeLevel, Session, Tab};
use country_profile::report::{fmt_change, fmt_int, fmt_share};
use country_profile::{CountryPair, DatasetKind, IpType, YearRange};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::fs;
use std::io;

pub struct App {
    pub session: Session,
    pub view: DashboardView,
    pub current_tab: Tab,
    pub state: TableState,
    pub status_message: Option<String>,
}

impl App {
    pub fn new(session: Session) -> Self {
        let view = session.view();
        let mut state = TableState::default();
        state.select(Some(0));

        Self {
            session,
            view,
            current_tab: Tab::Overview,
            state,
            status_message: None,
        }
    }

    fn refresh(&mut self, view: DashboardView) {
        self.view = view;
        self.state.select(Some(0));
    }

    pub fn next_tab(&mut self) {
        self.current_tab = self.current_tab.next();
        self.state.select(Some(0));
    }

    pub fn previous_tab(&mut self) {
        self.current_tab = self.current_tab.previous();
        self.state.select(Some(0));
    }

    /// Move one end of the year range, staying inside the slider bounds
    pub fn shift_years(&mut self, lo_delta: i32, hi_delta: i32) {
        let years = self.session.filter().years;
        let view = self
            .session
            .set_year_range(YearRange::new(years.lo + lo_delta, years.hi + hi_delta));
        self.refresh(view);
    }

    pub fn toggle_ip_type(&mut self, ip_type: IpType) {
        let view = self.session.toggle_ip_type(ip_type);
        self.refresh(view);
    }

    /// Step origin (or destination) through the country list
    pub fn cycle_country(&mut self, origin: bool, forward: bool) {
        let countries = self.session.countries();
        let Some(pair) = self.session.pair().cloned() else {
            return;
        };
        if countries.is_empty() {
            return;
        }

        let current = if origin { &pair.origin } else { &pair.destination };
        let pos = countries.iter().position(|c| c == current).unwrap_or(0);
        let next = if forward {
            (pos + 1) % countries.len()
        } else {
            (pos + countries.len() - 1) % countries.len()
        };

        let pair = if origin {
            CountryPair::new(countries[next].clone(), pair.destination)
        } else {
            CountryPair::new(pair.origin, countries[next].clone())
        };
        let view = self.session.set_pair(pair);
        self.refresh(view);
    }

    pub fn swap_pair(&mut self) {
        if let Some(pair) = self.session.pair().map(|p| p.reversed()) {
            let view = self.session.set_pair(pair);
            self.refresh(view);
        }
    }

    pub fn change_top_n(&mut self, delta: i64) {
        let n = (self.session.top_n() as i64 + delta).max(0) as usize;
        let view = self.session.set_top_n(n);
        self.refresh(view);
    }

    pub fn reset(&mut self) {
        self.session.reset_filters();
        let view = self.session.view();
        self.refresh(view);
        self.status_message = Some("Filters reset".to_string());
    }

    pub fn download_flows(&mut self) {
        let file_name = Session::download_file_name(DatasetKind::Flows);
        self.status_message = Some(
            match self
                .session
                .download(DatasetKind::Flows)
                .and_then(|bytes| fs::write(&file_name, bytes).map_err(Into::into))
            {
                Ok(()) => format!("Saved {}", file_name),
                Err(e) => format!("Download failed: {}", e),
            },
        );
    }

    fn row_count(&self) -> usize {
        match self.current_tab {
            Tab::Overview => self.view.overview.outbound.len(),
            Tab::FlowsPph => self.view.flows_pph.links.len(),
            Tab::TopFilers => self.view.top_filers.rows.len(),
            Tab::Gender => self.view.gender.years.len(),
            Tab::Annex => self.view.annex.trends.len(),
        }
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            app.status_message = None;
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_tab();
                    } else {
                        app.next_tab();
                    }
                }
                KeyCode::BackTab => app.previous_tab(),
                KeyCode::Char('[') => app.shift_years(-1, 0),
                KeyCode::Char(']') => app.shift_years(1, 0),
                KeyCode::Char('{') => app.shift_years(0, -1),
                KeyCode::Char('}') => app.shift_years(0, 1),
                KeyCode::Char('1') => app.toggle_ip_type(IpType::Patent),
                KeyCode::Char('2') => app.toggle_ip_type(IpType::Trademark),
                KeyCode::Char('3') => app.toggle_ip_type(IpType::Design),
                KeyCode::Char('o') => app.cycle_country(true, true),
                KeyCode::Char('O') => app.cycle_country(true, false),
                KeyCode::Char('p') => app.cycle_country(false, true),
                KeyCode::Char('P') => app.cycle_country(false, false),
                KeyCode::Char('s') => app.swap_pair(),
                KeyCode::Char('+') => app.change_top_n(1),
                KeyCode::Char('-') => app.change_top_n(-1),
                KeyCode::Char('r') => app.reset(),
                KeyCode::Char('d') => app.download_flows(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let notice_count = app.view.notices_for(app.current_tab).len();
    let notice_height = if notice_count == 0 { 0 } else { notice_count.min(4) as u16 + 2 };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),             // Header: tabs, filters, KPIs
            Constraint::Min(0),                // Tab content
            Constraint::Length(notice_height), // Notices for this tab
            Constraint::Length(3),             // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_tab {
        Tab::Overview => render_overview(f, chunks[1], &app.view, &mut app.state),
        Tab::FlowsPph => render_flows(f, chunks[1], &app.view, &mut app.state),
        Tab::TopFilers => render_top_filers(f, chunks[1], &app.view, &mut app.state),
        Tab::Gender => render_gender(f, chunks[1], &app.view, &mut app.state),
        Tab::Annex => render_annex(f, chunks[1], &app.view, &mut app.state),
    }

    let notices: Vec<&Notice> = app.view.notices_for(app.current_tab);
    if !notices.is_empty() {
        render_notices(f, chunks[2], &notices);
    }
    render_status_bar(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let header = &app.view.header;

    let mut tab_spans = vec![];
    for (i, tab) in Tab::ALL.into_iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if tab == app.current_tab {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(tab.title().to_string(), style));
    }

    let filter_line = Line::from(vec![
        Span::styled("Years: ", Style::default().fg(Color::Cyan)),
        Span::raw(header.years.to_string()),
        Span::raw("  |  "),
        Span::styled("IP types: ", Style::default().fg(Color::Cyan)),
        Span::raw(app.session.filter().ip_types_label()),
        Span::raw("  |  "),
        Span::styled("Pair: ", Style::default().fg(Color::Cyan)),
        Span::raw(
            header
                .pair
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "—".to_string()),
        ),
    ]);

    let kpi_line = match &header.pair {
        Some(pair) => Line::from(vec![
            Span::styled(
                format!("{}: {}", pair, fmt_int(header.kpis.outbound_applications)),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" ({})", fmt_change(header.kpis.outbound_yoy)),
                yoy_style(header.kpis.outbound_yoy),
            ),
            Span::raw("   "),
            Span::styled(
                format!("{}: {}", pair.reversed(), fmt_int(header.kpis.inbound_applications)),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" ({})", fmt_change(header.kpis.inbound_yoy)),
                yoy_style(header.kpis.inbound_yoy),
            ),
        ]),
        None => Line::from(Span::styled(
            "No flow data loaded",
            Style::default().fg(Color::Red),
        )),
    };

    let paragraph = Paragraph::new(vec![Line::from(tab_spans), filter_line, kpi_line]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" {} ", header.title)),
    );

    f.render_widget(paragraph, area);
}

fn yoy_style(value: Option<f64>) -> Style {
    match value {
        Some(v) if v > 0.0 => Style::default().fg(Color::Green),
        Some(v) if v < 0.0 => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::DarkGray),
    }
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn table_block<'a>(title: impl Into<String>) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(title.into())
}

fn highlight() -> Style {
    Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD)
}

fn ip_color(ip_type: &str) -> Color {
    match IpType::parse(ip_type) {
        Some(IpType::Patent) => Color::Cyan,
        Some(IpType::Trademark) => Color::Magenta,
        Some(IpType::Design) => Color::Green,
        None => Color::White,
    }
}

fn render_overview(f: &mut Frame, area: Rect, view: &DashboardView, state: &mut TableState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(area);

    // Outbound and inbound yearly totals share the same (year, ip_type) grid
    let rows = view
        .overview
        .outbound
        .iter()
        .zip(view.overview.inbound.iter())
        .map(|(out, back)| {
            Row::new(vec![
                Cell::from(out.year.to_string()),
                Cell::from(out.ip_type.as_str()).style(Style::default().fg(ip_color(out.ip_type.as_str()))),
                Cell::from(fmt_int(out.applications)),
                Cell::from(fmt_int(back.applications)),
            ])
        });

    let (out_label, back_label) = match &view.header.pair {
        Some(pair) => (
            format!("{} → {}", truncate(&pair.origin, 10), truncate(&pair.destination, 10)),
            format!("{} → {}", truncate(&pair.destination, 10), truncate(&pair.origin, 10)),
        ),
        None => ("outbound".to_string(), "inbound".to_string()),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(11),
            Constraint::Length(16),
            Constraint::Length(16),
        ],
    )
    .header(header_row(&["Year", "IP type", "Outbound", "Inbound"]))
    .block(table_block(format!(" Applications over time ({} / {}) ", out_label, back_label)))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[0], state);

    let labels: Vec<(String, u64)> = view
        .overview
        .latest_by_type
        .iter()
        .map(|t| {
            (
                format!("{} {}", truncate(&t.origin_country, 4), t.ip_type.as_str()),
                t.applications,
            )
        })
        .collect();
    let data: Vec<(&str, u64)> = labels.iter().map(|(l, v)| (l.as_str(), *v)).collect();

    let chart = BarChart::default()
        .block(table_block(format!(
            " By IP type ({}) ",
            view.overview.latest_year
        )))
        .data(data.as_slice())
        .bar_width(9)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));

    f.render_widget(chart, chunks[1]);
}

fn render_flows(f: &mut Frame, area: Rect, view: &DashboardView, state: &mut TableState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let rows = view.flows_pph.links.iter().map(|link| {
        Row::new(vec![
            Cell::from(truncate(&link.origin_country, 20)),
            Cell::from(truncate(&link.dest_country, 20)),
            Cell::from(link.ip_type.as_str()).style(Style::default().fg(ip_color(link.ip_type.as_str()))),
            Cell::from(fmt_int(link.applications)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(22),
            Constraint::Length(22),
            Constraint::Length(11),
            Constraint::Length(14),
        ],
    )
    .header(header_row(&["Origin", "Destination", "IP type", "Applications"]))
    .block(table_block(" Origin → Destination flow "))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[0], state);

    let pph_rows = view.flows_pph.pph.iter().map(|row| {
        Row::new(vec![
            Cell::from(row.year.to_string()),
            Cell::from(row.direction.to_string()),
            Cell::from(fmt_int(row.requests)),
        ])
    });

    let pph = Table::new(
        pph_rows,
        [
            Constraint::Length(6),
            Constraint::Length(40),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["Year", "Direction", "Requests"]))
    .block(table_block(" PPH requests "));

    f.render_widget(pph, chunks[1]);
}

fn render_top_filers(f: &mut Frame, area: Rect, view: &DashboardView, state: &mut TableState) {
    let rows = view.top_filers.rows.iter().map(|row| {
        Row::new(vec![
            Cell::from(format!("{:>2}", row.rank)),
            Cell::from(truncate(&row.filer, 40)),
            Cell::from(row.ip_type.clone()).style(Style::default().fg(ip_color(&row.ip_type))),
            Cell::from(fmt_int(row.filings)),
        ])
    });

    let title = match &view.header.pair {
        Some(pair) => format!(" Top {} filers: {} (+/- to change) ", view.top_filers.top_n, pair),
        None => " Top filers ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(42),
            Constraint::Length(12),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["#", "Filer", "IP type", "Filings"]))
    .block(table_block(title))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, state);
}

fn render_gender(f: &mut Frame, area: Rect, view: &DashboardView, state: &mut TableState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let metric = Paragraph::new(Line::from(vec![
        Span::styled(
            "  Female share (latest year): ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            fmt_share(view.gender.latest_female_share),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL).title(" Inventor gender split "));

    f.render_widget(metric, chunks[0]);

    let rows = view.gender.years.iter().map(|year| {
        Row::new(vec![
            Cell::from(year.year.to_string()),
            Cell::from(fmt_int(year.female_inventors)),
            Cell::from(fmt_int(year.male_inventors)),
            Cell::from(fmt_int(year.total)),
            Cell::from(year.female_to_male.to_string()),
            Cell::from(fmt_share(Some(year.female_share))),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(11),
            Constraint::Length(10),
        ],
    )
    .header(header_row(&["Year", "Female", "Male", "Total", "F/M", "Share"]))
    .block(table_block(" By year "))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[1], state);
}

fn render_annex(f: &mut Frame, area: Rect, view: &DashboardView, state: &mut TableState) {
    let rows = view.annex.trends.iter().map(|trend| {
        let points: Vec<String> = trend
            .points
            .iter()
            .map(|p| format!("{} {:.2}", p.year, p.importance_score))
            .collect();
        Row::new(vec![
            Cell::from(trend.jurisdiction.clone()),
            Cell::from(points.join("  ")),
        ])
    });

    let title = format!(
        " Patent importance trend ({} of {} jurisdictions) ",
        view.annex.selected.len(),
        view.annex.available.len()
    );

    let table = Table::new(rows, [Constraint::Length(14), Constraint::Min(20)])
        .header(header_row(&["Jurisdiction", "Year / score"]))
        .block(table_block(title))
        .highlight_style(highlight())
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, state);
}

fn render_notices(f: &mut Frame, area: Rect, notices: &[&Notice]) {
    let lines: Vec<Line> = notices
        .iter()
        .take(4)
        .map(|n| {
            let color = match n.level() {
                NoticeLevel::Info => Color::Blue,
                NoticeLevel::Warning => Color::Yellow,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(Span::styled(format!(" {}", n.message()), Style::default().fg(color)))
        })
        .collect();

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Notices "),
    );

    f.render_widget(paragraph, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    if let Some(message) = &app.status_message {
        status_spans.push(Span::styled(
            format!(" {} ", message),
            Style::default().fg(Color::Green),
        ));
        status_spans.push(Span::raw(" | "));
    }

    for (key, label) in [
        ("Tab", " Tab | "),
        ("[ ]", " From | "),
        ("{ }", " To | "),
        ("1-3", " IP types | "),
        ("o/p", " Countries | "),
        ("s", " Swap | "),
        ("d", " Download | "),
        ("r", " Reset | "),
    ] {
        status_spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(label));
    }
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(Line::from(status_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use country_profile::DashboardConfig;

    fn app() -> App {
        let mut session = Session::new(DashboardConfig::default());
        session.upload(
            DatasetKind::Flows,
            "flows.csv",
            b"year,origin_country,dest_country,ip_type,applications\n\
              2020,Canada,Japan,patent,100\n\
              2021,Canada,Japan,patent,120\n\
              2021,Japan,Canada,design,40\n\
              2021,Germany,Canada,trademark,7\n",
        );
        App::new(session)
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Canada", 10), "Canada");
        assert_eq!(truncate("United Kingdom", 8), "United...");
    }

    #[test]
    fn test_tab_cycle_wraps() {
        let mut app = app();
        app.previous_tab();
        assert_eq!(app.current_tab, Tab::Annex);
        app.next_tab();
        assert_eq!(app.current_tab, Tab::Overview);
    }

    #[test]
    fn test_shift_years_stays_in_bounds() {
        let mut app = app();
        app.shift_years(-1, 0);
        assert_eq!(app.view.header.years, YearRange::new(2020, 2021));

        app.shift_years(1, 0);
        assert_eq!(app.view.header.years, YearRange::new(2021, 2021));
    }

    #[test]
    fn test_cycle_origin_and_swap() {
        let mut app = app();
        assert_eq!(app.session.pair(), Some(&CountryPair::new("Canada", "Japan")));

        app.cycle_country(true, true);
        assert_eq!(app.session.pair().map(|p| p.origin.as_str()), Some("Germany"));

        app.swap_pair();
        assert_eq!(app.session.pair(), Some(&CountryPair::new("Japan", "Germany")));
    }

    #[test]
    fn test_toggle_and_reset() {
        let mut app = app();
        app.toggle_ip_type(IpType::Patent);
        assert!(!app.session.filter().ip_types.contains(&IpType::Patent));

        app.reset();
        assert!(app.session.filter().ip_types.contains(&IpType::Patent));
        assert_eq!(app.status_message.as_deref(), Some("Filters reset"));
    }
}
