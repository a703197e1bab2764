use anyhow::Result;
use chrono::NaiveDate;
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
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rusqlite::Connection;
use std::collections::HashMap;
use std::io;

use loan_servicing::db::{list_borrowers, list_loans, list_properties};
use loan_servicing::{Loan, LoanStatus, LoanSummary, Property};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Portfolio,
    Schedule,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Portfolio => Page::Schedule,
            Page::Schedule => Page::Portfolio,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Portfolio => "Portfolio",
            Page::Schedule => "Schedule",
        }
    }
}

/// One loan with everything the table needs, computed once at load
#[derive(Debug, Clone)]
pub struct LoanRow {
    pub loan: Loan,
    pub summary: LoanSummary,
    pub borrower_name: String,
    pub property_address: String,
}

impl LoanRow {
    pub fn new(loan: Loan, borrower_name: String, property: Option<&Property>, today: NaiveDate) -> Self {
        let summary = loan.summary(property, today);
        LoanRow {
            loan,
            summary,
            borrower_name,
            property_address: property.map(|p| p.full_address()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct PortfolioStats {
    pub active_count: usize,
    pub total_principal: f64,
    pub outstanding: f64,
    /// Principal-weighted average rate of open loans
    pub weighted_rate: f64,
}

pub struct App {
    pub rows: Vec<LoanRow>,
    pub filtered: Vec<usize>,
    pub status_filter: Option<LoanStatus>,
    pub state: TableState,
    pub schedule_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(rows: Vec<LoanRow>) -> Self {
        let mut state = TableState::default();
        if !rows.is_empty() {
            state.select(Some(0));
        }

        let filtered = (0..rows.len()).collect();

        Self {
            rows,
            filtered,
            status_filter: None,
            state,
            schedule_state: TableState::default(),
            current_page: Page::Portfolio,
            show_detail: false,
        }
    }

    /// Read loans plus borrower/property lookups from the database
    pub fn load(conn: &Connection, today: NaiveDate) -> Result<Self> {
        let borrowers: HashMap<String, String> = list_borrowers(conn)?
            .into_iter()
            .map(|b| (b.id, b.full_name))
            .collect();
        let properties: HashMap<String, Property> = list_properties(conn)?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let rows = list_loans(conn)?
            .into_iter()
            .map(|loan| {
                let borrower = borrowers.get(&loan.borrower_id).cloned().unwrap_or_default();
                let property = properties.get(&loan.property_id);
                LoanRow::new(loan, borrower, property, today)
            })
            .collect();

        Ok(Self::new(rows))
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected(&self) -> Option<&LoanRow> {
        self.state
            .selected()
            .and_then(|i| self.filtered.get(i))
            .and_then(|&idx| self.rows.get(idx))
    }

    pub fn apply_filter(&mut self, status: Option<LoanStatus>) {
        self.status_filter = status;
        self.filtered = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| status.map_or(true, |s| row.loan.status == s))
            .map(|(i, _)| i)
            .collect();

        self.state.select(if self.filtered.is_empty() { None } else { Some(0) });
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.schedule_state.select(Some(0));
    }

    pub fn next(&mut self) {
        let len = self.filtered.len();
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
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    fn scroll_schedule(&mut self, delta: i64) {
        let len = self.selected().map(|r| r.loan.term_months.max(0) as i64).unwrap_or(0);
        if len == 0 {
            return;
        }
        let current = self.schedule_state.selected().unwrap_or(0) as i64;
        let next = (current + delta).clamp(0, len - 1);
        self.schedule_state.select(Some(next as usize));
    }

    pub fn stats(&self) -> PortfolioStats {
        let mut stats = PortfolioStats::default();
        let mut rate_weight = 0.0;

        for row in &self.rows {
            stats.total_principal += row.loan.principal;
            if row.loan.status.is_open() {
                stats.active_count += 1;
                stats.outstanding += row.summary.remaining_balance;
                rate_weight += row.loan.interest_rate * row.loan.principal;
            }
        }

        let open_principal: f64 = self
            .rows
            .iter()
            .filter(|r| r.loan.status.is_open())
            .map(|r| r.loan.principal)
            .sum();
        if open_principal > 0.0 {
            stats.weighted_rate = rate_weight / open_principal;
        }

        stats
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
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

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => app.next_page(),
                KeyCode::Char('0') => app.apply_filter(None),
                KeyCode::Char('1') => app.apply_filter(Some(LoanStatus::Pending)),
                KeyCode::Char('2') => app.apply_filter(Some(LoanStatus::Active)),
                KeyCode::Char('3') => app.apply_filter(Some(LoanStatus::PaidOff)),
                KeyCode::Char('4') => app.apply_filter(Some(LoanStatus::Defaulted)),
                KeyCode::Down | KeyCode::Char('j') => match app.current_page {
                    Page::Portfolio => app.next(),
                    Page::Schedule => app.scroll_schedule(1),
                },
                KeyCode::Up | KeyCode::Char('k') => match app.current_page {
                    Page::Portfolio => app.previous(),
                    Page::Schedule => app.scroll_schedule(-1),
                },
                KeyCode::PageDown => app.scroll_schedule(12),
                KeyCode::PageUp => app.scroll_schedule(-12),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Portfolio if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[1]);

            render_loans(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::Portfolio => render_loans(f, chunks[1], app),
        Page::Schedule => render_schedule(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let stats = app.stats();

    let mut spans = vec![];
    for (i, page) in [Page::Portfolio, Page::Schedule].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title().to_string(), style));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Loans: {} ({} open)", app.rows.len(), stats.active_count),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Outstanding: {:.2}", stats.outstanding),
        Style::default().fg(Color::Green),
    ));
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Avg rate: {:.2}%", stats.weighted_rate),
        Style::default().fg(Color::Cyan),
    ));

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn status_color(status: LoanStatus) -> Color {
    match status {
        LoanStatus::Pending => Color::Yellow,
        LoanStatus::Active => Color::Green,
        LoanStatus::PaidOff => Color::DarkGray,
        LoanStatus::Defaulted => Color::Red,
    }
}

fn render_loans(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Loan #", "Borrower", "Principal", "Rate", "Payment", "Balance", "Matures", "Status"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray)).height(1);

    let rows = app.filtered.iter().filter_map(|&i| app.rows.get(i)).map(|row| {
        let s = &row.summary;
        Row::new(vec![
            Cell::from(row.loan.loan_number.clone()),
            Cell::from(truncate(&row.borrower_name, 22)),
            Cell::from(format!("{:.2}", s.principal)),
            Cell::from(format!("{:.2}%", row.loan.interest_rate)),
            Cell::from(format!("{:.2}", s.monthly_payment)),
            Cell::from(format!("{:.2}", s.remaining_balance)),
            Cell::from(s.maturity_date.to_string()),
            Cell::from(s.status.as_str()).style(Style::default().fg(status_color(s.status))),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(24),
            Constraint::Length(14),
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Loans "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_schedule(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(row) = app.selected() else {
        let empty = Paragraph::new("No loan selected")
            .block(Block::default().borders(Borders::ALL).title(" Schedule "));
        f.render_widget(empty, area);
        return;
    };

    let title = format!(" Schedule - {} ", row.loan.loan_number);
    let schedule = row.loan.schedule();

    let header = Row::new(["#", "Due", "Payment", "Interest", "Principal", "Balance"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }))
    .style(Style::default().bg(Color::DarkGray));

    let rows = schedule.iter().map(|r| {
        Row::new(vec![
            Cell::from(r.period.to_string()),
            Cell::from(r.due_date.to_string()),
            Cell::from(format!("{:.2}", r.payment)),
            Cell::from(format!("{:.2}", r.interest)).style(Style::default().fg(Color::Red)),
            Cell::from(format!("{:.2}", r.principal)).style(Style::default().fg(Color::Green)),
            Cell::from(format!("{:.2}", r.balance)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(Style::default().bg(Color::DarkGray))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.schedule_state);
}

fn detail_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("  {}: ", label),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Loan Details ");

    let Some(row) = app.selected() else {
        f.render_widget(Paragraph::new("No loan selected").block(block), area);
        return;
    };

    let s = &row.summary;
    let pct = |v: Option<f64>| v.map(|x| format!("{:.1}%", x)).unwrap_or_else(|| "n/a".to_string());

    let content = vec![
        Line::from(""),
        detail_line("Loan", row.loan.loan_number.clone()),
        detail_line("Borrower", row.borrower_name.clone()),
        detail_line("Property", truncate(&row.property_address, 40)),
        Line::from(""),
        detail_line("Principal", format!("{:.2}", s.principal)),
        detail_line("Rate", format!("{:.3}%", row.loan.interest_rate)),
        detail_line("Term", format!("{} months", row.loan.term_months)),
        detail_line("Originated", row.loan.origination_date.to_string()),
        detail_line("Matures", s.maturity_date.to_string()),
        Line::from(""),
        detail_line("Monthly payment", format!("{:.2}", s.monthly_payment)),
        detail_line("Total interest", format!("{:.2}", s.total_interest)),
        detail_line("Principal paid", format!("{:.2}", row.loan.principal_paid)),
        detail_line("Balance", format!("{:.2}", s.remaining_balance)),
        detail_line(
            "Next payment",
            s.next_payment_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
        ),
        Line::from(""),
        detail_line("LTV", pct(s.ltv)),
        detail_line("LTC", pct(s.ltc)),
        Line::from(""),
        Line::from(Span::styled(
            "  Press Enter to close",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
    ];

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.filtered.len()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(status) = app.status_filter {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            format!("Filter: {}", status.as_str()),
            Style::default().fg(Color::Green),
        ));
    }

    for (key, label) in [("Enter", " Details | "), ("Tab", " Page | "), ("0-4", " Status | "), ("↑/↓", " Nav | ")] {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(label));
    }
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(number: &str, principal: f64, rate: f64, status: LoanStatus) -> LoanRow {
        let mut loan = Loan::new(
            number.to_string(),
            "b".to_string(),
            "l".to_string(),
            "p".to_string(),
            principal,
            rate,
            12,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        loan.status = status;
        LoanRow::new(loan, "Borrower".to_string(), None, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    fn app() -> App {
        App::new(vec![
            row("LN-1", 100_000.0, 10.0, LoanStatus::Active),
            row("LN-2", 300_000.0, 12.0, LoanStatus::Active),
            row("LN-3", 50_000.0, 9.0, LoanStatus::PaidOff),
        ])
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        assert_eq!(app.selected().unwrap().loan.loan_number, "LN-1");

        app.previous();
        assert_eq!(app.selected().unwrap().loan.loan_number, "LN-3");
        app.next();
        assert_eq!(app.selected().unwrap().loan.loan_number, "LN-1");
    }

    #[test]
    fn test_status_filter() {
        let mut app = app();

        app.apply_filter(Some(LoanStatus::PaidOff));
        assert_eq!(app.filtered.len(), 1);
        assert_eq!(app.selected().unwrap().loan.loan_number, "LN-3");

        app.apply_filter(Some(LoanStatus::Defaulted));
        assert!(app.selected().is_none());

        app.apply_filter(None);
        assert_eq!(app.filtered.len(), 3);
    }

    #[test]
    fn test_stats_weight_open_loans() {
        let stats = app().stats();

        assert_eq!(stats.active_count, 2);
        assert_eq!(stats.total_principal, 450_000.0);
        assert_eq!(stats.outstanding, 400_000.0);
        // (10 * 100k + 12 * 300k) / 400k
        assert!((stats.weighted_rate - 11.5).abs() < 1e-9);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long borrower name", 10), "a very ...");
    }
}
