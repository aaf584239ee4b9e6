use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Top-level layout: optional title row, table, status row, control bar, optional debug row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppLayout {
    pub title: Rect,
    pub table: Rect,
    pub status: Rect,
    pub control_bar: Rect,
    pub debug: Option<Rect>,
}

pub fn app_layout(area: Rect, debug_enabled: bool) -> AppLayout {
    let mut constraints = vec![
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ];
    if debug_enabled {
        constraints.push(Constraint::Length(1));
    }

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    AppLayout {
        title: layout[0],
        table: layout[1],
        status: layout[2],
        control_bar: layout[3],
        debug: debug_enabled.then(|| layout[4]),
    }
}

/// Rows of data the table can show: its height minus the header row.
pub fn table_viewport_rows(table: Rect) -> u16 {
    table.height.saturating_sub(1)
}
