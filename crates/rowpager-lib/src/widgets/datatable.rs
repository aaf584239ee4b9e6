//! Table widget over the render window. Only the window's slots are turned
//! into ratatui rows; the viewport starts at the first visible slot, the rest
//! is overscan.

use crate::model::Row;
use crate::window::{RenderWindow, Slot};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Cell, Paragraph, Row as TableRow, StatefulWidget, Table, TableState, Widget},
};

const MAX_COLUMN_WIDTH: u16 = 40;
const SKELETON: &str = "···";

pub struct PagedTable<'a> {
    headers: &'a [String],
    rows: &'a [Row],
    window: &'a RenderWindow,
    row_numbers: bool,
    row_start_index: usize,
    cell_padding: u16,
    placeholder: &'a str,
    header_style: Style,
    placeholder_style: Style,
    row_number_style: Style,
    empty_message: &'a str,
}

impl<'a> PagedTable<'a> {
    pub fn new(headers: &'a [String], rows: &'a [Row], window: &'a RenderWindow) -> Self {
        Self {
            headers,
            rows,
            window,
            row_numbers: false,
            row_start_index: 1,
            cell_padding: 2,
            placeholder: "Loading more...",
            header_style: Style::default()
                .fg(Color::White)
                .bg(Color::Indexed(235))
                .add_modifier(Modifier::BOLD),
            placeholder_style: Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::DIM),
            row_number_style: Style::default().fg(Color::DarkGray),
            empty_message: "No rows",
        }
    }

    pub fn with_row_numbers(mut self, enabled: bool, start_index: usize) -> Self {
        self.row_numbers = enabled;
        self.row_start_index = start_index;
        self
    }

    pub fn with_cell_padding(mut self, padding: u16) -> Self {
        self.cell_padding = padding;
        self
    }

    pub fn with_placeholder(mut self, text: &'a str) -> Self {
        self.placeholder = text;
        self
    }

    pub fn with_empty_message(mut self, text: &'a str) -> Self {
        self.empty_message = text;
        self
    }

    fn cell_text(&self, row: &Row, header: &str) -> String {
        row.get(header).map(|v| v.to_string()).unwrap_or_default()
    }

    /// Widths from the header and the materialized rows only. The first
    /// column also fits the placeholder text when a placeholder is shown.
    fn column_widths(&self) -> Vec<u16> {
        let placeholder_width = if self.window.slots().any(Slot::is_placeholder) {
            self.placeholder.chars().count()
        } else {
            0
        };
        self.headers
            .iter()
            .enumerate()
            .map(|(n, h)| {
                let data_width = self
                    .window
                    .slots()
                    .filter_map(|slot| match slot {
                        Slot::Row(i) => self.rows.get(i),
                        Slot::Placeholder(_) => None,
                    })
                    .map(|row| self.cell_text(row, h).chars().count())
                    .max()
                    .unwrap_or(0);
                let min_width = if n == 0 { placeholder_width } else { 0 };
                (data_width.max(h.chars().count()).max(min_width) as u16)
                    .clamp(3, MAX_COLUMN_WIDTH)
            })
            .collect()
    }

    fn row_number_width(&self) -> u16 {
        let last = self.row_start_index + self.window.end;
        last.to_string().len() as u16
    }

    fn build_row(&self, slot: Slot) -> TableRow<'a> {
        let mut cells: Vec<Cell> = Vec::with_capacity(self.headers.len() + 1);
        if self.row_numbers {
            cells.push(
                Cell::from(Line::from((self.row_start_index + slot.index()).to_string()).right_aligned())
                    .style(self.row_number_style),
            );
        }
        match slot {
            Slot::Row(i) => {
                if let Some(row) = self.rows.get(i) {
                    cells.extend(self.headers.iter().map(|h| Cell::from(self.cell_text(row, h))));
                }
                TableRow::new(cells)
            }
            Slot::Placeholder(_) => {
                for (n, _) in self.headers.iter().enumerate() {
                    let text = if n == 0 { self.placeholder } else { SKELETON };
                    cells.push(Cell::from(text));
                }
                TableRow::new(cells).style(self.placeholder_style)
            }
        }
    }
}

impl Widget for PagedTable<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.window.is_empty() || self.headers.is_empty() {
            Paragraph::new(self.empty_message)
                .style(self.placeholder_style)
                .centered()
                .render(area, buf);
            return;
        }

        let mut widths: Vec<Constraint> = Vec::with_capacity(self.headers.len() + 1);
        if self.row_numbers {
            widths.push(Constraint::Length(self.row_number_width()));
        }
        widths.extend(self.column_widths().into_iter().map(Constraint::Length));

        let mut header_cells: Vec<Cell> = Vec::with_capacity(self.headers.len() + 1);
        if self.row_numbers {
            header_cells.push(Cell::from(""));
        }
        header_cells.extend(self.headers.iter().map(|h| Cell::from(h.as_str())));
        let header = TableRow::new(header_cells).style(self.header_style);

        let rows: Vec<TableRow> = self.window.slots().map(|slot| self.build_row(slot)).collect();
        let first_visible = self.window.visible.map(|(first, _)| first).unwrap_or(0);
        let mut state = TableState::default().with_offset(first_visible - self.window.start);

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(self.cell_padding);
        StatefulWidget::render(table, area, buf, &mut state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellValue;
    use crate::window::WindowGeometry;

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".to_string(), CellValue::Int(i as i64));
                row.insert("name".to_string(), CellValue::Text(format!("row{i}")));
                row
            })
            .collect()
    }

    fn render_lines(table: PagedTable<'_>, width: u16, height: u16) -> Vec<String> {
        let area = Rect::new(0, 0, width, height);
        let mut buf = Buffer::empty(area);
        table.render(area, &mut buf);
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| buf[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn test_renders_visible_rows_from_offset() {
        let headers = vec!["id".to_string(), "name".to_string()];
        let data = rows(100);
        let geometry = WindowGeometry {
            row_height: 1.0,
            overscan: 3,
        };
        let window = RenderWindow::compute(geometry, data.len(), true, 50.0, 4.0);
        let lines = render_lines(PagedTable::new(&headers, &data, &window), 30, 5);
        assert!(lines[0].contains("name"));
        assert!(lines[1].contains("row50"), "got: {:?}", lines);
        assert!(lines[4].contains("row53"));
    }

    #[test]
    fn test_trailing_placeholder_is_drawn() {
        let headers = vec!["id".to_string(), "name".to_string()];
        let data = rows(3);
        let window = RenderWindow::compute(WindowGeometry::default(), data.len(), true, 0.0, 10.0);
        let lines = render_lines(
            PagedTable::new(&headers, &data, &window)
                .with_placeholder("Loading more...")
                .with_row_numbers(true, 1),
            40,
            6,
        );
        assert!(lines[1].contains("row0"));
        assert!(lines[4].contains("Loading"), "got: {:?}", lines);
        assert!(lines[4].trim_start().starts_with('4'));
    }

    #[test]
    fn test_empty_state() {
        let headers: Vec<String> = Vec::new();
        let window = RenderWindow::compute(WindowGeometry::default(), 0, false, 0.0, 10.0);
        let lines = render_lines(
            PagedTable::new(&headers, &[], &window).with_empty_message("No rows"),
            20,
            3,
        );
        assert!(lines.iter().any(|l| l.contains("No rows")));
    }
}
