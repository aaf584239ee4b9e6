use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Paragraph, Widget},
};

const DEFAULT_CONTROLS: [(&str, &str); 6] = [
    ("↑↓", "Scroll"),
    ("PgDn", "Page"),
    ("g", "Top"),
    ("Tab", "Dataset"),
    ("r", "Retry"),
    ("q", "Quit"),
];

const COUNT_WIDTH: u16 = 28;
const THROBBER_WIDTH: u16 = 3;

/// Bottom bar: key hints, loaded/total row counts and a busy throbber.
pub struct Controls {
    pub loaded: usize,
    pub total: Option<u64>,
    pub bg_color: Color,
    pub key_color: Color,
    pub label_color: Color,
    pub throbber_color: Color,
    pub use_unicode_throbber: bool,
    pub busy: bool,
    pub throbber_frame: u8,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            loaded: 0,
            total: None,
            bg_color: Color::Indexed(236),
            key_color: Color::Cyan,
            label_color: Color::White,
            throbber_color: Color::Cyan,
            use_unicode_throbber: false,
            busy: false,
            throbber_frame: 0,
        }
    }
}

impl Controls {
    pub fn with_counts(loaded: usize, total: Option<u64>) -> Self {
        Self {
            loaded,
            total,
            ..Self::default()
        }
    }

    pub fn with_busy(mut self, busy: bool, throbber_frame: u8) -> Self {
        self.busy = busy;
        self.throbber_frame = throbber_frame;
        self
    }

    pub fn with_unicode_throbber(mut self, use_unicode: bool) -> Self {
        self.use_unicode_throbber = use_unicode;
        self
    }

    pub fn count_text(&self) -> String {
        match self.total {
            Some(total) => format!(
                "Rows: {} / {}",
                format_number_with_commas(self.loaded as u64),
                format_number_with_commas(total)
            ),
            None => format!("Rows: {}", format_number_with_commas(self.loaded as u64)),
        }
    }
}

impl Widget for &Controls {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let base = Style::default().bg(self.bg_color);
        Block::default().style(base).render(area, buf);

        // Pairs are never shrunk: key + space, label + space.
        let pair_width = |(key, action): &(&str, &str)| -> u16 {
            (key.chars().count() as u16 + 1) + (action.chars().count() as u16 + 1)
        };
        let mut available = area.width.saturating_sub(COUNT_WIDTH + THROBBER_WIDTH);
        let n_show = DEFAULT_CONTROLS
            .iter()
            .take_while(|pair| {
                let need = pair_width(pair);
                if available >= need {
                    available -= need;
                    true
                } else {
                    false
                }
            })
            .count();

        let mut constraints: Vec<Constraint> = DEFAULT_CONTROLS
            .iter()
            .take(n_show)
            .flat_map(|(key, action)| {
                [
                    Constraint::Length(key.chars().count() as u16 + 1),
                    Constraint::Length(action.chars().count() as u16 + 1),
                ]
            })
            .collect();
        constraints.push(Constraint::Fill(1));
        constraints.push(Constraint::Length(COUNT_WIDTH));
        constraints.push(Constraint::Length(THROBBER_WIDTH));
        let layout = Layout::new(Direction::Horizontal, constraints).split(area);

        let key_style = base.fg(self.key_color);
        let label_style = base.fg(self.label_color);
        for (i, (key, action)) in DEFAULT_CONTROLS.iter().take(n_show).enumerate() {
            Paragraph::new(*key).style(key_style).render(layout[i * 2], buf);
            Paragraph::new(*action)
                .style(label_style)
                .render(layout[i * 2 + 1], buf);
        }

        let fill_idx = n_show * 2;
        Paragraph::new(self.count_text())
            .style(label_style)
            .right_aligned()
            .render(layout[fill_idx + 1], buf);

        const THROBBER_ASCII: [char; 4] = ['|', '/', '-', '\\'];
        const THROBBER_BRAILLE_EIGHT: [char; 8] = ['⣷', '⣯', '⣟', '⡿', '⢿', '⣻', '⣽', '⣾'];
        let throbber_ch = if !self.busy {
            ' '
        } else if self.use_unicode_throbber {
            THROBBER_BRAILLE_EIGHT[self.throbber_frame as usize % 8]
        } else {
            THROBBER_ASCII[self.throbber_frame as usize % 4]
        };
        Paragraph::new(throbber_ch.to_string())
            .style(base.fg(self.throbber_color))
            .centered()
            .render(layout[fill_idx + 2], buf);
    }
}

pub fn format_number_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, ch) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_with_commas() {
        assert_eq!(format_number_with_commas(0), "0");
        assert_eq!(format_number_with_commas(999), "999");
        assert_eq!(format_number_with_commas(2500), "2,500");
        assert_eq!(format_number_with_commas(1_000_000), "1,000,000");
    }

    #[test]
    fn test_count_text() {
        assert_eq!(
            Controls::with_counts(2000, Some(2500)).count_text(),
            "Rows: 2,000 / 2,500"
        );
        assert_eq!(Controls::with_counts(10, None).count_text(), "Rows: 10");
    }

    #[test]
    fn test_render_shows_counts() {
        let area = Rect::new(0, 0, 100, 1);
        let mut buf = Buffer::empty(area);
        (&Controls::with_counts(1000, Some(2500))).render(area, &mut buf);
        let line: String = (0..area.width)
            .map(|x| buf[(x, 0)].symbol().to_string())
            .collect();
        assert!(line.contains("Rows: 1,000 / 2,500"), "got: {line}");
        assert!(line.contains("Quit"));
    }
}
