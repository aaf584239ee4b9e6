use crate::cache::CacheStats;
use crate::loader::LoaderState;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    widgets::{Paragraph, Widget},
};

pub struct DebugState {
    pub num_events: usize,
    pub num_frames: usize,
    pub num_key_events: usize,
    pub last_key_event_name: String,
    pub enabled: bool,
    /// Snapshot taken by App at render time.
    pub loader_state: LoaderState,
    pub current_page: u32,
    pub in_flight_page: Option<u32>,
    pub stale_completions: usize,
    pub cache: CacheStats,
}

impl Default for DebugState {
    fn default() -> Self {
        Self {
            num_events: 0,
            num_frames: 0,
            num_key_events: 0,
            last_key_event_name: String::new(),
            enabled: false,
            loader_state: LoaderState::Idle,
            current_page: 0,
            in_flight_page: None,
            stale_completions: 0,
            cache: CacheStats::default(),
        }
    }
}

impl DebugState {
    pub fn on_key(&mut self, event: &crossterm::event::KeyEvent) {
        self.num_key_events += 1;
        self.last_key_event_name = format!("{:?}", event.code);
    }

    pub fn line(&self) -> String {
        let in_flight = self
            .in_flight_page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "events={} keys={} last_key={} frames={} loader={} page={} in_flight={} stale={} cache: hits={} joins={} fetches={} failures={}",
            self.num_events,
            self.num_key_events,
            self.last_key_event_name,
            self.num_frames,
            self.loader_state.label(),
            self.current_page,
            in_flight,
            self.stale_completions,
            self.cache.hits,
            self.cache.joins,
            self.cache.fetches,
            self.cache.failures,
        )
    }
}

impl Widget for &DebugState {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(self.line()).render(area, buf);
    }
}
