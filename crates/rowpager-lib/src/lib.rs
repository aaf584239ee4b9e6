use color_eyre::eyre::eyre;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::{mpsc::Sender, Arc};
use std::time::{Duration, Instant};

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Clear, Paragraph};
use ratatui::{buffer::Buffer, layout::Rect, widgets::Widget};

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod dal;
pub mod error;
pub mod error_display;
pub mod fetcher;
pub mod loader;
pub mod logging;
pub mod model;
mod render;
pub mod service;
pub mod source;
pub mod state;
pub mod store;
pub mod widgets;
pub mod window;

pub use cache::{CacheStats, Clock, ManualClock, PageCache, SystemClock};
pub use client::PageSource;
#[cfg(feature = "http")]
pub use client::HttpPageClient;
pub use config::{AppConfig, ConfigManager};
pub use error::{LoadError, LoadResult};
pub use loader::{FetchRequest, FetchTicket, LoaderState, ScrollEvent, ScrollLoader};
pub use model::{CellValue, DatasetMeta, PageResponse, Row};
pub use rowpager_cli::{Args, FileFormat};
pub use source::DataSource;
pub use state::StateManager;
pub use store::RowStore;

use loader::{LoaderSettings, SettleOutcome};
use render::layout::{app_layout, table_viewport_rows};
use widgets::controls::Controls;
use widgets::datatable::PagedTable;
use widgets::debug::DebugState;
use window::{RenderWindow, WindowGeometry};

/// Application name used for config, cache and log paths
pub const APP_NAME: &str = "rowpager";

/// One terminal line per row.
const ROW_HEIGHT: f64 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct OpenOptions {
    /// Dataset to select once the listing arrives. None = first by name.
    pub dataset: Option<String>,
    pub page_size: u32,
    pub cache_ttl: Duration,
    pub load_threshold: f64,
    pub cooldown: Duration,
    pub overscan: usize,
    pub request_timeout: Duration,
    /// Forces the format of local files instead of extension detection.
    pub format: Option<FileFormat>,
    pub row_numbers: bool,
    pub row_start_index: usize,
    pub table_cell_padding: u16,
    pub placeholder: String,
    pub debug: bool,
    pub log_level: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl OpenOptions {
    fn from_config(config: &AppConfig) -> Self {
        Self {
            dataset: None,
            page_size: config.source.page_size,
            cache_ttl: config.cache.ttl(),
            load_threshold: config.loader.threshold,
            cooldown: config.loader.cooldown(),
            overscan: config.display.overscan,
            request_timeout: config.source.request_timeout(),
            format: None,
            row_numbers: config.display.row_numbers,
            row_start_index: config.display.row_start_index,
            table_cell_padding: u16::try_from(config.display.table_cell_padding)
                .unwrap_or(u16::MAX),
            placeholder: config.display.placeholder.clone(),
            debug: config.debug.enabled,
            log_level: None,
        }
    }

    /// Create OpenOptions from CLI args and config, with CLI args taking precedence
    pub fn from_args_and_config(args: &Args, config: &AppConfig) -> Self {
        let mut opts = Self::from_config(config);

        opts.dataset = args.dataset.clone();
        if let Some(page_size) = args.page_size {
            opts.page_size = page_size;
        }
        if let Some(secs) = args.cache_ttl_secs {
            opts.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(threshold) = args.load_threshold {
            opts.load_threshold = threshold;
        }
        if let Some(ms) = args.cooldown_ms {
            opts.cooldown = Duration::from_millis(ms);
        }
        opts.overscan = args.overscan.unwrap_or(opts.overscan);
        if let Some(secs) = args.timeout_secs {
            opts.request_timeout = Duration::from_secs(secs);
        }

        // Format: CLI only (auto-detect from extension when not specified)
        opts.format = args.format;

        // Row numbers: CLI flag overrides config
        opts.row_numbers = args.row_numbers || opts.row_numbers;
        opts.row_start_index = args.row_start_index.unwrap_or(opts.row_start_index);

        opts.debug = args.debug || opts.debug;
        opts.log_level = args.log_level.clone();
        opts
    }

    /// Rejects values the loader cannot work with. Config values were
    /// checked by `AppConfig::validate`; this covers CLI overrides.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(eyre!("page size must be greater than 0"));
        }
        if !(self.load_threshold > 0.0 && self.load_threshold <= 1.0) {
            return Err(eyre!(
                "load threshold must be in (0, 1], got {}",
                self.load_threshold
            ));
        }
        Ok(())
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            threshold: self.load_threshold,
            cooldown: self.cooldown,
            row_height: ROW_HEIGHT,
            page_size: self.page_size,
        }
    }
}

impl From<&Args> for OpenOptions {
    fn from(args: &Args) -> Self {
        // Use default config if creating from args alone
        let config = AppConfig::default();
        Self::from_args_and_config(args, &config)
    }
}

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    /// Request the dataset listing (startup, or retry after a failed listing).
    LoadDatasets,
    DatasetsLoaded(LoadResult<Vec<DatasetMeta>>),
    SelectDataset(String),
    /// A fetch issued by the loader finished, successfully or not.
    PageSettled {
        ticket: FetchTicket,
        result: LoadResult<Arc<PageResponse>>,
    },
    /// Idle wake-up while work is pending (throbber, viewport fill after cooldown).
    Tick,
    Resize(u16, u16),
    Exit,
    Crash(String),
}

pub struct App {
    events: Sender<AppEvent>,
    cache: Arc<PageCache>,
    options: OpenOptions,
    loader: ScrollLoader,
    datasets: Vec<DatasetMeta>,
    selected: Option<usize>,
    listing_in_flight: bool,
    listing_error: Option<String>,
    scroll_top: usize,
    viewport_rows: usize,
    throbber_frame: u8,
    stale_completions: usize,
    state: Option<StateManager>,
    debug: DebugState,
}

impl App {
    pub fn new(events: Sender<AppEvent>, cache: Arc<PageCache>, options: OpenOptions) -> App {
        let debug = DebugState {
            enabled: options.debug,
            ..DebugState::default()
        };
        App {
            events,
            cache,
            loader: ScrollLoader::new(options.loader_settings()),
            options,
            datasets: Vec::new(),
            selected: None,
            listing_in_flight: false,
            listing_error: None,
            scroll_top: 0,
            viewport_rows: 0,
            throbber_frame: 0,
            stale_completions: 0,
            state: None,
            debug,
        }
    }

    /// Remember the selected dataset across runs.
    pub fn with_state(mut self, state: StateManager) -> App {
        self.state = Some(state);
        self
    }

    pub fn enable_debug(&mut self) {
        self.debug.enabled = true;
    }

    pub fn loader(&self) -> &ScrollLoader {
        &self.loader
    }

    pub fn datasets(&self) -> &[DatasetMeta] {
        &self.datasets
    }

    pub fn selected_dataset(&self) -> Option<&DatasetMeta> {
        self.selected.and_then(|i| self.datasets.get(i))
    }

    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    pub fn viewport_rows(&self) -> usize {
        self.viewport_rows
    }

    /// Normally set while rendering; exposed so the app can be driven headless.
    pub fn set_viewport_rows(&mut self, rows: usize) {
        self.viewport_rows = rows;
        self.clamp_scroll();
    }

    pub fn listing_error(&self) -> Option<&str> {
        self.listing_error.as_deref()
    }

    pub fn stale_completions(&self) -> usize {
        self.stale_completions
    }

    pub fn busy(&self) -> bool {
        self.listing_in_flight || self.loader.in_flight().is_some()
    }

    /// True while an idle `Tick` could change something on screen.
    pub fn wants_tick(&self) -> bool {
        self.busy()
            || self.loader.has_deferred_load()
            || (self.loader.state() == LoaderState::Ready
                && self.loader.store().has_more()
                && self.loader.loaded_height() < self.viewport_rows as f64)
    }

    fn item_count(&self) -> usize {
        let store = self.loader.store();
        RenderWindow::item_count(store.len(), store.has_more())
    }

    fn max_scroll_top(&self) -> usize {
        self.item_count().saturating_sub(self.viewport_rows)
    }

    fn clamp_scroll(&mut self) {
        self.scroll_top = self.scroll_top.min(self.max_scroll_top());
    }

    fn dispatch(&mut self, request: FetchRequest) {
        tracing::debug!(
            dataset_id = request.dataset_id(),
            page = request.page(),
            limit = request.limit,
            "dispatching page fetch"
        );
        fetcher::spawn_page_fetch(self.cache.clone(), request, self.events.clone());
    }

    fn scroll_to(&mut self, top: usize, programmatic: bool) {
        self.scroll_top = top.min(self.max_scroll_top());
        let viewport = self.viewport_rows as f64;
        let offset = self.scroll_top as f64 * ROW_HEIGHT;
        let event = if programmatic {
            ScrollEvent::programmatic(offset, viewport)
        } else {
            ScrollEvent::user(offset, viewport)
        };
        if let Some(request) = self.loader.on_scroll(event, Instant::now()) {
            self.dispatch(request);
        }
    }

    fn scroll_by(&mut self, delta: isize) {
        let top = self.scroll_top.saturating_add_signed(delta);
        self.scroll_to(top, false);
    }

    fn page_rows(&self) -> isize {
        isize::try_from(self.viewport_rows.max(1)).unwrap_or(1)
    }

    /// Id of the dataset `step` positions away from the selection, wrapping.
    fn neighbour_dataset(&self, step: isize) -> Option<String> {
        let n = self.datasets.len();
        if n < 2 {
            return None;
        }
        let current = self.selected.unwrap_or(0);
        let step = step.rem_euclid(n as isize) as usize;
        Some(self.datasets[(current + step) % n].id.clone())
    }

    fn key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        self.debug.on_key(event);

        if event.modifiers.contains(KeyModifiers::CONTROL) {
            return match event.code {
                KeyCode::Char('c') => Some(AppEvent::Exit),
                KeyCode::Char('d') | KeyCode::Char('f') => {
                    self.scroll_by(self.page_rows());
                    None
                }
                KeyCode::Char('u') | KeyCode::Char('b') => {
                    self.scroll_by(-self.page_rows());
                    None
                }
                _ => None,
            };
        }

        match event.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(AppEvent::Exit),
            KeyCode::Down | KeyCode::Char('j') => {
                self.scroll_by(1);
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.scroll_by(-1);
                None
            }
            KeyCode::PageDown => {
                self.scroll_by(self.page_rows());
                None
            }
            KeyCode::PageUp => {
                self.scroll_by(-self.page_rows());
                None
            }
            KeyCode::Home | KeyCode::Char('g') => {
                self.scroll_to(0, false);
                None
            }
            KeyCode::End | KeyCode::Char('G') => {
                self.scroll_to(usize::MAX, false);
                None
            }
            KeyCode::Tab => self.neighbour_dataset(1).map(AppEvent::SelectDataset),
            KeyCode::BackTab => self.neighbour_dataset(-1).map(AppEvent::SelectDataset),
            KeyCode::Char('r') => {
                if self.listing_error.is_some() && !self.listing_in_flight {
                    return Some(AppEvent::LoadDatasets);
                }
                if let Some(request) = self.loader.retry() {
                    tracing::info!(page = request.page(), "retrying failed page");
                    self.dispatch(request);
                }
                None
            }
            KeyCode::Char('R') => {
                let id = self.loader.store().dataset_id()?.to_string();
                let dropped = self.cache.invalidate(&id);
                tracing::info!(dataset_id = %id, dropped, "reloading dataset");
                Some(AppEvent::SelectDataset(id))
            }
            _ => None,
        }
    }

    fn on_datasets_loaded(&mut self, result: &LoadResult<Vec<DatasetMeta>>) -> Option<AppEvent> {
        self.listing_in_flight = false;
        let datasets = match result {
            Ok(datasets) => datasets,
            Err(e) => {
                self.listing_error = Some(error_display::user_message_from_load_error(e));
                return None;
            }
        };
        tracing::info!(count = datasets.len(), "datasets listed");
        self.datasets = datasets.clone();
        self.listing_error = None;

        if self.datasets.is_empty() {
            self.listing_error = Some("No datasets available. Press r to reload.".to_string());
            return None;
        }
        let wanted = self.options.dataset.clone();
        let initial = match wanted {
            Some(id) if self.datasets.iter().any(|d| d.id == id) => id,
            Some(id) => {
                self.listing_error = Some(format!("Dataset not found: {}", id));
                self.datasets[0].id.clone()
            }
            None => self
                .remembered_dataset()
                .unwrap_or_else(|| self.datasets[0].id.clone()),
        };
        Some(AppEvent::SelectDataset(initial))
    }

    /// Dataset saved by a previous run, if it is still listed.
    fn remembered_dataset(&self) -> Option<String> {
        let id = match self.state.as_ref()?.load_last_dataset() {
            Ok(id) => id?,
            Err(e) => {
                tracing::warn!(error = %e, "could not read last dataset");
                return None;
            }
        };
        if self.datasets.iter().any(|d| d.id == id) {
            tracing::debug!(dataset_id = %id, "restoring last dataset");
            Some(id)
        } else {
            None
        }
    }

    fn select_dataset(&mut self, id: &str) {
        let Some(index) = self.datasets.iter().position(|d| d.id == id) else {
            self.listing_error = Some(format!("Dataset not found: {}", id));
            return;
        };
        self.selected = Some(index);
        if let Some(state) = &self.state {
            if let Err(e) = state.save_last_dataset(id) {
                tracing::warn!(error = %e, "could not save last dataset");
            }
        }
        let request = self.loader.select_dataset(id);
        self.loader
            .hint_headers(&self.datasets[index].column_headers);
        self.scroll_to(0, true);
        self.dispatch(request);
    }

    fn on_page_settled(&mut self, ticket: &FetchTicket, result: &LoadResult<Arc<PageResponse>>) {
        let now = Instant::now();
        match self.loader.on_page_settled(ticket, result.clone(), now) {
            SettleOutcome::Ignored => self.stale_completions += 1,
            SettleOutcome::Applied { .. } => self.clamp_scroll(),
            SettleOutcome::Failed { .. } => {}
        }
    }

    pub fn event(&mut self, event: &AppEvent) -> Option<AppEvent> {
        self.debug.num_events += 1;

        match event {
            AppEvent::Key(key) => self.key(key),
            AppEvent::LoadDatasets => {
                self.listing_in_flight = true;
                self.listing_error = None;
                fetcher::spawn_dataset_listing(self.cache.clone(), self.events.clone());
                None
            }
            AppEvent::DatasetsLoaded(result) => self.on_datasets_loaded(result),
            AppEvent::SelectDataset(id) => {
                self.select_dataset(id);
                None
            }
            AppEvent::PageSettled { ticket, result } => {
                self.on_page_settled(ticket, result);
                None
            }
            AppEvent::Tick => {
                let viewport = self.viewport_rows as f64;
                if let Some(request) = self.loader.fill_viewport(viewport, Instant::now()) {
                    self.dispatch(request);
                }
                None
            }
            AppEvent::Resize(_, _) => None,
            AppEvent::Exit | AppEvent::Crash(_) => None,
        }
    }

    fn status_line(&self) -> Line<'static> {
        let error_style = Style::default().fg(Color::Red);
        if let Some(msg) = &self.listing_error {
            return Line::from(Span::styled(msg.clone(), error_style));
        }
        let store = self.loader.store();
        if let Some(msg) = store.last_error() {
            return Line::from(Span::styled(format!("{} (r to retry)", msg), error_style));
        }
        if self.listing_in_flight {
            return Line::from("Listing datasets...");
        }
        let mut text = self.loader.state().label().to_string();
        if store.current_page() > 0 {
            text.push_str(&format!("  page {}", store.current_page()));
        }
        if self.datasets.len() > 1 {
            let position = self.selected.map(|i| i + 1).unwrap_or(0);
            text.push_str(&format!("  dataset {}/{}", position, self.datasets.len()));
        }
        Line::from(Span::styled(text, Style::default().fg(Color::Gray)))
    }

    fn title_line(&self) -> Line<'static> {
        let mut spans = vec![Span::styled(
            format!(" {} ", APP_NAME),
            Style::default().add_modifier(Modifier::BOLD),
        )];
        if let Some(meta) = self.selected_dataset() {
            spans.push(Span::styled(
                meta.name.clone(),
                Style::default().fg(Color::Cyan),
            ));
            if !meta.description.is_empty() {
                spans.push(Span::raw(format!(": {}", meta.description)));
            }
        }
        Line::from(spans)
    }
}

impl Widget for &mut App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.debug.num_frames += 1;

        Clear.render(area, buf);

        let layout = app_layout(area, self.debug.enabled);
        self.viewport_rows = usize::from(table_viewport_rows(layout.table));
        self.clamp_scroll();

        Paragraph::new(self.title_line()).render(layout.title, buf);

        let store = self.loader.store();
        let geometry = WindowGeometry {
            row_height: ROW_HEIGHT,
            overscan: self.options.overscan,
        };
        // No placeholder slot until the first page lands; the empty message covers it.
        let window = if store.is_initial_loading() && store.is_empty() {
            RenderWindow::compute(geometry, 0, false, 0.0, self.viewport_rows as f64)
        } else {
            RenderWindow::compute(
                geometry,
                store.len(),
                store.has_more(),
                self.scroll_top as f64 * ROW_HEIGHT,
                self.viewport_rows as f64,
            )
        };
        let empty_message = if store.is_initial_loading() || self.listing_in_flight {
            "Loading..."
        } else {
            "No rows"
        };
        PagedTable::new(store.headers(), store.rows(), &window)
            .with_row_numbers(self.options.row_numbers, self.options.row_start_index)
            .with_cell_padding(self.options.table_cell_padding)
            .with_placeholder(&self.options.placeholder)
            .with_empty_message(empty_message)
            .render(layout.table, buf);

        Paragraph::new(self.status_line()).render(layout.status, buf);

        let use_unicode_throbber = std::env::var("LANG")
            .map(|l| l.to_uppercase().contains("UTF-8"))
            .unwrap_or(false);
        let busy = self.busy();
        if busy {
            self.throbber_frame = self.throbber_frame.wrapping_add(1);
        }
        let controls = Controls::with_counts(self.loader.store().len(), self.loader.store().total_count())
            .with_unicode_throbber(use_unicode_throbber)
            .with_busy(busy, self.throbber_frame);
        (&controls).render(layout.control_bar, buf);

        if let Some(debug_area) = layout.debug {
            self.debug.loader_state = self.loader.state();
            self.debug.current_page = self.loader.store().current_page();
            self.debug.in_flight_page = self.loader.in_flight().map(|t| t.page);
            self.debug.stale_completions = self.stale_completions;
            self.debug.cache = self.cache.stats();
            (&self.debug).render(debug_area, buf);
        }
    }
}

/// Builds the page source for `source`: an HTTP client for a dataset API,
/// or an in-process service over local files.
pub fn open_source(source: &DataSource, options: &OpenOptions) -> Result<Arc<dyn PageSource>> {
    match source {
        #[cfg(feature = "http")]
        DataSource::Remote(url) => Ok(Arc::new(
            HttpPageClient::new(url.clone()).with_timeout(options.request_timeout),
        )),
        #[cfg(not(feature = "http"))]
        DataSource::Remote(url) => Err(eyre!(
            "{} was built without HTTP support; cannot open {}",
            APP_NAME,
            url
        )),
        DataSource::Local(paths) => {
            for path in paths {
                if !path.exists() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("File not found: {}", path.display()),
                    )
                    .into());
                }
            }
            let store = dal::FrameStore::from_paths(paths, options.format).map_err(|e| {
                eyre!(
                    "{}",
                    error_display::user_message_from_polars(&e)
                )
            })?;
            Ok(Arc::new(service::LocalPageSource::new(Arc::new(store))))
        }
    }
}

/// Run the TUI against `source` until the user quits.
pub fn run(source: Arc<dyn PageSource>, options: OpenOptions, config: &AppConfig) -> Result<()> {
    use std::sync::mpsc;

    let cache = Arc::new(PageCache::new(source).with_ttl(options.cache_ttl));

    let mut terminal = ratatui::try_init().map_err(|e| {
        eyre!(
            "{} requires an interactive terminal (TTY). No terminal detected: {}. \
             Run from a terminal or ensure stdout is connected to a TTY.",
            APP_NAME,
            e
        )
    })?;
    let (tx, rx) = mpsc::channel::<AppEvent>();
    let mut app = App::new(tx.clone(), cache, options);
    match StateManager::new(APP_NAME) {
        Ok(state) => app = app.with_state(state),
        Err(e) => tracing::debug!(error = %e, "not remembering the selected dataset"),
    }

    terminal.draw(|frame| frame.render_widget(&mut app, frame.area()))?;
    tx.send(AppEvent::LoadDatasets)?;

    let poll_interval = Duration::from_millis(config.performance.event_poll_interval_ms);
    loop {
        if crossterm::event::poll(poll_interval)? {
            match crossterm::event::read()? {
                crossterm::event::Event::Key(key) => {
                    if key.is_press() {
                        tx.send(AppEvent::Key(key))?
                    }
                }
                crossterm::event::Event::Resize(cols, rows) => {
                    tx.send(AppEvent::Resize(cols, rows))?
                }
                _ => {}
            }
        }

        let updated = match rx.recv_timeout(Duration::from_millis(0)) {
            Ok(event) => {
                match event {
                    AppEvent::Exit => break,
                    AppEvent::Crash(msg) => {
                        ratatui::restore();
                        return Err(eyre!(msg));
                    }
                    event => {
                        if let Some(next) = app.event(&event) {
                            tx.send(next)?;
                        }
                    }
                }
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if app.wants_tick() {
                    app.event(&AppEvent::Tick);
                    true
                } else {
                    false
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if updated {
            terminal.draw(|frame| frame.render_widget(&mut app, frame.area()))?;
        }
    }

    ratatui::restore();
    Ok(())
}
