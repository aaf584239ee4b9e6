//! Virtualized render window: which logical items to materialize for a given
//! scroll offset, independent of how they are drawn.

/// One materialized position in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A loaded row, by index into the row store.
    Row(usize),
    /// A position with no row yet (the trailing "loading more" item).
    Placeholder(usize),
}

impl Slot {
    pub fn index(self) -> usize {
        match self {
            Slot::Row(i) | Slot::Placeholder(i) => i,
        }
    }

    pub fn is_placeholder(self) -> bool {
        matches!(self, Slot::Placeholder(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowGeometry {
    pub row_height: f64,
    pub overscan: usize,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            row_height: 1.0,
            overscan: 5,
        }
    }
}

/// Items to render: the visible range widened by the overscan on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderWindow {
    /// First and last item intersecting the viewport (inclusive), if any.
    pub visible: Option<(usize, usize)>,
    pub start: usize,
    pub end: usize,
    pub item_count: usize,
    loaded: usize,
}

impl RenderWindow {
    /// Logical item count: every loaded row plus one trailing slot while more
    /// rows exist.
    pub fn item_count(loaded: usize, has_more: bool) -> usize {
        loaded + usize::from(has_more)
    }

    pub fn compute(
        geometry: WindowGeometry,
        loaded: usize,
        has_more: bool,
        scroll_offset: f64,
        viewport_height: f64,
    ) -> Self {
        let item_count = Self::item_count(loaded, has_more);
        if item_count == 0 || viewport_height <= 0.0 || geometry.row_height <= 0.0 {
            return Self {
                visible: None,
                start: 0,
                end: 0,
                item_count,
                loaded,
            };
        }
        let offset = scroll_offset.max(0.0);
        let first = ((offset / geometry.row_height).floor() as usize).min(item_count - 1);
        let bottom = offset + viewport_height;
        let last = ((bottom / geometry.row_height).ceil() as usize)
            .saturating_sub(1)
            .clamp(first, item_count - 1);
        Self {
            visible: Some((first, last)),
            start: first.saturating_sub(geometry.overscan),
            end: (last + 1 + geometry.overscan).min(item_count),
            item_count,
            loaded,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        (self.start..self.end).map(move |i| {
            if i < self.loaded {
                Slot::Row(i)
            } else {
                Slot::Placeholder(i)
            }
        })
    }
}
