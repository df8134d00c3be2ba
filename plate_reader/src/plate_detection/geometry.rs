use opencv::core::{Point, Rect};

/// Minimum room above a box before its label is placed on top of it.
const LABEL_HEADROOM: i32 = 40;
const LABEL_ABOVE_OFFSET: i32 = 20;
const LABEL_BELOW_OFFSET: i32 = 50;

/// Axis-aligned box in pixel coordinates, corners inclusive-exclusive
/// (`x1..x2`, `y1..y2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlateBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PlateBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::new(rect.x, rect.y, rect.x + rect.width, rect.y + rect.height)
    }

    /// Saturates instead of overflowing for boxes spanning most of `i32`.
    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }

    /// True for zero-area or inverted boxes.
    pub fn is_degenerate(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    /// Clips the box to a `cols` x `rows` frame. Returns `None` when nothing
    /// of the box is left inside the frame.
    pub fn clamp_to(&self, cols: i32, rows: i32) -> Option<PlateBox> {
        let cols = cols.max(0);
        let rows = rows.max(0);
        let clamped = PlateBox::new(
            self.x1.clamp(0, cols),
            self.y1.clamp(0, rows),
            self.x2.clamp(0, cols),
            self.y2.clamp(0, rows),
        );

        if clamped.is_degenerate() {
            None
        } else {
            Some(clamped)
        }
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x1, self.y1, self.width(), self.height())
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    pub fn bottom_right(&self) -> Point {
        Point::new(self.x2, self.y2)
    }
}

/// Where the recognised text goes: above the box when there is headroom,
/// below it otherwise so the label never falls off the top edge.
pub fn text_anchor(bbox: &PlateBox) -> Point {
    let y = if bbox.y1.saturating_sub(LABEL_HEADROOM) > 0 {
        bbox.y1 - LABEL_ABOVE_OFFSET
    } else {
        bbox.y2.saturating_add(LABEL_BELOW_OFFSET)
    };
    Point::new(bbox.x1, y)
}
