use std::fmt;
use std::ops::RangeInclusive;

use crate::error::{Result, TableError};

/// Logical grid address. Coordinates may be negative or sparse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub column: i32,
    pub row: i32,
}

impl Position {
    pub const fn new(column: i32, row: i32) -> Self {
        Self { column, row }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.column, self.row)
    }
}

impl From<(i32, i32)> for Position {
    fn from((column, row): (i32, i32)) -> Self {
        Self { column, row }
    }
}

/// Pixel offset on the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, other: Point) -> Point {
        Point {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn shrink(self, dx: i32, dy: i32) -> Size {
        Size {
            width: (self.width - dx).max(0),
            height: (self.height - dy).max(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            width: size.width,
            height: size.height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// Inclusive rectangle in grid coordinates, used for the occupied region of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Section {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Section {
    /// Upper bound for passes that touch every position of a section, such as gap
    /// filling and HTML export.
    pub const MAX_VISITED_POSITIONS: u128 = 1 << 24;

    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Smallest section covering every position, or `None` when there are none.
    pub fn enclosing<I>(positions: I) -> Option<Section>
    where
        I: IntoIterator<Item = Position>,
    {
        positions.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Section::new(p.column, p.row, p.column, p.row),
                Some(s) => Section {
                    left: s.left.min(p.column),
                    top: s.top.min(p.row),
                    right: s.right.max(p.column),
                    bottom: s.bottom.max(p.row),
                },
            })
        })
    }

    pub fn columns(&self) -> RangeInclusive<i32> {
        self.left..=self.right
    }

    pub fn rows(&self) -> RangeInclusive<i32> {
        self.top..=self.bottom
    }

    pub fn column_count(&self) -> u64 {
        span(self.left, self.right)
    }

    pub fn row_count(&self) -> u64 {
        span(self.top, self.bottom)
    }

    /// Number of positions covered. A section over the whole `i32` plane does not fit `u64`.
    pub fn position_count(&self) -> u128 {
        u128::from(self.column_count()) * u128::from(self.row_count())
    }

    /// Fails with `RegionTooLarge` when visiting every position would exceed
    /// [`Section::MAX_VISITED_POSITIONS`].
    pub fn ensure_visitable(&self) -> Result<()> {
        if self.position_count() > Self::MAX_VISITED_POSITIONS {
            return Err(TableError::RegionTooLarge {
                columns: self.column_count(),
                rows: self.row_count(),
            });
        }
        Ok(())
    }

    pub fn contains(&self, position: Position) -> bool {
        self.columns().contains(&position.column) && self.rows().contains(&position.row)
    }

    /// Radii for the cell at `position`: only the four extreme cells get a non-zero corner.
    pub fn corner_radii(&self, position: Position, radius: u32) -> CornerRadii {
        let on = |column: i32, row: i32| {
            if position.column == column && position.row == row {
                radius
            } else {
                0
            }
        };
        CornerRadii {
            top_left: on(self.left, self.top),
            top_right: on(self.right, self.top),
            bottom_left: on(self.left, self.bottom),
            bottom_right: on(self.right, self.bottom),
        }
    }
}

fn span(start: i32, end: i32) -> u64 {
    (i64::from(end) - i64::from(start) + 1).max(0) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CornerRadii {
    pub top_left: u32,
    pub top_right: u32,
    pub bottom_left: u32,
    pub bottom_right: u32,
}

impl CornerRadii {
    pub const ZERO: CornerRadii = CornerRadii {
        top_left: 0,
        top_right: 0,
        bottom_left: 0,
        bottom_right: 0,
    };

    pub const fn uniform(radius: u32) -> Self {
        Self {
            top_left: radius,
            top_right: radius,
            bottom_left: radius,
            bottom_right: radius,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == CornerRadii::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    pub fn to_css(&self) -> String {
        match self.a {
            255 => format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b),
            0 => "transparent".to_string(),
            a => format!(
                "rgba({}, {}, {}, {:.3})",
                self.r,
                self.g,
                self.b,
                a as f32 / 255.0
            ),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enclosing_section_of_nothing_is_none() {
        assert_eq!(Section::enclosing(std::iter::empty()), None);
    }

    #[test]
    fn enclosing_section_spans_negative_and_sparse_positions() {
        let section = Section::enclosing([
            Position::new(3, -1),
            Position::new(-2, 4),
            Position::new(0, 0),
        ])
        .unwrap();
        assert_eq!(section, Section::new(-2, -1, 3, 4));
        assert_eq!(section.column_count(), 6);
        assert_eq!(section.row_count(), 6);
        assert!(section.contains(Position::new(-2, 4)));
        assert!(!section.contains(Position::new(4, 0)));
    }

    #[test]
    fn counts_cover_the_full_coordinate_range() {
        let wide = Section::new(i32::MIN, 0, i32::MAX, 0);
        assert_eq!(wide.column_count(), 1 << 32);
        assert_eq!(wide.row_count(), 1);
        assert!(matches!(
            wide.ensure_visitable(),
            Err(TableError::RegionTooLarge { columns, rows: 1 }) if columns == 1 << 32
        ));

        let plane = Section::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(plane.position_count(), 1 << 64);
        assert!(Section::new(0, 0, 4095, 4095).ensure_visitable().is_ok());
        assert!(Section::new(0, 0, 4096, 4095).ensure_visitable().is_err());
    }

    #[test]
    fn corner_radii_only_touch_extreme_cells() {
        let section = Section::new(0, 0, 2, 1);
        assert_eq!(
            section.corner_radii(Position::new(0, 0), 8),
            CornerRadii {
                top_left: 8,
                ..CornerRadii::ZERO
            }
        );
        assert!(section.corner_radii(Position::new(1, 0), 8).is_zero());
        assert_eq!(
            section.corner_radii(Position::new(2, 1), 8),
            CornerRadii {
                bottom_right: 8,
                ..CornerRadii::ZERO
            }
        );
    }

    #[test]
    fn single_cell_section_gets_every_corner() {
        let section = Section::new(4, 4, 4, 4);
        assert_eq!(
            section.corner_radii(Position::new(4, 4), 5),
            CornerRadii::uniform(5)
        );
    }

    #[test]
    fn color_css_forms() {
        assert_eq!(Color::rgb(250, 250, 255).to_css(), "#fafaff");
        assert_eq!(Color::TRANSPARENT.to_css(), "transparent");
        assert_eq!(Color::rgba(0, 0, 0, 51).to_css(), "rgba(0, 0, 0, 0.200)");
    }

    #[test]
    fn size_shrink_saturates_at_zero() {
        assert_eq!(Size::new(10, 3).shrink(4, 4), Size::new(6, 0));
    }
}
