use std::any::Any;
use std::fmt::Write as _;

use crate::canvas::Canvas;
use crate::cell::Cell;
use crate::content::Content;
use crate::error::Result;
use crate::font::TextMeasure;
use crate::grid::Grid;
use crate::html::HtmlResources;
use crate::layout::{advance, paint_cell};
use crate::types::{CornerRadii, Point, Rect, Size};

/// Splits `total` pixels over `count` slots. Each step takes the floor of what is left
/// over the slots left, so rounding lands on the last slots and the parts sum to `total`.
pub fn distribute(total: i32, count: usize) -> Vec<i32> {
    (0..count as u64)
        .map(|index| slot(total, count as u64, index).1)
        .collect()
}

/// Start and length of slot `index` in the [`distribute`] split, without building the
/// other slots. The first `count - total % count` slots get `total / count` pixels and
/// the rest one more.
fn slot(total: i32, count: u64, index: u64) -> (i32, i32) {
    if count == 0 {
        return (0, 0);
    }
    let total = total.max(0) as u64;
    let base = total / count;
    let first_long = count - total % count;
    let start = index * base + index.saturating_sub(first_long);
    let part = base + u64::from(index >= first_long);
    (start as i32, part as i32)
}

/// A nested grid drawn inside a cell.
///
/// Nested rows and columns ignore their cells' own sizes: the table area is shared out
/// evenly with [`distribute`]. In auto-size mode the area is the hosting cell; pair it
/// with `ItemAlignment::TOP_LEFT.with_margin(Point::ZERO)` on that cell so the table
/// starts at the cell's corner.
#[derive(Debug, Clone)]
pub struct SubTableContent {
    grid: Grid,
    table_size: Option<Size>,
}

impl SubTableContent {
    /// Sized to the hosting cell at export time.
    pub fn auto() -> Self {
        Self::from_grid(Grid::new(), None)
    }

    pub fn fixed(size: Size) -> Self {
        Self::from_grid(Grid::new(), Some(size))
    }

    pub fn from_grid(grid: Grid, table_size: Option<Size>) -> Self {
        Self { grid, table_size }
    }

    /// The nested grid. Cells are created and inserted through it as with any grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn is_auto_size(&self) -> bool {
        self.table_size.is_none()
    }

    pub fn table_size(&self) -> Option<Size> {
        self.table_size
    }

    /// `None` switches to auto-size mode.
    pub fn set_table_size(&mut self, size: Option<Size>) {
        self.table_size = size;
    }

    fn area(&self, cell_size: Option<Size>) -> Size {
        match self.table_size {
            Some(size) => size,
            None => cell_size.unwrap_or(Size::ZERO),
        }
    }

    /// Each nested cell with its rectangle relative to the table's top-left corner.
    /// Neighbouring rectangles share their border pixel.
    pub fn cell_rects(&self, cell_size: Size) -> Vec<(Cell, Rect)> {
        let Some(section) = self.grid.bounding_region() else {
            return Vec::new();
        };
        let area = self.area(Some(cell_size));
        let (width, height) = (advance(area.width), advance(area.height));
        let (columns, rows) = (section.column_count(), section.row_count());

        self.grid
            .cells()
            .into_iter()
            .map(|cell| {
                let position = cell.position();
                let column = (i64::from(position.column) - i64::from(section.left)) as u64;
                let row = (i64::from(position.row) - i64::from(section.top)) as u64;
                let (x, w) = slot(width, columns, column);
                let (y, h) = slot(height, rows, row);
                (cell, Rect::new(x, y, w + 1, h + 1))
            })
            .collect()
    }
}

impl Content for SubTableContent {
    fn measure(&self, _measure: &dyn TextMeasure, bounds: Option<Size>) -> Size {
        self.area(bounds)
    }

    fn draw(&self, canvas: &mut Canvas, measure: &dyn TextMeasure, origin: Point, bounds: Size) {
        let border = self.grid.border_color();
        for (cell, rect) in self.cell_rects(bounds) {
            let rect = Rect::from_origin_size(origin.offset(rect.origin()), rect.size());
            paint_cell(canvas, measure, &cell, rect, CornerRadii::ZERO, border);
        }
    }

    fn to_html(&self, resources: &mut HtmlResources) -> Result<String> {
        let sizing = match self.table_size {
            Some(size) => format!("width: {}px; height: {}px;", size.width, size.height),
            None => "width: 100%; height: 100%;".to_string(),
        };
        let mut html = format!("<table style=\"{sizing} border-spacing: 0;\">\n");
        let Some(section) = self.grid.bounding_region() else {
            html.push_str("</table>");
            return Ok(html);
        };
        section.ensure_visitable()?;
        let border = self.grid.border_color().to_css();
        for row in section.rows() {
            html.push_str("<tr>\n");
            for column in section.columns() {
                match self.grid.cell_at((column, row)) {
                    Some(cell) => {
                        let inner = match cell.content() {
                            Some(content) => content.borrow().to_html(resources)?,
                            None => String::new(),
                        };
                        let _ = writeln!(
                            html,
                            "<td style=\"background-color: {}; border: 1px solid {};\">{}</td>",
                            cell.background().to_css(),
                            border,
                            inner
                        );
                    }
                    None => html.push_str("<td></td>\n"),
                }
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</table>");
        Ok(html)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
