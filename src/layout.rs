use std::collections::BTreeMap;
use std::path::Path;

use image::RgbaImage;
use tracing::debug;

use crate::canvas::{Canvas, Drawing};
use crate::cell::Cell;
use crate::content::Content;
use crate::error::{Result, TableError};
use crate::font::{FontRegistry, TextMeasure};
use crate::grid::Grid;
use crate::raster;
use crate::types::{Color, CornerRadii, Point, Position, Rect, Section, Size};

/// Pixels a row or column moves the running offset: borders of neighbours overlap.
pub(crate) fn advance(extent: i32) -> i32 {
    extent.saturating_sub(1).max(0)
}

/// Start offset of each coordinate and the total surface length, with collapsed borders.
/// Coordinates absent from `extents` are empty and do not move the offset.
pub(crate) fn accumulate(extents: &BTreeMap<i32, i32>) -> (BTreeMap<i32, i32>, i32) {
    let mut offsets = BTreeMap::new();
    let mut running = 0i32;
    for (&coordinate, &extent) in extents {
        offsets.insert(coordinate, running);
        running = running.saturating_add(advance(extent));
    }
    (offsets, running.saturating_add(1))
}

/// Widest cell per occupied column and tallest cell per occupied row, in one scan.
pub(crate) fn extents(cells: &[Cell]) -> (BTreeMap<i32, i32>, BTreeMap<i32, i32>) {
    let mut widths = BTreeMap::new();
    let mut heights = BTreeMap::new();
    for cell in cells {
        let position = cell.position();
        let size = cell.size();
        let width = widths.entry(position.column).or_insert(0);
        *width = size.width.max(*width);
        let height = heights.entry(position.row).or_insert(0);
        *height = size.height.max(*height);
    }
    (widths, heights)
}

/// Where one cell lands on the export surface.
#[derive(Debug, Clone)]
pub struct CellPlacement {
    pub cell: Cell,
    pub position: Position,
    pub rect: Rect,
    pub corners: CornerRadii,
    /// Aligned content rectangle; `None` for cells without content.
    pub content_rect: Option<Rect>,
}

/// Result of the accumulation pass over a non-empty grid.
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub section: Section,
    pub size: Size,
    /// Keyed by grid column; columns without cells are absent and take no space.
    pub column_widths: BTreeMap<i32, i32>,
    pub row_heights: BTreeMap<i32, i32>,
    pub placements: Vec<CellPlacement>,
}

impl TableLayout {
    fn compute(grid: &Grid, measure: &dyn TextMeasure) -> Option<Self> {
        let section = grid.bounding_region()?;
        let cells = grid.cells();
        let (column_widths, row_heights) = extents(&cells);
        let (xs, width) = accumulate(&column_widths);
        let (ys, height) = accumulate(&row_heights);

        let mut by_column: BTreeMap<i32, Vec<Cell>> = BTreeMap::new();
        for cell in cells {
            by_column.entry(cell.position().column).or_default().push(cell);
        }

        let radius = grid.corner_radius();
        let mut placements = Vec::new();
        for (column, cells) in by_column {
            let x = xs.get(&column).copied().unwrap_or_default();
            for cell in cells {
                let position = cell.position();
                let y = ys.get(&position.row).copied().unwrap_or_default();
                let rect = Rect::from_origin_size(Point::new(x, y), cell.size());
                let content_rect = cell.content().map(|content| {
                    let content = content.borrow();
                    content_rect(&*content, measure, &cell, rect)
                });
                placements.push(CellPlacement {
                    corners: section.corner_radii(position, radius),
                    cell,
                    position,
                    rect,
                    content_rect,
                });
            }
        }

        Some(Self {
            section,
            size: Size::new(width, height),
            column_widths,
            row_heights,
            placements,
        })
    }
}

fn content_rect(content: &dyn Content, measure: &dyn TextMeasure, cell: &Cell, rect: Rect) -> Rect {
    let size = content.measure(measure, Some(rect.size()));
    let offset = cell.alignment().align(rect.size(), size);
    Rect::from_origin_size(rect.origin().offset(offset), size)
}

/// Draws a cell box, then its content aligned inside and clipped to the box.
pub(crate) fn paint_cell(
    canvas: &mut Canvas,
    measure: &dyn TextMeasure,
    cell: &Cell,
    rect: Rect,
    radii: CornerRadii,
    border: Color,
) {
    canvas.draw_rounded_rect(rect, cell.background(), radii, border);
    let Some(content) = cell.content() else {
        return;
    };
    let content = content.borrow();
    let target = content_rect(&*content, measure, cell, rect);
    canvas.save_state();
    canvas.clip_rect(rect);
    content.draw(canvas, measure, target.origin(), rect.size());
    canvas.restore_state();
}

impl Grid {
    /// Runs the accumulation pass; `None` for an empty grid.
    pub fn layout(&self, measure: &dyn TextMeasure) -> Option<TableLayout> {
        TableLayout::compute(self, measure)
    }

    /// Size of the export surface; zero for an empty grid.
    pub fn dimensions(&self) -> Size {
        if self.is_empty() {
            return Size::ZERO;
        }
        let (widths, heights) = extents(&self.cells());
        Size::new(accumulate(&widths).1, accumulate(&heights).1)
    }

    /// Records the whole table, column by column, onto a canvas.
    pub fn render(&self, measure: &dyn TextMeasure) -> Result<Drawing> {
        let layout = self.layout(measure).ok_or(TableError::EmptyTable)?;
        let border = self.border_color();
        let mut canvas = Canvas::new(layout.size);
        for placement in &layout.placements {
            paint_cell(
                &mut canvas,
                measure,
                &placement.cell,
                placement.rect,
                placement.corners,
                border,
            );
        }
        debug!(
            width = layout.size.width,
            height = layout.size.height,
            cells = layout.placements.len(),
            "table rendered"
        );
        Ok(canvas.finish())
    }

    /// Rasterizes the table. Text is drawn only in families registered with `fonts`;
    /// others keep their measured space but stay blank.
    pub fn export_image(&self, fonts: &FontRegistry) -> Result<RgbaImage> {
        raster::render_image(&self.render(fonts)?, fonts)
    }

    pub fn export_png(&self, fonts: &FontRegistry) -> Result<Vec<u8>> {
        raster::render_png(&self.render(fonts)?, fonts)
    }

    pub fn save_png(&self, fonts: &FontRegistry, path: impl AsRef<Path>) -> Result<()> {
        let png = self.export_png(fonts)?;
        std::fs::write(path.as_ref(), png)?;
        debug!(path = %path.as_ref().display(), "table image saved");
        Ok(())
    }
}
