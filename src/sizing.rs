use std::collections::{BTreeMap, HashSet};

use tracing::{debug, trace};

use crate::cell::{Cell, CellOptions};
use crate::error::{Result, TableError};
use crate::font::TextMeasure;
use crate::grid::Grid;
use crate::layout::extents;
use crate::types::{Color, Position, Size};

fn non_negative(name: &str, value: i32) -> Result<()> {
    if value < 0 {
        return Err(TableError::Validation(format!(
            "{name} must not be negative, got {value}"
        )));
    }
    Ok(())
}

/// Cells grouped by one coordinate, in coordinate order.
fn group_by<'a>(cells: &'a [Cell], key: impl Fn(&Cell) -> i32) -> BTreeMap<i32, Vec<&'a Cell>> {
    let mut groups: BTreeMap<i32, Vec<&Cell>> = BTreeMap::new();
    for cell in cells {
        groups.entry(key(cell)).or_default().push(cell);
    }
    groups
}

impl Grid {
    /// Inserts a transparent, empty cell at every unoccupied position of the bounding
    /// region and returns the new cells. Fillers take the width of their column and the
    /// height of their row as they were before the pass; an empty row or column falls
    /// back to the configured cell size.
    ///
    /// Fails with `RegionTooLarge`, leaving the grid untouched, when the bounding region
    /// holds more than [`crate::Section::MAX_VISITED_POSITIONS`] positions.
    pub fn fill_missing_gaps(&self) -> Result<Vec<Cell>> {
        let Some(section) = self.bounding_region() else {
            return Ok(Vec::new());
        };
        section.ensure_visitable()?;
        let cells = self.cells();
        let occupied: HashSet<Position> = cells.iter().map(Cell::position).collect();
        let (widths, heights) = extents(&cells);

        let fallback = self.default_cell_size();
        let mut fillers = Vec::new();
        for column in section.columns() {
            let width = widths
                .get(&column)
                .copied()
                .filter(|w| *w > 0)
                .unwrap_or(fallback.width);
            for row in section.rows() {
                let position = Position::new(column, row);
                if occupied.contains(&position) {
                    continue;
                }
                let height = heights
                    .get(&row)
                    .copied()
                    .filter(|h| *h > 0)
                    .unwrap_or(fallback.height);
                fillers.push(self.create_cell_with(
                    position,
                    None,
                    CellOptions::default()
                        .size(Size::new(width, height))
                        .background(Color::TRANSPARENT),
                ));
            }
        }

        if !fillers.is_empty() {
            self.push_bulk(fillers.clone());
        }
        debug!(grid = %self.id(), inserted = fillers.len(), "filled missing gaps");
        Ok(fillers)
    }

    /// Sets every column's width to its widest unwrapped content, raised to `minimum`,
    /// plus `overflow`. Cells without content measure as zero.
    pub fn expand_columns_to_content(
        &self,
        measure: &dyn TextMeasure,
        overflow: i32,
        minimum: i32,
    ) -> Result<()> {
        non_negative("overflow", overflow)?;
        non_negative("minimum width", minimum)?;
        let cells = self.cells();
        for (column, members) in group_by(&cells, |c| c.position().column) {
            let widest = members
                .iter()
                .map(|c| c.measure_content(measure, None).width)
                .max()
                .unwrap_or(0);
            let width = widest.max(minimum).saturating_add(overflow);
            members.iter().for_each(|c| c.set_width(width));
            trace!(column, width, "column expanded");
        }
        Ok(())
    }

    /// Sets every row's height to its tallest content wrapped at each cell's width, raised
    /// to `minimum`, plus `overflow`. Content sized to its cell reports no height here.
    pub fn expand_rows_to_content(
        &self,
        measure: &dyn TextMeasure,
        overflow: i32,
        minimum: i32,
    ) -> Result<()> {
        non_negative("overflow", overflow)?;
        non_negative("minimum height", minimum)?;
        let cells = self.cells();
        for (row, members) in group_by(&cells, |c| c.position().row) {
            let tallest = members
                .iter()
                .map(|c| {
                    c.measure_content(measure, Some(Size::new(c.width(), 0)))
                        .height
                })
                .max()
                .unwrap_or(0);
            let height = tallest.max(minimum).saturating_add(overflow);
            members.iter().for_each(|c| c.set_height(height));
            trace!(row, height, "row expanded");
        }
        Ok(())
    }
}
