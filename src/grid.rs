use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::cell::{Cell, CellOptions, CellState, GridId};
use crate::config::TableConfig;
use crate::content::{Content, DateContent, SharedContent, TextContent};
use crate::error::{Result, TableError};
use crate::notify::{Notifier, StructureChange, Subscription};
use crate::types::{Color, Position, Section, Size};
use crate::view::{TableColumn, TableRow};

pub(crate) struct GridInner {
    id: GridId,
    config: RefCell<TableConfig>,
    cells: RefCell<Vec<Cell>>,
    notifier: Rc<Notifier>,
}

/// Sparse collection of cells addressed by [`Position`].
///
/// `Grid` is a cheap handle; clones share the same cells. Cells are created by the grid
/// they belong to and cannot be inserted into any other grid. Every structural mutation
/// notifies subscribers synchronously, after the mutation is complete.
#[derive(Clone)]
pub struct Grid {
    inner: Rc<GridInner>,
}

#[derive(Clone)]
pub(crate) struct WeakGrid(Weak<GridInner>);

impl WeakGrid {
    pub(crate) fn upgrade(&self) -> Option<Grid> {
        self.0.upgrade().map(|inner| Grid { inner })
    }
}

impl Grid {
    pub fn new() -> Self {
        Self::from_valid_config(TableConfig::default())
    }

    /// Fails with `Validation` when the config's date format is invalid.
    pub fn with_config(config: TableConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: TableConfig) -> Self {
        Self {
            inner: Rc::new(GridInner {
                id: GridId::next(),
                config: RefCell::new(config),
                cells: RefCell::new(Vec::new()),
                notifier: Rc::new(Notifier::default()),
            }),
        }
    }

    pub fn id(&self) -> GridId {
        self.inner.id
    }

    pub(crate) fn downgrade(&self) -> WeakGrid {
        WeakGrid(Rc::downgrade(&self.inner))
    }

    pub fn config(&self) -> TableConfig {
        self.inner.config.borrow().clone()
    }

    pub fn corner_radius(&self) -> u32 {
        self.inner.config.borrow().corner_radius
    }

    pub fn set_corner_radius(&self, radius: u32) {
        self.inner.config.borrow_mut().corner_radius = radius;
    }

    pub fn border_color(&self) -> Color {
        self.inner.config.borrow().border_color
    }

    pub fn set_border_color(&self, color: Color) {
        self.inner.config.borrow_mut().border_color = color;
    }

    /// A new cell bound to this grid, using the configured size, background and alignment.
    /// The cell is not inserted.
    pub fn create_cell(
        &self,
        position: impl Into<Position>,
        content: Option<SharedContent>,
    ) -> Cell {
        self.create_cell_with(position, content, CellOptions::default())
    }

    pub fn create_cell_with(
        &self,
        position: impl Into<Position>,
        content: Option<SharedContent>,
        options: CellOptions,
    ) -> Cell {
        let config = self.inner.config.borrow();
        Cell::bind(
            self.inner.id,
            Rc::downgrade(&self.inner.notifier),
            CellState {
                position: position.into(),
                content,
                size: options.size.unwrap_or(config.cell_size),
                background: options.background.unwrap_or(config.background),
                alignment: options.alignment.unwrap_or(config.alignment),
            },
        )
    }

    /// A new cell holding text in the configured font and colour.
    pub fn create_text_cell(&self, position: impl Into<Position>, text: impl Into<String>) -> Cell {
        let style = self.inner.config.borrow().text_style();
        self.create_cell(position, Some(TextContent::styled(text, style).shared()))
    }

    /// A new cell holding a date in the configured format, locale, font and colour.
    pub fn create_date_cell(&self, position: impl Into<Position>, value: NaiveDateTime) -> Cell {
        let content = DateContent::from_config(value, &self.inner.config.borrow());
        self.create_cell(position, Some(content.shared()))
    }

    /// Snapshot of the cell collection in insertion order.
    pub fn cells(&self) -> Vec<Cell> {
        self.inner.cells.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.cells.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cells.borrow().is_empty()
    }

    pub fn contains(&self, cell: &Cell) -> bool {
        self.inner.cells.borrow().iter().any(|c| c.ptr_eq(cell))
    }

    fn validate(&self, cell: &Cell) -> Result<()> {
        if cell.parent() != self.inner.id {
            return Err(TableError::TableMismatch {
                cell: cell.parent(),
                grid: self.inner.id,
            });
        }
        Ok(())
    }

    fn validate_all<'a>(&self, cells: impl IntoIterator<Item = &'a Cell>) -> Result<()> {
        cells.into_iter().try_for_each(|cell| self.validate(cell))
    }

    fn emit(&self, change: StructureChange) {
        self.inner.notifier.emit(change);
    }

    /// Replaces the whole collection. Nothing changes if any cell belongs to another grid.
    pub fn set_cells(&self, cells: Vec<Cell>) -> Result<()> {
        self.validate_all(&cells)?;
        *self.inner.cells.borrow_mut() = cells;
        self.emit(StructureChange::Reset);
        Ok(())
    }

    pub fn add(&self, cell: Cell) -> Result<()> {
        self.validate(&cell)?;
        let position = cell.position();
        self.inner.cells.borrow_mut().push(cell);
        self.emit(StructureChange::Added(position));
        Ok(())
    }

    /// Appends many cells with a single notification at the end.
    pub fn add_in_bulk(&self, cells: impl IntoIterator<Item = Cell>) -> Result<usize> {
        let cells: Vec<Cell> = cells.into_iter().collect();
        self.validate_all(&cells)?;
        Ok(self.push_bulk(cells))
    }

    /// Bulk append for cells this grid just created.
    pub(crate) fn push_bulk(&self, cells: Vec<Cell>) -> usize {
        let count = cells.len();
        {
            let _quiet = self.inner.notifier.suppress();
            for cell in cells {
                let position = cell.position();
                self.inner.cells.borrow_mut().push(cell);
                self.emit(StructureChange::Added(position));
            }
        }
        self.emit(StructureChange::BulkInserted { count });
        count
    }

    /// Removes `cell` (by identity). Returns false if it was not in the collection.
    pub fn remove(&self, cell: &Cell) -> bool {
        let removed = {
            let mut cells = self.inner.cells.borrow_mut();
            match cells.iter().position(|c| c.ptr_eq(cell)) {
                Some(index) => Some(cells.remove(index)),
                None => None,
            }
        };
        match removed {
            Some(cell) => {
                self.emit(StructureChange::Removed(cell.position()));
                true
            }
            None => false,
        }
    }

    /// Swaps `old` for `new` in place. Returns false if `old` was not in the collection.
    pub fn replace(&self, old: &Cell, new: Cell) -> Result<bool> {
        self.validate(&new)?;
        let position = new.position();
        let replaced = {
            let mut cells = self.inner.cells.borrow_mut();
            match cells.iter().position(|c| c.ptr_eq(old)) {
                Some(index) => {
                    cells[index] = new;
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.emit(StructureChange::Replaced(position));
        }
        Ok(replaced)
    }

    pub fn clear(&self) {
        self.inner.cells.borrow_mut().clear();
        self.emit(StructureChange::Reset);
    }

    /// First cell at `position` in collection order.
    pub fn cell_at(&self, position: impl Into<Position>) -> Option<Cell> {
        let position = position.into();
        self.inner
            .cells
            .borrow()
            .iter()
            .find(|c| c.position() == position)
            .cloned()
    }

    /// Puts `cell` at `position`, replacing the first cell already there or appending.
    /// The cell's own position is overwritten to match, and any other entry of the same
    /// cell is dropped from the collection.
    pub fn set_cell_at(&self, position: impl Into<Position>, cell: Cell) -> Result<()> {
        let position = position.into();
        self.validate(&cell)?;
        self.inner.cells.borrow_mut().retain(|c| !c.ptr_eq(&cell));
        cell.set_position(position);
        let replaced = {
            let mut cells = self.inner.cells.borrow_mut();
            match cells.iter().position(|c| c.position() == position) {
                Some(index) => {
                    cells[index] = cell;
                    true
                }
                None => {
                    cells.push(cell);
                    false
                }
            }
        };
        self.emit(if replaced {
            StructureChange::Replaced(position)
        } else {
            StructureChange::Added(position)
        });
        Ok(())
    }

    /// Occupied region, or `None` for an empty grid.
    pub fn bounding_region(&self) -> Option<Section> {
        Section::enclosing(self.inner.cells.borrow().iter().map(Cell::position))
    }

    /// Live view of the cells in row `row`, ordered by column.
    pub fn row(&self, row: i32) -> TableRow {
        TableRow::new(self, row)
    }

    /// Live view of the cells in column `column`, ordered by row.
    pub fn column(&self, column: i32) -> TableColumn {
        TableColumn::new(self, column)
    }

    /// Tallest cell in `row`; 0 when the row is empty.
    pub fn row_height(&self, row: i32) -> i32 {
        self.inner
            .cells
            .borrow()
            .iter()
            .filter(|c| c.position().row == row)
            .map(Cell::height)
            .max()
            .unwrap_or(0)
    }

    /// Widest cell in `column`; 0 when the column is empty.
    pub fn column_width(&self, column: i32) -> i32 {
        self.inner
            .cells
            .borrow()
            .iter()
            .filter(|c| c.position().column == column)
            .map(Cell::width)
            .max()
            .unwrap_or(0)
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StructureChange) + 'static,
    {
        self.inner.notifier.subscribe(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.notifier.listener_count()
    }

    /// Alternates row backgrounds from `start_row` down to the last row.
    /// Defaults: white, then rgb(250, 250, 255).
    pub fn add_stripe_ribbons_to_rows(
        &self,
        primary: Option<Color>,
        secondary: Option<Color>,
        start_row: i32,
    ) {
        let primary = primary.unwrap_or(Color::WHITE);
        let secondary = secondary.unwrap_or(Color::rgb(250, 250, 255));
        let Some(section) = self.bounding_region() else {
            return;
        };
        for cell in self.inner.cells.borrow().iter() {
            let row = cell.position().row;
            if row < start_row || row > section.bottom {
                continue;
            }
            let color = if (i64::from(row) - i64::from(start_row)) % 2 == 0 {
                primary
            } else {
                secondary
            };
            cell.set_background(color);
        }
    }

    /// Restores a cell's background and alignment (and size, if asked) from the config.
    pub fn reset_cell_settings(&self, cell: &Cell, reset_size: bool) -> Result<()> {
        self.validate(cell)?;
        let config = self.inner.config.borrow();
        cell.set_background(config.background);
        cell.set_alignment(config.alignment);
        if reset_size {
            cell.set_size(config.cell_size);
        }
        Ok(())
    }

    /// Default size for rows and columns that have no cells.
    pub(crate) fn default_cell_size(&self) -> Size {
        self.inner.config.borrow().cell_size
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("id", &self.inner.id)
            .field("cells", &self.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Drop for GridInner {
    fn drop(&mut self) {
        debug!(grid = %self.id, cells = self.cells.get_mut().len(), "grid dropped");
    }
}
