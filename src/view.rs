use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::alignment::ItemAlignment;
use crate::cell::Cell;
use crate::error::{Result, TableError};
use crate::font::Font;
use crate::grid::{Grid, WeakGrid};
use crate::notify::Subscription;
use crate::types::Color;

/// Which coordinate a view is fixed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Row,
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::Row => "row",
            Axis::Column => "column",
        })
    }
}

#[derive(Default)]
struct Snapshot {
    cells: Vec<Cell>,
    disposed: bool,
}

fn collect(grid: &Grid, axis: Axis, index: i32) -> Vec<Cell> {
    let mut cells: Vec<Cell> = grid
        .cells()
        .into_iter()
        .filter(|cell| {
            let position = cell.position();
            match axis {
                Axis::Row => position.row == index,
                Axis::Column => position.column == index,
            }
        })
        .collect();
    cells.sort_by_key(|cell| {
        let position = cell.position();
        match axis {
            Axis::Row => position.column,
            Axis::Column => position.row,
        }
    });
    cells
}

/// Snapshot of one row or column that re-filters itself on every structure change of
/// its grid while alive. Holds the grid weakly and the subscription strongly.
pub struct AxisView {
    axis: Axis,
    index: i32,
    grid: WeakGrid,
    snapshot: Rc<RefCell<Snapshot>>,
    subscription: RefCell<Option<Subscription>>,
}

impl AxisView {
    fn new(grid: &Grid, axis: Axis, index: i32) -> Self {
        let snapshot = Rc::new(RefCell::new(Snapshot {
            cells: collect(grid, axis, index),
            disposed: false,
        }));
        let subscription = {
            let weak_snapshot = Rc::downgrade(&snapshot);
            let weak_grid = grid.downgrade();
            grid.subscribe(move |_| {
                let (Some(snapshot), Some(grid)) = (weak_snapshot.upgrade(), weak_grid.upgrade())
                else {
                    return;
                };
                let cells = collect(&grid, axis, index);
                snapshot.borrow_mut().cells = cells;
            })
        };
        Self {
            axis,
            index,
            grid: grid.downgrade(),
            snapshot,
            subscription: RefCell::new(Some(subscription)),
        }
    }

    fn live(&self) -> Result<()> {
        if self.snapshot.borrow().disposed {
            return Err(TableError::DisposedView {
                axis: self.axis,
                index: self.index,
            });
        }
        Ok(())
    }

    fn cells(&self) -> Result<Vec<Cell>> {
        self.live()?;
        Ok(self.snapshot.borrow().cells.clone())
    }

    fn refresh(&self) -> Result<()> {
        self.live()?;
        let cells = match self.grid.upgrade() {
            Some(grid) => collect(&grid, self.axis, self.index),
            None => Vec::new(),
        };
        self.snapshot.borrow_mut().cells = cells;
        Ok(())
    }

    fn for_each(&self, f: impl Fn(&Cell)) -> Result<()> {
        self.cells()?.iter().for_each(f);
        Ok(())
    }

    fn dispose(&self) {
        {
            let mut snapshot = self.snapshot.borrow_mut();
            if snapshot.disposed {
                return;
            }
            snapshot.disposed = true;
            snapshot.cells.clear();
        }
        self.subscription.borrow_mut().take();
        trace!(axis = %self.axis, index = self.index, "view disposed");
    }
}

impl fmt::Debug for AxisView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.borrow();
        f.debug_struct("AxisView")
            .field("axis", &self.axis)
            .field("index", &self.index)
            .field("cells", &snapshot.cells.len())
            .field("disposed", &snapshot.disposed)
            .finish()
    }
}

/// Shared behaviour of row and column views.
///
/// Every operation fails with [`TableError::DisposedView`] once the view is disposed.
/// Dropping a view unsubscribes it from its grid whether or not it was disposed.
pub trait TableCollection {
    #[doc(hidden)]
    fn view(&self) -> &AxisView;

    fn axis(&self) -> Axis {
        self.view().axis
    }

    /// The fixed row or column number.
    fn index(&self) -> i32 {
        self.view().index
    }

    /// Re-filters from the grid's current cells. Runs on its own after every structure change.
    fn refresh(&self) -> Result<()> {
        self.view().refresh()
    }

    fn cells(&self) -> Result<Vec<Cell>> {
        self.view().cells()
    }

    /// The `index`th cell of the snapshot, in order along the view.
    fn get(&self, index: usize) -> Result<Option<Cell>> {
        Ok(self.view().cells()?.get(index).cloned())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.view().cells()?.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn set_background(&self, color: Color) -> Result<()> {
        self.view().for_each(|cell| cell.set_background(color))
    }

    /// Sets the font of every text or date content in the view; other content is untouched.
    fn set_font(&self, font: Font) -> Result<()> {
        self.view().for_each(|cell| {
            if let Some(content) = cell.content()
                && let Some(style) = content.borrow_mut().text_style_mut()
            {
                style.font = font.clone();
            }
        })
    }

    fn set_text_color(&self, color: Color) -> Result<()> {
        self.view().for_each(|cell| {
            if let Some(content) = cell.content()
                && let Some(style) = content.borrow_mut().text_style_mut()
            {
                style.color = color;
            }
        })
    }

    fn set_alignment(&self, alignment: ItemAlignment) -> Result<()> {
        self.view().for_each(|cell| cell.set_alignment(alignment))
    }

    fn is_disposed(&self) -> bool {
        self.view().snapshot.borrow().disposed
    }

    /// Unsubscribes and clears the snapshot. Disposing twice is a no-op.
    fn dispose(&self) {
        self.view().dispose();
    }
}

/// Live view of one grid row, ordered by column.
#[derive(Debug)]
pub struct TableRow {
    view: AxisView,
}

impl TableRow {
    pub(crate) fn new(grid: &Grid, row: i32) -> Self {
        Self {
            view: AxisView::new(grid, Axis::Row, row),
        }
    }

    /// Tallest cell in the row; 0 when empty.
    pub fn height(&self) -> Result<i32> {
        Ok(self.view.cells()?.iter().map(Cell::height).max().unwrap_or(0))
    }

    pub fn set_height(&self, height: i32) -> Result<()> {
        self.view.for_each(|cell| cell.set_height(height))
    }
}

impl TableCollection for TableRow {
    fn view(&self) -> &AxisView {
        &self.view
    }
}

/// Live view of one grid column, ordered by row.
#[derive(Debug)]
pub struct TableColumn {
    view: AxisView,
}

impl TableColumn {
    pub(crate) fn new(grid: &Grid, column: i32) -> Self {
        Self {
            view: AxisView::new(grid, Axis::Column, column),
        }
    }

    /// Widest cell in the column; 0 when empty.
    pub fn width(&self) -> Result<i32> {
        Ok(self.view.cells()?.iter().map(Cell::width).max().unwrap_or(0))
    }

    pub fn set_width(&self, width: i32) -> Result<()> {
        self.view.for_each(|cell| cell.set_width(width))
    }
}

impl TableCollection for TableColumn {
    fn view(&self) -> &AxisView {
        &self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellOptions;
    use crate::content::{Content, TextContent};
    use crate::image_content::ImageContent;
    use crate::types::{Position, Size};
    use image::RgbaImage;

    fn positions(cells: &[Cell]) -> Vec<Position> {
        cells.iter().map(Cell::position).collect()
    }

    #[test]
    fn row_is_filtered_and_sorted_by_column() {
        let grid = Grid::new();
        for (c, r) in [(2, 0), (0, 0), (1, 1), (1, 0)] {
            grid.add(grid.create_cell((c, r), None)).unwrap();
        }
        let row = grid.row(0);
        assert_eq!(
            positions(&row.cells().unwrap()),
            vec![Position::new(0, 0), Position::new(1, 0), Position::new(2, 0)]
        );
        assert_eq!(row.get(1).unwrap().map(|c| c.position()), Some(Position::new(1, 0)));
        assert_eq!(row.get(3).unwrap(), None);
    }

    #[test]
    fn view_follows_grid_changes() {
        let grid = Grid::new();
        let column = grid.column(0);
        assert!(column.is_empty().unwrap());

        let a = grid.create_cell((0, 3), None);
        grid.add(a.clone()).unwrap();
        grid.add(grid.create_cell((0, 1), None)).unwrap();
        assert_eq!(column.len().unwrap(), 2);
        assert_eq!(column.get(0).unwrap().map(|c| c.position().row), Some(1));

        a.set_position((5, 3));
        assert_eq!(column.len().unwrap(), 1);
        grid.clear();
        assert_eq!(column.len().unwrap(), 0);
    }

    #[test]
    fn disposed_view_rejects_every_operation() {
        let grid = Grid::new();
        grid.add(grid.create_cell((0, 0), None)).unwrap();
        let row = grid.row(0);
        assert_eq!(grid.listener_count(), 1);

        row.dispose();
        assert!(row.is_disposed());
        assert_eq!(grid.listener_count(), 0);
        assert!(matches!(
            row.refresh(),
            Err(TableError::DisposedView { axis: Axis::Row, index: 0 })
        ));
        assert!(row.cells().is_err());
        assert!(row.height().is_err());
        assert!(row.set_background(Color::BLACK).is_err());

        // Mutating the grid afterwards reaches no stale callback.
        grid.add(grid.create_cell((1, 0), None)).unwrap();
        row.dispose();
    }

    #[test]
    fn dropping_a_view_unsubscribes() {
        let grid = Grid::new();
        {
            let _row = grid.row(0);
            let _column = grid.column(0);
            assert_eq!(grid.listener_count(), 2);
        }
        assert_eq!(grid.listener_count(), 0);
    }

    #[test]
    fn view_outliving_grid_refreshes_empty() {
        let row = {
            let grid = Grid::new();
            grid.add(grid.create_cell((0, 0), None)).unwrap();
            grid.row(0)
        };
        assert_eq!(row.len().unwrap(), 1);
        row.refresh().unwrap();
        assert_eq!(row.len().unwrap(), 0);
    }

    #[test]
    fn extent_setters_write_every_cell() {
        let grid = Grid::new();
        let small = grid.create_cell_with((0, 0), None, CellOptions::default().size(Size::new(10, 10)));
        let big = grid.create_cell_with((1, 0), None, CellOptions::default().size(Size::new(40, 30)));
        grid.add_in_bulk([small.clone(), big.clone()]).unwrap();

        let row = grid.row(0);
        assert_eq!(row.height().unwrap(), 30);
        row.set_height(12).unwrap();
        assert_eq!(small.size(), Size::new(10, 12));
        assert_eq!(big.size(), Size::new(40, 12));

        let column = grid.column(1);
        assert_eq!(column.width().unwrap(), 40);
        column.set_width(25).unwrap();
        assert_eq!(big.width(), 25);
        assert_eq!(small.width(), 10);
    }

    #[test]
    fn styling_skips_content_without_text() {
        let grid = Grid::new();
        let text = grid.create_text_cell((0, 0), "a");
        let image = grid.create_cell(
            (1, 0),
            Some(ImageContent::new(RgbaImage::new(2, 2)).shared()),
        );
        let blank = grid.create_cell((2, 0), None);
        grid.add_in_bulk([text.clone(), image, blank.clone()]).unwrap();

        let row = grid.row(0);
        row.set_font(Font::new("Arial", 20.0)).unwrap();
        row.set_text_color(Color::rgb(9, 9, 9)).unwrap();
        row.set_background(Color::rgb(1, 1, 1)).unwrap();
        row.set_alignment(ItemAlignment::CENTRE).unwrap();

        let style = text.with_content(|t: &TextContent| t.style().clone()).unwrap();
        assert_eq!(style.font, Font::new("Arial", 20.0));
        assert_eq!(style.color, Color::rgb(9, 9, 9));
        assert_eq!(blank.background(), Color::rgb(1, 1, 1));
        assert_eq!(blank.alignment(), ItemAlignment::CENTRE);
    }

    #[test]
    fn axis_displays_lowercase() {
        assert_eq!(Axis::Column.to_string(), "column");
        let err = TableError::DisposedView { axis: Axis::Row, index: 4 };
        assert_eq!(err.to_string(), "row view 4 has been disposed");
    }
}
