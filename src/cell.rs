use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::alignment::ItemAlignment;
use crate::content::{Content, SharedContent};
use crate::font::TextMeasure;
use crate::notify::{Notifier, StructureChange};
use crate::types::{Color, Position, Size};

static NEXT_GRID_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a grid; every cell records the grid that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridId(u64);

impl GridId {
    pub(crate) fn next() -> Self {
        GridId(NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-cell overrides of the grid's configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellOptions {
    pub size: Option<Size>,
    pub alignment: Option<ItemAlignment>,
    pub background: Option<Color>,
}

impl CellOptions {
    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn alignment(mut self, alignment: ItemAlignment) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.background = Some(color);
        self
    }
}

pub(crate) struct CellState {
    pub(crate) position: Position,
    pub(crate) content: Option<SharedContent>,
    pub(crate) size: Size,
    pub(crate) background: Color,
    pub(crate) alignment: ItemAlignment,
}

struct CellInner {
    parent: GridId,
    notifier: Weak<Notifier>,
    state: RefCell<CellState>,
}

/// Shared handle to one grid cell. Clones refer to the same cell; equality is identity.
///
/// Cells only come from [`Grid::create_cell`](crate::Grid::create_cell) and friends, so
/// every cell is bound to its grid for its whole life.
#[derive(Clone)]
pub struct Cell {
    inner: Rc<CellInner>,
}

impl Cell {
    pub(crate) fn bind(parent: GridId, notifier: Weak<Notifier>, state: CellState) -> Cell {
        Cell {
            inner: Rc::new(CellInner {
                parent,
                notifier,
                state: RefCell::new(state),
            }),
        }
    }

    pub fn parent(&self) -> GridId {
        self.inner.parent
    }

    pub fn position(&self) -> Position {
        self.inner.state.borrow().position
    }

    /// Moves the cell and notifies the owning grid's listeners with the old and new position.
    pub fn set_position(&self, position: impl Into<Position>) {
        let to = position.into();
        let from = std::mem::replace(&mut self.inner.state.borrow_mut().position, to);
        if let Some(notifier) = self.inner.notifier.upgrade() {
            notifier.emit(StructureChange::Moved { from, to });
        }
    }

    pub fn content(&self) -> Option<SharedContent> {
        self.inner.state.borrow().content.clone()
    }

    pub fn has_content(&self) -> bool {
        self.inner.state.borrow().content.is_some()
    }

    pub fn set_content(&self, content: Option<SharedContent>) {
        self.inner.state.borrow_mut().content = content;
    }

    pub fn size(&self) -> Size {
        self.inner.state.borrow().size
    }

    pub fn set_size(&self, size: Size) {
        self.inner.state.borrow_mut().size = size;
    }

    pub fn width(&self) -> i32 {
        self.size().width
    }

    pub fn set_width(&self, width: i32) {
        self.inner.state.borrow_mut().size.width = width;
    }

    pub fn height(&self) -> i32 {
        self.size().height
    }

    pub fn set_height(&self, height: i32) {
        self.inner.state.borrow_mut().size.height = height;
    }

    pub fn background(&self) -> Color {
        self.inner.state.borrow().background
    }

    pub fn set_background(&self, color: Color) {
        self.inner.state.borrow_mut().background = color;
    }

    pub fn alignment(&self) -> ItemAlignment {
        self.inner.state.borrow().alignment
    }

    pub fn set_alignment(&self, alignment: ItemAlignment) {
        self.inner.state.borrow_mut().alignment = alignment;
    }

    /// Runs `f` on the content if it is a `T`; `None` when empty or of another type.
    pub fn with_content<T, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R>
    where
        T: Content,
    {
        let content = self.content()?;
        let guard = content.borrow();
        let result = guard.as_any().downcast_ref::<T>().map(f);
        result
    }

    pub fn with_content_mut<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R>
    where
        T: Content,
    {
        let content = self.content()?;
        let mut guard = content.borrow_mut();
        let result = guard.as_any_mut().downcast_mut::<T>().map(f);
        result
    }

    /// Size of the content measured against `bounds`; empty cells measure as zero.
    pub fn measure_content(&self, measure: &dyn TextMeasure, bounds: Option<Size>) -> Size {
        match self.content() {
            Some(content) => content.borrow().measure(measure, bounds),
            None => Size::ZERO,
        }
    }

    pub fn ptr_eq(&self, other: &Cell) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Cell {}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Cell")
            .field("parent", &self.inner.parent)
            .field("position", &state.position)
            .field("size", &state.size)
            .field("background", &state.background)
            .field("has_content", &state.content.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TextContent;
    use crate::font::FontRegistry;
    use crate::grid::Grid;
    use crate::image_content::ImageContent;

    #[test]
    fn grid_ids_are_unique() {
        assert_ne!(GridId::next(), GridId::next());
    }

    #[test]
    fn set_position_emits_old_and_new() {
        let grid = Grid::new();
        let cell = grid.create_cell((0, 0), None);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            grid.subscribe(move |change| seen.borrow_mut().push(*change))
        };
        cell.set_position((2, 3));
        assert_eq!(cell.position(), Position::new(2, 3));
        assert_eq!(
            *seen.borrow(),
            vec![StructureChange::Moved {
                from: Position::new(0, 0),
                to: Position::new(2, 3),
            }]
        );
    }

    #[test]
    fn size_setters_touch_one_axis() {
        let grid = Grid::new();
        let cell = grid.create_cell((0, 0), None);
        cell.set_width(40);
        assert_eq!(cell.size(), Size::new(40, 28));
        cell.set_height(10);
        assert_eq!(cell.size(), Size::new(40, 10));
    }

    #[test]
    fn content_cast_is_soft() {
        let grid = Grid::new();
        let cell = grid.create_cell((0, 0), Some(TextContent::new("abc").shared()));
        assert_eq!(cell.with_content(|t: &TextContent| t.text().len()), Some(3));
        assert_eq!(cell.with_content(|_: &ImageContent| ()), None);
        cell.with_content_mut(|t: &mut TextContent| t.set_text("abcd"));
        assert_eq!(
            cell.with_content(|t: &TextContent| t.text().to_string()),
            Some("abcd".to_string())
        );

        let empty = grid.create_cell((1, 0), None);
        assert_eq!(empty.with_content(|t: &TextContent| t.text().len()), None);
        assert_eq!(
            empty.measure_content(&FontRegistry::new(), None),
            Size::ZERO
        );
    }

    #[test]
    fn clones_share_identity_and_state() {
        let grid = Grid::new();
        let cell = grid.create_cell((0, 0), None);
        let other = cell.clone();
        other.set_background(Color::BLACK);
        assert_eq!(cell.background(), Color::BLACK);
        assert_eq!(cell, other);
        assert_ne!(cell, grid.create_cell((0, 0), None));
    }

    #[test]
    fn moving_a_cell_after_its_grid_is_gone_is_silent() {
        let cell = {
            let grid = Grid::new();
            grid.create_cell((0, 0), None)
        };
        cell.set_position((1, 1));
        assert_eq!(cell.position(), Position::new(1, 1));
    }
}
