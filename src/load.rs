use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::cell::Cell;
use crate::content::CellValue;
use crate::error::Result;
use crate::grid::Grid;
use crate::types::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    #[default]
    Csv,
    Tsv,
}

impl DataFormat {
    pub fn delimiter(self) -> u8 {
        match self {
            DataFormat::Csv => b',',
            DataFormat::Tsv => b'\t',
        }
    }

    /// Guesses from the file extension; anything but `.tsv` reads as CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => DataFormat::Tsv,
            _ => DataFormat::Csv,
        }
    }
}

/// Trims every line of a field, keeping the line structure.
fn per_line_trim(field: &str) -> String {
    field.lines().map(str::trim).collect::<Vec<_>>().join("\n")
}

impl Grid {
    /// A grid with the default config holding one text cell per field of `reader`.
    pub fn from_delimited<R: Read>(reader: R, format: DataFormat) -> Result<Grid> {
        let grid = Grid::new();
        grid.load_delimited(reader, format)?;
        Ok(grid)
    }

    /// Replaces every cell with the fields of `reader`: field index becomes the column,
    /// record index the row. There is no header row and records may differ in length.
    /// Returns the number of cells loaded.
    pub fn load_delimited<R: Read>(&self, reader: R, format: DataFormat) -> Result<usize> {
        let mut csv = csv::ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut cells = Vec::new();
        let mut rows = 0;
        for (row, record) in csv.records().enumerate() {
            let record = record?;
            for (column, field) in record.iter().enumerate() {
                let position = Position::new(column as i32, row as i32);
                cells.push(self.create_text_cell(position, per_line_trim(field)));
            }
            rows += 1;
        }

        let count = cells.len();
        self.set_cells(cells)?;
        debug!(grid = %self.id(), ?format, rows, cells = count, "delimited data loaded");
        Ok(count)
    }

    /// Loads a delimited file, picking the format from its extension.
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let file = File::open(path)?;
        self.load_delimited(file, DataFormat::from_path(path))
    }

    /// Replaces every cell with `cells`; alias of [`Grid::set_cells`].
    pub fn load_cells(&self, cells: Vec<Cell>) -> Result<()> {
        self.set_cells(cells)
    }

    /// Appends one row per record starting at `start_at`. Value `j` of record `i` lands at
    /// `(start_at.column + j, start_at.row + i)`. All cells go in with a single notification.
    pub fn load_records<T, F>(
        &self,
        records: &[T],
        start_at: impl Into<Position>,
        extract: F,
    ) -> Result<usize>
    where
        F: Fn(&T) -> Vec<CellValue>,
    {
        let start = start_at.into();
        let config = self.config();
        let mut cells = Vec::new();
        for (i, record) in records.iter().enumerate() {
            for (j, value) in extract(record).into_iter().enumerate() {
                let position = Position::new(start.column + j as i32, start.row + i as i32);
                cells.push(self.create_cell(position, value.into_content(&config)));
            }
        }
        let count = self.add_in_bulk(cells)?;
        debug!(grid = %self.id(), records = records.len(), cells = count, "records loaded");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{DateContent, TextContent};
    use crate::error::TableError;
    use crate::notify::StructureChange;
    use crate::types::Section;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn text_at(grid: &Grid, column: i32, row: i32) -> Option<String> {
        grid.cell_at((column, row))?
            .with_content(|t: &TextContent| t.text().to_string())
    }

    #[test]
    fn csv_fields_map_to_columns_and_records_to_rows() {
        let grid = Grid::from_delimited("A,B\n1,2\n".as_bytes(), DataFormat::Csv).unwrap();
        assert_eq!(grid.len(), 4);
        assert_eq!(text_at(&grid, 0, 0).as_deref(), Some("A"));
        assert_eq!(text_at(&grid, 1, 0).as_deref(), Some("B"));
        assert_eq!(text_at(&grid, 0, 1).as_deref(), Some("1"));
        assert_eq!(text_at(&grid, 1, 1).as_deref(), Some("2"));
        assert_eq!(grid.bounding_region(), Some(Section::new(0, 0, 1, 1)));
    }

    #[test]
    fn tsv_and_ragged_records() {
        let grid = Grid::new();
        let count = grid
            .load_delimited("a\tb\tc\nd\n".as_bytes(), DataFormat::Tsv)
            .unwrap();
        assert_eq!(count, 4);
        assert_eq!(text_at(&grid, 2, 0).as_deref(), Some("c"));
        assert_eq!(text_at(&grid, 1, 1), None);
    }

    #[test]
    fn quoted_fields_are_trimmed_per_line() {
        let grid = Grid::from_delimited("\"  one  \n   two \",x\n".as_bytes(), DataFormat::Csv)
            .unwrap();
        assert_eq!(text_at(&grid, 0, 0).as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn loading_replaces_existing_cells_with_one_notification() {
        let grid = Grid::new();
        grid.add(grid.create_text_cell((5, 5), "old")).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            grid.subscribe(move |c| seen.borrow_mut().push(*c))
        };
        grid.load_delimited("x\n".as_bytes(), DataFormat::Csv).unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(*seen.borrow(), vec![StructureChange::Reset]);
    }

    #[test]
    fn load_path_detects_tsv_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tsv");
        std::fs::write(&path, "a,b\tc\n").unwrap();
        let grid = Grid::new();
        assert_eq!(grid.load_path(&path).unwrap(), 2);
        assert_eq!(text_at(&grid, 0, 0).as_deref(), Some("a,b"));
        assert!(matches!(
            grid.load_path(dir.path().join("missing.csv")),
            Err(TableError::Io(_))
        ));
    }

    struct Person {
        name: &'static str,
        born: NaiveDate,
        note: Option<&'static str>,
    }

    #[test]
    fn records_become_rows_at_an_offset() {
        let people = [
            Person {
                name: "Ada",
                born: NaiveDate::from_ymd_opt(1815, 12, 10).unwrap(),
                note: None,
            },
            Person {
                name: "Alan",
                born: NaiveDate::from_ymd_opt(1912, 6, 23).unwrap(),
                note: Some("bombe"),
            },
        ];
        let grid = Grid::new();
        let count = grid
            .load_records(&people, (1, 2), |p| {
                vec![p.name.into(), p.born.into(), p.note.into()]
            })
            .unwrap();
        assert_eq!(count, 6);
        assert_eq!(text_at(&grid, 1, 2).as_deref(), Some("Ada"));
        assert_eq!(text_at(&grid, 3, 3).as_deref(), Some("bombe"));
        assert!(!grid.cell_at((3, 2)).unwrap().has_content());
        let date = grid
            .cell_at((2, 3))
            .unwrap()
            .with_content(|d: &DateContent| d.formatted())
            .unwrap();
        assert_eq!(date, "23/06/1912");
    }

    #[test]
    fn loaded_cells_must_belong_to_the_grid() {
        let grid = Grid::new();
        let other = Grid::new();
        let err = grid.load_cells(vec![other.create_cell((0, 0), None)]);
        assert!(matches!(err, Err(TableError::TableMismatch { .. })));
        grid.load_cells(vec![grid.create_cell((0, 0), None)]).unwrap();
        assert_eq!(grid.len(), 1);
    }
}
