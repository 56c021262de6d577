use std::fmt::Write as _;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use image::{ImageFormat, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cell::Cell;
use crate::error::{Result, TableError};
use crate::grid::Grid;
use crate::types::{Color, Section};

pub const DEFAULT_TABLE_CLASS: &str = "tablecast";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlOptions {
    /// Directory that receives image files. Images are inlined as data URIs when `None`.
    pub resource_dir: Option<PathBuf>,
    pub table_class: String,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            resource_dir: None,
            table_class: DEFAULT_TABLE_CLASS.to_string(),
        }
    }
}

impl HtmlOptions {
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = Some(dir.into());
        self
    }

    pub fn with_table_class(mut self, class: impl Into<String>) -> Self {
        self.table_class = class.into();
        self
    }
}

/// A `<style>` block and the table fragment it styles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlExport {
    pub css: String,
    pub table: String,
}

impl HtmlExport {
    /// A standalone HTML document holding both parts.
    pub fn to_document(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n<style>\n{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
            self.css, self.table
        )
    }
}

/// Where content writes the binary resources it references.
#[derive(Debug)]
pub struct HtmlResources {
    dir: Option<PathBuf>,
    written: Vec<PathBuf>,
}

impl HtmlResources {
    pub fn inline() -> Self {
        Self {
            dir: None,
            written: Vec::new(),
        }
    }

    /// Fails with `MissingResource` unless `dir` is an existing directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(TableError::MissingResource(dir));
        }
        Ok(Self {
            dir: Some(dir),
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Files written so far, in order. Identical images share one file.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// `src` value for an image: a content-addressed PNG in the resource directory, or a
    /// base64 data URI.
    pub fn image_source(&mut self, image: &RgbaImage) -> Result<String> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        let Some(dir) = self.dir.as_ref() else {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
            return Ok(format!("data:image/png;base64,{encoded}"));
        };
        let path = dir.join(format!("{}.png", sha256_hex(&png)));
        if !path.exists() {
            std::fs::write(&path, &png)?;
            debug!(path = %path.display(), bytes = png.len(), "image resource written");
        }
        if !self.written.contains(&path) {
            self.written.push(path.clone());
        }
        Ok(escape_html(&path.to_string_lossy()))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn table_css(class: &str, border: Color) -> String {
    let border = border.to_css();
    format!(
        "table.{class} {{ border-collapse: separate; border-spacing: 0; }}\n\
         table.{class} td {{ border-right: 1px solid {border}; border-bottom: 1px solid {border}; overflow: hidden; }}\n"
    )
}

fn cell_style(cell: &Cell, section: &Section, radius: u32, border: Color) -> String {
    let position = cell.position();
    let size = cell.size();
    let alignment = cell.alignment();
    let margin = alignment.margin;
    let mut style = format!(
        "width: {}px; height: {}px; padding: {}px {}px; background-color: {}; {}",
        (size.width - 2 * margin.x).max(0),
        (size.height - 2 * margin.y).max(0),
        margin.y,
        margin.x,
        cell.background().to_css(),
        alignment.to_css()
    );
    if position.column == section.left {
        let _ = write!(style, " border-left: 1px solid {};", border.to_css());
    }
    if position.row == section.top {
        let _ = write!(style, " border-top: 1px solid {};", border.to_css());
    }
    let corners = section.corner_radii(position, radius);
    if !corners.is_zero() {
        let _ = write!(
            style,
            " border-radius: {}px {}px {}px {}px;",
            corners.top_left, corners.top_right, corners.bottom_right, corners.bottom_left
        );
    }
    style
}

impl Grid {
    /// Renders the grid as an HTML table plus the CSS it needs. A configured resource
    /// directory is checked before anything is written. Gaps become empty cells, so a
    /// bounding region too large to visit fails with `RegionTooLarge`.
    pub fn export_html(&self, options: &HtmlOptions) -> Result<HtmlExport> {
        let mut resources = match &options.resource_dir {
            Some(dir) => HtmlResources::with_dir(dir.clone())?,
            None => HtmlResources::inline(),
        };
        let class = escape_html(&options.table_class);
        let border = self.border_color();
        let css = table_css(&class, border);

        let section = self.bounding_region();
        if let Some(section) = &section {
            section.ensure_visitable()?;
        }

        let mut table = format!("<table class=\"{class}\">\n");
        if let Some(section) = section {
            let radius = self.corner_radius();
            for row in section.rows() {
                table.push_str("<tr>\n");
                for column in section.columns() {
                    let Some(cell) = self.cell_at((column, row)) else {
                        table.push_str("<td></td>\n");
                        continue;
                    };
                    let inner = match cell.content() {
                        Some(content) => content.borrow().to_html(&mut resources)?,
                        None => String::new(),
                    };
                    let _ = writeln!(
                        table,
                        "<td style=\"{}\">{}</td>",
                        cell_style(&cell, &section, radius, border),
                        inner
                    );
                }
                table.push_str("</tr>\n");
            }
        }
        table.push_str("</table>");

        debug!(
            grid = %self.id(),
            cells = self.len(),
            resources = resources.written().len(),
            "html exported"
        );
        Ok(HtmlExport { css, table })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use crate::image_content::ImageContent;

    fn image_grid() -> Grid {
        let grid = Grid::new();
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        for column in 0..2 {
            let content = ImageContent::new(image.clone()).shared();
            grid.add(grid.create_cell((column, 0), Some(content))).unwrap();
        }
        grid
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn inline_images_become_data_uris() {
        let export = image_grid().export_html(&HtmlOptions::default()).unwrap();
        assert_eq!(export.table.matches("src=\"data:image/png;base64,").count(), 2);
    }

    #[test]
    fn identical_images_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = HtmlOptions::default().with_resource_dir(dir.path());
        let export = image_grid().export_html(&options).unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let name = files[0].as_ref().unwrap().file_name().into_string().unwrap();
        assert_eq!(name.len(), 64 + ".png".len());
        assert_eq!(export.table.matches(name.as_str()).count(), 2);
    }

    #[test]
    fn missing_resource_dir_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let options = HtmlOptions::default().with_resource_dir(&missing);
        assert!(matches!(
            image_grid().export_html(&options),
            Err(TableError::MissingResource(path)) if path == missing
        ));
        assert!(!missing.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn only_corner_cells_are_rounded() {
        let grid = Grid::new();
        grid.set_corner_radius(8);
        for (c, r) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            grid.add(grid.create_text_cell((c, r), "x")).unwrap();
        }
        let table = grid.export_html(&HtmlOptions::default()).unwrap().table;
        assert!(table.contains("border-radius: 8px 0px 0px 0px;"));
        assert!(table.contains("border-radius: 0px 8px 0px 0px;"));
        assert!(table.contains("border-radius: 0px 0px 0px 8px;"));
        assert!(table.contains("border-radius: 0px 0px 8px 0px;"));
        assert_eq!(table.matches("border-radius").count(), 4);
    }

    #[test]
    fn leading_borders_only_on_first_row_and_column() {
        let grid = Grid::new();
        for (c, r) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            grid.add(grid.create_cell((c, r), None)).unwrap();
        }
        let table = grid.export_html(&HtmlOptions::default()).unwrap().table;
        assert_eq!(table.matches("border-left").count(), 2);
        assert_eq!(table.matches("border-top").count(), 2);
    }

    #[test]
    fn cell_size_excludes_padding() {
        let grid = Grid::new();
        grid.add(grid.create_cell((0, 0), None)).unwrap();
        let table = grid.export_html(&HtmlOptions::default()).unwrap().table;
        assert!(table.contains("width: 96px; height: 24px; padding: 2px 2px; background-color: #ffffff;"));
        assert!(table.contains("text-align: left; vertical-align: middle;"));
    }

    #[test]
    fn gaps_and_text_render_as_expected() {
        let grid = Grid::new();
        grid.add(grid.create_text_cell((0, 0), "a & b\nc")).unwrap();
        grid.add(grid.create_cell((1, 1), None)).unwrap();
        let export = grid
            .export_html(&HtmlOptions::default().with_table_class("report"))
            .unwrap();
        assert!(export.table.starts_with("<table class=\"report\">"));
        assert!(export.table.contains("a &amp; b<br/>c"));
        assert_eq!(export.table.matches("<td></td>").count(), 2);
        assert!(export.css.contains("table.report td"));

        let document = export.to_document();
        assert!(document.contains(&export.css));
        assert!(document.contains(&export.table));
    }

    #[test]
    fn far_apart_cells_are_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let grid = image_grid();
        let far = grid.create_cell((i32::MAX, i32::MAX), None);
        grid.add(far).unwrap();
        let options = HtmlOptions::default().with_resource_dir(dir.path());
        assert!(matches!(
            grid.export_html(&options),
            Err(TableError::RegionTooLarge { .. })
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_grid_exports_an_empty_table() {
        let export = Grid::new().export_html(&HtmlOptions::default()).unwrap();
        assert_eq!(export.table, "<table class=\"tablecast\">\n</table>");
    }
}
