use chrono::Locale;

use crate::alignment::ItemAlignment;
use crate::content::check_date_format;
use crate::error::Result;
use crate::font::{Font, TextStyle};
use crate::types::{Color, Size};

/// Defaults applied when a grid creates cells and content.
#[derive(Debug, Clone, PartialEq)]
pub struct TableConfig {
    pub cell_size: Size,
    pub background: Color,
    pub alignment: ItemAlignment,
    pub font: Font,
    pub text_color: Color,
    pub date_format: String,
    pub date_locale: Option<Locale>,
    pub corner_radius: u32,
    pub border_color: Color,
}

impl TableConfig {
    pub const DEFAULT_CELL_SIZE: Size = Size::new(100, 28);
    pub const DEFAULT_CORNER_RADIUS: u32 = 5;
    pub const DEFAULT_DATE_FORMAT: &'static str = "%d/%m/%Y";

    pub fn builder() -> TableConfigBuilder {
        TableConfigBuilder::new()
    }

    /// Rejects a `date_format` chrono cannot render.
    pub fn validate(&self) -> Result<()> {
        check_date_format(&self.date_format)
    }

    pub fn text_style(&self) -> TextStyle {
        TextStyle {
            font: self.font.clone(),
            color: self.text_color,
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            cell_size: Self::DEFAULT_CELL_SIZE,
            background: Color::WHITE,
            alignment: ItemAlignment::CENTRE_LEFT,
            font: Font::default(),
            text_color: Color::BLACK,
            date_format: Self::DEFAULT_DATE_FORMAT.to_string(),
            date_locale: None,
            corner_radius: Self::DEFAULT_CORNER_RADIUS,
            border_color: Color::BLACK,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableConfigBuilder {
    config: TableConfig,
}

impl TableConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TableConfig::default(),
        }
    }

    pub fn cell_size(mut self, size: Size) -> Self {
        self.config.cell_size = size;
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.config.background = color;
        self
    }

    pub fn alignment(mut self, alignment: ItemAlignment) -> Self {
        self.config.alignment = alignment;
        self
    }

    pub fn font(mut self, font: Font) -> Self {
        self.config.font = font;
        self
    }

    pub fn text_color(mut self, color: Color) -> Self {
        self.config.text_color = color;
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.config.date_format = format.into();
        self
    }

    pub fn date_locale(mut self, locale: Locale) -> Self {
        self.config.date_locale = Some(locale);
        self
    }

    pub fn corner_radius(mut self, radius: u32) -> Self {
        self.config.corner_radius = radius;
        self
    }

    pub fn border_color(mut self, color: Color) -> Self {
        self.config.border_color = color;
        self
    }

    /// Fails with `Validation` when the date format is not a valid strftime string.
    pub fn build(self) -> Result<TableConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for TableConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
