use std::any::Any;
use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::rc::Rc;

use chrono::format::{Item, StrftimeItems};
use chrono::{Locale, NaiveDate, NaiveDateTime, NaiveTime};
use image::RgbaImage;

use crate::canvas::Canvas;
use crate::config::TableConfig;
use crate::error::{Result, TableError};
use crate::font::{TextMeasure, TextStyle};
use crate::html::{HtmlResources, escape_html};
use crate::image_content::ImageContent;
use crate::types::{Point, Size};

/// Content shared between cells. Mutation goes through the `RefCell`.
pub type SharedContent = Rc<RefCell<dyn Content>>;

/// Payload of a cell. `bounds` is the cell size when measuring or drawing inside a cell;
/// `draw` places the content at `origin` exactly as `measure` sized it for the same bounds.
pub trait Content: Any + fmt::Debug {
    fn measure(&self, measure: &dyn TextMeasure, bounds: Option<Size>) -> Size;

    fn draw(&self, canvas: &mut Canvas, measure: &dyn TextMeasure, origin: Point, bounds: Size);

    fn to_html(&self, resources: &mut HtmlResources) -> Result<String>;

    /// Font and colour, for content that has them.
    fn text_style(&self) -> Option<&TextStyle> {
        None
    }

    fn text_style_mut(&mut self) -> Option<&mut TextStyle> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn shared(self) -> SharedContent
    where
        Self: Sized,
    {
        Rc::new(RefCell::new(self))
    }
}

fn draw_text_block(
    canvas: &mut Canvas,
    measure: &dyn TextMeasure,
    text: &str,
    style: &TextStyle,
    origin: Point,
    bounds: Size,
) {
    let block = measure.layout_text(text, &style.font, Some(bounds.width));
    canvas.draw_text(origin, block.lines, block.line_height, &style.font, style.color);
}

fn text_html(text: &str, style: &TextStyle) -> String {
    let body = escape_html(text).replace('\n', "<br/>");
    format!(
        "<span style=\"{} color: {};\">{}</span>",
        style.font.to_css(),
        style.color.to_css(),
        body
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextContent {
    text: String,
    style: TextStyle,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self::styled(text, TextStyle::default())
    }

    pub fn styled(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }
}

impl Content for TextContent {
    fn measure(&self, measure: &dyn TextMeasure, bounds: Option<Size>) -> Size {
        measure.measure_text(&self.text, &self.style.font, bounds.map(|b| b.width))
    }

    fn draw(&self, canvas: &mut Canvas, measure: &dyn TextMeasure, origin: Point, bounds: Size) {
        draw_text_block(canvas, measure, &self.text, &self.style, origin, bounds);
    }

    fn to_html(&self, _resources: &mut HtmlResources) -> Result<String> {
        Ok(text_html(&self.text, &self.style))
    }

    fn text_style(&self) -> Option<&TextStyle> {
        Some(&self.style)
    }

    fn text_style_mut(&mut self) -> Option<&mut TextStyle> {
        Some(&mut self.style)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn check_date_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(TableError::Validation(format!(
            "invalid date format {format:?}"
        )));
    }
    Ok(())
}

/// A timestamp rendered through a strftime-style format, optionally localized.
#[derive(Debug, Clone, PartialEq)]
pub struct DateContent {
    value: NaiveDateTime,
    format: String,
    locale: Option<Locale>,
    style: TextStyle,
}

impl DateContent {
    pub fn new(value: NaiveDateTime) -> Self {
        Self {
            value,
            format: TableConfig::DEFAULT_DATE_FORMAT.to_string(),
            locale: None,
            style: TextStyle::default(),
        }
    }

    pub(crate) fn from_config(value: NaiveDateTime, config: &TableConfig) -> Self {
        Self {
            value,
            format: config.date_format.clone(),
            locale: config.date_locale,
            style: config.text_style(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Result<Self> {
        self.set_format(format)?;
        Ok(self)
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn with_style(mut self, style: TextStyle) -> Self {
        self.style = style;
        self
    }

    pub fn value(&self) -> NaiveDateTime {
        self.value
    }

    pub fn set_value(&mut self, value: NaiveDateTime) {
        self.value = value;
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Rejects format strings chrono cannot render.
    pub fn set_format(&mut self, format: impl Into<String>) -> Result<()> {
        let format = format.into();
        check_date_format(&format)?;
        self.format = format;
        Ok(())
    }

    pub fn locale(&self) -> Option<Locale> {
        self.locale
    }

    pub fn set_locale(&mut self, locale: Option<Locale>) {
        self.locale = locale;
    }

    pub fn formatted(&self) -> String {
        let value = self.value.and_utc();
        let mut out = String::new();
        let written = match self.locale {
            Some(locale) => write!(out, "{}", value.format_localized(&self.format, locale)),
            None => write!(out, "{}", value.format(&self.format)),
        };
        if written.is_err() {
            return self.value.to_string();
        }
        out
    }
}

impl Content for DateContent {
    fn measure(&self, measure: &dyn TextMeasure, bounds: Option<Size>) -> Size {
        measure.measure_text(&self.formatted(), &self.style.font, bounds.map(|b| b.width))
    }

    fn draw(&self, canvas: &mut Canvas, measure: &dyn TextMeasure, origin: Point, bounds: Size) {
        draw_text_block(canvas, measure, &self.formatted(), &self.style, origin, bounds);
    }

    fn to_html(&self, _resources: &mut HtmlResources) -> Result<String> {
        Ok(text_html(&self.formatted(), &self.style))
    }

    fn text_style(&self) -> Option<&TextStyle> {
        Some(&self.style)
    }

    fn text_style_mut(&mut self) -> Option<&mut TextStyle> {
        Some(&mut self.style)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One extracted field of a record, before it becomes cell content.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Date(NaiveDateTime),
    Image(RgbaImage),
}

impl CellValue {
    pub fn into_content(self, config: &TableConfig) -> Option<SharedContent> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(text) => Some(TextContent::styled(text, config.text_style()).shared()),
            CellValue::Date(value) => Some(DateContent::from_config(value, config).shared()),
            CellValue::Image(image) => Some(ImageContent::new(image).shared()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::Date(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value.and_time(NaiveTime::MIN))
    }
}

impl From<RgbaImage> for CellValue {
    fn from(value: RgbaImage) -> Self {
        CellValue::Image(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::font::{Font, FontRegistry};
    use crate::types::Color;

    fn small() -> TextStyle {
        TextStyle {
            font: Font::new("Unregistered", 10.0),
            color: Color::rgb(10, 20, 30),
        }
    }

    fn date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(14, 5, 0))
            .unwrap()
    }

    #[test]
    fn text_measures_with_cell_width_as_wrap() {
        let fonts = FontRegistry::new();
        let text = TextContent::styled("aa bb cc", small());
        assert_eq!(text.measure(&fonts, None), Size::new(48, 12));
        assert_eq!(
            text.measure(&fonts, Some(Size::new(30, 100))),
            Size::new(30, 24)
        );
    }

    #[test]
    fn text_draw_records_wrapped_lines_at_origin() {
        let fonts = FontRegistry::new();
        let text = TextContent::styled("aa bb cc", small());
        let mut canvas = Canvas::new(Size::new(50, 50));
        text.draw(&mut canvas, &fonts, Point::new(2, 3), Size::new(30, 28));
        match &canvas.commands()[0] {
            Command::DrawText {
                origin,
                lines,
                color,
                ..
            } => {
                assert_eq!(*origin, Point::new(2, 3));
                assert_eq!(lines, &vec!["aa bb".to_string(), "cc".to_string()]);
                assert_eq!(*color, Color::rgb(10, 20, 30));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn text_html_is_escaped_and_styled() {
        let text = TextContent::styled("a<b>\n&c", small());
        let html = text.to_html(&mut HtmlResources::inline()).unwrap();
        assert!(html.contains("a&lt;b&gt;<br/>&amp;c"));
        assert!(html.contains("color: #0a141e;"));
        assert!(html.contains("font-size: 10px;"));
    }

    #[test]
    fn date_formats_with_default_and_custom_patterns() {
        let content = DateContent::new(date());
        assert_eq!(content.formatted(), "07/03/2024");
        let content = content.with_format("%Y-%m-%d %H:%M").unwrap();
        assert_eq!(content.formatted(), "2024-03-07 14:05");
    }

    #[test]
    fn date_formats_with_locale() {
        let content = DateContent::new(date())
            .with_format("%A %e %B")
            .unwrap()
            .with_locale(Locale::fr_FR);
        assert_eq!(content.formatted(), "jeudi  7 mars");
    }

    #[test]
    fn invalid_date_format_is_rejected_and_keeps_previous() {
        let mut content = DateContent::new(date());
        assert!(matches!(
            content.set_format("%Q nonsense %"),
            Err(TableError::Validation(_))
        ));
        assert_eq!(content.format(), "%d/%m/%Y");
    }

    #[test]
    fn text_style_is_reachable_through_the_trait() {
        let shared = DateContent::new(date()).shared();
        shared.borrow_mut().text_style_mut().unwrap().color = Color::WHITE;
        assert_eq!(shared.borrow().text_style().unwrap().color, Color::WHITE);
    }

    #[test]
    fn cell_values_map_to_content_kinds() {
        let config = TableConfig::default();
        let text = CellValue::from("x").into_content(&config).unwrap();
        assert!(text.borrow().as_any().is::<TextContent>());
        let date = CellValue::from(date()).into_content(&config).unwrap();
        assert!(date.borrow().as_any().is::<DateContent>());
        let image = CellValue::from(RgbaImage::new(2, 2))
            .into_content(&config)
            .unwrap();
        assert!(image.borrow().as_any().is::<ImageContent>());
        assert!(CellValue::from(None::<&str>).into_content(&config).is_none());
        assert_eq!(CellValue::from(42i64), CellValue::Text("42".to_string()));
    }
}
