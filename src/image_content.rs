use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;

use crate::canvas::Canvas;
use crate::content::Content;
use crate::error::Result;
use crate::font::TextMeasure;
use crate::html::HtmlResources;
use crate::types::{Point, Rect, Size};

/// A bitmap drawn at a render size that can differ from its natural size.
#[derive(Debug, Clone)]
pub struct ImageContent {
    image: Arc<RgbaImage>,
    render_size: Size,
}

impl ImageContent {
    pub fn new(image: RgbaImage) -> Self {
        Self::from_shared(Arc::new(image))
    }

    pub fn from_shared(image: Arc<RgbaImage>) -> Self {
        let render_size = natural_size_of(&image);
        Self { image, render_size }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let decoded = image::open(path.as_ref())?;
        Ok(Self::new(decoded.to_rgba8()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(data)?;
        Ok(Self::new(decoded.to_rgba8()))
    }

    pub fn image(&self) -> &Arc<RgbaImage> {
        &self.image
    }

    pub fn natural_size(&self) -> Size {
        natural_size_of(&self.image)
    }

    pub fn render_size(&self) -> Size {
        self.render_size
    }

    pub fn set_render_size(&mut self, size: Size) {
        self.render_size = Size::new(size.width.max(0), size.height.max(0));
    }

    /// Fills a cell of `size`, leaving one pixel for each border.
    pub fn stretch_to_size(&mut self, size: Size) {
        self.render_size = size.shrink(2, 2);
    }

    pub fn scale_to_width(&mut self, width: i32) {
        let natural = self.natural_size();
        let width = width.max(0);
        self.render_size = Size::new(width, scale(width, natural.height, natural.width));
    }

    pub fn scale_to_height(&mut self, height: i32) {
        let natural = self.natural_size();
        let height = height.max(0);
        self.render_size = Size::new(scale(height, natural.width, natural.height), height);
    }

    pub fn reset_size(&mut self) {
        self.render_size = self.natural_size();
    }
}

fn natural_size_of(image: &RgbaImage) -> Size {
    let (w, h) = image.dimensions();
    Size::new(
        i32::try_from(w).unwrap_or(i32::MAX),
        i32::try_from(h).unwrap_or(i32::MAX),
    )
}

// value * num / den, rounded to nearest.
fn scale(value: i32, num: i32, den: i32) -> i32 {
    if den <= 0 {
        return 0;
    }
    let scaled = (value as i64 * num as i64 + den as i64 / 2) / den as i64;
    scaled.clamp(0, i32::MAX as i64) as i32
}

impl Content for ImageContent {
    fn measure(&self, _measure: &dyn TextMeasure, _bounds: Option<Size>) -> Size {
        self.render_size
    }

    fn draw(&self, canvas: &mut Canvas, _measure: &dyn TextMeasure, origin: Point, _bounds: Size) {
        canvas.draw_image(
            Rect::from_origin_size(origin, self.render_size),
            self.image.clone(),
        );
    }

    fn to_html(&self, resources: &mut HtmlResources) -> Result<String> {
        let src = resources.image_source(&self.image)?;
        Ok(format!(
            "<img src=\"{}\" width=\"{}\" height=\"{}\" alt=\"\"/>",
            src, self.render_size.width, self.render_size.height
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::error::TableError;
    use crate::font::FontRegistry;

    fn picture() -> ImageContent {
        ImageContent::new(RgbaImage::new(40, 20))
    }

    #[test]
    fn render_size_starts_at_natural_size() {
        let image = picture();
        assert_eq!(image.natural_size(), Size::new(40, 20));
        assert_eq!(image.measure(&FontRegistry::new(), Some(Size::new(5, 5))), Size::new(40, 20));
    }

    #[test]
    fn stretch_leaves_room_for_borders() {
        let mut image = picture();
        image.stretch_to_size(Size::new(100, 28));
        assert_eq!(image.render_size(), Size::new(98, 26));
        assert_eq!(image.natural_size(), Size::new(40, 20));
    }

    #[test]
    fn scaling_keeps_natural_aspect_ratio() {
        let mut image = picture();
        image.stretch_to_size(Size::new(10, 90));
        image.scale_to_width(30);
        assert_eq!(image.render_size(), Size::new(30, 15));
        image.scale_to_height(25);
        assert_eq!(image.render_size(), Size::new(50, 25));
        image.reset_size();
        assert_eq!(image.render_size(), Size::new(40, 20));
    }

    #[test]
    fn empty_image_scales_to_zero() {
        let mut image = ImageContent::new(RgbaImage::new(0, 0));
        image.scale_to_width(30);
        assert_eq!(image.render_size(), Size::new(30, 0));
    }

    #[test]
    fn draw_uses_render_size() {
        let mut image = picture();
        image.scale_to_width(20);
        let mut canvas = Canvas::new(Size::new(50, 50));
        image.draw(&mut canvas, &FontRegistry::new(), Point::new(3, 4), Size::new(50, 50));
        assert!(matches!(
            canvas.commands(),
            [Command::DrawImage { rect, .. }] if *rect == Rect::new(3, 4, 20, 10)
        ));
    }

    #[test]
    fn undecodable_bytes_are_an_image_error() {
        assert!(matches!(
            ImageContent::from_bytes(b"not an image"),
            Err(TableError::Image(_))
        ));
    }
}
