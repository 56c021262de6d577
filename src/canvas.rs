use std::sync::Arc;

use image::RgbaImage;

use crate::font::Font;
use crate::types::{Color, CornerRadii, Point, Rect, Size};

#[derive(Debug, Clone)]
pub enum Command {
    SaveState,
    RestoreState,
    // Intersects the current clip with `rect` until the matching RestoreState.
    ClipRect(Rect),
    DrawRoundedRect {
        rect: Rect,
        fill: Color,
        radii: CornerRadii,
        border: Color,
    },
    DrawText {
        origin: Point,
        lines: Vec<String>,
        line_height: f32,
        font: Font,
        color: Color,
    },
    DrawImage {
        rect: Rect,
        image: Arc<RgbaImage>,
    },
}

/// A finished recording: the surface size and the commands to replay onto it.
#[derive(Debug, Clone)]
pub struct Drawing {
    pub size: Size,
    pub commands: Vec<Command>,
}

#[derive(Debug)]
pub struct Canvas {
    size: Size,
    commands: Vec<Command>,
    depth: usize,
}

impl Canvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
            depth: 0,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn save_state(&mut self) {
        self.depth += 1;
        self.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        self.commands.push(Command::RestoreState);
    }

    pub fn clip_rect(&mut self, rect: Rect) {
        self.commands.push(Command::ClipRect(rect));
    }

    pub fn draw_rounded_rect(&mut self, rect: Rect, fill: Color, radii: CornerRadii, border: Color) {
        self.commands.push(Command::DrawRoundedRect {
            rect,
            fill,
            radii,
            border,
        });
    }

    pub fn draw_text(
        &mut self,
        origin: Point,
        lines: Vec<String>,
        line_height: f32,
        font: &Font,
        color: Color,
    ) {
        if lines.iter().all(|line| line.is_empty()) {
            return;
        }
        self.commands.push(Command::DrawText {
            origin,
            lines,
            line_height,
            font: font.clone(),
            color,
        });
    }

    pub fn draw_image(&mut self, rect: Rect, image: Arc<RgbaImage>) {
        if rect.width <= 0 || rect.height <= 0 {
            return;
        }
        self.commands.push(Command::DrawImage { rect, image });
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Closes any unbalanced saves and returns the recording.
    pub fn finish(mut self) -> Drawing {
        while self.depth > 0 {
            self.restore_state();
        }
        Drawing {
            size: self.size,
            commands: self.commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_balances_open_saves() {
        let mut canvas = Canvas::new(Size::new(10, 10));
        canvas.save_state();
        canvas.clip_rect(Rect::new(0, 0, 5, 5));
        canvas.save_state();
        let drawing = canvas.finish();
        let restores = drawing
            .commands
            .iter()
            .filter(|c| matches!(c, Command::RestoreState))
            .count();
        assert_eq!(restores, 2);
    }

    #[test]
    fn stray_restore_is_ignored() {
        let mut canvas = Canvas::new(Size::new(10, 10));
        canvas.restore_state();
        assert!(canvas.commands().is_empty());
    }

    #[test]
    fn blank_text_and_empty_images_are_not_recorded() {
        let mut canvas = Canvas::new(Size::new(10, 10));
        canvas.draw_text(Point::ZERO, vec![String::new()], 12.0, &Font::default(), Color::BLACK);
        canvas.draw_image(Rect::new(0, 0, 0, 4), Arc::new(RgbaImage::new(1, 1)));
        assert!(canvas.commands().is_empty());
    }
}
