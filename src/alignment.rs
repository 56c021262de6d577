use crate::types::{Point, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HorizontalAlign {
    #[default]
    Left,
    Centre,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VerticalAlign {
    Top,
    #[default]
    Centre,
    Bottom,
}

/// Anchors content inside a cell. Edge-anchored axes keep `margin` pixels from the edge;
/// centred axes ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemAlignment {
    pub horizontal: HorizontalAlign,
    pub vertical: VerticalAlign,
    pub margin: Point,
}

impl ItemAlignment {
    pub const DEFAULT_MARGIN: i32 = 2;

    pub const fn new(horizontal: HorizontalAlign, vertical: VerticalAlign) -> Self {
        Self {
            horizontal,
            vertical,
            margin: Point::new(Self::DEFAULT_MARGIN, Self::DEFAULT_MARGIN),
        }
    }

    pub const fn with_margin(mut self, margin: Point) -> Self {
        self.margin = margin;
        self
    }

    pub const TOP_LEFT: ItemAlignment = ItemAlignment::new(HorizontalAlign::Left, VerticalAlign::Top);
    pub const CENTRE_LEFT: ItemAlignment =
        ItemAlignment::new(HorizontalAlign::Left, VerticalAlign::Centre);
    pub const CENTRE: ItemAlignment =
        ItemAlignment::new(HorizontalAlign::Centre, VerticalAlign::Centre);
    pub const CENTRE_RIGHT: ItemAlignment =
        ItemAlignment::new(HorizontalAlign::Right, VerticalAlign::Centre);

    /// Offset of an `object` placed inside `container`, relative to the container origin.
    /// The container's last pixel row and column belong to its border.
    pub fn align(&self, container: Size, object: Size) -> Point {
        let width = container.width - 1;
        let height = container.height - 1;
        let x = match self.horizontal {
            HorizontalAlign::Left => self.margin.x,
            HorizontalAlign::Centre => width / 2 - object.width / 2,
            HorizontalAlign::Right => width - (object.width + self.margin.x),
        };
        let y = match self.vertical {
            VerticalAlign::Top => self.margin.y,
            VerticalAlign::Centre => height / 2 - object.height / 2,
            VerticalAlign::Bottom => height - (object.height + self.margin.y),
        };
        Point::new(x, y)
    }

    pub fn to_css(&self) -> String {
        let text_align = match self.horizontal {
            HorizontalAlign::Left => "left",
            HorizontalAlign::Centre => "center",
            HorizontalAlign::Right => "right",
        };
        let vertical_align = match self.vertical {
            VerticalAlign::Top => "top",
            VerticalAlign::Centre => "middle",
            VerticalAlign::Bottom => "bottom",
        };
        format!("text-align: {text_align}; vertical-align: {vertical_align};")
    }
}

impl Default for ItemAlignment {
    fn default() -> Self {
        ItemAlignment::CENTRE_LEFT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_left_keeps_margin_and_centres_vertically() {
        let offset = ItemAlignment::CENTRE_LEFT.align(Size::new(100, 29), Size::new(40, 10));
        assert_eq!(offset, Point::new(2, 9));
    }

    #[test]
    fn right_bottom_subtracts_margin_from_far_edge() {
        let alignment = ItemAlignment::new(HorizontalAlign::Right, VerticalAlign::Bottom)
            .with_margin(Point::new(3, 4));
        let offset = alignment.align(Size::new(51, 31), Size::new(20, 10));
        assert_eq!(offset, Point::new(27, 16));
    }

    #[test]
    fn centre_ignores_margin() {
        let alignment = ItemAlignment::CENTRE.with_margin(Point::new(50, 50));
        assert_eq!(
            alignment.align(Size::new(21, 21), Size::new(10, 10)),
            Point::new(5, 5)
        );
    }

    #[test]
    fn oversized_content_gets_negative_centre_offset() {
        let offset = ItemAlignment::CENTRE.align(Size::new(11, 11), Size::new(30, 2));
        assert_eq!(offset.x, -10);
    }

    #[test]
    fn css_uses_html_keywords() {
        assert_eq!(
            ItemAlignment::CENTRE_RIGHT.to_css(),
            "text-align: right; vertical-align: middle;"
        );
    }
}
