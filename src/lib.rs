mod alignment;
mod canvas;
mod cell;
mod config;
mod content;
mod error;
mod font;
mod grid;
mod html;
mod image_content;
mod layout;
mod load;
mod notify;
mod raster;
mod sizing;
mod sub_table;
mod types;
mod view;

pub use alignment::{HorizontalAlign, ItemAlignment, VerticalAlign};
pub use canvas::{Canvas, Command, Drawing};
pub use cell::{Cell, CellOptions, GridId};
pub use config::{TableConfig, TableConfigBuilder};
pub use content::{CellValue, Content, DateContent, SharedContent, TextContent};
pub use error::{Result, TableError};
pub use font::{Font, FontRegistry, TextBlock, TextMeasure, TextStyle};
pub use grid::Grid;
pub use html::{DEFAULT_TABLE_CLASS, HtmlExport, HtmlOptions, HtmlResources};
pub use image_content::ImageContent;
pub use layout::{CellPlacement, TableLayout};
pub use load::DataFormat;
pub use notify::{StructureChange, Subscription, SubscriptionId};
pub use raster::{rasterize, render_image, render_png};
pub use sub_table::{SubTableContent, distribute};
pub use types::{Color, CornerRadii, Point, Position, Rect, Section, Size};
pub use view::{Axis, AxisView, TableCollection, TableColumn, TableRow};
