use crate::canvas::{Command, Drawing};
use crate::error::{Result, TableError};
use crate::font::{Font, FontRegistry, detect_direction};
use crate::types::{Color, CornerRadii, Point, Rect};
use image::RgbaImage;
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tiny_skia::{
    FillRule, FilterQuality, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Transform,
};
use tracing::{debug, trace, warn};
use ttf_parser::{GlyphId, OutlineBuilder};

const KAPPA: f32 = 0.552_284_8;

#[derive(Clone, Default)]
struct RasterState {
    clip_mask: Option<Mask>,
}

/// Replays a drawing onto a fresh transparent pixmap.
///
/// Text is drawn only in families `fonts` can resolve. Other families are still measured
/// with fallback metrics, so their cells keep their size but stay blank; each such family
/// is logged once per call.
pub fn rasterize(drawing: &Drawing, fonts: &FontRegistry) -> Result<Pixmap> {
    let width = u32::try_from(drawing.size.width).unwrap_or(0);
    let height = u32::try_from(drawing.size.height).unwrap_or(0);
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        TableError::Raster(format!("invalid raster size {width}x{height}"))
    })?;

    let mut state = RasterState::default();
    let mut stack: Vec<RasterState> = Vec::new();
    let mut image_cache: HashMap<usize, Option<Pixmap>> = HashMap::new();
    let mut unresolved: HashSet<&str> = HashSet::new();

    for command in &drawing.commands {
        match command {
            Command::SaveState => stack.push(state.clone()),
            Command::RestoreState => {
                if let Some(prev) = stack.pop() {
                    state = prev;
                }
            }
            Command::ClipRect(rect) => apply_clip_rect(&mut state, *rect, width, height),
            Command::DrawRoundedRect {
                rect,
                fill,
                radii,
                border,
            } => draw_rounded_rect(&mut pixmap, &state, *rect, *fill, *radii, *border),
            Command::DrawText {
                origin,
                lines,
                line_height,
                font,
                color,
            } => {
                if fonts.resolve(&font.family).is_none() {
                    if unresolved.insert(font.family.as_str()) {
                        warn!(
                            family = %font.family,
                            "no font registered for family; its text is measured but not drawn"
                        );
                    }
                    continue;
                }
                draw_text(
                    &mut pixmap,
                    &state,
                    fonts,
                    *origin,
                    lines,
                    *line_height,
                    font,
                    *color,
                );
            }
            Command::DrawImage { rect, image } => {
                let source = image_cache
                    .entry(Arc::as_ptr(image) as usize)
                    .or_insert_with(|| image_to_pixmap(image));
                if let Some(source) = source.as_ref() {
                    draw_image(&mut pixmap, &state, *rect, source);
                }
            }
        }
    }

    debug!(width, height, commands = drawing.commands.len(), "rasterized drawing");
    Ok(pixmap)
}

pub fn render_image(drawing: &Drawing, fonts: &FontRegistry) -> Result<RgbaImage> {
    let pixmap = rasterize(drawing, fonts)?;
    pixmap_to_image(&pixmap)
}

pub fn render_png(drawing: &Drawing, fonts: &FontRegistry) -> Result<Vec<u8>> {
    let pixmap = rasterize(drawing, fonts)?;
    pixmap
        .encode_png()
        .map_err(|e| TableError::Raster(format!("png encode failed: {e}")))
}

pub(crate) fn pixmap_to_image(pixmap: &Pixmap) -> Result<RgbaImage> {
    let mut raw = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        raw.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), raw)
        .ok_or_else(|| TableError::Raster("pixel buffer size mismatch".to_string()))
}

fn apply_clip_rect(state: &mut RasterState, rect: Rect, width: u32, height: u32) {
    let Some(sk_rect) =
        tiny_skia::Rect::from_xywh(rect.x as f32, rect.y as f32, rect.width as f32, rect.height as f32)
    else {
        // An empty clip hides everything after it.
        state.clip_mask = Mask::new(width, height);
        return;
    };
    let path = PathBuilder::from_rect(sk_rect);
    if let Some(mask) = state.clip_mask.as_mut() {
        mask.intersect_path(&path, FillRule::Winding, false, Transform::identity());
        return;
    }
    let Some(mut mask) = Mask::new(width, height) else {
        return;
    };
    mask.fill_path(&path, FillRule::Winding, false, Transform::identity());
    state.clip_mask = Some(mask);
}

fn draw_rounded_rect(
    pixmap: &mut Pixmap,
    state: &RasterState,
    rect: Rect,
    fill: Color,
    radii: CornerRadii,
    border: Color,
) {
    if rect.width <= 0 || rect.height <= 0 {
        return;
    }
    let clip = state.clip_mask.as_ref();
    let radii = clamp_radii(radii, rect);
    let mut solid = fill_paint(fill);
    solid.anti_alias = false;
    let mut edge_paint = fill_paint(border);
    edge_paint.anti_alias = false;
    let (w, h) = (rect.width, rect.height);

    if radii.is_zero() || w < 3 || h < 3 {
        if !fill.is_transparent() {
            fill_pixels(pixmap, &solid, clip, rect);
        }
        if !border.is_transparent() {
            let edges = [
                Rect::new(rect.x, rect.y, w, 1),
                Rect::new(rect.x, rect.y + h - 1, w, 1),
                Rect::new(rect.x, rect.y, 1, h),
                Rect::new(rect.x + w - 1, rect.y, 1, h),
            ];
            for edge in edges {
                fill_pixels(pixmap, &edge_paint, clip, edge);
            }
        }
        return;
    }

    // Outside the corner boxes every pixel is either wholly fill or wholly border.
    for row in 0..h {
        let (left, right) = row_span(radii, w, h, row);
        if left >= right {
            continue;
        }
        let y = rect.y + row;
        if row == 0 || row == h - 1 {
            if !border.is_transparent() {
                let span = Rect::new(rect.x + left, y, right - left, 1);
                fill_pixels(pixmap, &edge_paint, clip, span);
            }
            continue;
        }
        if !fill.is_transparent() {
            fill_pixels(pixmap, &solid, clip, Rect::new(rect.x + left, y, right - left, 1));
        }
        if !border.is_transparent() {
            if left == 0 {
                fill_pixels(pixmap, &edge_paint, clip, Rect::new(rect.x, y, 1, 1));
            }
            if right == w {
                fill_pixels(pixmap, &edge_paint, clip, Rect::new(rect.x + w - 1, y, 1, 1));
            }
        }
    }

    draw_rounded_corners(pixmap, clip, rect, fill, radii, border);
}

/// Anti-aliased arcs, confined to the square box of each rounded corner.
fn draw_rounded_corners(
    pixmap: &mut Pixmap,
    clip: Option<&Mask>,
    rect: Rect,
    fill: Color,
    radii: CornerRadii,
    border: Color,
) {
    let (x, y, w, h) = (rect.x, rect.y, rect.width, rect.height);
    let boxes = [
        (radii.top_left as i32, x, y),
        (radii.top_right as i32, x + w - radii.top_right as i32, y),
        (
            radii.bottom_right as i32,
            x + w - radii.bottom_right as i32,
            y + h - radii.bottom_right as i32,
        ),
        (radii.bottom_left as i32, x, y + h - radii.bottom_left as i32),
    ];
    let mut pb = PathBuilder::new();
    for (radius, bx, by) in boxes {
        if radius > 0
            && let Some(area) = to_sk_rect(Rect::new(bx, by, radius, radius))
        {
            pb.push_rect(area);
        }
    }
    let Some(corner_area) = pb.finish() else {
        return;
    };
    let mask = match clip {
        Some(clip) => {
            let mut mask = clip.clone();
            mask.intersect_path(&corner_area, FillRule::Winding, false, Transform::identity());
            mask
        }
        None => {
            let Some(mut mask) = Mask::new(pixmap.width(), pixmap.height()) else {
                return;
            };
            mask.fill_path(&corner_area, FillRule::Winding, false, Transform::identity());
            mask
        }
    };

    let (fx, fy, fw, fh) = (x as f32, y as f32, w as f32, h as f32);
    let inner_radii = CornerRadii {
        top_left: radii.top_left.saturating_sub(1),
        top_right: radii.top_right.saturating_sub(1),
        bottom_right: radii.bottom_right.saturating_sub(1),
        bottom_left: radii.bottom_left.saturating_sub(1),
    };
    let mut inner = PathBuilder::new();
    push_rounded_rect(&mut inner, fx + 1.0, fy + 1.0, fw - 2.0, fh - 2.0, inner_radii);
    let inner = inner.finish();

    if !fill.is_transparent()
        && let Some(inner) = inner.as_ref()
    {
        pixmap.fill_path(
            inner,
            &fill_paint(fill),
            FillRule::Winding,
            Transform::identity(),
            Some(&mask),
        );
    }
    if !border.is_transparent() {
        let mut ring = PathBuilder::new();
        push_rounded_rect(&mut ring, fx, fy, fw, fh, radii);
        if inner.is_some() {
            push_rounded_rect(&mut ring, fx + 1.0, fy + 1.0, fw - 2.0, fh - 2.0, inner_radii);
        }
        if let Some(ring) = ring.finish() {
            pixmap.fill_path(
                &ring,
                &fill_paint(border),
                FillRule::EvenOdd,
                Transform::identity(),
                Some(&mask),
            );
        }
    }
}

/// Radii limited to half the shorter side, so corner boxes never overlap.
fn clamp_radii(radii: CornerRadii, rect: Rect) -> CornerRadii {
    let max = (rect.width.min(rect.height) / 2).max(0) as u32;
    CornerRadii {
        top_left: radii.top_left.min(max),
        top_right: radii.top_right.min(max),
        bottom_right: radii.bottom_right.min(max),
        bottom_left: radii.bottom_left.min(max),
    }
}

/// Columns `[left, right)` of `row` lying outside every corner box.
fn row_span(radii: CornerRadii, width: i32, height: i32, row: i32) -> (i32, i32) {
    let corner = |top: u32, bottom: u32| {
        let (top, bottom) = (top as i32, bottom as i32);
        if row < top {
            top
        } else if row >= height - bottom {
            bottom
        } else {
            0
        }
    };
    (
        corner(radii.top_left, radii.bottom_left),
        width - corner(radii.top_right, radii.bottom_right),
    )
}

fn to_sk_rect(rect: Rect) -> Option<tiny_skia::Rect> {
    tiny_skia::Rect::from_xywh(rect.x as f32, rect.y as f32, rect.width as f32, rect.height as f32)
}

fn fill_pixels(pixmap: &mut Pixmap, paint: &Paint, clip: Option<&Mask>, rect: Rect) {
    if let Some(area) = to_sk_rect(rect) {
        pixmap.fill_rect(area, paint, Transform::identity(), clip);
    }
}

/// Appends a closed rounded rectangle whose edges run along `x`, `y`, `x + w` and `y + h`.
fn push_rounded_rect(pb: &mut PathBuilder, x: f32, y: f32, w: f32, h: f32, radii: CornerRadii) {
    if w <= 0.0 || h <= 0.0 {
        return;
    }
    let max_radius = w.min(h) / 2.0;
    let clamp = |r: u32| (r as f32).min(max_radius);
    let (tl, tr, br, bl) = (
        clamp(radii.top_left),
        clamp(radii.top_right),
        clamp(radii.bottom_right),
        clamp(radii.bottom_left),
    );
    let (l, t, r, b) = (x, y, x + w, y + h);

    pb.move_to(l + tl, t);
    pb.line_to(r - tr, t);
    if tr > 0.0 {
        pb.cubic_to(r - tr + tr * KAPPA, t, r, t + tr - tr * KAPPA, r, t + tr);
    }
    pb.line_to(r, b - br);
    if br > 0.0 {
        pb.cubic_to(r, b - br + br * KAPPA, r - br + br * KAPPA, b, r - br, b);
    }
    pb.line_to(l + bl, b);
    if bl > 0.0 {
        pb.cubic_to(l + bl - bl * KAPPA, b, l, b - bl + bl * KAPPA, l, b - bl);
    }
    pb.line_to(l, t + tl);
    if tl > 0.0 {
        pb.cubic_to(l, t + tl - tl * KAPPA, l + tl - tl * KAPPA, t, l + tl, t);
    }
    pb.close();
}

#[allow(clippy::too_many_arguments)]
fn draw_text(
    pixmap: &mut Pixmap,
    state: &RasterState,
    fonts: &FontRegistry,
    origin: Point,
    lines: &[String],
    line_height: f32,
    font: &Font,
    color: Color,
) {
    if font.size <= 0.0 {
        return;
    }
    let Some(registered) = fonts.resolve(&font.family) else {
        trace!(family = %font.family, "no font program registered; text not drawn");
        return;
    };
    let Ok(face) = ttf_parser::Face::parse(&registered.data, 0) else {
        trace!(font = %registered.name, "font program failed to parse");
        return;
    };
    let paint = fill_paint(color);
    let ascent = fonts.ascent(font);

    for (index, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let baseline_x = origin.x as f32;
        let baseline_y = origin.y as f32 + index as f32 * line_height + ascent;
        for placement in layout_text_glyphs(&registered.data, line, font.size, baseline_x, baseline_y)
        {
            let mut builder = GlyphPathBuilder::new(placement.scale);
            if face
                .outline_glyph(GlyphId(placement.glyph_id), &mut builder)
                .is_none()
            {
                continue;
            }
            if let Some(path) = builder.finish() {
                pixmap.fill_path(
                    &path,
                    &paint,
                    FillRule::Winding,
                    Transform::from_translate(placement.origin_x, placement.origin_y),
                    state.clip_mask.as_ref(),
                );
            }
        }
    }
}

fn draw_image(pixmap: &mut Pixmap, state: &RasterState, rect: Rect, image: &Pixmap) {
    let src_w = image.width() as f32;
    let src_h = image.height() as f32;
    if src_w <= 0.0 || src_h <= 0.0 {
        return;
    }
    let sx = rect.width as f32 / src_w;
    let sy = rect.height as f32 / src_h;
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    pixmap.draw_pixmap(
        0,
        0,
        image.as_ref(),
        &paint,
        Transform::from_row(sx, 0.0, 0.0, sy, rect.x as f32, rect.y as f32),
        state.clip_mask.as_ref(),
    );
}

#[derive(Clone, Copy)]
struct GlyphPlacement {
    glyph_id: u16,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

fn layout_text_glyphs(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return layout_text_glyphs_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    };
    let hb_units = face.units_per_em().max(1) as f32;
    let scale = font_size / hb_units;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.is_empty() || infos.len() != positions.len() {
        return layout_text_glyphs_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    }

    let mut out = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let gid = info.glyph_id as u16;
        if gid != 0 {
            out.push(GlyphPlacement {
                glyph_id: gid,
                origin_x: baseline_x + pen_x + pos.x_offset as f32 * scale,
                // Font units grow upwards; the surface grows downwards.
                origin_y: baseline_y - pos.y_offset as f32 * scale,
                scale,
            });
        }
        pen_x += pos.x_advance as f32 * scale;
    }
    out
}

fn layout_text_glyphs_unshaped(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let Ok(face) = ttf_parser::Face::parse(font_data, 0) else {
        return Vec::new();
    };
    let units_per_em = face.units_per_em().max(1) as f32;
    let scale = font_size / units_per_em;

    let mut out = Vec::new();
    let mut pen_x = 0.0f32;
    for ch in text.chars() {
        let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        if gid == 0 {
            pen_x += font_size * 0.5;
            continue;
        }
        out.push(GlyphPlacement {
            glyph_id: gid,
            origin_x: baseline_x + pen_x,
            origin_y: baseline_y,
            scale,
        });
        let advance_units = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32;
        let mut adv = advance_units * scale;
        if adv <= 0.0 {
            adv = font_size * 0.5;
        }
        pen_x += adv;
    }
    out
}

/// Builds a glyph outline around the pen position, flipping font units to surface space.
struct GlyphPathBuilder {
    builder: PathBuilder,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x * self.scale, -y * self.scale);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x * self.scale, -y * self.scale);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            x1 * self.scale,
            -y1 * self.scale,
            x * self.scale,
            -y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            x1 * self.scale,
            -y1 * self.scale,
            x2 * self.scale,
            -y2 * self.scale,
            x * self.scale,
            -y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn fill_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a)
}

fn image_to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    let src = image.as_raw();
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}
