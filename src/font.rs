use crate::error::{Result, TableError};
use crate::types::{Color, Size};
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const FALLBACK_ADVANCE_EM: f32 = 0.6;
const FALLBACK_LINE_HEIGHT_EM: f32 = 1.2;
const FALLBACK_ASCENT_EM: f32 = 0.8;
const PX_EPSILON: f32 = 0.001;

#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family: String,
    /// Pixel size.
    pub size: f32,
}

impl Font {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            size,
        }
    }

    pub fn to_css(&self) -> String {
        format!(
            "font-family: '{}'; font-size: {}px;",
            self.family.replace('\'', ""),
            self.size
        )
    }
}

impl Default for Font {
    fn default() -> Self {
        Font::new("Times New Roman", 15.0)
    }
}

/// Font and colour shared by text-like content; row and column views restyle through it.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: Font,
    pub color: Color,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: Font::default(),
            color: Color::BLACK,
        }
    }
}

/// Text broken into lines at a wrap width, with its pixel extent.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub line_height: f32,
    pub size: Size,
}

/// Text metrics used by layout. Implementors supply single-line width and line height;
/// wrapping is derived from those.
pub trait TextMeasure {
    fn line_width(&self, text: &str, font: &Font) -> f32;

    fn line_height(&self, font: &Font) -> f32;

    fn layout_text(&self, text: &str, font: &Font, wrap_width: Option<i32>) -> TextBlock {
        let lines = wrap_lines(self, text, font, wrap_width);
        let line_height = self.line_height(font);
        let widest = lines
            .iter()
            .map(|line| self.line_width(line, font))
            .fold(0.0f32, f32::max);
        TextBlock {
            size: Size::new(to_px(widest), to_px(line_height * lines.len() as f32)),
            lines,
            line_height,
        }
    }

    fn measure_text(&self, text: &str, font: &Font, wrap_width: Option<i32>) -> Size {
        self.layout_text(text, font, wrap_width).size
    }
}

/// Greedy whitespace wrapping. Explicit newlines always break; a word wider than the
/// wrap width keeps a line of its own.
fn wrap_lines<M: TextMeasure + ?Sized>(
    measure: &M,
    text: &str,
    font: &Font,
    wrap_width: Option<i32>,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.strip_suffix('\r').unwrap_or(paragraph);
        let Some(limit) = wrap_width else {
            lines.push(paragraph.to_string());
            continue;
        };
        let limit = limit as f32 + PX_EPSILON;
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{current} {word}");
            if measure.line_width(&candidate, font) <= limit {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            }
        }
        lines.push(current);
    }
    lines
}

pub(crate) fn to_px(value: f32) -> i32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value - PX_EPSILON).ceil().max(0.0) as i32
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, f32>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<f32> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: f32) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

/// Registered font programs plus measurement. Families that cannot be resolved measure
/// with fixed em-based metrics, so layout is deterministic without any font installed.
#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    fallback: Option<usize>,
    text_width_cache: Mutex<TextWidthCache>,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Arc<Vec<u8>>,
    pub(crate) metrics: FontMetrics,
}

#[derive(Debug)]
pub(crate) struct FontMetrics {
    first_char: u8,
    last_char: u8,
    widths: Vec<u16>,
    missing_width: u16,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) line_gap: i16,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            fallback: None,
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    /// Registry populated from the platform font directories.
    pub fn with_system_fonts() -> Self {
        let mut registry = Self::new();
        registry.register_system_fonts();
        registry
    }

    pub fn register_system_fonts(&mut self) {
        for dir in system_font_dirs() {
            self.register_dir(&dir);
        }
        if self.fallback.is_none() {
            let preferred = [
                "Times New Roman",
                "Liberation Serif",
                "DejaVu Serif",
                "DejaVu Sans",
                "Arial",
            ];
            self.fallback = preferred
                .iter()
                .find_map(|name| self.lookup.get(&normalize_name(name)).copied())
                .or_else(|| (!self.fonts.is_empty()).then_some(0));
        }
        debug!(fonts = self.fonts.len(), "registered system fonts");
    }

    /// Registers every .ttf/.otf below `path`.
    pub fn register_dir(&mut self, path: impl AsRef<Path>) {
        let Ok(entries) = fs::read_dir(path.as_ref()) else {
            return;
        };
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();
        for path in paths {
            if path.is_dir() {
                self.register_dir(&path);
            } else if path.is_file() {
                self.register_file(&path);
            }
        }
    }

    /// Registers a font file, returning its primary name. Non-font extensions and
    /// unparsable files are skipped.
    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Option<String> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|v| v.to_str())?.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" {
            return None;
        }
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable font file");
                return None;
            }
        };
        match self.register_bytes(data, path.to_str()) {
            Ok(name) => Some(name),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping font file");
                None
            }
        }
    }

    pub fn register_bytes(&mut self, data: Vec<u8>, source_name: Option<&str>) -> Result<String> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(TableError::Validation(format!(
                "invalid font data for {source}"
            )));
        };

        let (name, aliases) = font_names(&face, Path::new(source));
        let metrics = FontMetrics::from_face(&face);
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data: Arc::new(data),
            metrics,
        });

        let mut all_aliases = Vec::new();
        all_aliases.push(name.clone());
        all_aliases.extend(aliases);
        for alias in all_aliases {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }

        Ok(name)
    }

    /// Family used when a requested family is not registered.
    pub fn set_fallback_family(&mut self, name: &str) -> bool {
        match self.lookup.get(&normalize_name(name)) {
            Some(index) => {
                self.fallback = Some(*index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    fn resolve_index(&self, name: &str) -> Option<usize> {
        self.lookup
            .get(&normalize_name(name))
            .copied()
            .or(self.fallback)
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        self.resolve_index(name)
            .and_then(|index| self.fonts.get(index))
    }

    pub fn ascent(&self, font: &Font) -> f32 {
        match self.resolve(&font.family) {
            Some(registered) => registered.metrics.ascent as f32 * font.size / 1000.0,
            None => font.size * FALLBACK_ASCENT_EM,
        }
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TextMeasure for FontRegistry {
    fn line_width(&self, text: &str, font: &Font) -> f32 {
        let Some(index) = self.resolve_index(&font.family) else {
            return text.chars().count() as f32 * font.size * FALLBACK_ADVANCE_EM;
        };
        let Some(registered) = self.fonts.get(index) else {
            return text.chars().count() as f32 * font.size * FALLBACK_ADVANCE_EM;
        };
        let cache_key = TextWidthKey {
            font_index: index,
            size_milli: (font.size as f64 * 1000.0).round() as i64,
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }
        let value = if registered.metrics.is_within_basic_latin(text) {
            registered.metrics.measure_text_width(font.size, text)
        } else {
            measure_text_width_shaped(registered, font.size, text)
                .unwrap_or_else(|| registered.metrics.measure_text_width(font.size, text))
        };
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }

    fn line_height(&self, font: &Font) -> f32 {
        let fallback = font.size * FALLBACK_LINE_HEIGHT_EM;
        match self.resolve(&font.family) {
            Some(registered) => registered.metrics.line_height(font.size).max(fallback),
            None => fallback,
        }
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;
        let widths = build_widths(face, scale, first_char, last_char);
        let missing_width = widths
            .get((b' ' - first_char) as usize)
            .copied()
            .unwrap_or(0);
        Self {
            first_char,
            last_char,
            widths,
            missing_width,
            ascent: scale_i16(face.ascender(), scale),
            descent: scale_i16(face.descender(), scale),
            line_gap: scale_i16(face.line_gap(), scale),
        }
    }

    fn advance_for_char(&self, ch: char) -> u16 {
        let code = ch as u32;
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        if code < first || code > last {
            return self.missing_width;
        }
        let idx = (code - first) as usize;
        self.widths.get(idx).copied().unwrap_or(self.missing_width)
    }

    fn measure_text_width(&self, font_size: f32, text: &str) -> f32 {
        let total_units: i32 = text
            .chars()
            .map(|ch| self.advance_for_char(ch) as i32)
            .fold(0, i32::saturating_add);
        if total_units <= 0 {
            return 0.0;
        }
        font_size * total_units as f32 / 1000.0
    }

    fn is_within_basic_latin(&self, text: &str) -> bool {
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        text.chars().all(|ch| {
            let code = ch as u32;
            code >= first && code <= last
        })
    }

    fn line_height(&self, font_size: f32) -> f32 {
        let height_1000 = self.ascent as i32 - self.descent as i32 + self.line_gap as i32;
        if height_1000 <= 0 {
            return 0.0;
        }
        font_size * height_1000 as f32 / 1000.0
    }
}

fn build_widths(face: &ttf_parser::Face<'_>, scale: f32, first: u8, last: u8) -> Vec<u16> {
    let mut widths = Vec::with_capacity((last - first + 1) as usize);
    for code in first..=last {
        let width = char::from_u32(code as u32)
            .and_then(|ch| face.glyph_index(ch))
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(0);
        let scaled = (width as f32 * scale).round() as i32;
        widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
    }
    widths
}

fn measure_text_width_shaped(font: &RegisteredFont, font_size: f32, text: &str) -> Option<f32> {
    let face = HbFace::from_slice(&font.data, 0)?;
    let units_per_em = face.units_per_em().max(1) as f32;

    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return None;
    }
    let total_units: i64 = positions.iter().map(|pos| pos.x_advance as i64).sum();
    if total_units <= 0 {
        return Some(0.0);
    }
    Some(font_size * total_units as f32 / units_per_em)
}

pub(crate) fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF
                | 0xFB1D..=0xFDFF
                | 0xFE70..=0xFEFF
                | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = family
        .clone()
        .or_else(|| full.clone())
        .or_else(|| post.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let mut aliases = Vec::new();
    for candidate in [family, full, post, stem].into_iter().flatten() {
        if candidate != primary {
            aliases.push(candidate);
        }
    }

    (primary, aliases)
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    if let Ok(extra) = std::env::var("TABLECAST_FONT_DIR") {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    dirs
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font(size: f32) -> Font {
        Font::new("Unregistered Sans", size)
    }

    #[test]
    fn unresolved_family_uses_em_based_metrics() {
        let registry = FontRegistry::new();
        assert_eq!(registry.measure_text("hello", &font(10.0), None), Size::new(30, 12));
        assert!((registry.ascent(&font(10.0)) - 8.0).abs() < 1e-4);
    }

    #[test]
    fn empty_text_is_one_empty_line() {
        let registry = FontRegistry::new();
        let block = registry.layout_text("", &font(10.0), Some(50));
        assert_eq!(block.lines, vec![String::new()]);
        assert_eq!(block.size, Size::new(0, 12));
    }

    #[test]
    fn wrapping_is_greedy_on_whitespace() {
        let registry = FontRegistry::new();
        // 6px per char: "aa bb" = 30, "aa bb cc" = 48.
        let block = registry.layout_text("aa bb cc dd", &font(10.0), Some(30));
        assert_eq!(block.lines, vec!["aa bb", "cc dd"]);
        assert_eq!(block.size, Size::new(30, 24));
    }

    #[test]
    fn long_word_keeps_its_own_line() {
        let registry = FontRegistry::new();
        let block = registry.layout_text("a overlongword b", &font(10.0), Some(20));
        assert_eq!(block.lines, vec!["a", "overlongword", "b"]);
        assert_eq!(block.size.width, 72);
    }

    #[test]
    fn explicit_newlines_break_without_wrap_width() {
        let registry = FontRegistry::new();
        let block = registry.layout_text("one\r\ntwo three", &font(10.0), None);
        assert_eq!(block.lines, vec!["one", "two three"]);
        assert_eq!(block.size, Size::new(54, 24));
    }

    #[test]
    fn register_bytes_rejects_garbage() {
        let mut registry = FontRegistry::new();
        let err = registry.register_bytes(vec![0, 1, 2, 3], Some("junk.ttf"));
        assert!(matches!(err, Err(TableError::Validation(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn register_file_skips_non_font_extensions() {
        let mut registry = FontRegistry::new();
        assert_eq!(registry.register_file("notes.txt"), None);
        assert!(!registry.set_fallback_family("anything"));
    }

    #[test]
    fn px_rounding_ignores_float_noise() {
        assert_eq!(to_px(30.000_002), 30);
        assert_eq!(to_px(30.2), 31);
        assert_eq!(to_px(-4.0), 0);
    }

    #[test]
    fn text_width_cache_evicts_oldest() {
        let mut cache = TextWidthCache::new(1);
        let key = |text: &str| TextWidthKey {
            font_index: 0,
            size_milli: 1000,
            text: text.to_string(),
        };
        cache.insert(key("a"), 1.0);
        cache.insert(key("b"), 2.0);
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.get(&key("b")), Some(2.0));
    }
}
