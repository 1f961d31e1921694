use crate::{ReelError, Result};
use image::{Pixel, Rgba, RgbaImage};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// System font file names tried, in order, when no usable font was requested
pub const FALLBACK_FONT_NAMES: &[&str] = &[
    "arial.ttf",
    "Arial.ttf",
    "DejaVuSans.ttf",
    "DejaVuSans-Bold.ttf",
    "calibri.ttf",
    "times.ttf",
];

const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc"];

/// Built-in bitmap face geometry: 5x7 glyphs in a 6x8 cell
const CELL_COLUMNS: f32 = 6.0;
const CELL_ROWS: f32 = 8.0;
const GLYPH_ROWS: usize = 7;

/// Loaded glyph source
pub enum FontFace {
    TrueType(fontdue::Font),
    /// Fixed-cell bitmap face compiled into the binary
    Builtin,
}

/// A font that can be sized; cheap to clone
#[derive(Clone)]
pub struct Font {
    face: Arc<FontFace>,
    name: String,
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font").field("name", &self.name).finish()
    }
}

impl Font {
    /// The bitmap face that is always available
    pub fn builtin() -> Self {
        Self {
            face: Arc::new(FontFace::Builtin),
            name: "builtin-5x7".to_string(),
        }
    }

    /// Parse a TrueType/OpenType font from memory
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let face = fontdue::Font::from_bytes(data, fontdue::FontSettings::default())
            .map_err(|e| ReelError::Font(format!("{}: {}", name, e)))?;
        Ok(Self {
            face: Arc::new(FontFace::TrueType(face)),
            name,
        })
    }

    /// Read and parse a font file
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(path.display().to_string(), data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_builtin(&self) -> bool {
        matches!(*self.face, FontFace::Builtin)
    }

    /// Bind this font to a pixel size
    pub fn sized(&self, px: u32) -> SizedFont {
        SizedFont {
            font: self.clone(),
            px: px.max(1) as f32,
        }
    }
}

/// Measured extent of rendered text in whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextBox {
    pub width: u32,
    pub height: u32,
}

/// Ink bounds relative to the pen origin on the baseline (y grows upwards)
#[derive(Debug, Clone, Copy)]
struct Ink {
    min_x: f32,
    max_x: f32,
    min_y: f32,
    max_y: f32,
}

/// A font at a concrete pixel size
#[derive(Debug, Clone)]
pub struct SizedFont {
    font: Font,
    px: f32,
}

impl SizedFont {
    pub fn font(&self) -> &Font {
        &self.font
    }

    pub fn size(&self) -> u32 {
        self.px as u32
    }

    /// Bounding box of the ink of a single line. A line without ink measures 0x0.
    pub fn measure(&self, line: &str) -> TextBox {
        match &*self.font.face {
            FontFace::Builtin => {
                let cells = line.chars().count();
                if cells == 0 {
                    return TextBox::default();
                }
                let scale = self.px / CELL_ROWS;
                TextBox {
                    width: (cells as f32 * CELL_COLUMNS * scale).ceil() as u32,
                    height: (GLYPH_ROWS as f32 * scale).ceil() as u32,
                }
            }
            FontFace::TrueType(face) => match self.ink(face, line) {
                Some(ink) => TextBox {
                    width: (ink.max_x - ink.min_x).ceil().max(0.0) as u32,
                    height: (ink.max_y - ink.min_y).ceil().max(0.0) as u32,
                },
                None => TextBox::default(),
            },
        }
    }

    fn ink(&self, face: &fontdue::Font, line: &str) -> Option<Ink> {
        let mut pen = 0.0f32;
        let mut ink: Option<Ink> = None;
        let mut previous: Option<char> = None;

        for ch in line.chars() {
            if let Some(prev) = previous {
                pen += face.horizontal_kern(prev, ch, self.px).unwrap_or(0.0);
            }
            let metrics = face.metrics(ch, self.px);
            if metrics.width > 0 && metrics.height > 0 {
                let left = pen + metrics.xmin as f32;
                let right = left + metrics.width as f32;
                let bottom = metrics.ymin as f32;
                let top = bottom + metrics.height as f32;
                ink = Some(match ink {
                    Some(acc) => Ink {
                        min_x: acc.min_x.min(left),
                        max_x: acc.max_x.max(right),
                        min_y: acc.min_y.min(bottom),
                        max_y: acc.max_y.max(top),
                    },
                    None => Ink {
                        min_x: left,
                        max_x: right,
                        min_y: bottom,
                        max_y: top,
                    },
                });
            }
            pen += metrics.advance_width;
            previous = Some(ch);
        }

        ink
    }

    /// Draw one line so that the top-left corner of its ink box lands on (x, y)
    pub fn draw(&self, canvas: &mut RgbaImage, x: i64, y: i64, line: &str, color: Rgba<u8>) {
        match &*self.font.face {
            FontFace::Builtin => self.draw_builtin(canvas, x, y, line, color),
            FontFace::TrueType(face) => self.draw_truetype(face, canvas, x, y, line, color),
        }
    }

    fn draw_builtin(&self, canvas: &mut RgbaImage, x: i64, y: i64, line: &str, color: Rgba<u8>) {
        let scale = self.px / CELL_ROWS;
        for (cell, ch) in line.chars().enumerate() {
            let columns = builtin_glyph(ch);
            let cell_x = x as f32 + cell as f32 * CELL_COLUMNS * scale;
            for (col, bits) in columns.iter().enumerate() {
                for row in 0..GLYPH_ROWS {
                    if bits & (1 << row) == 0 {
                        continue;
                    }
                    let x0 = (cell_x + col as f32 * scale).floor() as i64;
                    let x1 = ((cell_x + (col + 1) as f32 * scale).floor() as i64).max(x0 + 1);
                    let y0 = (y as f32 + row as f32 * scale).floor() as i64;
                    let y1 = ((y as f32 + (row + 1) as f32 * scale).floor() as i64).max(y0 + 1);
                    for py in y0..y1 {
                        for px in x0..x1 {
                            blend(canvas, px, py, color, 1.0);
                        }
                    }
                }
            }
        }
    }

    fn draw_truetype(
        &self,
        face: &fontdue::Font,
        canvas: &mut RgbaImage,
        x: i64,
        y: i64,
        line: &str,
        color: Rgba<u8>,
    ) {
        let Some(ink) = self.ink(face, line) else {
            return;
        };
        let baseline = y as f32 + ink.max_y;
        let mut pen = x as f32 - ink.min_x;
        let mut previous: Option<char> = None;

        for ch in line.chars() {
            if let Some(prev) = previous {
                pen += face.horizontal_kern(prev, ch, self.px).unwrap_or(0.0);
            }
            let (metrics, coverage) = face.rasterize(ch, self.px);
            let gx = (pen + metrics.xmin as f32).round() as i64;
            let gy = (baseline - (metrics.ymin as f32 + metrics.height as f32)).round() as i64;
            for row in 0..metrics.height {
                for col in 0..metrics.width {
                    let alpha = coverage[row * metrics.width + col];
                    if alpha > 0 {
                        blend(canvas, gx + col as i64, gy + row as i64, color, alpha as f32 / 255.0);
                    }
                }
            }
            pen += metrics.advance_width;
            previous = Some(ch);
        }
    }
}

/// Alpha-blend `color` scaled by `coverage` onto one pixel; out-of-bounds writes are ignored
fn blend(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
        return;
    }
    let alpha = (color[3] as f32 * coverage.clamp(0.0, 1.0)).round() as u8;
    if alpha == 0 {
        return;
    }
    let source = Rgba([color[0], color[1], color[2], alpha]);
    canvas.get_pixel_mut(x as u32, y as u32).blend(&source);
}

/// Font lookup with an ordered fallback chain ending in the built-in face.
///
/// Each font file is parsed at most once; failed loads are remembered too.
#[derive(Debug, Default)]
pub struct FontLibrary {
    preferred: Option<PathBuf>,
    index: HashMap<String, PathBuf>,
    loaded: Mutex<HashMap<PathBuf, Option<Font>>>,
}

impl FontLibrary {
    /// Index every font file below `search_dirs`. Missing directories are skipped.
    pub fn discover(preferred: Option<PathBuf>, search_dirs: &[PathBuf]) -> Self {
        let mut index = HashMap::new();
        for dir in search_dirs {
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(dir).follow_links(true).into_iter().flatten() {
                let path = entry.path();
                let is_font = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FONT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false);
                if !is_font {
                    continue;
                }
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    index.entry(name.to_string()).or_insert_with(|| path.to_path_buf());
                }
            }
        }
        debug!("Indexed {} font files in {} directories", index.len(), search_dirs.len());
        Self {
            preferred,
            index,
            loaded: Mutex::default(),
        }
    }

    /// A library that only knows the built-in face
    pub fn builtin_only() -> Self {
        Self::default()
    }

    /// Find an indexed font file by name, case-insensitively as a second try
    pub fn find(&self, name: &str) -> Option<&Path> {
        if let Some(path) = self.index.get(name) {
            return Some(path);
        }
        let lower = name.to_ascii_lowercase();
        self.index
            .iter()
            .find(|(key, _)| key.to_ascii_lowercase() == lower)
            .map(|(_, path)| path.as_path())
    }

    /// Resolve a font reference. Never fails: the chain ends in the built-in face.
    ///
    /// Order: `reference` as a path, `reference` as an indexed file name (with
    /// and without `.ttf`), the configured font path, [`FALLBACK_FONT_NAMES`].
    pub fn load(&self, reference: Option<&str>) -> Font {
        if let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) {
            let direct = Path::new(reference);
            if direct.is_file() {
                if let Some(font) = self.load_path(direct) {
                    return font;
                }
            }
            let with_ext = format!("{}.ttf", reference);
            for name in [reference, with_ext.as_str()] {
                if let Some(font) = self.find(name).and_then(|path| self.load_path(path)) {
                    return font;
                }
            }
            debug!("Font '{}' not found, falling back", reference);
        }

        if let Some(path) = self.preferred.as_deref() {
            if let Some(font) = self.load_path(path) {
                return font;
            }
        }

        for name in FALLBACK_FONT_NAMES {
            if let Some(font) = self.find(name).and_then(|path| self.load_path(path)) {
                return font;
            }
        }

        debug!("No system font available, using built-in face");
        Font::builtin()
    }

    /// Number of font files parsed (or rejected) so far
    pub fn cached(&self) -> usize {
        self.loaded.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn load_path(&self, path: &Path) -> Option<Font> {
        let mut cache = match self.loaded.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache
            .entry(path.to_path_buf())
            .or_insert_with(|| try_load(path))
            .clone()
    }
}

fn try_load(path: &Path) -> Option<Font> {
    match Font::from_path(path) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Could not load font {}: {}", path.display(), e);
            None
        }
    }
}

/// Conventional font directories on Linux, macOS and Windows
pub fn default_font_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/share/fonts"),
        PathBuf::from("/usr/local/share/fonts"),
        PathBuf::from("/Library/Fonts"),
        PathBuf::from("/System/Library/Fonts"),
        PathBuf::from(r"C:\Windows\Fonts"),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        dirs.push(home.join(".fonts"));
        dirs.push(home.join(".local/share/fonts"));
    }
    dirs
}

fn builtin_glyph(ch: char) -> &'static [u8; 5] {
    let code = ch as u32;
    if (0x20..=0x7e).contains(&code) {
        &GLYPHS[(code - 0x20) as usize]
    } else {
        &MISSING_GLYPH
    }
}

const MISSING_GLYPH: [u8; 5] = [0x7f, 0x41, 0x41, 0x41, 0x7f];

/// Column-major 5x7 glyphs for ASCII 0x20..=0x7e, bit 0 is the top row
const GLYPHS: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
    [0x00, 0x00, 0x5f, 0x00, 0x00], // !
    [0x00, 0x07, 0x00, 0x07, 0x00], // "
    [0x14, 0x7f, 0x14, 0x7f, 0x14], // #
    [0x24, 0x2a, 0x7f, 0x2a, 0x12], // $
    [0x23, 0x13, 0x08, 0x64, 0x62], // %
    [0x36, 0x49, 0x55, 0x22, 0x50], // &
    [0x00, 0x05, 0x03, 0x00, 0x00], // '
    [0x00, 0x1c, 0x22, 0x41, 0x00], // (
    [0x00, 0x41, 0x22, 0x1c, 0x00], // )
    [0x08, 0x2a, 0x1c, 0x2a, 0x08], // *
    [0x08, 0x08, 0x3e, 0x08, 0x08], // +
    [0x00, 0x50, 0x30, 0x00, 0x00], // ,
    [0x08, 0x08, 0x08, 0x08, 0x08], // -
    [0x00, 0x60, 0x60, 0x00, 0x00], // .
    [0x20, 0x10, 0x08, 0x04, 0x02], // /
    [0x3e, 0x51, 0x49, 0x45, 0x3e], // 0
    [0x00, 0x42, 0x7f, 0x40, 0x00], // 1
    [0x42, 0x61, 0x51, 0x49, 0x46], // 2
    [0x21, 0x41, 0x45, 0x4b, 0x31], // 3
    [0x18, 0x14, 0x12, 0x7f, 0x10], // 4
    [0x27, 0x45, 0x45, 0x45, 0x39], // 5
    [0x3c, 0x4a, 0x49, 0x49, 0x30], // 6
    [0x01, 0x71, 0x09, 0x05, 0x03], // 7
    [0x36, 0x49, 0x49, 0x49, 0x36], // 8
    [0x06, 0x49, 0x49, 0x29, 0x1e], // 9
    [0x00, 0x36, 0x36, 0x00, 0x00], // :
    [0x00, 0x56, 0x36, 0x00, 0x00], // ;
    [0x00, 0x08, 0x14, 0x22, 0x41], // <
    [0x14, 0x14, 0x14, 0x14, 0x14], // =
    [0x41, 0x22, 0x14, 0x08, 0x00], // >
    [0x02, 0x01, 0x51, 0x09, 0x06], // ?
    [0x32, 0x49, 0x79, 0x41, 0x3e], // @
    [0x7e, 0x11, 0x11, 0x11, 0x7e], // A
    [0x7f, 0x49, 0x49, 0x49, 0x36], // B
    [0x3e, 0x41, 0x41, 0x41, 0x22], // C
    [0x7f, 0x41, 0x41, 0x22, 0x1c], // D
    [0x7f, 0x49, 0x49, 0x49, 0x41], // E
    [0x7f, 0x09, 0x09, 0x01, 0x01], // F
    [0x3e, 0x41, 0x41, 0x51, 0x32], // G
    [0x7f, 0x08, 0x08, 0x08, 0x7f], // H
    [0x00, 0x41, 0x7f, 0x41, 0x00], // I
    [0x20, 0x40, 0x41, 0x3f, 0x01], // J
    [0x7f, 0x08, 0x14, 0x22, 0x41], // K
    [0x7f, 0x40, 0x40, 0x40, 0x40], // L
    [0x7f, 0x02, 0x04, 0x02, 0x7f], // M
    [0x7f, 0x04, 0x08, 0x10, 0x7f], // N
    [0x3e, 0x41, 0x41, 0x41, 0x3e], // O
    [0x7f, 0x09, 0x09, 0x09, 0x06], // P
    [0x3e, 0x41, 0x51, 0x21, 0x5e], // Q
    [0x7f, 0x09, 0x19, 0x29, 0x46], // R
    [0x46, 0x49, 0x49, 0x49, 0x31], // S
    [0x01, 0x01, 0x7f, 0x01, 0x01], // T
    [0x3f, 0x40, 0x40, 0x40, 0x3f], // U
    [0x1f, 0x20, 0x40, 0x20, 0x1f], // V
    [0x7f, 0x20, 0x18, 0x20, 0x7f], // W
    [0x63, 0x14, 0x08, 0x14, 0x63], // X
    [0x03, 0x04, 0x78, 0x04, 0x03], // Y
    [0x61, 0x51, 0x49, 0x45, 0x43], // Z
    [0x00, 0x00, 0x7f, 0x41, 0x41], // [
    [0x02, 0x04, 0x08, 0x10, 0x20], // \
    [0x41, 0x41, 0x7f, 0x00, 0x00], // ]
    [0x04, 0x02, 0x01, 0x02, 0x04], // ^
    [0x40, 0x40, 0x40, 0x40, 0x40], // _
    [0x00, 0x01, 0x02, 0x04, 0x00], // `
    [0x20, 0x54, 0x54, 0x54, 0x78], // a
    [0x7f, 0x48, 0x44, 0x44, 0x38], // b
    [0x38, 0x44, 0x44, 0x44, 0x20], // c
    [0x38, 0x44, 0x44, 0x48, 0x7f], // d
    [0x38, 0x54, 0x54, 0x54, 0x18], // e
    [0x08, 0x7e, 0x09, 0x01, 0x02], // f
    [0x08, 0x14, 0x54, 0x54, 0x3c], // g
    [0x7f, 0x08, 0x04, 0x04, 0x78], // h
    [0x00, 0x44, 0x7d, 0x40, 0x00], // i
    [0x20, 0x40, 0x44, 0x3d, 0x00], // j
    [0x00, 0x7f, 0x10, 0x28, 0x44], // k
    [0x00, 0x41, 0x7f, 0x40, 0x00], // l
    [0x7c, 0x04, 0x18, 0x04, 0x78], // m
    [0x7c, 0x08, 0x04, 0x04, 0x78], // n
    [0x38, 0x44, 0x44, 0x44, 0x38], // o
    [0x7c, 0x14, 0x14, 0x14, 0x08], // p
    [0x08, 0x14, 0x14, 0x18, 0x7c], // q
    [0x7c, 0x08, 0x04, 0x04, 0x08], // r
    [0x48, 0x54, 0x54, 0x54, 0x20], // s
    [0x04, 0x3f, 0x44, 0x40, 0x20], // t
    [0x3c, 0x40, 0x40, 0x20, 0x7c], // u
    [0x1c, 0x20, 0x40, 0x20, 0x1c], // v
    [0x3c, 0x40, 0x30, 0x40, 0x3c], // w
    [0x44, 0x28, 0x10, 0x28, 0x44], // x
    [0x0c, 0x50, 0x50, 0x50, 0x3c], // y
    [0x44, 0x64, 0x54, 0x4c, 0x44], // z
    [0x00, 0x08, 0x36, 0x41, 0x00], // {
    [0x00, 0x00, 0x7f, 0x00, 0x00], // |
    [0x00, 0x41, 0x36, 0x08, 0x00], // }
    [0x10, 0x08, 0x08, 0x10, 0x08], // ~
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_measure_scales_with_size() {
        let font = Font::builtin();
        let small = font.sized(8).measure("abc");
        assert_eq!(small, TextBox { width: 18, height: 7 });

        let large = font.sized(16).measure("abc");
        assert_eq!(large, TextBox { width: 36, height: 14 });
    }

    #[test]
    fn test_builtin_empty_line() {
        let font = Font::builtin();
        assert_eq!(font.sized(40).measure(""), TextBox::default());
    }

    #[test]
    fn test_builtin_draw_marks_pixels() {
        let font = Font::builtin().sized(16);
        let mut canvas = RgbaImage::from_pixel(64, 32, Rgba([0, 0, 0, 0]));
        font.draw(&mut canvas, 2, 2, "H", Rgba([255, 0, 0, 255]));

        let painted = canvas.pixels().filter(|p| p[3] > 0).count();
        assert!(painted > 0);
        // Left stem of the H
        assert_eq!(canvas.get_pixel(2, 2)[0], 255);
    }

    #[test]
    fn test_draw_out_of_bounds_is_clipped() {
        let font = Font::builtin().sized(32);
        let mut canvas = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
        font.draw(&mut canvas, -50, -50, "WWW", Rgba([255, 255, 255, 255]));
        font.draw(&mut canvas, 500, 500, "WWW", Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_non_ascii_uses_missing_glyph() {
        assert_eq!(builtin_glyph('Ж'), &MISSING_GLYPH);
        assert_eq!(builtin_glyph('A'), &GLYPHS[33]);
    }

    #[test]
    fn test_load_falls_back_to_builtin() {
        let dir = tempdir().unwrap();
        let library = FontLibrary::discover(None, &[dir.path().to_path_buf()]);
        let font = library.load(Some("NoSuchFont"));
        assert!(font.is_builtin());
    }

    #[test]
    fn test_corrupt_font_file_falls_back() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("DejaVuSans.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();

        let library = FontLibrary::discover(Some(bogus.clone()), &[dir.path().to_path_buf()]);
        assert_eq!(library.find("dejavusans.ttf"), Some(bogus.as_path()));

        let font = library.load(bogus.to_str());
        assert!(font.is_builtin());
    }

    #[test]
    fn test_font_files_are_parsed_once() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("broken.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();

        let library = FontLibrary::discover(None, &[dir.path().to_path_buf()]);
        assert_eq!(library.cached(), 0);
        assert!(library.load(Some("broken")).is_builtin());
        assert_eq!(library.cached(), 1);

        // later edits on disk are not re-read by the same library
        std::fs::write(&bogus, b"still not a font").unwrap();
        assert!(library.load(Some("broken.ttf")).is_builtin());
        assert!(library.load(bogus.to_str()).is_builtin());
        assert_eq!(library.cached(), 1);
    }
}
