//! Caption data model and drawing of captions onto still images.

use crate::font::{FontLibrary, SizedFont};
use crate::layout::{fit_text_to_region, line_boxes, line_gap, FitRequest, FitResult};
use crate::{ReelError, Result};
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Valid range for both overlay offsets, in percent
pub const OFFSET_RANGE: std::ops::RangeInclusive<u8> = 1..=100;

/// Margin kept free above and below a portrait text block
const PORTRAIT_VERTICAL_MARGIN: u32 = 20;

/// Widest stroke drawn around a caption, in pixels
pub const MAX_STROKE_WIDTH: u32 = 20;

/// Visual style of one caption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    /// Font path or file name; `None` uses the library default
    pub font: Option<String>,
    pub font_size: u32,
    pub text_color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: None,
            font_size: 50,
            text_color: "black".to_string(),
            stroke_color: "white".to_string(),
            stroke_width: 2,
        }
    }
}

/// A caption positioned by percentages of its target region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextOverlay {
    pub text: String,
    pub horizontal_offset: u8,
    /// 100 is the top of the region
    pub vertical_offset: u8,
    pub style: TextStyle,
}

impl TextOverlay {
    /// Build an overlay; offsets outside 1..=100 are rejected
    pub fn new(
        text: impl Into<String>,
        horizontal_offset: i64,
        vertical_offset: i64,
        style: TextStyle,
    ) -> Result<Self> {
        let text = text.into();
        let check = |name: &str, value: i64| -> Result<u8> {
            u8::try_from(value)
                .ok()
                .filter(|v| OFFSET_RANGE.contains(v))
                .ok_or_else(|| {
                    ReelError::InvalidOverlay(format!(
                        "{} offset {} for '{}' is outside 1..=100",
                        name, value, text
                    ))
                })
        };
        let horizontal_offset = check("horizontal", horizontal_offset)?;
        let vertical_offset = check("vertical", vertical_offset)?;

        Ok(Self {
            text,
            horizontal_offset,
            vertical_offset,
            style,
        })
    }
}

/// Where portrait captions may go: a left-hand panel inside a safe area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortraitLayout {
    /// Safe-area margins in percent: top, right, bottom, left
    pub safe_area: (u32, u32, u32, u32),
    /// Right edge of the text panel in percent of the image width
    pub panel_split: f64,
    pub max_text_width_ratio: f64,
    pub font_min: u32,
    pub font_max: u32,
    pub line_spacing: f64,
    /// Ignore horizontal offsets and centre every block in the panel
    pub center_horizontally: bool,
    /// Fallback font for overlays that do not name one
    pub font: Option<String>,
}

impl Default for PortraitLayout {
    fn default() -> Self {
        Self {
            safe_area: (5, 6, 14, 6),
            panel_split: 62.0,
            max_text_width_ratio: 0.9,
            font_min: 20,
            font_max: 100,
            line_spacing: 1.2,
            center_horizontally: true,
            font: None,
        }
    }
}

/// Pixel rectangle, right and bottom exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl Region {
    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

impl PortraitLayout {
    /// The text panel of an image of the given size
    pub fn region(&self, width: u32, height: u32) -> Result<Region> {
        let (top_p, right_p, bottom_p, left_p) = self.safe_area;
        let pct = |total: u32, p: f64| (total as f64 * p / 100.0).floor() as i64;

        let safe_left = pct(width, left_p as f64);
        let safe_right = width as i64 - pct(width, right_p as f64);
        let split_x = pct(width, self.panel_split);

        let region = Region {
            left: safe_left,
            top: pct(height, top_p as f64),
            right: safe_right.min(split_x),
            bottom: height as i64 - pct(height, bottom_p as f64),
        };
        if region.width() <= 0 || region.height() <= 0 {
            return Err(ReelError::InvalidOverlay(format!(
                "Text panel is empty for a {}x{} image",
                width, height
            )));
        }
        Ok(region)
    }
}

/// Style of the caption plate laid over video clips
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    pub font: Option<String>,
    pub font_min: u32,
    pub font_max: u32,
    pub color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
    /// Maximum caption width as a share of the frame width
    pub width_ratio: f64,
    /// Top edge of the caption as a share of the frame height
    pub top_ratio: f64,
    pub line_spacing: f64,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font: None,
            font_min: 20,
            font_max: 50,
            color: "#D4AF37".to_string(),
            stroke_color: "black".to_string(),
            stroke_width: 2,
            width_ratio: 0.9,
            top_ratio: 0.75,
            line_spacing: 1.2,
        }
    }
}

/// Parse a hex (`#RGB`, `#RRGGBB`, `#RRGGBBAA`) or CSS colour name.
/// Unrecognised values become opaque white.
pub fn parse_color(value: &str) -> Rgba<u8> {
    match colorgrad::Color::from_html(value.trim()) {
        Ok(color) => Rgba(color.to_rgba8()),
        Err(e) => {
            warn!("Unknown colour '{}' ({}), using white", value, e);
            Rgba([255, 255, 255, 255])
        }
    }
}

/// Draw a fitted text block with its top-left corner at (x, y).
/// Lines are centred within the block; the stroke is the block redrawn at
/// every offset of a square of radius `stroke_width`.
fn draw_block(
    canvas: &mut RgbaImage,
    fit: &FitResult,
    x: i64,
    y: i64,
    spacing: f64,
    color: Rgba<u8>,
    stroke: Option<(Rgba<u8>, u32)>,
) {
    if let Some((stroke_color, width)) = stroke {
        let w = width.min(MAX_STROKE_WIDTH) as i64;
        for dx in -w..=w {
            for dy in -w..=w {
                if dx != 0 || dy != 0 {
                    draw_lines(canvas, &fit.font, &fit.lines, fit.width, x + dx, y + dy, spacing, stroke_color);
                }
            }
        }
    }
    draw_lines(canvas, &fit.font, &fit.lines, fit.width, x, y, spacing, color);
}

#[allow(clippy::too_many_arguments)]
fn draw_lines(
    canvas: &mut RgbaImage,
    font: &SizedFont,
    lines: &[String],
    block_width: u32,
    x: i64,
    y: i64,
    spacing: f64,
    color: Rgba<u8>,
) {
    let mut top = y;
    for (line, extent) in lines.iter().zip(line_boxes(lines, font)) {
        let left = x + (block_width as i64 - extent.width as i64) / 2;
        font.draw(canvas, left, top, line, color);
        top += (extent.height + line_gap(extent.height, spacing)) as i64;
    }
}

/// Fit request for one portrait overlay. The overlay's own size caps the
/// search; the configured minimum always stays the floor.
pub fn portrait_request(overlay: &TextOverlay, region: &Region, layout: &PortraitLayout) -> FitRequest {
    let font_min = layout.font_min.max(1);
    FitRequest {
        max_width: (region.width() as f64 * layout.max_text_width_ratio).floor().max(1.0) as u32,
        max_height: (region.height().max(0) as u32).saturating_sub(PORTRAIT_VERTICAL_MARGIN).max(1),
        font_min,
        font_max: overlay.style.font_size.min(layout.font_max).max(font_min),
        line_spacing: layout.line_spacing,
    }
}

/// Draw portrait captions into the left text panel of `base`.
///
/// Overlays that cannot be laid out are logged and skipped.
pub fn render_portrait_overlays(
    base: &RgbaImage,
    overlays: &[TextOverlay],
    fonts: &FontLibrary,
    layout: &PortraitLayout,
) -> Result<RgbaImage> {
    let (width, height) = base.dimensions();
    let region = layout.region(width, height)?;
    debug!(
        "Text panel ({}, {})-({}, {}) in {}x{}",
        region.left, region.top, region.right, region.bottom, width, height
    );

    let mut text_layer = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));

    for (i, overlay) in overlays.iter().enumerate() {
        let font = fonts.load(overlay.style.font.as_deref().or(layout.font.as_deref()));
        let request = portrait_request(overlay, &region, layout);

        let fit = match fit_text_to_region(&overlay.text, &font, &request) {
            Ok(fit) => fit,
            Err(e) => {
                warn!("Skipping overlay {}: {}", i + 1, e);
                continue;
            }
        };
        if !fit.fits {
            warn!("Overlay {} overflows the panel at minimum size {}", i + 1, fit.font_size);
        }

        let cx = if layout.center_horizontally {
            region.left + region.width() / 2
        } else {
            region.left + (overlay.horizontal_offset as f64 / 100.0 * region.width() as f64) as i64
        };
        let cy = region.top
            + ((100 - overlay.vertical_offset as i64) as f64 / 100.0 * region.height() as f64) as i64;

        let (w, h) = (fit.width as i64, fit.height as i64);
        let x = (cx - w / 2).min(region.right - w).max(region.left);
        let y = (cy - h / 2).min(region.bottom - h).max(region.top);
        debug!("Overlay {} at ({}, {}) size {}x{} font {}", i + 1, x, y, w, h, fit.font_size);

        let stroke = (overlay.style.stroke_width > 0)
            .then(|| (parse_color(&overlay.style.stroke_color), overlay.style.stroke_width));
        draw_block(
            &mut text_layer,
            &fit,
            x,
            y,
            layout.line_spacing,
            parse_color(&overlay.style.text_color),
            stroke,
        );
    }

    let mut composed = base.clone();
    imageops::overlay(&mut composed, &text_layer, 0, 0);
    Ok(composed)
}

/// Output file name for an image with overlays: `{stem}_{first text}_overlay.png`
pub fn overlay_file_name(image_path: &Path, overlays: &[TextOverlay]) -> String {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let first = overlays.first().map(|o| o.text.as_str()).unwrap_or("overlay");
    let cleaned: String = first
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let label: String = cleaned.trim_end().chars().take(30).collect();
    format!("{}_{}_overlay.png", stem, label.replace(' ', "_"))
}

/// Render overlays onto the image at `image_path` and save the result in
/// `output_dir`. Returns the written path.
pub fn create_image_with_overlays(
    image_path: &Path,
    overlays: &[TextOverlay],
    output_dir: &Path,
    fonts: &FontLibrary,
    layout: &PortraitLayout,
) -> Result<PathBuf> {
    if !image_path.exists() {
        return Err(ReelError::MissingInput(image_path.to_path_buf()));
    }
    for overlay in overlays {
        if !OFFSET_RANGE.contains(&overlay.horizontal_offset)
            || !OFFSET_RANGE.contains(&overlay.vertical_offset)
        {
            return Err(ReelError::InvalidOverlay(format!(
                "Offsets ({}, {}) for '{}' are outside 1..=100",
                overlay.horizontal_offset, overlay.vertical_offset, overlay.text
            )));
        }
    }

    let base = image::open(image_path)?.to_rgba8();
    info!(
        "Adding {} overlay(s) to {} ({}x{})",
        overlays.len(),
        image_path.display(),
        base.width(),
        base.height()
    );
    let composed = render_portrait_overlays(&base, overlays, fonts, layout)?;

    std::fs::create_dir_all(output_dir)?;
    let output = output_dir.join(overlay_file_name(image_path, overlays));
    DynamicImage::ImageRgba8(composed).to_rgb8().save(&output)?;
    info!("Saved image with overlays: {}", output.display());
    Ok(output)
}

/// A transparent frame-sized plate with `text` centred horizontally and its
/// top edge at `style.top_ratio` of the frame height.
pub fn render_caption_plate(
    text: &str,
    frame: (u32, u32),
    fonts: &FontLibrary,
    style: &CaptionStyle,
) -> Result<RgbaImage> {
    let (width, height) = frame;
    let top = (height as f64 * style.top_ratio).floor() as u32;
    let request = FitRequest {
        max_width: (width as f64 * style.width_ratio).floor() as u32,
        max_height: height.saturating_sub(top),
        font_min: style.font_min,
        font_max: style.font_max,
        line_spacing: style.line_spacing,
    };

    let font = fonts.load(style.font.as_deref());
    let fit = fit_text_to_region(text, &font, &request)?;
    if !fit.fits {
        debug!("Caption '{}' overflows its plate at size {}", text, fit.font_size);
    }

    let mut plate = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    let x = (width as i64 - fit.width as i64) / 2;
    let stroke = (style.stroke_width > 0).then(|| (parse_color(&style.stroke_color), style.stroke_width));
    draw_block(
        &mut plate,
        &fit,
        x,
        top as i64,
        style.line_spacing,
        parse_color(&style.color),
        stroke,
    );
    Ok(plate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn overlay(text: &str, h: i64, v: i64) -> TextOverlay {
        TextOverlay::new(text, h, v, TextStyle::default()).unwrap()
    }

    #[test]
    fn test_offsets_are_validated() {
        assert!(TextOverlay::new("ok", 1, 100, TextStyle::default()).is_ok());
        assert!(matches!(
            TextOverlay::new("low", 0, 50, TextStyle::default()),
            Err(ReelError::InvalidOverlay(_))
        ));
        assert!(matches!(
            TextOverlay::new("high", 50, 101, TextStyle::default()),
            Err(ReelError::InvalidOverlay(_))
        ));
        assert!(TextOverlay::new("neg", -5, 50, TextStyle::default()).is_err());
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#D4AF37"), Rgba([212, 175, 55, 255]));
        assert_eq!(parse_color("#fff"), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_color("#11223380"), Rgba([17, 34, 51, 128]));
        assert_eq!(parse_color("navy"), Rgba([0, 0, 128, 255]));
        assert_eq!(parse_color(" black "), Rgba([0, 0, 0, 255]));
        assert_eq!(parse_color("not-a-colour"), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_portrait_region() {
        let region = PortraitLayout::default().region(1000, 1000).unwrap();
        assert_eq!(region.left, 60);
        assert_eq!(region.top, 50);
        assert_eq!(region.right, 620);
        assert_eq!(region.bottom, 860);

        let squeezed = PortraitLayout {
            panel_split: 3.0,
            ..PortraitLayout::default()
        };
        assert!(squeezed.region(1000, 1000).is_err());
    }

    #[test]
    fn test_overlay_stays_in_panel() {
        let base = RgbaImage::from_pixel(400, 300, Rgba([10, 20, 30, 255]));
        let layout = PortraitLayout::default();
        let region = layout.region(400, 300).unwrap();
        let overlays = vec![overlay("Top", 50, 100), overlay("Bottom", 50, 1)];

        let out = render_portrait_overlays(&base, &overlays, &FontLibrary::builtin_only(), &layout)
            .unwrap();
        assert_eq!(out.dimensions(), (400, 300));

        let mut touched = 0;
        for (x, y, pixel) in out.enumerate_pixels() {
            if *pixel != Rgba([10, 20, 30, 255]) {
                touched += 1;
                // stroke may spill by its width
                assert!((x as i64) >= region.left - 2 && (x as i64) < region.right + 2);
                assert!((y as i64) >= region.top - 2 && (y as i64) < region.bottom + 2);
            }
        }
        assert!(touched > 0);
    }

    #[test]
    fn test_small_overlay_size_keeps_layout_minimum() {
        let layout = PortraitLayout::default();
        let region = layout.region(1000, 1000).unwrap();
        let mut small = overlay("Hermes", 50, 50);
        small.style.font_size = 10;

        let request = portrait_request(&small, &region, &layout);
        assert_eq!(request.font_min, 20);
        assert_eq!(request.font_max, 20);

        let fit = fit_text_to_region(&small.text, &crate::font::Font::builtin(), &request).unwrap();
        assert_eq!(fit.font_size, 20);
    }

    #[test]
    fn test_overlay_size_caps_search() {
        let layout = PortraitLayout::default();
        let region = layout.region(1000, 1000).unwrap();
        let mut capped = overlay("Hermes", 50, 50);
        capped.style.font_size = 40;
        let request = portrait_request(&capped, &region, &layout);
        assert_eq!((request.font_min, request.font_max), (20, 40));

        capped.style.font_size = 500;
        assert_eq!(portrait_request(&capped, &region, &layout).font_max, 100);
    }

    #[test]
    fn test_oversized_stroke_is_capped() {
        let base = RgbaImage::from_pixel(400, 300, Rgba([10, 20, 30, 255]));
        let mut heavy = overlay("Ares", 50, 50);
        heavy.style.stroke_width = u32::MAX;
        let out = render_portrait_overlays(
            &base,
            &[heavy],
            &FontLibrary::builtin_only(),
            &PortraitLayout::default(),
        )
        .unwrap();
        assert!(out.pixels().any(|p| *p != Rgba([10, 20, 30, 255])));
    }

    #[test]
    fn test_overlay_file_name() {
        let overlays = vec![overlay("Zeus: King of the Gods!", 50, 50)];
        assert_eq!(
            overlay_file_name(Path::new("/tmp/zeus.jpg"), &overlays),
            "zeus_Zeus_King_of_the_Gods_overlay.png"
        );
        assert_eq!(overlay_file_name(Path::new("a.png"), &[]), "a_overlay_overlay.png");
    }

    #[test]
    fn test_create_image_with_overlays() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("portrait.png");
        RgbaImage::from_pixel(320, 240, Rgba([200, 200, 200, 255]))
            .save(&input)
            .unwrap();

        let out_dir = dir.path().join("out");
        let path = create_image_with_overlays(
            &input,
            &[overlay("Athena", 50, 50)],
            &out_dir,
            &FontLibrary::builtin_only(),
            &PortraitLayout::default(),
        )
        .unwrap();

        assert_eq!(path, out_dir.join("portrait_Athena_overlay.png"));
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (320, 240));
    }

    #[test]
    fn test_missing_image_is_reported() {
        let dir = tempdir().unwrap();
        let result = create_image_with_overlays(
            &dir.path().join("missing.png"),
            &[overlay("x", 50, 50)],
            dir.path(),
            &FontLibrary::builtin_only(),
            &PortraitLayout::default(),
        );
        assert!(matches!(result, Err(ReelError::MissingInput(_))));
    }

    #[test]
    fn test_caption_plate_position() {
        let style = CaptionStyle::default();
        let plate = render_caption_plate("Hello", (640, 360), &FontLibrary::builtin_only(), &style)
            .unwrap();
        assert_eq!(plate.dimensions(), (640, 360));

        let top = (360.0 * style.top_ratio) as u32;
        let mut min_y = u32::MAX;
        let mut min_x = u32::MAX;
        let mut max_x = 0;
        for (x, y, p) in plate.enumerate_pixels() {
            if p[3] > 0 {
                min_y = min_y.min(y);
                min_x = min_x.min(x);
                max_x = max_x.max(x);
            }
        }
        assert!(min_y + 2 >= top && min_y <= top + 2);
        // roughly centred
        let left_gap = min_x as i64;
        let right_gap = 639 - max_x as i64;
        assert!((left_gap - right_gap).abs() <= 8, "{} vs {}", left_gap, right_gap);
    }

    #[test]
    fn test_caption_plate_rejects_empty_text() {
        let result = render_caption_plate(
            "  ",
            (640, 360),
            &FontLibrary::builtin_only(),
            &CaptionStyle::default(),
        );
        assert!(matches!(result, Err(ReelError::Layout(_))));
    }
}
