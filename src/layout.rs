//! Fit-to-region text layout.
//!
//! [`fit_text_to_region`] searches font sizes from large to small and keeps the
//! first one at which a greedy word wrap of the text fits inside a pixel box.

use crate::font::{Font, SizedFont, TextBox};
use log::debug;

/// Reference sample used to estimate the average glyph width
pub const WIDTH_SAMPLE: &str = "ABCDEabcde";

/// Lower bound for the characters-per-line budget while searching
const MIN_LINE_CHARS: usize = 10;

/// Lower bound for the characters-per-line budget of the minimum-size fallback
const MIN_FALLBACK_LINE_CHARS: usize = 5;

const SIZE_STEP: usize = 2;

/// Invalid arguments to the layout routines. Text that does not fit is not an error.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Text is empty")]
    EmptyText,

    #[error("Region must have a positive size, got {width}x{height}")]
    DegenerateRegion { width: u32, height: u32 },

    #[error("Invalid font size range {min}..={max}")]
    InvalidFontRange { min: u32, max: u32 },

    #[error("Line spacing ratio must be greater than 1.0, got {0}")]
    InvalidLineSpacing(f64),
}

/// Box and size constraints for a fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRequest {
    pub max_width: u32,
    pub max_height: u32,
    pub font_min: u32,
    pub font_max: u32,
    /// Line pitch as a multiple of the line height
    pub line_spacing: f64,
}

impl FitRequest {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
            font_min: 20,
            font_max: 100,
            line_spacing: 1.2,
        }
    }

    pub fn with_font_range(mut self, font_min: u32, font_max: u32) -> Self {
        self.font_min = font_min;
        self.font_max = font_max;
        self
    }

    pub fn with_line_spacing(mut self, ratio: f64) -> Self {
        self.line_spacing = ratio;
        self
    }

    fn validate(&self) -> Result<(), LayoutError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(LayoutError::DegenerateRegion {
                width: self.max_width,
                height: self.max_height,
            });
        }
        if self.font_min == 0 || self.font_min > self.font_max {
            return Err(LayoutError::InvalidFontRange {
                min: self.font_min,
                max: self.font_max,
            });
        }
        if !self.line_spacing.is_finite() || self.line_spacing <= 1.0 {
            return Err(LayoutError::InvalidLineSpacing(self.line_spacing));
        }
        Ok(())
    }
}

/// Outcome of a fit
#[derive(Debug, Clone)]
pub struct FitResult {
    pub font: SizedFont,
    pub font_size: u32,
    pub lines: Vec<String>,
    pub width: u32,
    pub height: u32,
    /// False when even the minimum size overflows the region
    pub fits: bool,
}

impl FitResult {
    pub fn wrapped_text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Find the largest font size in `request.font_max..=request.font_min` (step 2)
/// at which the wrapped text fits the region.
///
/// When nothing fits, the text is laid out at `font_min` anyway and returned
/// with `fits == false`.
pub fn fit_text_to_region(
    text: &str,
    font: &Font,
    request: &FitRequest,
) -> Result<FitResult, LayoutError> {
    if text.trim().is_empty() {
        return Err(LayoutError::EmptyText);
    }
    request.validate()?;

    let sizes = (request.font_min..=request.font_max).rev().step_by(SIZE_STEP);
    for size in sizes {
        let sized = font.sized(size);
        let budget = line_budget(&sized, request.max_width, MIN_LINE_CHARS);
        let lines = wrap_words(text, budget);
        let block = measure_block(&lines, &sized, request.line_spacing);

        if block.width <= request.max_width && block.height <= request.max_height {
            debug!(
                "Fitted {} line(s) at size {} ({}x{} in {}x{})",
                lines.len(),
                size,
                block.width,
                block.height,
                request.max_width,
                request.max_height
            );
            return Ok(FitResult {
                font: sized,
                font_size: size,
                lines,
                width: block.width,
                height: block.height,
                fits: true,
            });
        }
    }

    let sized = font.sized(request.font_min);
    let budget = line_budget(&sized, request.max_width, MIN_FALLBACK_LINE_CHARS);
    let lines = wrap_words(text, budget);
    let block = measure_block(&lines, &sized, request.line_spacing);
    debug!(
        "No size fits {}x{}, using minimum size {} ({}x{})",
        request.max_width, request.max_height, request.font_min, block.width, block.height
    );

    Ok(FitResult {
        font: sized,
        font_size: request.font_min,
        lines,
        width: block.width,
        height: block.height,
        fits: false,
    })
}

/// Characters per line that should fit `max_width` at this size
fn line_budget(font: &SizedFont, max_width: u32, floor: usize) -> usize {
    let sample = font.measure(WIDTH_SAMPLE);
    let avg = sample.width as f64 / WIDTH_SAMPLE.chars().count() as f64;
    if avg <= 0.0 {
        return floor;
    }
    ((max_width as f64 / avg).floor() as usize).max(floor)
}

/// Greedy word wrap to at most `width` characters per line.
///
/// Runs of whitespace collapse to a single space. A word longer than `width`
/// first fills what is left of the current line and continues on the next.
pub fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut rest: Vec<char> = word.chars().collect();
        while !rest.is_empty() {
            let needed = if current_len == 0 {
                rest.len()
            } else {
                current_len + 1 + rest.len()
            };
            if needed <= width {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(rest.iter());
                current_len += rest.len();
                break;
            }

            if rest.len() <= width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }

            // Word longer than a whole line
            let room = if current_len == 0 {
                width
            } else {
                width.saturating_sub(current_len + 1)
            };
            if room == 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            if current_len > 0 {
                current.push(' ');
            }
            current.extend(rest.drain(..room));
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Pixel extent of a block of lines.
///
/// Width is the widest line. Height is the sum of line heights plus
/// `floor(line_height * (spacing - 1))` after every line but the last.
/// A line without ink counts as zero wide and as tall as `"A"`.
pub fn measure_block<S: AsRef<str>>(lines: &[S], font: &SizedFont, spacing: f64) -> TextBox {
    let boxes = line_boxes(lines, font);
    let mut width = 0u32;
    let mut height = 0u32;

    for (i, extent) in boxes.iter().enumerate() {
        width = width.max(extent.width);
        height += extent.height;
        if i + 1 < boxes.len() {
            height += line_gap(extent.height, spacing);
        }
    }

    TextBox { width, height }
}

/// Extent of every line, with blank lines sized like `"A"` and zero wide
pub fn line_boxes<S: AsRef<str>>(lines: &[S], font: &SizedFont) -> Vec<TextBox> {
    lines
        .iter()
        .map(|line| {
            let extent = font.measure(line.as_ref());
            if extent.width == 0 || extent.height == 0 || line.as_ref().trim().is_empty() {
                TextBox {
                    width: 0,
                    height: font.measure("A").height,
                }
            } else {
                extent
            }
        })
        .collect()
}

/// Extra space below a line of the given height
pub fn line_gap(line_height: u32, spacing: f64) -> u32 {
    (line_height as f64 * (spacing - 1.0)).floor().max(0.0) as u32
}
