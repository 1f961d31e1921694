//! Spreadsheet input: CSV and Excel files read into plain string rows.

use crate::overlay::{TextOverlay, TextStyle, MAX_STROKE_WIDTH};
use crate::{ReelError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::Path;

/// One data row keyed by trimmed header name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRow {
    cells: HashMap<String, String>,
}

impl SheetRow {
    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into().trim().to_string()))
                .collect(),
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    /// Non-empty cell value
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn text_or(&self, column: &str, default: &str) -> String {
        self.get(column).unwrap_or(default).to_string()
    }

    /// Integer cell read as `trunc(float)`; empty or unparsable cells give `default`
    fn int_or(&self, column: &str, default: i64) -> i64 {
        match self.get(column) {
            None => default,
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => value.trunc() as i64,
                _ => {
                    warn!("Could not convert '{}' in '{}' to an integer, using {}", raw, column, default);
                    default
                }
            },
        }
    }
}

/// A header row plus data rows
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

impl Sheet {
    /// Read a `.csv` file, or the first worksheet of an Excel/ODS workbook
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReelError::MissingInput(path.to_path_buf()));
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let sheet = match extension.as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Self::read_workbook(path)?,
            _ => Self::read_csv(path)?,
        };
        debug!("Read {} row(s) from {}", sheet.rows.len(), path.display());
        Ok(sheet)
    }

    fn read_csv(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        Self::parse_csv(text.trim_start_matches('\u{feff}'))
    }

    /// Parse CSV text with a header line
    pub fn parse_csv(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(SheetRow::from_pairs(
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string())),
            ));
        }
        Ok(Self { headers, rows })
    }

    fn read_workbook(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ReelError::Sheet(format!("{} has no worksheets", path.display())))??;

        let mut rows_iter = range.rows();
        let headers: Vec<String> = match rows_iter.next() {
            Some(row) => row.iter().map(cell_text).collect(),
            None => return Ok(Self::default()),
        };

        let rows = rows_iter
            .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
            .map(|row| {
                SheetRow::from_pairs(
                    headers
                        .iter()
                        .enumerate()
                        .map(|(i, h)| (h.clone(), row.get(i).map(cell_text).unwrap_or_default())),
                )
            })
            .collect();
        Ok(Self { headers, rows })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Values of one column, empty cells as empty strings
    pub fn column(&self, column: &str) -> Option<Vec<String>> {
        if !self.has_column(column) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| row.get(column).unwrap_or("").to_string())
                .collect(),
        )
    }
}

/// Workbook cell as text; whole floats lose their fractional part
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Concatenate `column` from several sheets in order. Files that cannot be
/// read or lack the column are skipped with a warning.
pub fn texts_from_column<P: AsRef<Path>>(paths: &[P], column: &str) -> Vec<String> {
    let mut texts = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match Sheet::open(path) {
            Ok(sheet) => match sheet.column(column) {
                Some(values) => {
                    info!("Read {} text(s) from {}", values.len(), path.display());
                    texts.extend(values);
                }
                None => warn!("Column '{}' not found in {}", column, path.display()),
            },
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    texts
}

/// One tracker row: a portrait, its narration and the captions to draw
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOverlayEntry {
    pub image_path: String,
    pub audio_path: String,
    pub output_video_path: String,
    pub overlays: Vec<TextOverlay>,
    pub head_video_path: String,
    pub tail_video_path: String,
    pub status: String,
    pub notes: String,
}

impl VideoOverlayEntry {
    /// Parse a tracker row. Overlays are read from `Text 1`, `Text 2`, ... up to
    /// the first missing or empty text; absent style cells take defaults.
    pub fn from_row(row: &SheetRow) -> Result<Self> {
        let defaults = TextStyle::default();
        let mut overlays = Vec::new();

        for i in 1.. {
            let text_column = format!("Text {}", i);
            let Some(text) = row.get(&text_column) else {
                break;
            };
            let style = TextStyle {
                font: row.get(&format!("Font {}", i)).map(str::to_string),
                font_size: u32::try_from(
                    row.int_or(&format!("Font Size {}", i), defaults.font_size as i64),
                )
                .ok()
                .filter(|size| *size >= 1)
                .unwrap_or(defaults.font_size),
                text_color: row.text_or(&format!("Color {}", i), &defaults.text_color),
                stroke_color: row.text_or(&format!("Stroke Color {}", i), &defaults.stroke_color),
                stroke_width: row
                    .int_or(&format!("Stroke Width {}", i), defaults.stroke_width as i64)
                    .clamp(0, MAX_STROKE_WIDTH as i64) as u32,
            };
            overlays.push(TextOverlay::new(
                text,
                row.int_or(&format!("Hor Offset {}", i), 50),
                row.int_or(&format!("Vert Offset {}", i), 50),
                style,
            )?);
        }

        if overlays.is_empty() {
            return Err(ReelError::Sheet("No text overlays found in row".to_string()));
        }
        for column in ["Image Path", "Audio Path"] {
            if !row.has_column(column) {
                return Err(ReelError::Sheet(format!("Missing column '{}'", column)));
            }
        }

        Ok(Self {
            image_path: row.text_or("Image Path", ""),
            audio_path: row.text_or("Audio Path", ""),
            output_video_path: row.text_or("Output Video Path", ""),
            overlays,
            head_video_path: row.text_or("Head Video", ""),
            tail_video_path: row.text_or("Tail Video", ""),
            status: row.text_or("Status", ""),
            notes: row.text_or("Notes", ""),
        })
    }
}

/// Load every well-formed tracker row; malformed rows are logged and skipped
pub fn load_overlay_entries(path: &Path) -> Result<Vec<VideoOverlayEntry>> {
    let sheet = Sheet::open(path)?;
    let mut entries = Vec::with_capacity(sheet.rows.len());
    for (i, row) in sheet.rows.iter().enumerate() {
        match VideoOverlayEntry::from_row(row) {
            Ok(entry) => entries.push(entry),
            // header is line 1
            Err(e) => warn!("Skipping row {} of {}: {}", i + 2, path.display(), e),
        }
    }
    info!("Loaded {} entr(ies) from {}", entries.len(), path.display());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_font_size_defaults_to_50() {
        let row = SheetRow::from_pairs([
            ("Image Path", "zeus.png"),
            ("Audio Path", "zeus.mp3"),
            ("Text 1", "Zeus"),
            ("Color 1", "gold"),
        ]);
        let entry = VideoOverlayEntry::from_row(&row).unwrap();
        let overlay = &entry.overlays[0];
        assert_eq!(overlay.style.font_size, 50);
        assert_eq!(overlay.style.text_color, "gold");
        assert_eq!(overlay.style.stroke_color, "white");
        assert_eq!(overlay.style.stroke_width, 2);
        assert_eq!(overlay.horizontal_offset, 50);
        assert_eq!(overlay.vertical_offset, 50);
    }

    #[test]
    fn test_overlays_stop_at_first_empty_text() {
        let row = SheetRow::from_pairs([
            ("Image Path", "a.png"),
            ("Audio Path", "a.mp3"),
            ("Text 1", "First"),
            ("Font Size 1", "72.9"),
            ("Text 2", "Second"),
            ("Vert Offset 2", "80"),
            ("Text 3", " "),
            ("Text 4", "Unreached"),
        ]);
        let entry = VideoOverlayEntry::from_row(&row).unwrap();
        assert_eq!(entry.overlays.len(), 2);
        assert_eq!(entry.overlays[0].style.font_size, 72);
        assert_eq!(entry.overlays[1].vertical_offset, 80);
    }

    #[test]
    fn test_garbage_numbers_fall_back() {
        let row = SheetRow::from_pairs([
            ("Image Path", "a.png"),
            ("Audio Path", "a.mp3"),
            ("Text 1", "Hi"),
            ("Stroke Width 1", "thick"),
            ("Hor Offset 1", "abc"),
        ]);
        let entry = VideoOverlayEntry::from_row(&row).unwrap();
        assert_eq!(entry.overlays[0].style.stroke_width, 2);
        assert_eq!(entry.overlays[0].horizontal_offset, 50);
    }

    #[test]
    fn test_out_of_range_numbers() {
        let row = SheetRow::from_pairs([
            ("Image Path", "a.png"),
            ("Audio Path", "a.mp3"),
            ("Text 1", "Hi"),
            ("Font Size 1", "-5"),
            ("Stroke Width 1", "99999999999"),
            ("Text 2", "There"),
            ("Font Size 2", "99999999999"),
            ("Stroke Width 2", "-3"),
        ]);
        let entry = VideoOverlayEntry::from_row(&row).unwrap();
        assert_eq!(entry.overlays[0].style.font_size, 50);
        assert_eq!(entry.overlays[0].style.stroke_width, MAX_STROKE_WIDTH);
        assert_eq!(entry.overlays[1].style.font_size, 50);
        assert_eq!(entry.overlays[1].style.stroke_width, 0);
    }

    #[test]
    fn test_malformed_rows() {
        let no_text = SheetRow::from_pairs([("Image Path", "a.png"), ("Audio Path", "a.mp3")]);
        assert!(VideoOverlayEntry::from_row(&no_text).is_err());

        let bad_offset = SheetRow::from_pairs([
            ("Image Path", "a.png"),
            ("Audio Path", "a.mp3"),
            ("Text 1", "Hi"),
            ("Hor Offset 1", "150"),
        ]);
        assert!(matches!(
            VideoOverlayEntry::from_row(&bad_offset),
            Err(ReelError::InvalidOverlay(_))
        ));
    }

    #[test]
    fn test_load_entries_skips_bad_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracker.csv");
        std::fs::write(
            &path,
            "Image Path,Audio Path,Output Video Path,Text 1,Font Size 1,Status\n\
             hera.png,hera.mp3,out/hera.mp4,Hera,60,ToDo\n\
             nobody.png,nobody.mp3,,,,ToDo\n\
             ares.png,ares.mp3,,\"Ares, god of war\",,Done\n",
        )
        .unwrap();

        let entries = load_overlay_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].overlays[0].style.font_size, 60);
        assert_eq!(entries[0].output_video_path, "out/hera.mp4");
        assert_eq!(entries[1].overlays[0].text, "Ares, god of war");
        assert_eq!(entries[1].status, "Done");
    }

    #[test]
    fn test_texts_from_column_concatenates() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("intro.csv");
        let second = dir.path().join("tail.csv");
        std::fs::write(&first, "english_text,russian_text\nHello,Привет\n,Пусто\n").unwrap();
        std::fs::write(&second, "english_text\nBye\n").unwrap();
        let missing = dir.path().join("missing.csv");

        let texts = texts_from_column(&[&first, &missing, &second], "english_text");
        assert_eq!(texts, vec!["Hello", "", "Bye"]);

        let russian = texts_from_column(&[&first, &second], "russian_text");
        assert_eq!(russian, vec!["Привет", "Пусто"]);
    }

    #[test]
    fn test_csv_with_bom_and_padding() {
        let sheet = Sheet::parse_csv(" Text 1 , Status \n  Hello  ,ToDo\n").unwrap();
        assert!(sheet.has_column("Text 1"));
        assert_eq!(sheet.rows[0].get("Text 1"), Some("Hello"));

        let dir = tempdir().unwrap();
        let path = dir.path().join("bom.csv");
        std::fs::write(&path, "\u{feff}Text 1\nHi\n").unwrap();
        let sheet = Sheet::open(&path).unwrap();
        assert_eq!(sheet.column("Text 1"), Some(vec!["Hi".to_string()]));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(50.0)), "50");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::String("  x ".into())), "x");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
