use thiserror::Error;

use crate::workbook::{COLOR_LIST_SHEET, Workbook};

#[derive(Error, Debug, PartialEq)]
pub enum ColorError {
    #[error("The color name \"{0}\" does not have a corresponding hex code.")]
    UnknownColor(String),

    #[error("Color list sheet \"color-list\" not found")]
    ColorListMissing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorEntry {
    pub name: String,
    pub hex: String,
}

/// Colour name to hex lookup, read from the colour list sheet (A2:B).
#[derive(Debug, Clone, Default)]
pub struct ColorTable {
    entries: Vec<ColorEntry>,
}

impl ColorTable {
    pub fn from_workbook(workbook: &Workbook) -> Result<Self, ColorError> {
        let sheet = workbook
            .sheet(COLOR_LIST_SHEET)
            .ok_or(ColorError::ColorListMissing)?;

        // first row is the header
        let entries = sheet
            .rows
            .iter()
            .skip(1)
            .filter(|row| !row.label.trim().is_empty())
            .map(|row| ColorEntry {
                name: row.label.trim().to_string(),
                hex: row.value.trim().to_string(),
            })
            .collect();

        Ok(ColorTable { entries })
    }

    pub fn resolve(&self, color_name: &str) -> Result<&str, ColorError> {
        let wanted = color_name.trim().to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.name.to_lowercase() == wanted && !entry.hex.is_empty())
            .map(|entry| entry.hex.as_str())
            .ok_or_else(|| ColorError::UnknownColor(color_name.to_string()))
    }

    pub fn entries(&self) -> &[ColorEntry] {
        &self.entries
    }
}
