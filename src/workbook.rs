use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::unit_config::{MISSING_PROPERTY_SENTINEL, UnitKind};

pub const INDEX_SHEET: &str = "index";
pub const COLOR_LIST_SHEET: &str = "color-list";
pub const TEMPLATE_SHEET: &str = "template";

/// Sheets that hold bookkeeping rather than a reminder unit.
pub const RESERVED_SHEETS: [&str; 3] = [INDEX_SHEET, COLOR_LIST_SHEET, TEMPLATE_SHEET];

#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Workbook not found at {0}. Run with --setup first.")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse workbook: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize workbook: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("A sheet named \"{0}\" already exists. Please choose a different name.")]
    SheetExists(String),

    #[error("Sheet name \"{0}\" is reserved")]
    ReservedName(String),

    #[error("Template sheet not found")]
    TemplateMissing,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Row {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: String,
    /// Greyed-out cell: the value is not used by this kind of unit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub shaded: bool,
}

impl Row {
    pub fn new(label: &str, value: &str) -> Self {
        Row {
            label: label.to_string(),
            value: value.to_string(),
            shaded: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Sheet {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<UnitKind>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: &str) -> Self {
        Sheet {
            id: new_sheet_id(),
            name: name.to_string(),
            tab_color: None,
            kind: None,
            rows: Vec::new(),
        }
    }

    /// Column B values for rows `first..first + count` (1-based), blank where
    /// the sheet is shorter than the range.
    pub fn values(&self, first: usize, count: usize) -> Vec<String> {
        (first..first + count)
            .map(|row| {
                self.rows
                    .get(row.saturating_sub(1))
                    .map(|r| r.value.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn value(&self, row: usize) -> &str {
        self.rows
            .get(row.saturating_sub(1))
            .map(|r| r.value.as_str())
            .unwrap_or("")
    }

    /// Mutable access to a 1-based row, growing the sheet when needed.
    pub fn row_mut(&mut self, row: usize) -> &mut Row {
        let index = row.saturating_sub(1);
        if self.rows.len() <= index {
            self.rows.resize_with(index + 1, Row::default);
        }
        &mut self.rows[index]
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved_name(&self.name)
    }
}

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_SHEETS.contains(&name)
}

fn new_sheet_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Workbook {
    /// Base address used to build links to individual sheets.
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_sheet: Option<String>,
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn load(path: &Path) -> Result<Self, WorkbookError> {
        if !path.exists() {
            return Err(WorkbookError::NotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)?;
        let workbook: Workbook = toml::from_str(&content)?;
        Ok(workbook)
    }

    /// Writes to a sibling temp file and renames it over `path`, so a
    /// concurrent `load` sees either the old or the new workbook.
    pub fn save(&self, path: &Path) -> Result<(), WorkbookError> {
        let content = toml::to_string_pretty(self)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workbook.toml".to_string());
        let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        fs::write(&tmp_path, content)?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Starter workbook with the template, colour list and an empty index.
    pub fn starter(url: &str) -> Self {
        let mut template = Sheet::new(TEMPLATE_SHEET);
        template.rows = vec![
            Row::new("Description", ""),
            Row::new("Reminder Recipient(s)", ""),
            Row::new("Integration API Key", ""),
            Row::new("Target Table URL", ""),
            Row::new("Target Table Name", ""),
            Row::new("Title Property Name", ""),
            Row::new("Remind Date Property Name", ""),
            Row::new("Complete Check Property Name", ""),
            Row::new("Theme Color", ""),
        ];

        let mut colors = Sheet::new(COLOR_LIST_SHEET);
        colors.rows.push(Row::new("Color Name", "Hex Code"));
        for (name, hex) in DEFAULT_COLORS {
            colors.rows.push(Row::new(name, hex));
        }

        let mut workbook = Workbook {
            url: url.to_string(),
            active_sheet: None,
            sheets: vec![template, colors],
        };
        workbook.update_index();
        workbook
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheet_url(&self, sheet: &Sheet) -> String {
        format!("{}#gid={}", self.url, sheet.id)
    }

    /// Sheets that are reminder units, in workbook order.
    pub fn unit_sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter().filter(|s| !s.is_reserved())
    }

    /// Returns whether the stored colour changed.
    pub fn set_tab_color(&mut self, name: &str, hex: &str) -> bool {
        match self.sheet_mut(name) {
            Some(sheet) if sheet.tab_color.as_deref() != Some(hex) => {
                sheet.tab_color = Some(hex.to_string());
                true
            }
            _ => false,
        }
    }

    /// Clones the template into a new unit sheet of the given kind and makes
    /// it the active sheet.
    pub fn create_unit(
        &mut self,
        name: &str,
        kind: UnitKind,
        color_name: &str,
        color_hex: &str,
    ) -> Result<&Sheet, WorkbookError> {
        if is_reserved_name(name) {
            return Err(WorkbookError::ReservedName(name.to_string()));
        }
        if self.sheet(name).is_some() {
            return Err(WorkbookError::SheetExists(name.to_string()));
        }
        let template = self
            .sheet(TEMPLATE_SHEET)
            .ok_or(WorkbookError::TemplateMissing)?;

        let mut sheet = Sheet {
            id: new_sheet_id(),
            name: name.to_string(),
            tab_color: Some(color_hex.to_string()),
            kind: Some(kind),
            rows: template.rows.clone(),
        };

        match kind {
            UnitKind::Tracked => {}
            UnitKind::NoCompletion => {
                let row = sheet.row_mut(8);
                row.value = MISSING_PROPERTY_SENTINEL.to_string();
                row.shaded = true;
            }
            UnitKind::Placeholder => {
                for row in [3, 6, 7] {
                    sheet.row_mut(row).shaded = true;
                }
                let row = sheet.row_mut(8);
                row.value = MISSING_PROPERTY_SENTINEL.to_string();
                row.shaded = true;
            }
        }
        sheet.row_mut(9).value = color_name.to_string();

        tracing::info!(sheet = name, kind = %kind, "created reminder unit sheet");
        self.sheets.push(sheet);
        self.active_sheet = Some(name.to_string());

        let index = self.sheets.len() - 1;
        Ok(&self.sheets[index])
    }

    /// Rebuilds the index sheet: a header row, then one hyperlink and note
    /// per unit sheet. Returns the number of units listed.
    pub fn update_index(&mut self) -> usize {
        let mut rows = vec![Row {
            label: "Sheet Name".to_string(),
            value: "Description".to_string(),
            shaded: true,
        }];

        for sheet in self.unit_sheets() {
            let link = format!("=HYPERLINK(\"{}\", \"{}\")", self.sheet_url(sheet), sheet.name);
            rows.push(Row::new(&link, sheet.value(1)));
        }
        let listed = rows.len() - 1;

        match self.sheet_mut(INDEX_SHEET) {
            Some(index) => index.rows = rows,
            None => {
                let mut index = Sheet::new(INDEX_SHEET);
                index.rows = rows;
                self.sheets.push(index);
            }
        }

        listed
    }
}

const DEFAULT_COLORS: [(&str, &str); 12] = [
    ("Red", "#E06666"),
    ("Orange", "#F6B26B"),
    ("Yellow", "#FFD966"),
    ("Green", "#93C47D"),
    ("Cyan", "#76A5AF"),
    ("Blue", "#6FA8DC"),
    ("Purple", "#8E7CC3"),
    ("Magenta", "#C27BA0"),
    ("Light Gray", "#D3D3D3"),
    ("Dark Gray", "#666666"),
    ("Black", "#000000"),
    ("White", "#FFFFFF"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_sheet_reads_blank() {
        let mut sheet = Sheet::new("work");
        sheet.rows.push(Row::new("Description", "notes"));

        let values = sheet.values(1, 3);
        assert_eq!(values, vec!["notes".to_string(), String::new(), String::new()]);
        assert_eq!(sheet.value(9), "");
    }

    #[test]
    fn test_create_no_completion_unit() {
        let mut workbook = Workbook::starter("file:///tmp/workbook.toml");
        workbook
            .create_unit("chores", UnitKind::NoCompletion, "Blue", "#6FA8DC")
            .unwrap();

        let sheet = workbook.sheet("chores").unwrap();
        assert_eq!(sheet.tab_color.as_deref(), Some("#6FA8DC"));
        assert_eq!(sheet.kind, Some(UnitKind::NoCompletion));
        assert_eq!(sheet.value(8), MISSING_PROPERTY_SENTINEL);
        assert!(sheet.rows[7].shaded);
        assert_eq!(sheet.value(9), "Blue");
        assert!(!sheet.rows[2].shaded);
        assert_eq!(workbook.active_sheet.as_deref(), Some("chores"));
    }

    #[test]
    fn test_create_placeholder_unit_shades_unused_cells() {
        let mut workbook = Workbook::starter("file:///tmp/workbook.toml");
        workbook
            .create_unit("later", UnitKind::Placeholder, "Red", "#E06666")
            .unwrap();

        let sheet = workbook.sheet("later").unwrap();
        let shaded: Vec<usize> = sheet
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.shaded)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(shaded, vec![3, 6, 7, 8]);
        assert_eq!(sheet.value(8), MISSING_PROPERTY_SENTINEL);
    }

    #[test]
    fn test_create_tracked_unit_only_sets_color() {
        let mut workbook = Workbook::starter("file:///tmp/workbook.toml");
        workbook
            .create_unit("work", UnitKind::Tracked, "Green", "#93C47D")
            .unwrap();

        let sheet = workbook.sheet("work").unwrap();
        assert!(sheet.rows.iter().all(|r| !r.shaded));
        assert_eq!(sheet.value(8), "");
        assert_eq!(sheet.value(9), "Green");
    }

    #[test]
    fn test_create_duplicate_unit_fails() {
        let mut workbook = Workbook::starter("file:///tmp/workbook.toml");
        workbook
            .create_unit("work", UnitKind::Tracked, "Green", "#93C47D")
            .unwrap();

        let result = workbook.create_unit("work", UnitKind::Tracked, "Green", "#93C47D");
        assert!(matches!(result, Err(WorkbookError::SheetExists(_))));
        assert!(matches!(
            workbook.create_unit("index", UnitKind::Tracked, "Green", "#93C47D"),
            Err(WorkbookError::ReservedName(_))
        ));
    }

    #[test]
    fn test_create_without_template_fails() {
        let mut workbook = Workbook::default();
        let result = workbook.create_unit("work", UnitKind::Tracked, "Green", "#93C47D");
        assert!(matches!(result, Err(WorkbookError::TemplateMissing)));
    }

    #[test]
    fn test_update_index_lists_units_only() {
        let mut workbook = Workbook::starter("https://sheets.example/book");
        workbook
            .create_unit("work", UnitKind::Tracked, "Green", "#93C47D")
            .unwrap();
        workbook.sheet_mut("work").unwrap().row_mut(1).value = "Team tasks".to_string();

        let listed = workbook.update_index();
        assert_eq!(listed, 1);

        let index = workbook.sheet(INDEX_SHEET).unwrap();
        assert_eq!(index.rows.len(), 2);
        assert!(index.rows[0].shaded);
        assert_eq!(index.rows[0].label, "Sheet Name");

        let id = workbook.sheet("work").unwrap().id.clone();
        assert_eq!(
            index.rows[1].label,
            format!("=HYPERLINK(\"https://sheets.example/book#gid={}\", \"work\")", id)
        );
        assert_eq!(index.rows[1].value, "Team tasks");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workbook.toml");

        let mut workbook = Workbook::starter("file:///book");
        workbook
            .create_unit("work", UnitKind::NoCompletion, "Green", "#93C47D")
            .unwrap();
        workbook.save(&path).unwrap();

        let loaded = Workbook::load(&path).unwrap();
        assert_eq!(loaded.active_sheet.as_deref(), Some("work"));
        let sheet = loaded.sheet("work").unwrap();
        assert_eq!(sheet.kind, Some(UnitKind::NoCompletion));
        assert_eq!(sheet.rows, workbook.sheet("work").unwrap().rows);
    }

    #[test]
    fn test_set_tab_color_reports_change() {
        let mut workbook = Workbook::starter("file:///book");
        workbook
            .create_unit("work", UnitKind::Tracked, "Green", "#93C47D")
            .unwrap();

        assert!(!workbook.set_tab_color("work", "#93C47D"));
        assert!(workbook.set_tab_color("work", "#6FA8DC"));
        assert!(!workbook.set_tab_color("work", "#6FA8DC"));
        assert!(!workbook.set_tab_color("nope", "#6FA8DC"));
    }

    #[test]
    fn test_save_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workbook.toml");
        fs::write(&path, "# old contents\n").unwrap();

        Workbook::starter("file:///book").save(&path).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["workbook.toml".to_string()]);
        assert!(Workbook::load(&path).unwrap().sheet(TEMPLATE_SHEET).is_some());
    }

    #[test]
    fn test_load_missing_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let result = Workbook::load(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(WorkbookError::NotFound(_))));
    }
}
