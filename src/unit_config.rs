use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::colors::ColorTable;
use crate::workbook::{Workbook, is_reserved_name};

/// Cell value meaning "this table has no such property".
pub const MISSING_PROPERTY_SENTINEL: &str = "Property does not exist.";

const CONFIG_FIRST_ROW: usize = 1;
const CONFIG_ROW_COUNT: usize = 9;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} does not exist. Enter the valid sheet name.")]
    NotFound(String),

    #[error("{0} is a reserved sheet, not a reminder unit")]
    ReservedSheet(String),

    #[error("{unit}: \"{field}\" must be filled in for a {kind} unit")]
    MissingField {
        unit: String,
        field: ConfigField,
        kind: UnitKind,
    },

    #[error(
        "{unit}: the completion property is marked \"Property does not exist.\" but the sheet is a tracked unit; \
         set `kind = \"no-completion\"` on the sheet in workbook.toml"
    )]
    TrackedWithoutCompletion { unit: String },

    #[error("{unit}: \"{field}\" is not used by a {kind} unit and must be left as set by the template")]
    UnexpectedField {
        unit: String,
        field: ConfigField,
        kind: UnitKind,
    },
}

/// The three template variants a unit sheet can be created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    /// Every property is present on the table.
    #[value(alias = "type1")]
    Tracked,
    /// The table has no completion checkbox.
    #[value(alias = "type2")]
    NoCompletion,
    /// No table is wired up yet; only placeholder reminders are sent.
    #[value(alias = "type3")]
    Placeholder,
}

impl UnitKind {
    fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Tracked => "tracked",
            UnitKind::NoCompletion => "no-completion",
            UnitKind::Placeholder => "placeholder",
        }
    }

    /// Fields an active unit of this kind cannot leave blank.
    pub fn required_fields(&self) -> &'static [ConfigField] {
        match self {
            UnitKind::Tracked => &[
                ConfigField::TableUrl,
                ConfigField::TitleProperty,
                ConfigField::RemindDateProperty,
                ConfigField::CompleteCheckProperty,
            ],
            UnitKind::NoCompletion => &[
                ConfigField::TableUrl,
                ConfigField::TitleProperty,
                ConfigField::RemindDateProperty,
            ],
            UnitKind::Placeholder => &[],
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configuration cell of a unit sheet, in row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Description,
    Recipients,
    ApiKey,
    TableUrl,
    TableName,
    TitleProperty,
    RemindDateProperty,
    CompleteCheckProperty,
    ThemeColor,
}

impl ConfigField {
    pub fn label(&self) -> &'static str {
        match self {
            ConfigField::Description => "Description",
            ConfigField::Recipients => "Reminder Recipient(s)",
            ConfigField::ApiKey => "Integration API Key",
            ConfigField::TableUrl => "Target Table URL",
            ConfigField::TableName => "Target Table Name",
            ConfigField::TitleProperty => "Title Property Name",
            ConfigField::RemindDateProperty => "Remind Date Property Name",
            ConfigField::CompleteCheckProperty => "Complete Check Property Name",
            ConfigField::ThemeColor => "Theme Color",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyPresence {
    Present(String),
    Missing,
}

impl PropertyPresence {
    fn from_cell(value: &str) -> Self {
        if value == MISSING_PROPERTY_SENTINEL {
            PropertyPresence::Missing
        } else {
            PropertyPresence::Present(value.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReminderUnitConfig {
    pub unit_name: String,
    pub sheet_url: String,
    pub kind: UnitKind,
    pub description: String,
    pub recipients: Vec<String>,
    /// `None` leaves the unit inert: nothing is ever queried.
    pub api_key: Option<String>,
    pub table_url: String,
    pub table_name: String,
    pub title_property: String,
    pub remind_date_property: String,
    pub complete_check_property: PropertyPresence,
    pub theme_color: String,
}

impl ReminderUnitConfig {
    pub fn is_inert(&self) -> bool {
        self.api_key.is_none()
    }
}

/// Reads B1:B9 of the unit's sheet.
pub fn load(workbook: &Workbook, unit_name: &str) -> Result<ReminderUnitConfig, ConfigError> {
    if is_reserved_name(unit_name) {
        return Err(ConfigError::ReservedSheet(unit_name.to_string()));
    }
    let sheet = workbook
        .sheet(unit_name)
        .ok_or_else(|| ConfigError::NotFound(unit_name.to_string()))?;

    let data: Vec<String> = sheet
        .values(CONFIG_FIRST_ROW, CONFIG_ROW_COUNT)
        .into_iter()
        .map(|v| v.trim().to_string())
        .collect();
    let cell = |field: ConfigField| data[field as usize].as_str();

    let complete_check_property = PropertyPresence::from_cell(cell(ConfigField::CompleteCheckProperty));
    let kind = sheet.kind.unwrap_or(match complete_check_property {
        PropertyPresence::Missing => UnitKind::NoCompletion,
        PropertyPresence::Present(_) => UnitKind::Tracked,
    });

    let api_key = Some(cell(ConfigField::ApiKey))
        .filter(|key| !key.is_empty())
        .map(str::to_string);

    let config = ReminderUnitConfig {
        unit_name: unit_name.to_string(),
        sheet_url: workbook.sheet_url(sheet),
        kind,
        description: cell(ConfigField::Description).to_string(),
        recipients: parse_recipients(cell(ConfigField::Recipients)),
        api_key,
        table_url: cell(ConfigField::TableUrl).to_string(),
        table_name: cell(ConfigField::TableName).to_string(),
        title_property: cell(ConfigField::TitleProperty).to_string(),
        remind_date_property: cell(ConfigField::RemindDateProperty).to_string(),
        complete_check_property,
        theme_color: cell(ConfigField::ThemeColor).to_string(),
    };

    validate(&config, &data)?;
    Ok(config)
}

fn validate(config: &ReminderUnitConfig, cells: &[String]) -> Result<(), ConfigError> {
    let missing = |field| ConfigError::MissingField {
        unit: config.unit_name.clone(),
        field,
        kind: config.kind,
    };
    let unexpected = |field| ConfigError::UnexpectedField {
        unit: config.unit_name.clone(),
        field,
        kind: config.kind,
    };

    if config.recipients.is_empty() {
        return Err(missing(ConfigField::Recipients));
    }

    match config.kind {
        UnitKind::Placeholder if !config.is_inert() => return Err(unexpected(ConfigField::ApiKey)),
        UnitKind::NoCompletion if config.complete_check_property != PropertyPresence::Missing => {
            return Err(unexpected(ConfigField::CompleteCheckProperty));
        }
        _ => {}
    }

    // an inert unit only ever sends the placeholder
    if config.is_inert() {
        return Ok(());
    }

    if config.kind == UnitKind::Tracked && config.complete_check_property == PropertyPresence::Missing {
        return Err(ConfigError::TrackedWithoutCompletion {
            unit: config.unit_name.clone(),
        });
    }

    for field in config.kind.required_fields() {
        if cells[*field as usize].is_empty() {
            return Err(missing(*field));
        }
    }

    Ok(())
}

fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

/// A loaded unit together with its resolved theme colour.
#[derive(Debug, Clone)]
pub struct ReminderUnit {
    pub config: ReminderUnitConfig,
    pub theme_hex: Option<String>,
}

impl ReminderUnit {
    /// Loads the unit and resolves its theme colour. An unknown colour only
    /// costs the tab colour and the email border.
    pub fn open(workbook: &Workbook, unit_name: &str) -> Result<Self, ConfigError> {
        let config = load(workbook, unit_name)?;

        let theme_hex = match ColorTable::from_workbook(workbook)
            .and_then(|table| table.resolve(&config.theme_color).map(str::to_string))
        {
            Ok(hex) => Some(hex),
            Err(e) => {
                tracing::warn!(unit = unit_name, "{}", e);
                None
            }
        };

        Ok(ReminderUnit { config, theme_hex })
    }

    /// Colours the unit's sheet tab. Returns whether the workbook changed
    /// and needs saving.
    pub fn apply_tab_color(&self, workbook: &mut Workbook) -> bool {
        match &self.theme_hex {
            Some(hex) => workbook.set_tab_color(&self.config.unit_name, hex),
            None => false,
        }
    }
}
