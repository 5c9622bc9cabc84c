use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

use crate::unit_config::{PropertyPresence, ReminderUnitConfig};

#[derive(Error, Debug, PartialEq)]
pub enum TableUrlError {
    #[error("Not a Notion database URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuerySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<CheckboxFilter>,
    pub sorts: Vec<PropertySort>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckboxFilter {
    pub property: String,
    pub checkbox: CheckboxCondition,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckboxCondition {
    pub equals: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PropertySort {
    pub property: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
}

/// Unchecked items sorted by remind date; every item when the table has no
/// completion checkbox.
pub fn build_query(config: &ReminderUnitConfig) -> QuerySpec {
    let filter = match &config.complete_check_property {
        PropertyPresence::Present(property) => Some(CheckboxFilter {
            property: property.clone(),
            checkbox: CheckboxCondition { equals: false },
        }),
        PropertyPresence::Missing => None,
    };

    QuerySpec {
        filter,
        sorts: vec![PropertySort {
            property: config.remind_date_property.clone(),
            direction: SortDirection::Ascending,
        }],
    }
}

fn table_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^https://(?:www\.notion\.so|notion\.so|[A-Za-z0-9-]+\.notion\.site)/(?:[A-Za-z0-9_-]+/)?([A-Za-z0-9-]+)/?(?:[?#].*)?$",
        )
        .unwrap()
    })
}

fn trailing_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9a-fA-F]{32})$").unwrap())
}

/// Pulls the database id out of a Notion URL. Title-prefixed slugs such as
/// `Tasks-<32 hex>` yield just the hex id.
pub fn extract_table_id(url: &str) -> Result<String, TableUrlError> {
    let segment = table_url_regex()
        .captures(url.trim())
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| TableUrlError::InvalidUrl(url.to_string()))?;

    let id = trailing_id_regex()
        .captures(segment)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .unwrap_or(segment);

    Ok(id.to_string())
}
