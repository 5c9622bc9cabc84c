use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde_json::Value;
use std::fmt;

use crate::notion_types::{DateValue, PageRecord, RichText};
use crate::unit_config::ReminderUnitConfig;

pub const EMPTY_TITLE_TEXT: &str = "The title of the record is empty.";
pub const NO_DATE_TEXT: &str = "No date specified";
pub const DATE_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Clone, PartialEq)]
pub struct TodoItem {
    pub title: Option<String>,
    pub remind_date: Option<NaiveDate>,
    pub url: String,
}

impl TodoItem {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(EMPTY_TITLE_TEXT)
    }

    pub fn display_date(&self) -> String {
        match self.remind_date {
            Some(date) => date.format(DATE_FORMAT).to_string(),
            None => NO_DATE_TEXT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedTodos {
    /// Remind date on or before today, in query order.
    pub overdue: Vec<TodoItem>,
    pub undated: Vec<TodoItem>,
    /// Items due later; left for a later run.
    pub future_skipped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    MissingProperty,
    UnreadableDate(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaIssue {
    pub record_url: String,
    pub property: String,
    pub kind: IssueKind,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::MissingProperty => write!(f, "property \"{}\" not found", self.property),
            IssueKind::UnreadableDate(raw) => {
                write!(f, "property \"{}\" has an unreadable date \"{}\"", self.property, raw)
            }
        }
    }
}

/// The configured property names do not match the records the table returned.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaInconsistency {
    pub unit_name: String,
    pub table_name: String,
    pub issues: Vec<SchemaIssue>,
}

impl SchemaInconsistency {
    pub fn error_count(&self) -> usize {
        self.issues.len()
    }
}

impl fmt::Display for SchemaInconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} schema error(s) between {} and {}",
            self.error_count(),
            self.unit_name,
            self.table_name
        )
    }
}

impl std::error::Error for SchemaInconsistency {}

pub fn classify(
    records: &[PageRecord],
    config: &ReminderUnitConfig,
    today: NaiveDate,
    timezone: Tz,
) -> Result<ClassifiedTodos, SchemaInconsistency> {
    let mut classified = ClassifiedTodos::default();
    let mut issues = Vec::new();

    for record in records {
        let issues_before = issues.len();
        let mut issue = |property: &str, kind| {
            issues.push(SchemaIssue {
                record_url: record.url.clone(),
                property: property.to_string(),
                kind,
            })
        };

        let title = match record.properties.get(&config.title_property) {
            Some(value) => title_text(value),
            None => {
                issue(&config.title_property, IssueKind::MissingProperty);
                None
            }
        };

        let remind_date = match record.properties.get(&config.remind_date_property) {
            Some(value) => match remind_date(value, timezone) {
                Ok(date) => date,
                Err(raw) => {
                    issue(&config.remind_date_property, IssueKind::UnreadableDate(raw));
                    None
                }
            },
            None => {
                issue(&config.remind_date_property, IssueKind::MissingProperty);
                None
            }
        };

        if issues.len() > issues_before {
            continue;
        }

        let item = TodoItem {
            title,
            remind_date,
            url: record.url.clone(),
        };

        match item.remind_date {
            None => {
                tracing::debug!(id = %record.id, title = item.display_title(), "no remind date");
                classified.undated.push(item);
            }
            Some(date) if date <= today => classified.overdue.push(item),
            Some(_) => classified.future_skipped += 1,
        }
    }

    if !issues.is_empty() {
        return Err(SchemaInconsistency {
            unit_name: config.unit_name.clone(),
            table_name: config.table_name.clone(),
            issues,
        });
    }

    Ok(classified)
}

/// Plain text of a title property, `None` when it is empty.
fn title_text(value: &Value) -> Option<String> {
    let fragments: Vec<RichText> = value
        .get("title")
        .and_then(|t| serde_json::from_value(t.clone()).ok())
        .unwrap_or_default();

    let text: String = fragments.iter().map(|f| f.plain_text.as_str()).collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

/// Calendar date of a date property in `timezone`. `Ok(None)` when the date
/// is unset, `Err(raw)` when the start value cannot be read.
fn remind_date(value: &Value, timezone: Tz) -> Result<Option<NaiveDate>, String> {
    let date: Option<DateValue> = match value.get("date") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(serde_json::from_value(raw.clone()).map_err(|_| raw.to_string())?),
    };
    let Some(start) = date.and_then(|d| d.start) else {
        return Ok(None);
    };

    normalize_date(&start, timezone).map(Some).ok_or(start)
}

pub fn normalize_date(start: &str, timezone: Tz) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(start, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(start) {
        return Some(datetime.with_timezone(&timezone).date_naive());
    }
    NaiveDateTime::parse_from_str(start, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| timezone.from_local_datetime(&naive).earliest())
        .map(|local| local.date_naive())
}
