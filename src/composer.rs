use comrak::{Options, markdown_to_html};
use std::fmt::Write;

use crate::classifier::{ClassifiedTodos, SchemaInconsistency, TodoItem};
use crate::unit_config::ReminderUnit;

pub const SETUP_GUIDE_URL: &str =
    "https://docs.google.com/presentation/d/1QYZmRGCpvDynGNwytI1fn8Otty9uGgCT_erF84lc3Zw/edit#slide=id.p";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderMode {
    Test,
    Live,
}

/// Whether the body carries remind-date buckets or is the placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemindDatePresence {
    None,
    Present,
}

impl RemindDatePresence {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemindDatePresence::None => "none",
            RemindDatePresence::Present => "present",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReminderEmail {
    pub subject: String,
    pub html: String,
    pub presence: RemindDatePresence,
}

/// Builds the reminder for a unit. Live reminders are only produced when
/// something is overdue.
pub fn compose(
    unit: &ReminderUnit,
    classified: Option<&ClassifiedTodos>,
    mode: ReminderMode,
) -> Option<ReminderEmail> {
    let classified = match classified {
        Some(classified) if !unit.config.is_inert() => classified,
        _ => return Some(compose_placeholder(unit, mode)),
    };

    if mode == ReminderMode::Live && classified.overdue.is_empty() {
        return None;
    }

    Some(ReminderEmail {
        subject: subject(unit, mode),
        html: render(unit, &todo_markdown(unit, classified, mode)),
        presence: RemindDatePresence::Present,
    })
}

/// Reminder for a unit that has nothing to query yet.
pub fn compose_placeholder(unit: &ReminderUnit, mode: ReminderMode) -> ReminderEmail {
    ReminderEmail {
        subject: subject(unit, mode),
        html: render(unit, &placeholder_markdown(unit, mode)),
        presence: RemindDatePresence::None,
    }
}

fn subject(unit: &ReminderUnit, mode: ReminderMode) -> String {
    match mode {
        ReminderMode::Test => format!("Test Reminder for {}", unit.config.table_name),
        ReminderMode::Live => format!("Reminder for {}", unit.config.table_name),
    }
}

/// Sent instead of a reminder when the table does not match the unit sheet.
pub fn compose_schema_error(unit: &ReminderUnit, error: &SchemaInconsistency) -> ReminderEmail {
    let config = &unit.config;
    let mut md = String::from("# Notion Reminder Error\n\n");
    let _ = writeln!(
        md,
        "Some of the predefined values in **{}** are not consistent with **{}** in Notion. \
         Check from the links below.\n",
        escape(&error.unit_name),
        escape(&error.table_name)
    );
    for issue in &error.issues {
        let _ = writeln!(md, "- {}: {}", link(&issue.record_url, &issue.record_url), escape(&issue.to_string()));
    }
    let _ = writeln!(md, "\nUnit sheet: {}", link(&config.sheet_url, &config.unit_name));

    ReminderEmail {
        subject: format!(
            "Notion Reminder Error: Inconsistency between {} and {}",
            error.unit_name, error.table_name
        ),
        html: render(unit, &md),
        presence: RemindDatePresence::None,
    }
}

fn heading(unit: &ReminderUnit, mode: ReminderMode) -> String {
    let config = &unit.config;
    let prefix = match mode {
        ReminderMode::Test => "Test Reminder for",
        ReminderMode::Live => "Reminder for",
    };
    format!("# {} {}\n\n", prefix, link(&config.table_url, &config.table_name))
}

fn placeholder_markdown(unit: &ReminderUnit, mode: ReminderMode) -> String {
    let mut md = heading(unit, mode);
    md.push_str(
        "This reminder unit has no integration API key yet, so nothing was read from Notion.\n\n",
    );
    let _ = writeln!(
        md,
        "Fill in the sheet {} and send a test reminder again. Setup guide: {}",
        link(&unit.config.sheet_url, &unit.config.unit_name),
        link(SETUP_GUIDE_URL, "instructions")
    );
    md
}

fn todo_markdown(unit: &ReminderUnit, classified: &ClassifiedTodos, mode: ReminderMode) -> String {
    let mut md = heading(unit, mode);
    if mode == ReminderMode::Test {
        let _ = writeln!(
            md,
            "> This is a test reminder. Scheduled reminders are only sent when an item is overdue. \
             Setup guide: {}\n",
            link(SETUP_GUIDE_URL, "instructions")
        );
    }

    md.push_str("## Overdue\n\n");
    push_items(&mut md, &classified.overdue);
    md.push_str("## No remind date\n\n");
    push_items(&mut md, &classified.undated);
    md
}

fn push_items(md: &mut String, items: &[TodoItem]) {
    if items.is_empty() {
        md.push_str("_No items._\n\n");
        return;
    }
    for item in items {
        let _ = writeln!(md, "- {} ({})", link(&item.url, item.display_title()), item.display_date());
    }
    md.push('\n');
}

fn link(url: &str, text: &str) -> String {
    if url.is_empty() {
        escape(text)
    } else {
        let url = url.replace('<', "%3C").replace('>', "%3E").replace(' ', "%20");
        format!("[{}](<{}>)", escape(text), url)
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\`*_{}[]()<>#+-.!|~&".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn render(unit: &ReminderUnit, markdown: &str) -> String {
    let body = markdown_to_html(markdown, &Options::default());
    let border = unit
        .theme_hex
        .as_deref()
        .map(|hex| format!(" border-top: 6px solid {};", hex))
        .unwrap_or_default();
    format!(
        "<div style=\"font-family: sans-serif; padding-top: 8px;{}\">\n{}</div>\n",
        border, body
    )
}
