use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<PageRecord>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// One database row. Properties stay raw: which of them exist, and their
/// shape, is only known once the unit's configured names are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateValue {
    pub start: Option<String>, // YYYY-MM-DD or full ISO 8601 timestamp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_response() {
        let body = r#"{
            "object": "list",
            "results": [{
                "object": "page",
                "id": "59833787-2cf9-4fdf-8782-e53db20768a5",
                "url": "https://www.notion.so/Write-report-598337872cf94fdf8782e53db20768a5",
                "properties": {
                    "Name": {"id": "title", "type": "title", "title": [{"type": "text", "plain_text": "Write report"}]},
                    "Remind": {"id": "abc", "type": "date", "date": {"start": "2024-01-01", "end": null, "time_zone": null}},
                    "Done": {"id": "def", "type": "checkbox", "checkbox": false}
                }
            }],
            "next_cursor": null,
            "has_more": false
        }"#;

        let response: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.results.len(), 1);
        assert!(!response.has_more);

        let record = &response.results[0];
        assert!(record.url.ends_with("598337872cf94fdf8782e53db20768a5"));
        assert_eq!(record.properties.len(), 3);

        let date: DateValue =
            serde_json::from_value(record.properties["Remind"]["date"].clone()).unwrap();
        assert_eq!(date.start.as_deref(), Some("2024-01-01"));
    }
}
