use chrono::NaiveDate;
use chrono_tz::Tz;
use thiserror::Error;

use crate::classifier::{self, SchemaInconsistency};
use crate::composer::{self, ReminderEmail, ReminderMode};
use crate::mailer::{MailError, Mailer};
use crate::notion_client::{NotionError, TaskSource};
use crate::query::{self, TableUrlError};
use crate::unit_config::ReminderUnit;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidUrl(#[from] TableUrlError),

    #[error("Failed to fetch items from Notion: {0}")]
    Fetch(#[from] NotionError),

    #[error("Failed to send email: {0}")]
    Mail(#[from] MailError),
}

#[derive(Debug, PartialEq)]
pub enum DispatchOutcome {
    /// The unit has no API key; a placeholder went out instead.
    PlaceholderSent { subject: String },
    Sent {
        subject: String,
        overdue: usize,
        undated: usize,
    },
    /// Table and unit sheet disagree; an error notification went out.
    SchemaErrorReported(SchemaInconsistency),
    /// Live run with nothing overdue.
    Suppressed,
}

pub struct ReminderDispatcher<'a, S: TaskSource, M: Mailer> {
    source: &'a S,
    mailer: &'a M,
    timezone: Tz,
}

impl<'a, S: TaskSource, M: Mailer> ReminderDispatcher<'a, S, M> {
    pub fn new(source: &'a S, mailer: &'a M, timezone: Tz) -> Self {
        ReminderDispatcher {
            source,
            mailer,
            timezone,
        }
    }

    pub async fn dispatch(
        &self,
        unit: &ReminderUnit,
        mode: ReminderMode,
        today: NaiveDate,
    ) -> Result<DispatchOutcome, DispatchError> {
        let config = &unit.config;

        let Some(api_key) = config.api_key.as_deref() else {
            tracing::info!(unit = %config.unit_name, "no integration API key, sending placeholder");
            let email = composer::compose_placeholder(unit, mode);
            self.send(unit, &email)?;
            return Ok(DispatchOutcome::PlaceholderSent {
                subject: email.subject,
            });
        };

        let table_id = query::extract_table_id(&config.table_url)?;
        let query = query::build_query(config);

        let response = self
            .source
            .query_database(api_key, &table_id, &query)
            .await?;
        tracing::info!(
            unit = %config.unit_name,
            records = response.results.len(),
            "fetched items"
        );
        if response.has_more {
            tracing::warn!(
                unit = %config.unit_name,
                next_cursor = ?response.next_cursor,
                "table returned more than one page; only the first page is reminded"
            );
        }

        let classified = match classifier::classify(&response.results, config, today, self.timezone) {
            Ok(classified) => classified,
            Err(inconsistency) => {
                tracing::warn!(unit = %config.unit_name, "{}", inconsistency);
                let email = composer::compose_schema_error(unit, &inconsistency);
                self.send(unit, &email)?;
                return Ok(DispatchOutcome::SchemaErrorReported(inconsistency));
            }
        };
        tracing::info!(
            unit = %config.unit_name,
            overdue = classified.overdue.len(),
            undated = classified.undated.len(),
            later = classified.future_skipped,
            "classified items"
        );

        match composer::compose(unit, Some(&classified), mode) {
            Some(email) => {
                self.send(unit, &email)?;
                Ok(DispatchOutcome::Sent {
                    subject: email.subject,
                    overdue: classified.overdue.len(),
                    undated: classified.undated.len(),
                })
            }
            None => {
                tracing::info!(unit = %config.unit_name, "nothing overdue, no reminder sent");
                Ok(DispatchOutcome::Suppressed)
            }
        }
    }

    fn send(&self, unit: &ReminderUnit, email: &ReminderEmail) -> Result<(), MailError> {
        tracing::debug!(
            unit = %unit.config.unit_name,
            presence = email.presence.as_str(),
            "sending {}",
            email.subject
        );
        self.mailer
            .send_html(&unit.config.recipients, &email.subject, &email.html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion_types::QueryResponse;
    use crate::query::QuerySpec;
    use crate::unit_config::tests::sample_config;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeSource {
        response: serde_json::Value,
        queries: Mutex<Vec<(String, String, QuerySpec)>>,
    }

    impl FakeSource {
        fn returning(results: serde_json::Value) -> Self {
            FakeSource {
                response: json!({"results": results, "has_more": false}),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TaskSource for FakeSource {
        async fn query_database(
            &self,
            api_key: &str,
            table_id: &str,
            query: &QuerySpec,
        ) -> Result<QueryResponse, NotionError> {
            self.queries
                .lock()
                .unwrap()
                .push((api_key.to_string(), table_id.to_string(), query.clone()));
            Ok(serde_json::from_value(self.response.clone())?)
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TaskSource for FailingSource {
        async fn query_database(
            &self,
            _api_key: &str,
            _table_id: &str,
            _query: &QuerySpec,
        ) -> Result<QueryResponse, NotionError> {
            Err(NotionError::AuthError("Invalid integration API key".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeMailer {
        sent: Mutex<Vec<(Vec<String>, String, String)>>,
    }

    impl Mailer for FakeMailer {
        fn send_html(&self, recipients: &[String], subject: &str, html: &str) -> Result<(), MailError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipients.to_vec(), subject.to_string(), html.to_string()));
            Ok(())
        }
    }

    fn unit() -> ReminderUnit {
        ReminderUnit {
            config: sample_config(),
            theme_hex: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn page(url: &str, title: &str, start: Option<&str>) -> serde_json::Value {
        json!({
            "url": url,
            "properties": {
                "Name": {"title": [{"plain_text": title}]},
                "Remind": {"date": start.map(|s| json!({"start": s}))},
            }
        })
    }

    #[tokio::test]
    async fn test_inert_unit_sends_placeholder_without_fetching() {
        let source = FakeSource::returning(json!([]));
        let mailer = FakeMailer::default();
        let dispatcher = ReminderDispatcher::new(&source, &mailer, chrono_tz::Asia::Tokyo);

        let mut unit = unit();
        unit.config.api_key = None;

        for (mode, subject) in [
            (ReminderMode::Test, "Test Reminder for Tasks"),
            (ReminderMode::Live, "Reminder for Tasks"),
        ] {
            let outcome = dispatcher.dispatch(&unit, mode, today()).await.unwrap();
            assert_eq!(
                outcome,
                DispatchOutcome::PlaceholderSent {
                    subject: subject.to_string()
                }
            );
        }

        assert_eq!(source.calls(), 0);
        assert_eq!(mailer.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_live_reminder_sent_with_query_for_unit() {
        let source = FakeSource::returning(json!([
            page("https://n/1", "File taxes", Some("2024-01-01")),
            page("https://n/2", "Someday", None),
            page("https://n/3", "Renew passport", Some("2099-01-01")),
        ]));
        let mailer = FakeMailer::default();
        let dispatcher = ReminderDispatcher::new(&source, &mailer, chrono_tz::Asia::Tokyo);

        let outcome = dispatcher
            .dispatch(&unit(), ReminderMode::Live, today())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                subject: "Reminder for Tasks".to_string(),
                overdue: 1,
                undated: 1,
            }
        );

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries[0].0, "secret_abc");
        assert_eq!(queries[0].1, "0123456789abcdef0123456789abcdef");
        assert!(queries[0].2.filter.is_some());

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].0, vec!["me@example.com".to_string()]);
        assert!(sent[0].2.contains("File taxes"));
        assert!(!sent[0].2.contains("Renew passport"));
    }

    #[tokio::test]
    async fn test_live_reminder_suppressed_when_nothing_overdue() {
        let source = FakeSource::returning(json!([page("https://n/2", "Someday", None)]));
        let mailer = FakeMailer::default();
        let dispatcher = ReminderDispatcher::new(&source, &mailer, chrono_tz::Asia::Tokyo);

        let outcome = dispatcher
            .dispatch(&unit(), ReminderMode::Live, today())
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Suppressed);
        assert!(mailer.sent.lock().unwrap().is_empty());

        let outcome = dispatcher
            .dispatch(&unit(), ReminderMode::Test, today())
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Sent { overdue: 0, undated: 1, .. }));
    }

    #[tokio::test]
    async fn test_schema_error_replaces_reminder() {
        let source = FakeSource::returning(json!([
            page("https://n/1", "File taxes", Some("2024-01-01")),
            {"url": "https://n/2", "properties": {"Remind": {"date": null}}},
        ]));
        let mailer = FakeMailer::default();
        let dispatcher = ReminderDispatcher::new(&source, &mailer, chrono_tz::Asia::Tokyo);

        let outcome = dispatcher
            .dispatch(&unit(), ReminderMode::Test, today())
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::SchemaErrorReported(inconsistency) => {
                assert_eq!(inconsistency.error_count(), 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].1,
            "Notion Reminder Error: Inconsistency between work and Tasks"
        );
        assert!(!sent[0].2.contains("File taxes"));
    }

    #[tokio::test]
    async fn test_invalid_url_stops_before_fetch() {
        let source = FakeSource::returning(json!([]));
        let mailer = FakeMailer::default();
        let dispatcher = ReminderDispatcher::new(&source, &mailer, chrono_tz::Asia::Tokyo);

        let mut unit = unit();
        unit.config.table_url = "https://example.com/tasks".to_string();

        let result = dispatcher.dispatch(&unit, ReminderMode::Live, today()).await;
        assert!(matches!(result, Err(DispatchError::InvalidUrl(_))));
        assert_eq!(source.calls(), 0);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let mailer = FakeMailer::default();
        let dispatcher = ReminderDispatcher::new(&FailingSource, &mailer, chrono_tz::Asia::Tokyo);

        let result = dispatcher.dispatch(&unit(), ReminderMode::Live, today()).await;
        assert!(matches!(
            result,
            Err(DispatchError::Fetch(NotionError::AuthError(_)))
        ));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }
}
