//! PostgREST remote store
//!
//! Talks to a Supabase/PostgREST endpoint at `{url}/rest/v1/{table}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;

use super::{Condition, Filter, RemoteError, RemoteRow, RemoteStore};
use crate::config::RemoteConfig;
use crate::records::Table;

/// HTTP client for a PostgREST-compatible backend
#[derive(Clone)]
pub struct RestRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestRemoteStore {
    /// Create a client from configuration
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
        })
    }

    /// Base URL of the backend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, self.endpoint(table))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }
}

/// Render a filter as PostgREST query pairs
pub(crate) fn filter_query(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions()
        .iter()
        .map(|condition| match condition {
            Condition::Eq { column, value } => (column.clone(), format!("eq.{}", scalar(value))),
            Condition::In { column, values } => {
                let items: Vec<String> = values.iter().map(list_item).collect();
                (column.clone(), format!("in.({})", items.join(",")))
            }
        })
        .collect()
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// List items containing reserved characters must be double-quoted
fn list_item(value: &Value) -> String {
    let raw = scalar(value);
    if raw
        .chars()
        .any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\' | ' '))
    {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw
    }
}

/// Connection and timeout failures mean the backend is unreachable
fn transport(e: reqwest::Error) -> RemoteError {
    if e.is_connect() || e.is_timeout() {
        RemoteError::Unavailable(e.to_string())
    } else {
        RemoteError::Http(e)
    }
}

async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn upsert(
        &self,
        table: Table,
        rows: Vec<RemoteRow>,
        conflict_key: &[&str],
    ) -> Result<(), RemoteError> {
        if rows.is_empty() {
            return Ok(());
        }
        tracing::debug!("Upserting {} rows into remote {}", rows.len(), table);

        let response = self
            .request(Method::POST, table)
            .query(&[("on_conflict", conflict_key.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), RemoteError> {
        if filter.is_empty() {
            return Err(RemoteError::InvalidFilter(
                "refusing to delete without a filter".to_string(),
            ));
        }
        tracing::debug!("Deleting from remote {} where {:?}", table, filter.conditions());

        let response = self
            .request(Method::DELETE, table)
            .query(&filter_query(filter))
            .header("Prefer", "return=minimal")
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }

    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<RemoteRow>, RemoteError> {
        let response = self
            .request(Method::GET, table)
            .query(&[("select", "*")])
            .query(&filter_query(filter))
            .send()
            .await
            .map_err(transport)?;
        let rows = check(response).await?.json::<Vec<RemoteRow>>().await?;
        tracing::debug!("Selected {} rows from remote {}", rows.len(), table);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::OwnerId;

    #[test]
    fn test_filter_query_eq_and_in() {
        let filter = Filter::owner(&OwnerId::new("coach-a"))
            .is_in("student_id", ["STU-1", "STU-2"])
            .eq("date", "2024-01-10");

        assert_eq!(
            filter_query(&filter),
            vec![
                ("coach_id".to_string(), "eq.coach-a".to_string()),
                ("student_id".to_string(), "in.(STU-1,STU-2)".to_string()),
                ("date".to_string(), "eq.2024-01-10".to_string()),
            ]
        );
    }

    #[test]
    fn test_list_items_with_reserved_characters_are_quoted() {
        let filter = Filter::default().is_in("student_id", ["A,1", "say \"hi\"", "plain"]);

        assert_eq!(
            filter_query(&filter)[0].1,
            r#"in.("A,1","say \"hi\"",plain)"#
        );
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let store = RestRemoteStore::new(&RemoteConfig {
            url: "http://localhost:54321/".to_string(),
            api_key: "anon".to_string(),
            access_token: None,
            timeout_secs: 5,
        })
        .unwrap();

        assert_eq!(store.base_url(), "http://localhost:54321");
        assert_eq!(
            store.endpoint(Table::Performance),
            "http://localhost:54321/rest/v1/performance"
        );
    }
}
