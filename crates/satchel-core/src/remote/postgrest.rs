//! Supabase/PostgREST remote store client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::config::RemoteConfig;
use crate::models::{Assignment, Record, RecordData, RecordId, RecordKind, RecordPayload, Submission};
use crate::util::{error_excerpt, now_millis, parse_timestamp_millis};
use crate::{Error, Result};

/// Engine bookkeeping that never leaves the device
const LOCAL_FIELDS: [&str; 3] = ["synced", "last_modified", "offline_created"];

/// Row timestamps that stand in for `last_modified`, most specific first
const TIMESTAMP_FIELDS: [&str; 3] = ["updated_at", "submitted_at", "created_at"];

#[derive(Clone)]
pub struct PostgrestRemote {
    rest_url: String,
    anon_key: String,
    access_token: Option<String>,
    client: Client,
}

impl std::fmt::Debug for PostgrestRemote {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PostgrestRemote")
            .field("rest_url", &self.rest_url)
            .finish_non_exhaustive()
    }
}

impl PostgrestRemote {
    /// Build a client; every request is bounded by `timeout`
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Result<Self> {
        let config = config.clone().normalized();
        config.validate()?;
        let (Some(url), Some(anon_key)) = (config.rest_url, config.anon_key) else {
            return Err(Error::Config("remote URL and anon key are required".into()));
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("cannot build HTTP client: {error}")))?;

        Ok(Self {
            rest_url: normalize_rest_url(&url),
            anon_key,
            access_token: config.access_token,
            client,
        })
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    const fn table(kind: RecordKind) -> &'static str {
        match kind {
            RecordKind::Assignment => "assignments",
            RecordKind::Submission => "assignment_submissions",
        }
    }

    fn endpoint(&self, kind: RecordKind) -> String {
        format!("{}/{}", self.rest_url, Self::table(kind))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {token}"))
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self.authorized(request).send().await.map_err(classify)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteStore for PostgrestRemote {
    async fn fetch_all(
        &self,
        kind: RecordKind,
        owner: Option<&str>,
    ) -> RemoteResult<Vec<RecordPayload>> {
        let mut query = vec![("select", "*".to_string())];
        match kind {
            RecordKind::Assignment => query.push(("order", "due_date.asc".to_string())),
            RecordKind::Submission => {
                if let Some(owner) = owner {
                    query.push(("student_id", format!("eq.{owner}")));
                }
            }
        }

        let request = self
            .client
            .get(self.endpoint(kind))
            .header("Accept", "application/json")
            .query(&query);
        let rows = self.send(request).await?.json::<Vec<Value>>().await?;

        rows.into_iter().map(|row| from_row(kind, row)).collect()
    }

    async fn insert(&self, payload: &RecordPayload) -> RemoteResult<()> {
        let request = self
            .client
            .post(self.endpoint(payload.kind()))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&to_row(payload)?);
        self.send(request).await?;
        Ok(())
    }

    async fn update_by_id(&self, payload: &RecordPayload) -> RemoteResult<()> {
        let mut row = to_row(payload)?;
        if let Value::Object(fields) = &mut row {
            fields.remove("id");
        }

        let request = self
            .client
            .patch(self.endpoint(payload.kind()))
            .query(&[("id", format!("eq.{}", payload.id()))])
            .header("Prefer", "return=representation")
            .json(&row);
        let updated = self.send(request).await?.json::<Vec<Value>>().await?;
        if updated.is_empty() {
            return Err(RemoteError::Rejected(format!(
                "no {} row with id {}",
                payload.kind(),
                payload.id()
            )));
        }
        Ok(())
    }

    async fn delete_by_id(&self, kind: RecordKind, id: &RecordId) -> RemoteResult<()> {
        let request = self
            .client
            .delete(self.endpoint(kind))
            .query(&[("id", format!("eq.{id}"))]);
        self.send(request).await?;
        Ok(())
    }

    async fn ping(&self) -> RemoteResult<()> {
        let request = self
            .client
            .get(self.endpoint(RecordKind::Assignment))
            .query(&[("select", "id"), ("limit", "1")]);
        let response = self.authorized(request).send().await.map_err(classify)?;

        // Any answer below 500 proves the backend is reachable
        if response.status().is_server_error() {
            return Err(RemoteError::Api {
                status: response.status().as_u16(),
                message: format!("HTTP {}", response.status().as_u16()),
            });
        }
        Ok(())
    }
}

fn classify(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else if error.is_connect() {
        RemoteError::Unavailable(error.to_string())
    } else {
        RemoteError::Http(error)
    }
}

fn normalize_rest_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with("/rest/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/rest/v1")
    }
}

/// Serialize a record as a table row without local bookkeeping fields
fn to_row(payload: &RecordPayload) -> RemoteResult<Value> {
    let mut row = match payload {
        RecordPayload::Assignment(record) => serde_json::to_value(record)?,
        RecordPayload::Submission(record) => serde_json::to_value(record)?,
    };
    if let Value::Object(fields) = &mut row {
        for field in LOCAL_FIELDS {
            fields.remove(field);
        }
    }
    Ok(row)
}

fn from_row(kind: RecordKind, mut row: Value) -> RemoteResult<RecordPayload> {
    let last_modified = TIMESTAMP_FIELDS
        .iter()
        .find_map(|field| row.get(field).and_then(Value::as_str).and_then(parse_timestamp_millis))
        .unwrap_or_else(now_millis);
    if let Value::Object(fields) = &mut row {
        for field in LOCAL_FIELDS {
            fields.remove(field);
        }
    }

    let payload = match kind {
        RecordKind::Assignment => synced_record::<Assignment>(row, last_modified)?.into_payload(),
        RecordKind::Submission => synced_record::<Submission>(row, last_modified)?.into_payload(),
    };
    Ok(payload)
}

fn synced_record<T: RecordData>(row: Value, last_modified: i64) -> RemoteResult<Record<T>> {
    let record = serde_json::from_value::<Record<T>>(row)?;
    Ok(Record::from_remote(record.id, record.data, last_modified))
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorResponse {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorResponse>(body) {
        if let Some(message) = payload.message.or(payload.details).or(payload.hint) {
            return error_excerpt(&message);
        }
    }

    let trimmed = error_excerpt(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}
