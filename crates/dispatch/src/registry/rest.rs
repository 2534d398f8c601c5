//! PostgREST-backed worker directory (e.g. a hosted Supabase table).
//!
//! Rows are `{id, vm_url, status, total_tasks, last_ping}`.

use super::{Registry, RegistryAdmin, validate_endpoint};
use crate::record::{WorkerId, WorkerRecord};
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use protocol::WorkerStatus;
use reqwest::{
    Client, Method, RequestBuilder,
    header::{self, HeaderMap, HeaderValue},
};
use serde::Deserialize;
use serde_json::json;

/// Worker directory stored in a PostgREST table.
#[derive(Clone)]
pub struct RestRegistry {
    client: Client,
    /// `<url>/rest/v1/<table>`.
    table_url: String,
    headers: HeaderMap,
}

#[derive(Deserialize)]
struct TaskCount {
    #[serde(default)]
    total_tasks: Option<u64>,
}

impl RestRegistry {
    /// Connect to `<url>/rest/v1/<table>` with a service key.
    pub fn new(client: Client, url: &str, key: &str, table: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(key)?);
        headers.insert(header::AUTHORIZATION, format!("Bearer {key}").parse()?);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/{table}", url.trim_end_matches('/')),
            headers,
        })
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.client
            .request(method, &self.table_url)
            .headers(self.headers.clone())
    }

    async fn select(&self, query: &[(&str, String)]) -> Result<Vec<WorkerRecord>> {
        self.request(Method::GET)
            .query(query)
            .send()
            .await
            .context("worker directory unreachable")?
            .error_for_status()?
            .json()
            .await
            .context("unexpected worker directory response")
    }

    async fn patch(&self, id: WorkerId, body: serde_json::Value) -> Result<()> {
        self.request(Method::PATCH)
            .query(&[("id", format!("eq.{id}"))])
            .json(&body)
            .send()
            .await
            .context("worker directory unreachable")?
            .error_for_status()?;
        Ok(())
    }
}

impl Registry for RestRegistry {
    async fn list_active(&self) -> Result<Vec<WorkerRecord>> {
        self.select(&[
            ("select", "*".to_owned()),
            ("status", "eq.active".to_owned()),
            ("order", "id.asc".to_owned()),
        ])
        .await
    }

    async fn mark_offline(&self, id: WorkerId) -> Result<()> {
        self.patch(id, json!({ "status": WorkerStatus::Offline }))
            .await
    }

    // PostgREST has no atomic increment without a stored procedure, so this
    // reads then writes. Concurrent runs may lose an increment.
    async fn increment_task_count(&self, id: WorkerId) -> Result<()> {
        let rows: Vec<TaskCount> = self
            .request(Method::GET)
            .query(&[("select", "total_tasks".to_owned()), ("id", format!("eq.{id}"))])
            .send()
            .await
            .context("worker directory unreachable")?
            .error_for_status()?
            .json()
            .await
            .context("unexpected worker directory response")?;
        let current = rows
            .first()
            .ok_or_else(|| anyhow!("unknown worker id {id}"))?
            .total_tasks
            .unwrap_or_default();

        self.patch(
            id,
            json!({ "total_tasks": current + 1, "last_ping": Utc::now() }),
        )
        .await
    }
}

impl RegistryAdmin for RestRegistry {
    async fn list_all(&self) -> Result<Vec<WorkerRecord>> {
        self.select(&[("select", "*".to_owned()), ("order", "id.asc".to_owned())])
            .await
    }

    async fn add(&self, endpoint: &str) -> Result<WorkerRecord> {
        let endpoint = validate_endpoint(endpoint)?;
        let rows: Vec<WorkerRecord> = self
            .request(Method::POST)
            .header("Prefer", "return=representation")
            .json(&json!({ "vm_url": endpoint, "status": WorkerStatus::Active }))
            .send()
            .await
            .context("worker directory unreachable")?
            .error_for_status()?
            .json()
            .await
            .context("unexpected worker directory response")?;
        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("worker directory returned no row for the insert"))
    }

    async fn remove(&self, id: WorkerId) -> Result<()> {
        self.request(Method::DELETE)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .context("worker directory unreachable")?
            .error_for_status()?;
        Ok(())
    }

    async fn set_status(&self, id: WorkerId, status: WorkerStatus) -> Result<()> {
        self.patch(id, json!({ "status": status, "last_ping": Utc::now() }))
            .await
    }
}
