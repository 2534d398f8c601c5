//! `grid probe`: exercise one node's HTTP surface.

use anyhow::{Context, Result};
use protocol::{ExecuteRequest, SECRET_HEADER};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Task sent by the probe's `/execute` call.
pub const PROBE_TASK: &str = "grid probe";

/// Call `/`, `/health`, `/status` and a sample `/execute` and print each
/// response.
pub async fn probe(url: &str, secret: Option<&str>) -> Result<()> {
    let base = url.trim_end_matches('/');
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    for path in ["/", "/health", "/status"] {
        let response = client
            .get(format!("{base}{path}"))
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        print_response(&format!("GET {path}"), response).await?;
    }

    let mut request = client
        .post(format!("{base}/execute"))
        .json(&ExecuteRequest::new(PROBE_TASK, 0, Duration::from_secs(10)));
    if let Some(secret) = secret {
        request = request.header(SECRET_HEADER, secret);
    }
    let response = request.send().await.context("POST /execute failed")?;
    print_response("POST /execute", response).await
}

async fn print_response(label: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body = response.text().await?;
    let body = match serde_json::from_str::<Value>(&body) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => body,
    };
    println!("{label} -> {status}\n{body}\n");
    Ok(())
}
