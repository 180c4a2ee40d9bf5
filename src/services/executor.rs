//! Executor (§4.4): runs a single task against the external chat endpoint,
//! parses its SSE response, persists the result, and fires the webhook.
//!
//! Per §9 Design Notes, this is also the integration point for the LLM
//! Router subsystem: SSE frames carrying a `toolName` are recorded as task
//! steps and fed into `RouterMetrics`/`SelfLearner`'s downgrade-test sampling.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{CallMetric, Task, TaskResultUpdate, TaskStatus, TaskStep};
use crate::domain::ports::router_repository::RouterRepository;
use crate::domain::ports::task_repository::TaskRepository;
use crate::services::context_truncation::estimate_tokens;
use crate::services::cost_tracker;
use crate::services::provider_pool::LlmConfig;

const RAW_FALLBACK_BYTES: usize = 1_000;

pub struct Executor {
    repo: Arc<dyn TaskRepository>,
    router_repo: Option<Arc<dyn RouterRepository>>,
    http: Client,
    chat_endpoint_url: String,
    webhook_timeout_ms: u64,
}

enum ExecutionOutcome {
    Completed(serde_json::Value),
    Failed(String),
}

/// An intermediate tool invocation surfaced in the SSE stream.
struct ToolCallFrame {
    tool_name: String,
    provider: String,
    model: String,
    success: bool,
    arguments: serde_json::Value,
    result: Option<serde_json::Value>,
}

impl Executor {
    pub fn new(
        repo: Arc<dyn TaskRepository>,
        router_repo: Option<Arc<dyn RouterRepository>>,
        chat_endpoint_url: String,
        webhook_timeout_ms: u64,
    ) -> Self {
        Self { repo, router_repo, http: Client::new(), chat_endpoint_url, webhook_timeout_ms }
    }

    /// Runs one task to completion. `cancel` is signalled by the scheduler's
    /// cancel API; a timeout timer is armed independently at `task.timeout_ms`.
    pub async fn execute(&self, mut task: Task, cancel: CancellationToken, llm_config: Option<LlmConfig>) -> Result<()> {
        self.repo.update_state(task.id, TaskStatus::Running).await?;
        self.repo
            .set_result(task.id, TaskResultUpdate { started_at: Some(Utc::now()), ..Default::default() })
            .await?;
        info!(task_id = %task.id, "task.started");

        let started = std::time::Instant::now();
        let timeout = tokio::time::sleep(Duration::from_millis(task.timeout_ms));
        tokio::pin!(timeout);

        let outcome = tokio::select! {
            result = self.call_chat_endpoint(&task, llm_config.as_ref()) => {
                match result {
                    Ok(value) => ExecutionOutcome::Completed(value),
                    Err(err) => ExecutionOutcome::Failed(err.to_string()),
                }
            }
            _ = &mut timeout => {
                ExecutionOutcome::Failed(format!("timed out after {}ms", task.timeout_ms))
            }
            _ = cancel.cancelled() => {
                ExecutionOutcome::Failed("cancelled".to_string())
            }
        };

        let execution_time_ms = started.elapsed().as_millis() as u64;

        match outcome {
            ExecutionOutcome::Completed(result) => {
                self.repo.update_state(task.id, TaskStatus::Completed).await?;
                self.repo
                    .set_result(
                        task.id,
                        TaskResultUpdate {
                            result: Some(result.clone()),
                            completed_at: Some(Utc::now()),
                            execution_time_ms: Some(execution_time_ms),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(task_id = %task.id, execution_time_ms, "task.completed");
                task.status = TaskStatus::Completed;
                self.fire_webhook(&task, true, Some(result), None, execution_time_ms).await;
            }
            ExecutionOutcome::Failed(error) => {
                if cancel.is_cancelled() {
                    self.repo.update_state(task.id, TaskStatus::Cancelled).await?;
                    task.status = TaskStatus::Cancelled;
                } else {
                    self.repo.update_state(task.id, TaskStatus::Failed).await?;
                    self.repo
                        .set_result(task.id, TaskResultUpdate { error: Some(error.clone()), ..Default::default() })
                        .await?;
                    task.status = TaskStatus::Failed;
                }
                warn!(task_id = %task.id, error = %error, "task.failed");
                self.fire_webhook(&task, false, None, Some(error), execution_time_ms).await;
            }
        }

        Ok(())
    }

    async fn call_chat_endpoint(&self, task: &Task, llm_config: Option<&LlmConfig>) -> Result<serde_json::Value> {
        let mut body = json!({
            "conversationId": Uuid::new_v4(),
            "message": task.instruction,
            "isScheduledTask": true,
            "mode": "agent",
            "supportsImages": false,
        });
        if let Some(config) = llm_config {
            if let serde_json::Value::Object(ref mut map) = body {
                map.insert("provider".to_string(), json!(config.provider));
                map.insert("model".to_string(), json!(config.model));
            }
        } else if let Some(config) = &task.llm_config {
            if let (serde_json::Value::Object(ref mut map), serde_json::Value::Object(extra)) = (&mut body, config) {
                for (key, value) in extra {
                    map.insert(key.clone(), value.clone());
                }
            }
        }

        let started = std::time::Instant::now();
        let response = self
            .http
            .post(&self.chat_endpoint_url)
            .json(&body)
            .send()
            .await
            .context("chat endpoint request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("chat endpoint returned {}", response.status());
        }

        let parsed = parse_sse_body(response.bytes_stream()).await?;
        let latency_ms = started.elapsed().as_millis() as u64;
        self.record_tool_calls(task.id, parsed.tool_calls, latency_ms).await;
        Ok(parsed.result)
    }

    /// `latency_ms` is the round-trip time of the chat request the tool
    /// calls were surfaced in; the SSE stream gives no finer-grained timing
    /// per individual call.
    async fn record_tool_calls(&self, task_id: Uuid, tool_calls: Vec<ToolCallFrame>, latency_ms: u64) {
        for call in tool_calls {
            let input_tokens = estimate_tokens(&call.arguments.to_string()) as u64;
            let output_tokens = call.result.as_ref().map(|r| estimate_tokens(&r.to_string()) as u64).unwrap_or(0);

            let step = TaskStep {
                id: Uuid::new_v4(),
                task_id,
                tool_name: call.tool_name.clone(),
                arguments: call.arguments,
                result: call.result,
                created_at: Utc::now(),
            };
            if let Err(err) = self.repo.add_step(&step).await {
                warn!(task_id = %task_id, error = %err, "failed to record task step");
            }

            let Some(router_repo) = &self.router_repo else {
                continue;
            };
            let estimated_cost = cost_tracker::estimate_cost(&call.model, input_tokens, output_tokens).unwrap_or(0.0);
            let metric = CallMetric {
                tool_name: call.tool_name.clone(),
                provider: call.provider.clone(),
                model: call.model.clone(),
                success: call.success,
                latency_ms,
                estimated_cost,
                timestamp: Utc::now(),
            };
            if let Err(err) = router_repo.record_metric(&metric).await {
                warn!(error = %err, "failed to record router metric");
            }
            if let Err(err) = router_repo.record_downgrade_test_result(&call.tool_name, &call.model, call.success).await {
                warn!(error = %err, "failed to record downgrade test result");
            }
        }
    }

    async fn fire_webhook(
        &self,
        task: &Task,
        success: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
        execution_time_ms: u64,
    ) {
        let Some(url) = &task.webhook_url else {
            return;
        };
        if !is_safe_webhook_url(url) {
            warn!(task_id = %task.id, url, "webhook url rejected by private-address filter");
            return;
        }

        let payload = json!({
            "taskId": task.id,
            "state": if success { "completed" } else { "failed" },
            "result": result,
            "error": error,
            "executionTimeMs": execution_time_ms,
        });

        let client = self.http.clone();
        let url = url.clone();
        let timeout_ms = self.webhook_timeout_ms;
        tokio::spawn(async move {
            let outcome = client.post(&url).timeout(Duration::from_millis(timeout_ms)).json(&payload).send().await;
            if let Err(err) = outcome {
                warn!(url, error = %err, "webhook delivery failed");
            }
        });
    }
}

struct SseParseResult {
    result: serde_json::Value,
    tool_calls: Vec<ToolCallFrame>,
}

/// Collects every `data:` line as JSON; the last successfully parsed frame
/// is the task result, or `{raw: firstKBytes}` if none parsed. Frames
/// carrying a `toolName` are collected separately as tool-call steps.
async fn parse_sse_body(
    mut stream: impl futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
) -> Result<SseParseResult> {
    let mut buffer = String::new();
    let mut last_parsed: Option<serde_json::Value> = None;
    let mut tool_calls = Vec::new();
    let mut raw_prefix = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("error reading SSE stream")?;
        if raw_prefix.len() < RAW_FALLBACK_BYTES {
            let take = (RAW_FALLBACK_BYTES - raw_prefix.len()).min(chunk.len());
            raw_prefix.extend_from_slice(&chunk[..take]);
        }
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline_pos) = buffer.find('\n') {
            let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
            buffer.drain(..=newline_pos);
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(data.trim()) else {
                continue;
            };
            if let Some(frame) = as_tool_call_frame(&value) {
                tool_calls.push(frame);
            }
            last_parsed = Some(value);
        }
    }

    let result = last_parsed.unwrap_or_else(|| json!({ "raw": String::from_utf8_lossy(&raw_prefix).to_string() }));
    Ok(SseParseResult { result, tool_calls })
}

fn as_tool_call_frame(value: &serde_json::Value) -> Option<ToolCallFrame> {
    let tool_name = value.get("toolName")?.as_str()?.to_string();
    let provider = value.get("provider").and_then(|v| v.as_str()).unwrap_or("anthropic").to_string();
    let model = value.get("model")?.as_str()?.to_string();
    let success = value.get("success")?.as_bool()?;
    Some(ToolCallFrame {
        tool_name,
        provider,
        model,
        success,
        arguments: value.get("arguments").cloned().unwrap_or(serde_json::Value::Null),
        result: value.get("result").cloned(),
    })
}

/// Webhook host filter (§4.4, security-critical, enforced verbatim).
pub fn is_safe_webhook_url(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };

    let lower = host.to_lowercase();
    if lower == "localhost" || lower.ends_with(".internal") || lower.ends_with(".local") {
        return false;
    }

    if let Ok(ip) = IpAddr::from_str(host) {
        return !is_private_or_reserved(ip);
    }

    true
}

fn is_private_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_unspecified()
                || v4.is_private()
                || v4.is_link_local()
                || v4 == std::net::Ipv4Addr::new(169, 254, 169, 254)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
