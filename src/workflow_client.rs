//! Blocking client for the remote analysis workflow service.
//!
//! Three calls make up the contract:
//!
//! ```text
//! POST /api/workflow/full_workflow/start           -> { success, session_id, message }
//! GET  /api/workflow/status/{session_id}           -> { current_step, step_status, progress_percentage, error? }
//! GET  /api/workflow/results/synthesis/{session_id} -> free-form synthesis JSON
//! ```
//!
//! Response interpretation lives in the `parse_*` functions so it can be
//! exercised without a server.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{AppConfig, normalize_base};
use crate::error::WorkflowError;
use crate::http_client::http_client;
use crate::state::JobParams;

const START_PATH: &str = "/api/workflow/full_workflow/start";
const STATUS_PATH: &str = "/api/workflow/status/";
const SYNTHESIS_PATH: &str = "/api/workflow/results/synthesis/";

const START_FAILED_MSG: &str = "Failed to start the workflow on the backend.";
const RESULT_FETCH_FAILED_MSG: &str = "Could not fetch the final analysis data. Check the backend log to make sure the synthesis file was generated.";
const RESULT_EMPTY_MSG: &str = "The final synthesis data came back empty.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepName {
    Init,
    Collection,
    Verification,
    Synthesis,
    ModuleGeneration,
    FinalProtocol,
}

impl StepName {
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(StepName::Init),
            1 => Some(StepName::Collection),
            2 => Some(StepName::Verification),
            3 => Some(StepName::Synthesis),
            4 => Some(StepName::ModuleGeneration),
            5 => Some(StepName::FinalProtocol),
            _ => None,
        }
    }

    fn from_status_key(key: &str) -> Option<Self> {
        match key {
            "step1" => Some(StepName::Collection),
            "step2" => Some(StepName::Verification),
            "step3" => Some(StepName::Synthesis),
            "step4" => Some(StepName::ModuleGeneration),
            "cpl_devastador" => Some(StepName::FinalProtocol),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StepName::Init => "Starting workflow...",
            StepName::Collection => "STEP 1: Bulk data collection in progress...",
            StepName::Verification => "STEP 2: Verifying collected data with external AI...",
            StepName::Synthesis => "STEP 3: Synthesis and deep analysis of the data...",
            StepName::ModuleGeneration => "STEP 4: Generating the 16 intelligence modules...",
            StepName::FinalProtocol => "FINAL STEP: Running the final analysis protocol...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Completed,
    Failed,
}

impl StepState {
    fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(StepState::Pending),
            "completed" => Some(StepState::Completed),
            "failed" => Some(StepState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStatus {
    pub current_step: Option<StepName>,
    pub raw_step: Option<i64>,
    pub step_state: BTreeMap<StepName, StepState>,
    pub progress_percent: u8,
    pub error: Option<String>,
}

impl WorkflowStatus {
    pub fn is_complete(&self) -> bool {
        self.progress_percent >= 100
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSession {
    pub session_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl WorkflowSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            submitted_at: Utc::now(),
        }
    }
}

pub trait WorkflowApi: Send + Sync {
    fn start(&self, params: &JobParams) -> Result<String, WorkflowError>;
    fn poll_status(&self, session_id: &str) -> Result<WorkflowStatus, WorkflowError>;
    fn fetch_result(&self, session_id: &str) -> Result<Value, WorkflowError>;
}

impl<T: WorkflowApi + ?Sized> WorkflowApi for Arc<T> {
    fn start(&self, params: &JobParams) -> Result<String, WorkflowError> {
        (**self).start(params)
    }

    fn poll_status(&self, session_id: &str) -> Result<WorkflowStatus, WorkflowError> {
        (**self).poll_status(session_id)
    }

    fn fetch_result(&self, session_id: &str) -> Result<Value, WorkflowError> {
        (**self).fetch_result(session_id)
    }
}

pub struct HttpWorkflowClient {
    client: Client,
    base: String,
    home_team: String,
}

impl HttpWorkflowClient {
    pub fn new(client: Client, base: &str, home_team: &str) -> Self {
        Self {
            client,
            base: normalize_base(base),
            home_team: home_team.to_string(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let client = http_client(cfg.request_timeout)?;
        Ok(Self::new(client, &cfg.api_base, &cfg.home_team))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn send(&self, req: RequestBuilder) -> Result<(StatusCode, String), String> {
        let resp = req
            .header(CONTENT_TYPE, "application/json")
            .send()
            .map_err(|err| self.describe_send_error(&err))?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|err| format!("failed reading response body: {err}"))?;
        Ok((status, body))
    }

    fn describe_send_error(&self, err: &reqwest::Error) -> String {
        if err.is_connect() {
            unreachable_message(&self.base)
        } else if err.is_timeout() {
            format!("Request to the analysis service at {} timed out.", self.base)
        } else {
            format!("Request to the analysis service failed: {err}")
        }
    }
}

impl WorkflowApi for HttpWorkflowClient {
    fn start(&self, params: &JobParams) -> Result<String, WorkflowError> {
        let payload = build_start_payload(params, &self.home_team);
        debug!(url = %self.url(START_PATH), "starting workflow");
        let (status, body) = self
            .send(self.client.post(self.url(START_PATH)).body(payload.to_string()))
            .map_err(WorkflowError::Submission)?;
        parse_start_response(status, &body)
    }

    fn poll_status(&self, session_id: &str) -> Result<WorkflowStatus, WorkflowError> {
        let url = self.url(&format!("{STATUS_PATH}{session_id}"));
        let (status, body) = self
            .send(self.client.get(url))
            .map_err(WorkflowError::Transport)?;
        parse_status_response(status, &body)
    }

    fn fetch_result(&self, session_id: &str) -> Result<Value, WorkflowError> {
        let url = self.url(&format!("{SYNTHESIS_PATH}{session_id}"));
        let (status, body) = self
            .send(self.client.get(url))
            .map_err(WorkflowError::Transport)?;
        parse_result_response(status, &body)
    }
}

pub fn unreachable_message(base: &str) -> String {
    format!(
        "Could not reach the analysis service at {base}. Check that the backend is running and that CORS is enabled."
    )
}

pub fn build_start_payload(params: &JobParams, home_team: &str) -> Value {
    let opponent = params.opponent.trim();
    json!({
        "segmento": format!("Análise de partida de futebol: {home_team} vs {opponent}"),
        "produto": params.competition.trim(),
        "publico": "Torcedores e analistas de futebol",
        "context": {
            "opponent": opponent,
            "competition": params.competition.trim(),
            "match_date": params.match_date.trim(),
            "venue": params.venue.wire_label(),
            "deep_dive": params.deep_dive,
            "specialDirectives": params.special_directives,
        }
    })
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub fn parse_start_response(status: StatusCode, body: &str) -> Result<String, WorkflowError> {
    if !status.is_success() {
        let msg = server_message(body).unwrap_or_else(|| format!("HTTP error! status: {status}"));
        return Err(WorkflowError::Submission(msg));
    }

    let parsed: StartResponse = serde_json::from_str(body.trim())
        .map_err(|_| WorkflowError::Submission(START_FAILED_MSG.to_string()))?;
    let session_id = parsed
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    match session_id {
        Some(id) if parsed.success => Ok(id),
        _ => {
            let msg = non_empty(parsed.message)
                .or_else(|| non_empty(parsed.error))
                .unwrap_or_else(|| START_FAILED_MSG.to_string());
            Err(WorkflowError::Submission(msg))
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    current_step: Option<i64>,
    #[serde(default)]
    step_status: HashMap<String, Value>,
    #[serde(default)]
    progress_percentage: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

pub fn parse_status_response(
    status: StatusCode,
    body: &str,
) -> Result<WorkflowStatus, WorkflowError> {
    if !status.is_success() {
        let msg = server_message(body).unwrap_or_else(|| format!("HTTP error! status: {status}"));
        return Err(WorkflowError::Transport(msg));
    }

    let parsed: StatusResponse = serde_json::from_str(body.trim()).map_err(|err| {
        WorkflowError::Transport(format!("invalid status response from analysis service: {err}"))
    })?;

    let step_state = parsed
        .step_status
        .iter()
        .filter_map(|(key, value)| {
            Some((
                StepName::from_status_key(key)?,
                StepState::from_wire(value.as_str()?)?,
            ))
        })
        .collect();
    // Floored so a job at 99.6% is not treated as complete.
    let progress_percent = parsed
        .progress_percentage
        .filter(|p| p.is_finite())
        .map(|p| p.floor().clamp(0.0, 100.0) as u8)
        .unwrap_or(0);

    Ok(WorkflowStatus {
        current_step: parsed.current_step.and_then(StepName::from_index),
        raw_step: parsed.current_step,
        step_state,
        progress_percent,
        error: non_empty(parsed.error),
    })
}

pub fn parse_result_response(status: StatusCode, body: &str) -> Result<Value, WorkflowError> {
    if !status.is_success() {
        let detail = server_message(body).unwrap_or_else(|| format!("HTTP {status}"));
        return Err(WorkflowError::ResultUnavailable(format!(
            "{RESULT_FETCH_FAILED_MSG} ({detail})"
        )));
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::ResultUnavailable(RESULT_EMPTY_MSG.to_string()));
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|_| WorkflowError::ResultUnavailable(RESULT_FETCH_FAILED_MSG.to_string()))?;
    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if empty {
        return Err(WorkflowError::ResultUnavailable(RESULT_EMPTY_MSG.to_string()));
    }
    Ok(value)
}

fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    ["error", "message"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Venue;

    fn params() -> JobParams {
        JobParams {
            opponent: " Palmeiras ".to_string(),
            competition: "Brasileirão".to_string(),
            match_date: "2026-11-02T16:00".to_string(),
            venue: Venue::Away,
            special_directives: "Rotated squad".to_string(),
            deep_dive: true,
        }
    }

    #[test]
    fn start_payload_carries_form_fields_and_directives() {
        let payload = build_start_payload(&params(), "Corinthians");
        assert_eq!(
            payload["segmento"],
            "Análise de partida de futebol: Corinthians vs Palmeiras"
        );
        assert_eq!(payload["produto"], "Brasileirão");
        assert_eq!(payload["context"]["venue"], "Fora");
        assert_eq!(payload["context"]["specialDirectives"], "Rotated squad");
        assert_eq!(payload["context"]["deep_dive"], true);
    }

    #[test]
    fn step_indices_map_to_closed_names() {
        assert_eq!(StepName::from_index(0), Some(StepName::Init));
        assert_eq!(StepName::from_index(5), Some(StepName::FinalProtocol));
        assert_eq!(StepName::from_index(6), None);
        assert_eq!(StepName::from_index(-1), None);
    }

    #[test]
    fn server_message_prefers_error_field() {
        let body = r#"{"error":"Segmento é obrigatório","message":"other"}"#;
        assert_eq!(server_message(body).as_deref(), Some("Segmento é obrigatório"));
        assert_eq!(server_message("not json"), None);
        assert_eq!(server_message(r#"{"error":"  "}"#), None);
    }
}
