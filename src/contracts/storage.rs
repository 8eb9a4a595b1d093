//! Run lifecycle storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::RunStatus;

/// Outcome of one recorded agent step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
}

/// Payload for starting a persistent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRun {
    pub agent_id: String,
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancestor_run_ids: Vec<String>,
}

/// One agent step as recorded after each executed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: String,
    pub step_number: u32,
    /// Credits spent during this step (direct plus children spawned in it).
    pub credits: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_run_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub status: StepStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Payload for finalizing a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishRun {
    pub run_id: String,
    pub status: RunStatus,
    pub total_steps: u32,
    pub direct_credits: f64,
    pub total_credits: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Durable storage for runs and steps, supplied by the host.
#[async_trait]
pub trait RunStorage: Send + Sync {
    /// Start a run and return its id.
    async fn start_run(&self, request: StartRun) -> Result<String>;

    async fn add_step(&self, record: StepRecord) -> Result<()>;

    async fn finish_run(&self, request: FinishRun) -> Result<()>;
}
