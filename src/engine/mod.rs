// PromptChain — Workflow execution engine

pub mod completion;
pub mod dispatcher;
pub mod runner;

use crate::workflow::variables::VariableError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use completion::{Completion, CompletionDetector};
pub use dispatcher::Dispatcher;
pub use runner::{RunOutcome, StepRunner};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),
    #[error("no target tab found")]
    NoTargetPage,
    #[error("invalid variables: {0}")]
    Variables(#[from] VariableError),
    #[error("no reply completed for step '{node_id}' within {waited:?}")]
    CompletionTimeout { node_id: String, waited: Duration },
    #[error("target surface error: {0:#}")]
    Surface(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Surface(e)
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Delays used while driving a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Pause between inserting text and pressing Enter.
    pub settle_delay: Duration,
    /// Wait before the first completion poll.
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    /// `None` waits forever.
    pub max_wait: Option<Duration>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            initial_delay: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(2000),
            max_wait: Some(Duration::from_secs(600)),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Outcome of one workflow run, returned to whoever asked for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    /// Reserved; always empty.
    #[serde(default)]
    pub results: BTreeMap<String, Value>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            results: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        if self.status == ExecutionStatus::Pending {
            self.status = ExecutionStatus::Running;
        }
    }

    pub fn mark_completed(&mut self) {
        if !self.status.is_terminal() {
            self.status = ExecutionStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Terminal failure. An empty message is replaced with a generic one.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        let message = message.into();
        self.status = ExecutionStatus::Failed;
        self.error = Some(if message.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            message
        });
        self.completed_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
