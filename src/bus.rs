// PromptChain — Message bus (typed request/response between front ends and the engine)

use crate::engine::{Dispatcher, ExecutionRecord};
use crate::workflow::store::WorkflowStore;
use crate::workflow::variables::coerce_values;
use crate::workflow::Workflow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("message bus is closed")]
    Closed,
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    SaveWorkflow {
        workflow: Workflow,
    },
    LoadWorkflows,
    DeleteWorkflow {
        #[serde(rename = "workflowId")]
        workflow_id: String,
    },
    ExecuteWorkflow {
        #[serde(rename = "workflowId")]
        workflow_id: String,
        /// Loosely typed on the wire; coerced to strings before execution.
        #[serde(default)]
        variables: Value,
    },
}

impl Request {
    fn kind(&self) -> &'static str {
        match self {
            Request::SaveWorkflow { .. } => "SAVE_WORKFLOW",
            Request::LoadWorkflows => "LOAD_WORKFLOWS",
            Request::DeleteWorkflow { .. } => "DELETE_WORKFLOW",
            Request::ExecuteWorkflow { .. } => "EXECUTE_WORKFLOW",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Ack(bool),
    Workflows(Vec<Workflow>),
    Execution(ExecutionRecord),
}

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

// ---------------------------------------------------------------------------
// Service side
// ---------------------------------------------------------------------------

/// Owns the store and the dispatcher and answers requests one at a time.
pub struct BusService {
    store: WorkflowStore,
    dispatcher: Dispatcher,
}

impl BusService {
    pub fn new(store: WorkflowStore, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::SaveWorkflow { mut workflow } => {
                workflow.touch();
                Response::Ack(self.store.save(&workflow).await)
            }
            Request::LoadWorkflows => Response::Workflows(self.store.load_all().await),
            Request::DeleteWorkflow { workflow_id } => {
                Response::Ack(self.store.delete(&workflow_id).await)
            }
            Request::ExecuteWorkflow {
                workflow_id,
                variables,
            } => {
                let record = match coerce_values(&variables) {
                    Ok(values) => self.dispatcher.execute(&workflow_id, &values).await,
                    Err(e) => self.dispatcher.reject(&workflow_id, e.into()),
                };
                Response::Execution(record)
            }
        }
    }

    async fn run(self, mut rx: mpsc::Receiver<Envelope>) {
        while let Some(envelope) = rx.recv().await {
            let kind = envelope.request.kind();
            tracing::debug!(message = kind, "Handling request");
            let response = self.handle(envelope.request).await;
            if envelope.reply.send(response).is_err() {
                tracing::warn!(message = kind, "Requester went away before the reply");
            }
        }
        tracing::debug!("Message bus service stopped");
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Cloneable handle for sending requests to a running [`BusService`].
#[derive(Clone)]
pub struct MessageBus {
    tx: mpsc::Sender<Envelope>,
}

impl MessageBus {
    /// Start `service` on its own task. It stops once every handle is dropped.
    pub fn spawn(service: BusService) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(100);
        let handle = tokio::spawn(service.run(rx));
        (Self { tx }, handle)
    }

    pub async fn request(&self, request: Request) -> Result<Response, BusError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| BusError::Closed)?;
        rx.await.map_err(|_| BusError::Closed)
    }

    pub async fn save_workflow(&self, workflow: Workflow) -> Result<bool, BusError> {
        match self.request(Request::SaveWorkflow { workflow }).await? {
            Response::Ack(ok) => Ok(ok),
            _ => Err(BusError::UnexpectedResponse("SAVE_WORKFLOW")),
        }
    }

    pub async fn load_workflows(&self) -> Result<Vec<Workflow>, BusError> {
        match self.request(Request::LoadWorkflows).await? {
            Response::Workflows(list) => Ok(list),
            _ => Err(BusError::UnexpectedResponse("LOAD_WORKFLOWS")),
        }
    }

    pub async fn delete_workflow(&self, workflow_id: &str) -> Result<bool, BusError> {
        let request = Request::DeleteWorkflow {
            workflow_id: workflow_id.to_string(),
        };
        match self.request(request).await? {
            Response::Ack(ok) => Ok(ok),
            _ => Err(BusError::UnexpectedResponse("DELETE_WORKFLOW")),
        }
    }

    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        variables: Value,
    ) -> Result<ExecutionRecord, BusError> {
        let request = Request::ExecuteWorkflow {
            workflow_id: workflow_id.to_string(),
            variables,
        };
        match self.request(request).await? {
            Response::Execution(record) => Ok(record),
            _ => Err(BusError::UnexpectedResponse("EXECUTE_WORKFLOW")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let req: Request = serde_json::from_value(json!({
            "type": "EXECUTE_WORKFLOW",
            "workflowId": "171",
            "variables": {"topic": "rust", "count": 3}
        }))
        .unwrap();
        match req {
            Request::ExecuteWorkflow {
                workflow_id,
                variables,
            } => {
                assert_eq!(workflow_id, "171");
                assert_eq!(variables["count"], 3);
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let load = serde_json::to_value(Request::LoadWorkflows).unwrap();
        assert_eq!(load, json!({"type": "LOAD_WORKFLOWS"}));

        let delete = serde_json::to_value(Request::DeleteWorkflow {
            workflow_id: "9".into(),
        })
        .unwrap();
        assert_eq!(delete, json!({"type": "DELETE_WORKFLOW", "workflowId": "9"}));
    }

    #[test]
    fn test_execute_without_variables_parses() {
        let req: Request =
            serde_json::from_value(json!({"type": "EXECUTE_WORKFLOW", "workflowId": "1"})).unwrap();
        assert!(matches!(req, Request::ExecuteWorkflow { variables: Value::Null, .. }));
    }

    #[test]
    fn test_ack_serializes_as_plain_bool() {
        assert_eq!(serde_json::to_value(Response::Ack(true)).unwrap(), json!(true));
    }
}
