// PromptChain — Workflow data model and editor operations

pub mod store;
pub mod variables;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// A stored sequence of prompt steps plus the variables they reference.
///
/// Field names serialize in camelCase so definitions exported by the browser
/// extension can be imported as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Execution order is the order of this list.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Kept for compatibility with exported definitions; never interpreted.
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub variable_definitions: Vec<VariableDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Editor layout hint, ignored by the engine.
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
}

/// Only `Prompt` is executed. The other variants are reserved and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Prompt,
    Variable,
    Condition,
    Output,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    /// Default value offered when the workflow is about to run.
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Partial update applied by [`Workflow::update_node`].
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub label: Option<String>,
    pub prompt: Option<String>,
}

/// Partial update applied by [`Workflow::update_variable`].
#[derive(Debug, Clone, Default)]
pub struct VariablePatch {
    pub value: Option<String>,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Node helpers
// ---------------------------------------------------------------------------

impl Node {
    pub fn prompt(
        id: impl Into<String>,
        label: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Prompt,
            position: Position::default(),
            data: NodeData {
                label: label.into(),
                prompt: Some(prompt.into()),
                ..NodeData::default()
            },
        }
    }

    /// The prompt template if this node is something the runner will send.
    pub fn executable_prompt(&self) -> Option<&str> {
        match (self.kind, self.data.prompt.as_deref()) {
            (NodeKind::Prompt, Some(p)) if !p.is_empty() => Some(p),
            _ => None,
        }
    }
}

impl VariableDefinition {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Editor operations
// ---------------------------------------------------------------------------

impl Workflow {
    /// Create an empty workflow with a clock-derived id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis().to_string(),
            name: name.into(),
            description: description.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            variable_definitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append an empty prompt step and return its id.
    pub fn add_prompt_node(&mut self) -> String {
        let base = Utc::now().timestamp_millis().to_string();
        let mut id = base.clone();
        let mut suffix = 1;
        while self.nodes.iter().any(|n| n.id == id) {
            id = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        let index = self.nodes.len();
        let mut node = Node::prompt(id.clone(), format!("Prompt {}", index + 1), "");
        node.position = Position {
            x: 0.0,
            y: index as f64 * 100.0,
        };
        self.nodes.push(node);
        id
    }

    /// Merge `patch` into the node's data. Returns false if no such node exists.
    pub fn update_node(&mut self, node_id: &str, patch: NodePatch) -> bool {
        match self.nodes.iter_mut().find(|n| n.id == node_id) {
            Some(node) => {
                if let Some(label) = patch.label {
                    node.data.label = label;
                }
                if let Some(prompt) = patch.prompt {
                    node.data.prompt = Some(prompt);
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_node(&mut self, node_id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != node_id);
        self.nodes.len() != before
    }

    /// Define a variable with an empty default unless it is already defined.
    /// Surrounding whitespace is dropped; a blank name is refused.
    pub fn add_variable(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.variable(name).is_some() {
            return false;
        }
        self.variable_definitions.push(VariableDefinition::new(name, ""));
        true
    }

    /// Merge `patch` into the named definition. An empty description clears it.
    pub fn update_variable(&mut self, name: &str, patch: VariablePatch) -> bool {
        let Some(def) = self.variable_definitions.iter_mut().find(|v| v.name == name) else {
            return false;
        };
        if let Some(value) = patch.value {
            def.value = value;
        }
        if let Some(description) = patch.description {
            def.description = (!description.is_empty()).then_some(description);
        }
        true
    }

    pub fn remove_variable(&mut self, name: &str) -> bool {
        let before = self.variable_definitions.len();
        self.variable_definitions.retain(|v| v.name != name);
        self.variable_definitions.len() != before
    }

    /// First definition with this name. Names are assumed unique.
    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variable_definitions.iter().find(|v| v.name == name)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Nodes the runner will actually send, in order.
    pub fn prompt_nodes(&self) -> impl Iterator<Item = (&Node, &str)> {
        self.nodes
            .iter()
            .filter_map(|n| n.executable_prompt().map(|p| (n, p)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
