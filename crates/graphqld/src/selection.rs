//! The selection tree a request asks to resolve.
//!
//! Query text is parsed elsewhere; the server receives the parsed tree as
//! JSON. A request body is either a single node or an array of root nodes,
//! which is a query:
//!
//! ```json
//! [{"name": "charCount", "arguments": {"string": "hi"},
//!   "selections": [{"name": "string"}, {"name": "count"}]}]
//! ```
//!
//! or an envelope naming the operation:
//!
//! ```json
//! {"operation": "mutation", "selections": [{"name": "signGuestBook"}]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;

/// Which root an operation's top-level selections belong to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OperationKind {
    /// Read-only; top-level fields run concurrently.
    #[default]
    Query,
    /// Side-effecting; top-level fields run one after another.
    Mutation,
}

/// One selected field and its sub-selections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionNode {
    /// Field name.
    pub name: String,
    /// Response key override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Argument values keyed by argument name.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
    /// Child selections in request order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<SelectionNode>,
}

impl SelectionNode {
    /// A bare field selection.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the response alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds an argument value.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Appends a child selection.
    #[must_use]
    pub fn with_selection(mut self, child: Self) -> Self {
        self.selections.push(child);
        self
    }

    /// Key under which the field appears in the response.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether the field has sub-selections.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        !self.selections.is_empty()
    }
}

/// Root selections: one node or several.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SelectionSet {
    /// Several root selections.
    Many(Vec<SelectionNode>),
    /// A single root selection.
    One(SelectionNode),
}

impl SelectionSet {
    /// Root selections in request order.
    #[must_use]
    pub fn into_nodes(self) -> Vec<SelectionNode> {
        match self {
            Self::Many(nodes) => nodes,
            Self::One(node) => vec![node],
        }
    }
}

/// One request: an operation kind and its root selections.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Query or mutation.
    pub kind: OperationKind,
    /// Root selections in request order.
    pub selections: Vec<SelectionNode>,
}

impl Operation {
    /// A query over `selections`.
    #[must_use]
    pub const fn query(selections: Vec<SelectionNode>) -> Self {
        Self {
            kind: OperationKind::Query,
            selections,
        }
    }

    /// A mutation over `selections`.
    #[must_use]
    pub const fn mutation(selections: Vec<SelectionNode>) -> Self {
        Self {
            kind: OperationKind::Mutation,
            selections,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    #[serde(default)]
    operation: OperationKind,
    selections: SelectionSet,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RequestBody {
    Envelope(Envelope),
    Bare(SelectionSet),
}

/// Parses a request body.
///
/// # Errors
///
/// Returns the `serde_json` error when the body is neither an operation
/// envelope, a selection node, nor an array of them.
pub fn parse_operation(body: &str) -> Result<Operation, serde_json::Error> {
    serde_json::from_str::<RequestBody>(body).map(|parsed| match parsed {
        RequestBody::Envelope(envelope) => Operation {
            kind: envelope.operation,
            selections: envelope.selections.into_nodes(),
        },
        RequestBody::Bare(set) => Operation::query(set.into_nodes()),
    })
}
