//! Request context handed to every resolver on file descriptor 3.
//!
//! The context is produced once per request (for example by an
//! authentication step) and shared read-only by every resolver the request
//! invokes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Structured request context.
///
/// Serialises as `{"user": {...}, "loggedIn": bool}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    /// Whether the request carries an authenticated identity.
    #[serde(default)]
    pub logged_in: bool,
    /// Identity attributes, empty for anonymous requests.
    #[serde(default)]
    pub user: Map<String, Value>,
}

impl InvocationContext {
    /// Context for a request without an identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for an authenticated user.
    #[must_use]
    pub const fn authenticated(user: Map<String, Value>) -> Self {
        Self {
            logged_in: true,
            user,
        }
    }

    /// Serialises the context into the bytes a resolver reads.
    #[must_use]
    pub fn to_payload(&self) -> ContextPayload {
        let document = json!({
            "user": self.user,
            "loggedIn": self.logged_in,
        });
        ContextPayload::from(document.to_string().into_bytes())
    }
}

/// Immutable context bytes, cheap to clone across concurrent calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPayload(Arc<[u8]>);

impl ContextPayload {
    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ContextPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&InvocationContext> for ContextPayload {
    fn from(context: &InvocationContext) -> Self {
        context.to_payload()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn anonymous_context_reports_logged_out() {
        let payload = InvocationContext::anonymous().to_payload();
        let parsed: Value = serde_json::from_slice(payload.as_bytes()).expect("json");
        assert_eq!(parsed, json!({"user": {}, "loggedIn": false}));
    }

    #[test]
    fn authenticated_context_round_trips_through_serde() {
        let mut user = Map::new();
        user.insert("name".into(), json!("Ada"));
        let context = InvocationContext::authenticated(user);

        let payload = context.to_payload();
        let parsed: InvocationContext =
            serde_json::from_slice(payload.as_bytes()).expect("context");
        assert_eq!(parsed, context);
        assert!(parsed.logged_in);
    }

    #[test]
    fn payload_clones_share_bytes() {
        let payload = ContextPayload::from(b"{}".to_vec());
        let clone = payload.clone();
        assert_eq!(clone.as_bytes(), b"{}");
        assert_eq!(clone.len(), 2);
        assert!(!clone.is_empty());
    }
}
