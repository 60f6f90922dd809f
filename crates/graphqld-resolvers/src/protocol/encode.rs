//! Builds the process spec for a field call.

use serde_json::{Map, Value};

use super::{ArgumentEncoding, ProcessSpec, SCRIPT_FILENAME_VAR, SCRIPT_NAME_VAR};
use crate::context::ContextPayload;
use crate::location::ResolverHandle;
use crate::signature::FieldSignature;

/// Inputs for a single field call.
#[derive(Debug, Clone, Copy)]
pub struct CallInput<'a> {
    arguments: &'a Map<String, Value>,
    parent: Option<&'a Value>,
    context: Option<&'a ContextPayload>,
}

impl<'a> CallInput<'a> {
    /// Call with the given argument values and no parent or context.
    #[must_use]
    pub const fn new(arguments: &'a Map<String, Value>) -> Self {
        Self {
            arguments,
            parent: None,
            context: None,
        }
    }

    /// The parent object's resolved value, delivered on stdin.
    #[must_use]
    pub const fn with_parent(mut self, parent: &'a Value) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Request context, delivered on file descriptor 3.
    #[must_use]
    pub const fn with_context(mut self, context: &'a ContextPayload) -> Self {
        self.context = Some(context);
        self
    }

    /// Argument values keyed by name.
    #[must_use]
    pub const fn arguments(&self) -> &'a Map<String, Value> {
        self.arguments
    }

    /// Parent value, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<&'a Value> {
        self.parent
    }
}

/// Encodes a call to the resolver behind `handle`.
///
/// Arguments are laid out according to the handle's encoding. Null values
/// are omitted in both encodings so resolvers see absent and null arguments
/// the same way.
#[must_use]
pub fn encode_call(handle: &ResolverHandle, input: &CallInput<'_>) -> ProcessSpec {
    let signature = handle.signature();
    let args = match handle.encoding() {
        ArgumentEncoding::Flags => flag_arguments(signature, input.arguments),
        ArgumentEncoding::JsonBlob => vec![blob_argument(input.arguments)],
    };

    let mut spec = ProcessSpec::new(signature.path(), handle.executable())
        .with_args(args)
        .with_env(SCRIPT_NAME_VAR, handle.script_name())
        .with_env(
            SCRIPT_FILENAME_VAR,
            handle.executable().to_string_lossy().into_owned(),
        );
    if let Some(parent) = input.parent {
        spec = spec.with_stdin(parent.to_string().into_bytes());
    }
    if let Some(context) = input.context {
        spec = spec.with_context(context.clone());
    }
    spec
}

fn flag_arguments(signature: &FieldSignature, values: &Map<String, Value>) -> Vec<String> {
    let mut args = Vec::with_capacity(values.len() * 2);
    for decl in signature.arguments() {
        let Some(value) = values.get(decl.name()) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        args.push(format!("--{}", decl.name()));
        args.push(render_flag_value(value));
    }
    args
}

fn render_flag_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn blob_argument(values: &Map<String, Value>) -> String {
    let present: Map<String, Value> = values
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Value::Object(present).to_string()
}
