//! Walks a selection tree, running resolvers concurrently.
//!
//! Each field moves through [`FieldPhase::Planned`] and
//! [`FieldPhase::Dispatched`] to one of the terminal phases. Planning
//! happens before any process exists, so an unknown field, bad arguments,
//! or a selection on a scalar never spawn anything. Siblings run on scoped
//! threads; their results are placed by selection position. A field's
//! children are planned only once its own value is known, and a failed
//! field has no children at all.
//!
//! Every call is bounded by the per-call timeout and by whatever is left of
//! the request deadline, whichever is shorter. A bounded
//! [`InvocationPool`] caps how many resolver processes run at once, and no
//! fan-out starts more worker threads than that cap.
//!
//! Top-level fields of a mutation run one after another in selection order;
//! everything below them resolves as it would in a query.

mod merge;
mod plan;
mod pool;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use graphqld_config::Config;
use graphqld_resolvers::{
    CallInput, ContextPayload, DecodedResponse, ErrorKind, InvocationContext, InvocationLimits,
    ResolverError, ResolverHandle, ResolverInvoker, ResolverRegistry, ResponseMetadata,
    decode_response, encode_call,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use self::merge::{Slot, merge_fields};
use self::plan::{Parent, Plan};
pub use self::pool::{InvocationPool, PoolPermit};
use crate::response::{
    FieldError, FieldPhase, Gap, PathSegment, Response, ResponseAssembler, ResponseField,
    ResponseValue,
};
use crate::selection::{Operation, OperationKind, SelectionNode};
use crate::shared_registry::SharedRegistry;

/// Tracing target for dispatch events.
pub const DISPATCH_TARGET: &str = "graphqld::dispatch";

/// How long sibling assembly waits past the request deadline for calls
/// that are already being killed.
const ASSEMBLY_GRACE: Duration = Duration::from_millis(250);

/// Limits and defaults applied to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Object type of root query selections.
    pub root_type: String,
    /// Object type of root mutation selections.
    pub mutation_type: String,
    /// Budget for one resolver call.
    pub call_timeout: Duration,
    /// Budget for a whole request.
    pub request_timeout: Duration,
    /// Maximum resolver processes running at once.
    pub max_concurrent: usize,
    /// Largest accepted resolver output in bytes.
    pub max_payload_bytes: usize,
    /// Working directory for every resolver.
    pub working_dir: Option<PathBuf>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            root_type: "Query".to_owned(),
            mutation_type: "Mutation".to_owned(),
            call_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            max_concurrent: 16,
            max_payload_bytes: 1024 * 1024,
            working_dir: None,
        }
    }
}

impl DispatchSettings {
    /// Settings taken from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            root_type: config.root_type().to_owned(),
            mutation_type: config.mutation_type().to_owned(),
            call_timeout: config.call_timeout(),
            request_timeout: config.request_timeout(),
            max_concurrent: config.max_concurrent_resolvers(),
            max_payload_bytes: config.max_payload_bytes(),
            working_dir: config.working_dir().map(|dir| dir.as_std_path().to_path_buf()),
        }
    }

    /// Limits for one resolver call, before the request deadline applies.
    #[must_use]
    pub const fn call_limits(&self) -> InvocationLimits {
        InvocationLimits::new(self.call_timeout, self.max_payload_bytes)
    }
}

/// Resolves selection trees against a registry of resolver executables.
#[derive(Debug)]
pub struct DispatchEngine<I> {
    registry: SharedRegistry,
    invoker: I,
    settings: DispatchSettings,
    pool: InvocationPool,
}

impl<I: ResolverInvoker> DispatchEngine<I> {
    /// Creates an engine running resolvers through `invoker`.
    #[must_use]
    pub fn new(registry: SharedRegistry, invoker: I, settings: DispatchSettings) -> Self {
        let pool = InvocationPool::new(settings.max_concurrent);
        Self {
            registry,
            invoker,
            settings,
            pool,
        }
    }

    /// Registry handle shared with whoever refreshes it.
    #[must_use]
    pub const fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// The invoker every resolver call goes through.
    #[must_use]
    pub const fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// The process admission pool.
    #[must_use]
    pub const fn pool(&self) -> &InvocationPool {
        &self.pool
    }

    /// Resolves `selections` as a query on the root type.
    ///
    /// The returned response always has one entry per response key;
    /// failures are recorded per field.
    #[must_use]
    pub fn execute(
        &self,
        selections: &[SelectionNode],
        context: Option<&InvocationContext>,
    ) -> Response {
        self.run(OperationKind::Query, selections, context)
    }

    /// Resolves an operation against the root type its kind selects.
    #[must_use]
    pub fn execute_operation(
        &self,
        operation: &Operation,
        context: Option<&InvocationContext>,
    ) -> Response {
        self.run(operation.kind, &operation.selections, context)
    }

    fn run(
        &self,
        kind: OperationKind,
        selections: &[SelectionNode],
        context: Option<&InvocationContext>,
    ) -> Response {
        let started = Instant::now();
        let request = Request {
            registry: self.registry.snapshot(),
            invoker: &self.invoker,
            pool: &self.pool,
            settings: &self.settings,
            context: context.map(ContextPayload::from),
            deadline: started + self.settings.request_timeout,
        };

        let fields = match kind {
            OperationKind::Query => {
                request.resolve_set(selections, Parent::root(&self.settings.root_type), &[])
            }
            OperationKind::Mutation => request.resolve_serially(
                selections,
                Parent::root(&self.settings.mutation_type),
            ),
        };
        let response = Response::new(fields);
        info!(
            target: DISPATCH_TARGET,
            operation = %kind,
            fields = selections.len(),
            errors = response.errors().len(),
            elapsed_ms = elapsed_ms(started),
            "request resolved"
        );
        response
    }
}

/// State shared by every task of one request.
struct Request<'e, I: ?Sized> {
    registry: Arc<ResolverRegistry>,
    invoker: &'e I,
    pool: &'e InvocationPool,
    settings: &'e DispatchSettings,
    context: Option<ContextPayload>,
    deadline: Instant,
}

impl<I: ResolverInvoker + ?Sized> Request<'_, I> {
    fn resolve_set(
        &self,
        nodes: &[SelectionNode],
        parent: Parent<'_>,
        path: &[PathSegment],
    ) -> Vec<ResponseField> {
        let slots = merge_fields(nodes);
        self.fan_out(
            &slots,
            |_, slot| self.resolve_slot(slot, parent, path),
            |index, gap| {
                let key = slots.get(index).map_or("", Slot::response_key);
                let field_path = child_path(path, PathSegment::Key(key.to_owned()));
                ResponseField::failed(key, gap_error(gap, field_path))
            },
        )
    }

    /// Resolves root fields one at a time, in selection order.
    fn resolve_serially(&self, nodes: &[SelectionNode], parent: Parent<'_>) -> Vec<ResponseField> {
        merge_fields(nodes)
            .iter()
            .map(|slot| self.resolve_slot(slot, parent, &[]))
            .collect()
    }

    fn resolve_slot(&self, slot: &Slot<'_>, parent: Parent<'_>, path: &[PathSegment]) -> ResponseField {
        match slot {
            Slot::Field(node) => self.resolve_field(node, parent, path),
            Slot::Conflict { key, message } => {
                let field_path = child_path(path, PathSegment::Key((*key).to_owned()));
                let error = ResolverError::InvalidSelection {
                    field: render_path(&field_path),
                    message: message.clone(),
                };
                ResponseField::failed(*key, FieldError::from_resolver(&error, field_path))
            }
        }
    }

    fn resolve_field(
        &self,
        node: &SelectionNode,
        parent: Parent<'_>,
        path: &[PathSegment],
    ) -> ResponseField {
        let started = Instant::now();
        let key = node.response_key();
        let field_path = child_path(path, PathSegment::Key(key.to_owned()));

        let planned = plan::plan(&self.registry, parent, node);
        debug!(
            target: DISPATCH_TARGET,
            path = %render_path(&field_path),
            parent_type = parent.type_name.unwrap_or_default(),
            phase = %FieldPhase::Planned,
            resolver = matches!(planned, Ok(Plan::Invoke(_))),
            "field planned"
        );

        let field = match planned {
            Ok(Plan::Project { value, type_name }) => self.complete(
                node,
                key,
                value,
                type_name,
                &field_path,
                ResponseMetadata::default(),
            ),
            Ok(Plan::Invoke(handle)) => match self.invoke(handle, node, parent, &field_path) {
                Ok(DecodedResponse { value, metadata }) => {
                    let child_type = handle.signature().return_type().named_type();
                    self.complete(node, key, &value, Some(child_type), &field_path, metadata)
                }
                Err(error) => {
                    ResponseField::failed(key, FieldError::from_resolver(&error, field_path.clone()))
                }
            },
            Err(error) => {
                ResponseField::failed(key, FieldError::from_resolver(&error, field_path.clone()))
            }
        };

        debug!(
            target: DISPATCH_TARGET,
            path = %render_path(&field_path),
            phase = %field.phase,
            elapsed_ms = elapsed_ms(started),
            "field finished"
        );
        field
    }

    fn invoke(
        &self,
        handle: &ResolverHandle,
        node: &SelectionNode,
        parent: Parent<'_>,
        path: &[PathSegment],
    ) -> Result<DecodedResponse, ResolverError> {
        let signature = handle.signature();
        let expired = || ResolverError::Timeout {
            resolver: signature.path(),
            timeout_ms: millis(self.settings.request_timeout),
        };

        let Some(permit) = self.pool.acquire_until(self.deadline) else {
            return Err(expired());
        };
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(expired());
        }
        let limits = self.settings.call_limits().capped(remaining);

        let mut input = CallInput::new(&node.arguments);
        if let Some(value) = parent.value {
            input = input.with_parent(value);
        }
        if let Some(context) = &self.context {
            input = input.with_context(context);
        }
        let mut spec = encode_call(handle, &input);
        if let Some(dir) = &self.settings.working_dir {
            spec = spec.with_working_dir(dir);
        }

        debug!(
            target: DISPATCH_TARGET,
            path = %render_path(path),
            resolver = %handle.executable().display(),
            phase = %FieldPhase::Dispatched,
            timeout_ms = limits.timeout_ms(),
            "resolver dispatched"
        );
        let outcome = self.invoker.invoke(&spec, &limits);
        drop(permit);

        decode_response(&outcome?.stdout, signature)
    }

    fn complete(
        &self,
        node: &SelectionNode,
        key: &str,
        value: &Value,
        child_type: Option<&str>,
        path: &[PathSegment],
        metadata: ResponseMetadata,
    ) -> ResponseField {
        if !node.is_composite() {
            let leaf = if value.is_null() {
                ResponseValue::Null
            } else {
                ResponseValue::Leaf(value.clone())
            };
            return ResponseField::completed(key, leaf).with_metadata(metadata);
        }

        if !has_fields(value) {
            let error = ResolverError::InvalidSelection {
                field: render_path(path),
                message: "value has no fields to select".to_owned(),
            };
            return ResponseField::failed(key, FieldError::from_resolver(&error, path.to_vec()))
                .with_metadata(metadata);
        }

        let completed = self.complete_value(&node.selections, value, child_type, path);
        ResponseField::completed(key, completed).with_metadata(metadata)
    }

    fn complete_value(
        &self,
        selections: &[SelectionNode],
        value: &Value,
        child_type: Option<&str>,
        path: &[PathSegment],
    ) -> ResponseValue {
        match value {
            Value::Object(_) => ResponseValue::Object(self.resolve_set(
                selections,
                Parent::object(child_type, value),
                path,
            )),
            Value::Array(items) => ResponseValue::List(self.fan_out(
                items,
                |index, item| {
                    self.complete_value(
                        selections,
                        item,
                        child_type,
                        &child_path(path, PathSegment::Index(index)),
                    )
                },
                |index, gap| {
                    warn!(
                        target: DISPATCH_TARGET,
                        path = %render_path(path),
                        index,
                        ?gap,
                        "list element never completed"
                    );
                    ResponseValue::Null
                },
            )),
            _ => ResponseValue::Null,
        }
    }

    /// Runs `task` for every item and returns the results in item order.
    ///
    /// Items are pulled from a shared cursor by at most `max_concurrent`
    /// scoped workers; a single item runs on the calling thread.
    fn fan_out<S, T, F, G>(&self, items: &[S], task: F, fill: G) -> Vec<T>
    where
        S: Sync,
        T: Send,
        F: Fn(usize, &S) -> T + Sync,
        G: FnMut(usize, Gap) -> T,
    {
        if items.len() <= 1 {
            return items
                .iter()
                .enumerate()
                .map(|(index, item)| task(index, item))
                .collect();
        }

        let workers = items.len().min(self.settings.max_concurrent.max(1));
        let cursor = AtomicUsize::new(0);
        let mut assembler = ResponseAssembler::new(items.len());
        let (sender, receiver) = mpsc::channel();
        thread::scope(|scope| {
            let run = &task;
            let cursor = &cursor;
            let drain = move |results: Sender<(usize, T)>| loop {
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(item) = items.get(index) else {
                    break;
                };
                if results.send((index, run(index, item))).is_err() {
                    debug!(
                        target: DISPATCH_TARGET,
                        index,
                        "result arrived after assembly closed"
                    );
                    break;
                }
            };

            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let results = sender.clone();
                match thread::Builder::new().spawn_scoped(scope, move || drain(results)) {
                    Ok(handle) => handles.push(handle),
                    Err(error) => {
                        warn!(
                            target: DISPATCH_TARGET,
                            %error,
                            started = handles.len(),
                            "could not start fan-out worker"
                        );
                        break;
                    }
                }
            }
            if handles.is_empty() {
                drain(sender);
            } else {
                drop(sender);
            }

            assembler.collect(&receiver, self.deadline + ASSEMBLY_GRACE);
            for handle in handles {
                if handle.join().is_err() {
                    warn!(target: DISPATCH_TARGET, "resolver task panicked");
                }
            }
        });
        assembler.finish(fill)
    }
}

/// Whether sub-selections can apply to `value`.
///
/// Lists qualify when every element, however deeply nested, is an object
/// or `null`.
fn has_fields(value: &Value) -> bool {
    match value {
        Value::Object(_) | Value::Null => true,
        Value::Array(items) => items.iter().all(has_fields),
        _ => false,
    }
}

fn gap_error(gap: Gap, path: Vec<PathSegment>) -> FieldError {
    match gap {
        Gap::Expired => FieldError::new(ErrorKind::Timeout, "request deadline exceeded", path),
        Gap::Abandoned => FieldError::new(ErrorKind::ResolverFailed, "resolver task panicked", path),
    }
}

fn child_path(path: &[PathSegment], segment: PathSegment) -> Vec<PathSegment> {
    let mut extended = Vec::with_capacity(path.len() + 1);
    extended.extend_from_slice(path);
    extended.push(segment);
    extended
}

fn render_path(path: &[PathSegment]) -> String {
    let mut rendered = String::new();
    for segment in path {
        match segment {
            PathSegment::Key(key) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(key);
            }
            PathSegment::Index(index) => {
                rendered.push('[');
                rendered.push_str(&index.to_string());
                rendered.push(']');
            }
        }
    }
    rendered
}

fn elapsed_ms(started: Instant) -> u64 {
    millis(started.elapsed())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
