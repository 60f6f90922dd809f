//! The resolver calling convention.
//!
//! Two generations of the convention exist. They differ only in the flag
//! that switches a resolver into introspection mode, so the generation is a
//! closed [`ProtocolVersion`] enum fixed per resolver when the registry is
//! built.
//!
//! A call is described by a [`ProcessSpec`]: the argument vector, an
//! optional standard input payload (the parent object, as JSON), an optional
//! context payload for file descriptor 3, and environment additions. The
//! codec never touches processes itself; a
//! [`ResolverInvoker`](crate::runner::ResolverInvoker) turns the `ProcessSpec` into a
//! running child.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::context::ContextPayload;

mod decode;
mod encode;
mod introspection;

pub use self::decode::{DecodedResponse, ResponseMetadata, decode_response, split_preamble};
pub use self::encode::{CallInput, encode_call};
pub use self::introspection::{decode_introspection, introspect, introspection_spec};

/// Environment variable holding the resolver path relative to its root.
pub const SCRIPT_NAME_VAR: &str = "SCRIPT_NAME";

/// Environment variable holding the absolute resolver path.
pub const SCRIPT_FILENAME_VAR: &str = "SCRIPT_FILENAME";

/// File descriptor number of the context side channel in the child.
pub const CONTEXT_FD: i32 = 3;

/// Generation of the calling convention a resolver speaks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProtocolVersion {
    /// Current generation, introspected with `--graphqld-fields`.
    Graphqld,
    /// Earlier generation, introspected with `--cggi-fields`.
    Cggi,
}

impl ProtocolVersion {
    /// Generations in probing order.
    pub const ALL: [Self; 2] = [Self::Graphqld, Self::Cggi];

    /// The single argument that switches a resolver into introspection mode.
    #[must_use]
    pub const fn introspection_flag(self) -> &'static str {
        match self {
            Self::Graphqld => "--graphqld-fields",
            Self::Cggi => "--cggi-fields",
        }
    }
}

/// How field arguments are laid out on the resolver's command line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ArgumentEncoding {
    /// One `--name value` pair per declared argument. Scalars are written
    /// literally; input objects and lists are written as JSON.
    Flags,
    /// A single positional argument holding every argument as one JSON
    /// object.
    JsonBlob,
}

impl ArgumentEncoding {
    /// Chooses an encoding from the declared arguments.
    ///
    /// Signatures with zero or one argument use [`Self::Flags`]; with a
    /// single argument there is exactly one way to lay the call out. Wider
    /// signatures are ambiguous (a resolver may expect the pairs in any
    /// order) and use [`Self::JsonBlob`]. Locations may pin an encoding to
    /// bypass this rule.
    #[must_use]
    pub const fn infer(arguments: &[crate::signature::ArgumentDecl]) -> Self {
        if arguments.len() <= 1 {
            Self::Flags
        } else {
            Self::JsonBlob
        }
    }
}

/// Everything needed to start one resolver process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    label: String,
    program: PathBuf,
    args: Vec<String>,
    stdin: Option<Vec<u8>>,
    context: Option<ContextPayload>,
    env: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
}

impl ProcessSpec {
    /// Creates a spec that runs `program` with no arguments.
    #[must_use]
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            context: None,
            env: Vec::new(),
            working_dir: None,
        }
    }

    /// Replaces the argument vector.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Bytes written to the child's standard input before it is closed.
    #[must_use]
    pub fn with_stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    /// Context exposed on file descriptor 3.
    #[must_use]
    pub fn with_context(mut self, context: ContextPayload) -> Self {
        self.context = Some(context);
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Runs the child in `dir`.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Label used in logs and errors (`Type.field` or a path).
    #[must_use]
    pub const fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Executable to run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments after the program name.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Standard input payload.
    #[must_use]
    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Side-channel context payload.
    #[must_use]
    pub const fn context(&self) -> Option<&ContextPayload> {
        self.context.as_ref()
    }

    /// Environment additions.
    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Working directory override.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}
