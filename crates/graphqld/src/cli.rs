//! Command-line front end.
//!
//! In `single` mode one request is read as JSON from the configured
//! `selection` file or from standard input, and one response document is
//! written to standard output. In `stream` mode standard input carries one
//! request per line and each gets a response line; the document root is
//! rescanned before a request whenever its contents have changed.
//! Diagnostics go to standard error and the log.

use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::ExitCode;
use std::sync::Arc;

use graphqld_config::{Config, RequestMode};
use graphqld_resolvers::{ErrorKind, InvocationLimits, ProcessInvoker, ResolverInvoker};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::bootstrap::{BootstrapError, ConfigLoader, Server, SystemConfigLoader, bootstrap_with};
use crate::context::{ContextError, ContextProvider, ExecContextProvider, StaticContextProvider};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::response::FieldError;
use crate::selection::{Operation, parse_operation};

const CLI_TARGET: &str = "graphqld::cli";

/// Failures that stop the binary before a response is written.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The selection document could not be read.
    #[error("failed to read selection from {origin}: {source}")]
    ReadSelection {
        /// File path or `stdin`.
        origin: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The selection document was not a selection tree.
    #[error("invalid selection document: {0}")]
    ParseSelection(#[source] serde_json::Error),
    /// The invocation context could not be produced.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// The response could not be written.
    #[error("failed to write response: {0}")]
    Write(#[source] io::Error),
}

/// Runs the binary with the system configuration loader and real processes.
pub fn run<A, R, W, E>(args: A, stdin: &mut R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    A: IntoIterator<Item = OsString>,
    R: Read,
    W: Write,
    E: Write,
{
    CliRunner::new(&SystemConfigLoader, ProcessInvoker::default()).run(args, stdin, stdout, stderr)
}

/// Wires the loader, reporter, and invoker used by one run.
pub struct CliRunner<'l, I> {
    loader: &'l dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    invoker: Arc<I>,
}

impl<'l, I> CliRunner<'l, I>
where
    I: ResolverInvoker + 'static,
{
    /// Runner using `loader` and `invoker` with structured health events.
    #[must_use]
    pub fn new(loader: &'l dyn ConfigLoader, invoker: I) -> Self {
        Self {
            loader,
            reporter: Arc::new(StructuredHealthReporter::new()),
            invoker: Arc::new(invoker),
        }
    }

    /// Replaces the health reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Executes one request, returning the process exit code.
    ///
    /// A response with field errors still exits successfully.
    pub fn run<A, R, W, E>(&self, args: A, stdin: &mut R, stdout: &mut W, stderr: &mut E) -> ExitCode
    where
        A: IntoIterator<Item = OsString>,
        R: Read,
        W: Write,
        E: Write,
    {
        let arguments: Vec<OsString> = args.into_iter().collect();
        match self.execute(&arguments, stdin, stdout) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                if writeln!(stderr, "graphqld: {error}").is_err() {
                    tracing::error!(target: CLI_TARGET, %error, "failed to report error");
                }
                ExitCode::FAILURE
            }
        }
    }

    fn execute<R, W>(&self, args: &[OsString], stdin: &mut R, stdout: &mut W) -> Result<(), CliError>
    where
        R: Read,
        W: Write,
    {
        let server = bootstrap_with(
            self.loader,
            args,
            Arc::clone(&self.reporter),
            Arc::clone(&self.invoker),
        )?;
        if server.config().request_mode() == RequestMode::Stream {
            let provider = self.context_provider(server.config())?;
            return serve_stream(&server, provider.as_ref(), stdin, stdout);
        }

        let operation = read_operation(server.config(), stdin)?;
        let provider = self.context_provider(server.config())?;
        let context = provider.context()?;

        let response = server.execute(&operation, context.as_ref());
        write_line(stdout, &response)
    }

    fn context_provider(&self, config: &Config) -> Result<Box<dyn ContextProvider>, CliError> {
        if let Some(path) = &config.context {
            return Ok(Box::new(StaticContextProvider::from_file(path.as_std_path())?));
        }
        if let Some(program) = &config.context_exec_path {
            let limits = InvocationLimits::new(config.call_timeout(), config.max_payload_bytes());
            return Ok(Box::new(ExecContextProvider::new(
                program.as_std_path(),
                Arc::clone(&self.invoker),
                limits,
            )));
        }
        Ok(Box::new(StaticContextProvider::none()))
    }
}

/// Answers one request per non-blank input line until end of input.
///
/// A line that is not a request gets an error document in its place so
/// responses stay paired with requests.
fn serve_stream<I, R, W>(
    server: &Server<I>,
    provider: &dyn ContextProvider,
    stdin: &mut R,
    stdout: &mut W,
) -> Result<(), CliError>
where
    I: ResolverInvoker,
    R: Read,
    W: Write,
{
    for read in BufReader::new(stdin).lines() {
        let line = read.map_err(|source| CliError::ReadSelection {
            origin: "stdin".to_owned(),
            source,
        })?;
        let body = line.trim();
        if body.is_empty() {
            continue;
        }
        if let Err(error) = server.refresh_if_changed() {
            warn!(
                target: CLI_TARGET,
                %error,
                "document root rescan failed; keeping the current registry"
            );
        }
        match parse_operation(body) {
            Ok(operation) => {
                let context = provider.context()?;
                write_line(stdout, &server.execute(&operation, context.as_ref()))?;
            }
            Err(source) => {
                let error = CliError::ParseSelection(source);
                warn!(target: CLI_TARGET, %error, "rejected request line");
                let rejected =
                    FieldError::new(ErrorKind::InvalidSelection, error.to_string(), Vec::new());
                write_line(stdout, &json!({"data": null, "errors": [rejected]}))?;
            }
        }
    }
    Ok(())
}

fn write_line<W: Write, T: Serialize + ?Sized>(stdout: &mut W, document: &T) -> Result<(), CliError> {
    serde_json::to_writer(&mut *stdout, document).map_err(|err| CliError::Write(err.into()))?;
    stdout
        .write_all(b"\n")
        .and_then(|()| stdout.flush())
        .map_err(CliError::Write)
}

fn read_operation<R: Read>(config: &Config, stdin: &mut R) -> Result<Operation, CliError> {
    let (origin, body) = match &config.selection {
        Some(path) => (path.to_string(), fs::read_to_string(path.as_std_path())),
        None => {
            let mut buffer = String::new();
            let read = stdin.read_to_string(&mut buffer).map(|_| buffer);
            ("stdin".to_owned(), read)
        }
    };
    let text = body.map_err(|source| CliError::ReadSelection { origin, source })?;
    parse_operation(&text).map_err(CliError::ParseSelection)
}
