//! Asks a resolver to describe its own field.

use tracing::debug;

use super::{ProcessSpec, ProtocolVersion, SCRIPT_FILENAME_VAR, SCRIPT_NAME_VAR};
use crate::error::ResolverError;
use crate::location::ResolverLocation;
use crate::runner::{InvocationLimits, ResolverInvoker};
use crate::signature::{FieldSignature, SignatureDecl};

/// Tracing target for introspection.
const PROTOCOL_TARGET: &str = "graphqld_resolvers::protocol";

/// Spec for running `location` in introspection mode for `version`.
#[must_use]
pub fn introspection_spec(location: &ResolverLocation, version: ProtocolVersion) -> ProcessSpec {
    ProcessSpec::new(location.label(), location.executable())
        .with_args(vec![version.introspection_flag().to_owned()])
        .with_env(SCRIPT_NAME_VAR, location.script_name())
        .with_env(
            SCRIPT_FILENAME_VAR,
            location.executable().to_string_lossy().into_owned(),
        )
}

/// Parses introspection output.
///
/// The output must be a single line holding a JSON array with exactly one
/// signature string.
///
/// # Errors
///
/// Returns [`ResolverError::MalformedSignature`] when the output does not
/// have that shape or the signature does not parse.
pub fn decode_introspection(resolver: &str, output: &[u8]) -> Result<SignatureDecl, ResolverError> {
    let malformed = |message: String| ResolverError::MalformedSignature {
        resolver: resolver.to_owned(),
        message,
    };

    let text = std::str::from_utf8(output)
        .map_err(|_| malformed("introspection output is not valid UTF-8".to_owned()))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(malformed("introspection produced no output".to_owned()));
    }
    if trimmed.lines().count() != 1 {
        return Err(malformed(
            "introspection output must be a single line".to_owned(),
        ));
    }
    let entries: Vec<String> = serde_json::from_str(trimmed)
        .map_err(|err| malformed(format!("expected a JSON array of strings: {err}")))?;
    let [entry] = entries.as_slice() else {
        return Err(malformed(format!(
            "expected exactly one signature, found {}",
            entries.len()
        )));
    };
    SignatureDecl::parse(entry).map_err(|err| malformed(format!("{entry:?}: {err}")))
}

/// Introspects `location`, probing protocol generations in order.
///
/// A location with a pinned protocol is only asked once. Otherwise each
/// generation in [`ProtocolVersion::ALL`] is tried and the first valid
/// answer fixes the resolver's generation.
///
/// # Errors
///
/// Returns [`ResolverError::MalformedSignature`] when no generation yields a
/// valid signature. Spawn failures, timeouts and non-zero exits during
/// introspection are folded into that error.
pub fn introspect<I>(
    invoker: &I,
    location: &ResolverLocation,
    limits: &InvocationLimits,
) -> Result<FieldSignature, ResolverError>
where
    I: ResolverInvoker + ?Sized,
{
    let versions: Vec<ProtocolVersion> = location
        .protocol()
        .map_or_else(|| ProtocolVersion::ALL.to_vec(), |version| vec![version]);

    let mut failures = Vec::with_capacity(versions.len());
    for version in versions {
        let spec = introspection_spec(location, version);
        let attempt = invoker
            .invoke(&spec, limits)
            .and_then(|output| decode_introspection(&location.label(), &output.stdout));
        match attempt {
            Ok(decl) => {
                debug!(
                    target: PROTOCOL_TARGET,
                    resolver = %location.label(),
                    protocol = %version,
                    signature = decl.source(),
                    "introspection succeeded"
                );
                return Ok(FieldSignature::new(
                    location.type_name(),
                    location.field_name(),
                    decl,
                    version,
                ));
            }
            Err(err) => {
                debug!(
                    target: PROTOCOL_TARGET,
                    resolver = %location.label(),
                    protocol = %version,
                    error = %err,
                    "introspection attempt failed"
                );
                failures.push(format!("{version}: {}", err.detail()));
            }
        }
    }

    Err(ResolverError::MalformedSignature {
        resolver: location.label(),
        message: failures.join("; "),
    })
}
