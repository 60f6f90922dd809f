//! Where resolvers live and how they are addressed.

use std::path::{Path, PathBuf};

use crate::error::ResolverError;
use crate::protocol::{ArgumentEncoding, ProtocolVersion};
use crate::signature::FieldSignature;

/// A resolver executable assigned to a `(type, field)` position, before
/// introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverLocation {
    type_name: String,
    field_name: String,
    executable: PathBuf,
    root: Option<PathBuf>,
    protocol: Option<ProtocolVersion>,
    encoding: Option<ArgumentEncoding>,
}

impl ResolverLocation {
    /// Creates a location for `type_name.field_name`.
    #[must_use]
    pub fn new(
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        executable: impl Into<PathBuf>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
            executable: executable.into(),
            root: None,
            protocol: None,
            encoding: None,
        }
    }

    /// Document root the executable was found under.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Skips protocol probing and uses `protocol` directly.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Overrides the inferred argument encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: ArgumentEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Owning object type.
    #[must_use]
    pub const fn type_name(&self) -> &str {
        self.type_name.as_str()
    }

    /// Field name.
    #[must_use]
    pub const fn field_name(&self) -> &str {
        self.field_name.as_str()
    }

    /// Path to the executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Pinned protocol generation, if any.
    #[must_use]
    pub const fn protocol(&self) -> Option<ProtocolVersion> {
        self.protocol
    }

    /// Pinned argument encoding, if any.
    #[must_use]
    pub const fn encoding(&self) -> Option<ArgumentEncoding> {
        self.encoding
    }

    /// `Type.field`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}.{}", self.type_name, self.field_name)
    }

    /// Executable path relative to its root, or its file name when no root
    /// is known.
    #[must_use]
    pub fn script_name(&self) -> String {
        script_name(&self.executable, self.root.as_deref())
    }

    /// Checks that the location can be introspected.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::MalformedSignature`] when a name is empty or
    /// the executable path is not absolute.
    pub fn validate(&self) -> Result<(), ResolverError> {
        let invalid = |message: &str| ResolverError::MalformedSignature {
            resolver: self.label(),
            message: message.to_owned(),
        };
        if self.type_name.trim().is_empty() {
            return Err(invalid("type name must not be empty"));
        }
        if self.field_name.trim().is_empty() {
            return Err(invalid("field name must not be empty"));
        }
        if !self.executable.is_absolute() {
            return Err(invalid("executable path must be absolute"));
        }
        Ok(())
    }

    /// Binds an introspected signature to this location.
    #[must_use]
    pub fn into_handle(self, signature: FieldSignature) -> ResolverHandle {
        let encoding = self
            .encoding
            .unwrap_or_else(|| ArgumentEncoding::infer(signature.arguments()));
        let script_name = self.script_name();
        ResolverHandle {
            signature,
            executable: self.executable,
            script_name,
            encoding,
        }
    }
}

fn script_name(executable: &Path, root: Option<&Path>) -> String {
    root.and_then(|root| executable.strip_prefix(root).ok())
        .map(Path::to_path_buf)
        .or_else(|| executable.file_name().map(PathBuf::from))
        .unwrap_or_else(|| executable.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// A resolver ready to be invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverHandle {
    signature: FieldSignature,
    executable: PathBuf,
    script_name: String,
    encoding: ArgumentEncoding,
}

impl ResolverHandle {
    /// Introspected signature.
    #[must_use]
    pub const fn signature(&self) -> &FieldSignature {
        &self.signature
    }

    /// Path to the executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Value exported to the resolver as `SCRIPT_NAME`.
    #[must_use]
    pub const fn script_name(&self) -> &str {
        self.script_name.as_str()
    }

    /// How arguments are laid out on the command line.
    #[must_use]
    pub const fn encoding(&self) -> ArgumentEncoding {
        self.encoding
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::signature::SignatureDecl;

    fn signature(declared: &str) -> FieldSignature {
        let decl = SignatureDecl::parse(declared).expect("signature");
        FieldSignature::new("Query", decl.name().to_owned(), decl, ProtocolVersion::Graphqld)
    }

    #[test]
    fn script_name_is_relative_to_root() {
        let location = ResolverLocation::new("Query", "charCount", "/srv/gql/Query/charCount.sh")
            .with_root("/srv/gql");
        assert_eq!(location.script_name(), "Query/charCount.sh");
    }

    #[test]
    fn script_name_falls_back_to_file_name() {
        let location = ResolverLocation::new("Query", "charCount", "/opt/bin/charCount");
        assert_eq!(location.script_name(), "charCount");
    }

    #[rstest]
    #[case::empty_type("", "f", "/bin/f")]
    #[case::empty_field("Query", " ", "/bin/f")]
    #[case::relative("Query", "f", "bin/f")]
    fn validate_rejects_unusable_locations(
        #[case] type_name: &str,
        #[case] field: &str,
        #[case] path: &str,
    ) {
        let err = ResolverLocation::new(type_name, field, path)
            .validate()
            .expect_err("location must be rejected");
        assert!(matches!(err, ResolverError::MalformedSignature { .. }));
    }

    #[rstest]
    #[case::no_args("now: DateTime!", ArgumentEncoding::Flags)]
    #[case::one_arg("charCount(string: String!): Int", ArgumentEncoding::Flags)]
    #[case::two_args("add(a: Int!, b: Int!): Int!", ArgumentEncoding::JsonBlob)]
    fn handle_infers_encoding(#[case] declared: &str, #[case] expected: ArgumentEncoding) {
        let sig = signature(declared);
        let handle = ResolverLocation::new("Query", sig.field_name().to_owned(), "/bin/f")
            .into_handle(sig);
        assert_eq!(handle.encoding(), expected);
    }

    #[test]
    fn pinned_encoding_wins() {
        let sig = signature("add(a: Int!, b: Int!): Int!");
        let handle = ResolverLocation::new("Query", "add", "/bin/add")
            .with_encoding(ArgumentEncoding::Flags)
            .into_handle(sig);
        assert_eq!(handle.encoding(), ArgumentEncoding::Flags);
    }
}
