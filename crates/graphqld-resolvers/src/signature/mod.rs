//! The field declaration language resolvers print when introspected.
//!
//! A declaration names the field, its arguments, and its return type:
//!
//! ```text
//! charCount(string: String!): CharCountResponse!
//! isEven: Boolean!
//! guestBook(e: Status): [String]
//! ```
//!
//! Types are named types, lists (`[T]`), or non-null wrappers (`T!`).
//! Built-in scalar names are listed in [`ScalarType`]; every other name is
//! a composite type, an enum, or a custom scalar declared in a `.graphql`
//! document (see [`TypeDefinition`]). Default values are not supported.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::protocol::ProtocolVersion;

mod document;

pub use self::document::{EnumDef, InputDef, ObjectDef, TypeDefinition, TypeDefinitions};

/// Deepest list nesting accepted in a type reference.
pub const MAX_TYPE_DEPTH: usize = 32;

/// Built-in scalar types whose resolver output is literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// UTF-8 text.
    String,
    /// Opaque identifier, encoded as text.
    Id,
    /// Signed 64-bit integer.
    Int,
    /// Finite double precision number.
    Float,
    /// `true` or `false` (also `True` / `False`).
    Boolean,
    /// RFC 3339 timestamp, kept as text after validation.
    DateTime,
}

impl ScalarType {
    /// Maps a declared type name to a built-in scalar.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "String" => Some(Self::String),
            "ID" => Some(Self::Id),
            "Int" => Some(Self::Int),
            "Float" => Some(Self::Float),
            "Boolean" => Some(Self::Boolean),
            "DateTime" => Some(Self::DateTime),
            _ => None,
        }
    }

    /// Declared name of the scalar.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Id => "ID",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::DateTime => "DateTime",
        }
    }

    /// Returns `true` for scalars whose value is arbitrary text.
    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(self, Self::String | Self::Id)
    }
}

/// Reference to a declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A scalar or composite type by name.
    Named(String),
    /// A list of the inner type.
    List(Box<TypeRef>),
    /// The inner type, with `null` disallowed.
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// Named type reference.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// List of `inner`.
    #[must_use]
    pub fn list(inner: Self) -> Self {
        Self::List(Box::new(inner))
    }

    /// Non-null `inner`.
    #[must_use]
    pub fn non_null(inner: Self) -> Self {
        Self::NonNull(Box::new(inner))
    }

    /// Returns `true` when the outermost wrapper forbids `null`.
    #[must_use]
    pub const fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// The type with any outer non-null wrapper removed.
    #[must_use]
    pub fn nullable(&self) -> &Self {
        match self {
            Self::NonNull(inner) => inner,
            other => other,
        }
    }

    /// Innermost type name.
    #[must_use]
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named_type(),
        }
    }

    /// Returns `true` when the (nullable) type is a list.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self.nullable(), Self::List(_))
    }

    /// Scalar type when this reference is a bare (non-list) scalar.
    #[must_use]
    pub fn scalar(&self) -> Option<ScalarType> {
        match self.nullable() {
            Self::Named(name) => ScalarType::from_name(name),
            _ => None,
        }
    }

    /// Returns `true` when values of this type have no sub-fields.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        ScalarType::from_name(self.named_type()).is_some()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDecl {
    name: String,
    ty: TypeRef,
}

impl ArgumentDecl {
    /// Creates an argument declaration.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Argument name, used as the flag name in flag encoding.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Declared type.
    #[must_use]
    pub const fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// Returns `true` when the argument must be supplied and non-null.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.ty.is_non_null()
    }
}

/// Errors produced while parsing a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The declaration was blank.
    #[error("signature is empty")]
    Empty,
    /// Input ended while more was expected.
    #[error("expected {expected} at offset {offset}, found end of input")]
    UnexpectedEnd {
        /// What the parser was looking for.
        expected: &'static str,
        /// Byte offset where input ended.
        offset: usize,
    },
    /// An unexpected character was found.
    #[error("expected {expected} at offset {offset}, found '{found}'")]
    Unexpected {
        /// What the parser was looking for.
        expected: &'static str,
        /// The offending character.
        found: char,
        /// Byte offset of the character.
        offset: usize,
    },
    /// List wrappers nest deeper than [`MAX_TYPE_DEPTH`].
    #[error("list types nest deeper than {limit} levels at offset {offset}")]
    TooDeep {
        /// The nesting limit.
        limit: usize,
        /// Byte offset of the first bracket past the limit.
        offset: usize,
    },
    /// The same argument was declared twice.
    #[error("argument '{name}' is declared more than once")]
    DuplicateArgument {
        /// Repeated argument name.
        name: String,
    },
    /// A type, input, or enum lists the same member twice.
    #[error("'{name}' is declared more than once in {owner}")]
    DuplicateMember {
        /// Declaring type.
        owner: String,
        /// Repeated field or value name.
        name: String,
    },
    /// A `.graphql` document uses a definition kind that is not supported.
    #[error("unsupported definition '{keyword}' at offset {offset}")]
    UnsupportedDefinition {
        /// The definition keyword.
        keyword: String,
        /// Byte offset of the keyword.
        offset: usize,
    },
}

/// A parsed declaration, independent of where the resolver lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDecl {
    name: String,
    arguments: Vec<ArgumentDecl>,
    return_type: TypeRef,
    source: String,
}

impl SignatureDecl {
    /// Parses a declaration such as `name(arg: Type!): ReturnType`.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first syntax problem.
    pub fn parse(source: &str) -> Result<Self, SignatureError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(SignatureError::Empty);
        }
        let mut parser = Parser::new(trimmed);
        let name = parser.name("field name")?;
        let arguments = parser.arguments()?;
        parser.expect(':', "':' before the return type")?;
        let return_type = parser.type_ref()?;
        parser.finish()?;
        Ok(Self {
            name,
            arguments,
            return_type,
            source: trimmed.to_owned(),
        })
    }

    /// Declared field name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Declared arguments in declaration order.
    #[must_use]
    pub fn arguments(&self) -> &[ArgumentDecl] {
        &self.arguments
    }

    /// Declared return type.
    #[must_use]
    pub const fn return_type(&self) -> &TypeRef {
        &self.return_type
    }

    /// The declaration text as printed by the resolver (trimmed).
    #[must_use]
    pub const fn source(&self) -> &str {
        self.source.as_str()
    }
}

impl FromStr for SignatureDecl {
    type Err = SignatureError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}

/// A declaration bound to the type and field it resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSignature {
    type_name: String,
    field_name: String,
    decl: SignatureDecl,
    protocol: ProtocolVersion,
}

impl FieldSignature {
    /// Binds a parsed declaration to a (type, field) position.
    #[must_use]
    pub fn new(
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        decl: SignatureDecl,
        protocol: ProtocolVersion,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
            decl,
            protocol,
        }
    }

    /// Owning object type.
    #[must_use]
    pub const fn type_name(&self) -> &str {
        self.type_name.as_str()
    }

    /// Field name the resolver is registered under.
    #[must_use]
    pub const fn field_name(&self) -> &str {
        self.field_name.as_str()
    }

    /// `Type.field`, used to label logs and errors.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}.{}", self.type_name, self.field_name)
    }

    /// Declaration text as printed by the resolver.
    #[must_use]
    pub const fn declared(&self) -> &str {
        self.decl.source()
    }

    /// Parsed declaration.
    #[must_use]
    pub const fn decl(&self) -> &SignatureDecl {
        &self.decl
    }

    /// Declared arguments.
    #[must_use]
    pub fn arguments(&self) -> &[ArgumentDecl] {
        self.decl.arguments()
    }

    /// Looks up a declared argument by name.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&ArgumentDecl> {
        self.decl.arguments().iter().find(|arg| arg.name() == name)
    }

    /// Declared return type.
    #[must_use]
    pub const fn return_type(&self) -> &TypeRef {
        self.decl.return_type()
    }

    /// Protocol generation fixed when the resolver was discovered.
    #[must_use]
    pub const fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }
}

struct Parser<'a> {
    source: &'a str,
    offset: usize,
    /// In `.graphql` documents commas and `#` comments are insignificant.
    document: bool,
}

impl<'a> Parser<'a> {
    const fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            document: false,
        }
    }

    const fn document(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            document: true,
        }
    }

    fn rest(&self) -> &'a str {
        self.source.get(self.offset..).unwrap_or_default()
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.rest().chars().next()
    }

    fn bump(&mut self, ch: char) {
        self.offset += ch.len_utf8();
    }

    fn skip_whitespace(&mut self) {
        loop {
            let rest = self.rest();
            let mut trimmed = rest.trim_start();
            if self.document {
                trimmed = trimmed.trim_start_matches(',');
                if let Some(comment) = trimmed.strip_prefix('#') {
                    trimmed = comment
                        .find('\n')
                        .and_then(|end| comment.get(end..))
                        .unwrap_or_default();
                }
            }
            let skipped = rest.len() - trimmed.len();
            if skipped == 0 {
                return;
            }
            self.offset += skipped;
        }
    }

    fn unexpected(&mut self, expected: &'static str) -> SignatureError {
        match self.peek() {
            Some(found) => SignatureError::Unexpected {
                expected,
                found,
                offset: self.offset,
            },
            None => SignatureError::UnexpectedEnd {
                expected,
                offset: self.offset,
            },
        }
    }

    fn expect(&mut self, wanted: char, expected: &'static str) -> Result<(), SignatureError> {
        match self.peek() {
            Some(ch) if ch == wanted => {
                self.bump(ch);
                Ok(())
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn name(&mut self, expected: &'static str) -> Result<String, SignatureError> {
        match self.peek() {
            Some(ch) if ch == '_' || ch.is_ascii_alphabetic() => {}
            _ => return Err(self.unexpected(expected)),
        }
        let rest = self.rest();
        let length = rest
            .find(|ch: char| ch != '_' && !ch.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        let name = rest.get(..length).unwrap_or_default().to_owned();
        self.offset += length;
        Ok(name)
    }

    fn arguments(&mut self) -> Result<Vec<ArgumentDecl>, SignatureError> {
        let mut arguments: Vec<ArgumentDecl> = Vec::new();
        if self.peek() != Some('(') {
            return Ok(arguments);
        }
        self.bump('(');
        if self.peek() == Some(')') {
            self.bump(')');
            return Ok(arguments);
        }
        loop {
            let name = self.name("argument name")?;
            self.expect(':', "':' after the argument name")?;
            let ty = self.type_ref()?;
            if arguments.iter().any(|arg| arg.name() == name) {
                return Err(SignatureError::DuplicateArgument { name });
            }
            arguments.push(ArgumentDecl::new(name, ty));
            match self.peek() {
                Some(',') => self.bump(','),
                Some(')') => {
                    self.bump(')');
                    return Ok(arguments);
                }
                Some(_) if self.document => {}
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
    }

    fn type_ref(&mut self) -> Result<TypeRef, SignatureError> {
        let mut depth = 0_usize;
        while self.peek() == Some('[') {
            if depth == MAX_TYPE_DEPTH {
                return Err(SignatureError::TooDeep {
                    limit: MAX_TYPE_DEPTH,
                    offset: self.offset,
                });
            }
            self.bump('[');
            depth += 1;
        }
        let base = self.name("type name")?;
        let mut ty = self.non_null_suffix(TypeRef::Named(base));
        for _ in 0..depth {
            self.expect(']', "']' closing the list type")?;
            ty = self.non_null_suffix(TypeRef::list(ty));
        }
        Ok(ty)
    }

    fn non_null_suffix(&mut self, ty: TypeRef) -> TypeRef {
        if self.peek() == Some('!') {
            self.bump('!');
            return TypeRef::non_null(ty);
        }
        ty
    }

    fn finish(&mut self) -> Result<(), SignatureError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("end of signature")),
        }
    }
}
