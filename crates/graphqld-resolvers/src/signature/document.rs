//! Type declarations read from `.graphql` documents in the document root.
//!
//! Resolvers declare their own fields; a document declares the types those
//! fields mention, so that arguments can be checked before any process is
//! spawned and payload properties can be typed:
//!
//! ```graphql
//! # Guest book entry state.
//! enum Status { DRAFT PUBLISHED }
//!
//! input PythonInput {
//!   Name: String!
//!   tags: [String]
//! }
//!
//! "The result of counting characters."
//! type CharCountResponse {
//!   string: String!
//!   count: Int!
//! }
//!
//! scalar Upload
//! ```
//!
//! Commas and `#` comments are insignificant and descriptions are skipped.
//! Interfaces, unions, directives, and default values are not supported.

use std::collections::BTreeMap;

use super::{ArgumentDecl, Parser, SignatureDecl, SignatureError, TypeRef};

/// An object type and its declared fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDef {
    name: String,
    fields: Vec<SignatureDecl>,
}

impl ObjectDef {
    /// Type name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[SignatureDecl] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&SignatureDecl> {
        self.fields.iter().find(|field| field.name() == name)
    }
}

/// An input object type accepted as an argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDef {
    name: String,
    fields: Vec<ArgumentDecl>,
}

impl InputDef {
    /// Type name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Input fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[ArgumentDecl] {
        &self.fields
    }

    /// Looks up an input field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&ArgumentDecl> {
        self.fields.iter().find(|field| field.name() == name)
    }
}

/// An enum type; values travel as their names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    name: String,
    values: Vec<String>,
}

impl EnumDef {
    /// Type name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Values in declaration order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Whether `value` is one of the declared values.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|declared| declared == value)
    }
}

/// One definition from a `.graphql` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDefinition {
    /// `type Name { ... }`
    Object(ObjectDef),
    /// `input Name { ... }`
    Input(InputDef),
    /// `enum Name { ... }`
    Enum(EnumDef),
    /// `scalar Name`; values are passed through unchecked.
    Scalar(String),
}

impl TypeDefinition {
    /// Parses every definition in a document.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first problem.
    pub fn parse_document(source: &str) -> Result<Vec<Self>, SignatureError> {
        let mut parser = Parser::document(source);
        let mut definitions = Vec::new();
        loop {
            parser.skip_description()?;
            if parser.peek().is_none() {
                return Ok(definitions);
            }
            let offset = parser.offset;
            let keyword = parser.name("definition keyword")?;
            let definition = match keyword.as_str() {
                "type" => Self::Object(parser.object_def()?),
                "input" => Self::Input(parser.input_def()?),
                "enum" => Self::Enum(parser.enum_def()?),
                "scalar" => Self::Scalar(parser.name("scalar name")?),
                _ => return Err(SignatureError::UnsupportedDefinition { keyword, offset }),
            };
            definitions.push(definition);
        }
    }

    /// Declared type name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Object(def) => def.name(),
            Self::Input(def) => def.name(),
            Self::Enum(def) => def.name(),
            Self::Scalar(name) => name,
        }
    }

    /// Definition keyword.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Object(_) => "type",
            Self::Input(_) => "input",
            Self::Enum(_) => "enum",
            Self::Scalar(_) => "scalar",
        }
    }
}

/// Declared types keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDefinitions {
    types: BTreeMap<String, TypeDefinition>,
}

impl TypeDefinitions {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, returning the one it replaces.
    pub fn insert(&mut self, definition: TypeDefinition) -> Option<TypeDefinition> {
        self.types
            .insert(definition.name().to_owned(), definition)
    }

    /// Looks up a type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Looks up an object type by name.
    #[must_use]
    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        match self.types.get(name) {
            Some(TypeDefinition::Object(def)) => Some(def),
            _ => None,
        }
    }

    /// Whether values of `ty` have no sub-fields: built-in scalars, enums,
    /// and declared scalars.
    #[must_use]
    pub fn is_leaf(&self, ty: &TypeRef) -> bool {
        ty.is_leaf()
            || matches!(
                self.types.get(ty.named_type()),
                Some(TypeDefinition::Enum(_) | TypeDefinition::Scalar(_))
            )
    }

    /// Definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    /// Number of declared types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Parser<'_> {
    fn eat(&mut self, wanted: char) -> bool {
        if self.peek() == Some(wanted) {
            self.bump(wanted);
            return true;
        }
        false
    }

    /// Skips a `"..."` or `"""..."""` description, if one comes next.
    fn skip_description(&mut self) -> Result<(), SignatureError> {
        if self.peek() != Some('"') {
            return Ok(());
        }
        let rest = self.rest();
        let (delimiter, expected) = if rest.starts_with("\"\"\"") {
            ("\"\"\"", "'\"\"\"' closing the description")
        } else {
            ("\"", "'\"' closing the description")
        };
        let body = rest.get(delimiter.len()..).unwrap_or_default();
        let Some(end) = closing(body, delimiter) else {
            self.offset = self.source.len();
            return Err(SignatureError::UnexpectedEnd {
                expected,
                offset: self.offset,
            });
        };
        self.offset += delimiter.len() + end + delimiter.len();
        Ok(())
    }

    /// Consumes `implements A & B` ahead of an object body.
    fn implements(&mut self) -> Result<(), SignatureError> {
        const KEYWORD: &str = "implements";
        self.skip_whitespace();
        let Some(after) = self.rest().strip_prefix(KEYWORD) else {
            return Ok(());
        };
        if after.starts_with(|ch: char| ch == '_' || ch.is_ascii_alphanumeric()) {
            return Ok(());
        }
        self.offset += KEYWORD.len();
        loop {
            self.eat('&');
            self.name("interface name")?;
            if self.peek() == Some('{') {
                return Ok(());
            }
        }
    }

    fn object_def(&mut self) -> Result<ObjectDef, SignatureError> {
        let name = self.name("type name")?;
        self.implements()?;
        self.expect('{', "'{' opening the field list")?;
        let mut fields: Vec<SignatureDecl> = Vec::new();
        loop {
            self.skip_description()?;
            if self.eat('}') {
                return Ok(ObjectDef { name, fields });
            }
            let start = self.offset;
            let field = self.name("field name")?;
            let arguments = self.arguments()?;
            self.expect(':', "':' before the field type")?;
            let return_type = self.type_ref()?;
            if fields.iter().any(|existing| existing.name() == field) {
                return Err(duplicate(&name, field));
            }
            let source = self
                .source
                .get(start..self.offset)
                .unwrap_or_default()
                .trim()
                .to_owned();
            fields.push(SignatureDecl {
                name: field,
                arguments,
                return_type,
                source,
            });
        }
    }

    fn input_def(&mut self) -> Result<InputDef, SignatureError> {
        let name = self.name("input name")?;
        self.expect('{', "'{' opening the input fields")?;
        let mut fields: Vec<ArgumentDecl> = Vec::new();
        loop {
            self.skip_description()?;
            if self.eat('}') {
                return Ok(InputDef { name, fields });
            }
            let field = self.name("input field name")?;
            self.expect(':', "':' after the input field name")?;
            let ty = self.type_ref()?;
            if fields.iter().any(|existing| existing.name() == field) {
                return Err(duplicate(&name, field));
            }
            fields.push(ArgumentDecl::new(field, ty));
        }
    }

    fn enum_def(&mut self) -> Result<EnumDef, SignatureError> {
        let name = self.name("enum name")?;
        self.expect('{', "'{' opening the enum values")?;
        let mut values: Vec<String> = Vec::new();
        loop {
            self.skip_description()?;
            if self.eat('}') {
                return Ok(EnumDef { name, values });
            }
            let value = self.name("enum value")?;
            if values.contains(&value) {
                return Err(duplicate(&name, value));
            }
            values.push(value);
        }
    }
}

/// Byte offset of the unescaped `delimiter` ending a string body.
fn closing(body: &str, delimiter: &str) -> Option<usize> {
    let mut escaped = false;
    for (index, ch) in body.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if body
            .get(index..)
            .is_some_and(|tail| tail.starts_with(delimiter))
        {
            return Some(index);
        }
    }
    None
}

fn duplicate(owner: &str, name: String) -> SignatureError {
    SignatureError::DuplicateMember {
        owner: owner.to_owned(),
        name,
    }
}
