//! Decides how a single field is resolved, before anything is spawned.

use graphqld_resolvers::{
    FieldSignature, ResolverError, ResolverHandle, ResolverRegistry, ScalarType,
    TypeDefinition, TypeDefinitions, TypeRef,
};
use serde_json::{Map, Value};

use crate::selection::SelectionNode;

/// Projected for declared fields the payload leaves out.
static NULL: Value = Value::Null;

/// The object a field is selected on.
#[derive(Debug, Clone, Copy)]
pub(super) struct Parent<'v> {
    /// Declared type, unknown for values read straight from a payload.
    pub(super) type_name: Option<&'v str>,
    /// Resolved payload, absent at the root.
    pub(super) value: Option<&'v Value>,
}

impl<'v> Parent<'v> {
    pub(super) const fn root(type_name: &'v str) -> Self {
        Self {
            type_name: Some(type_name),
            value: None,
        }
    }

    pub(super) const fn object(type_name: Option<&'v str>, value: &'v Value) -> Self {
        Self {
            type_name,
            value: Some(value),
        }
    }
}

/// How a field gets its value.
#[derive(Debug)]
pub(super) enum Plan<'r, 'v> {
    /// Run the registered resolver.
    Invoke(&'r ResolverHandle),
    /// Read the property from the parent payload.
    Project {
        /// The property, `null` when a declared field is absent.
        value: &'v Value,
        /// Declared type of the property, when the parent type is declared.
        type_name: Option<&'r str>,
    },
}

/// Plans `node` under `parent`.
///
/// A registered resolver for `(parent type, field)` takes precedence over a
/// payload property of the same name. A field declared on the parent's
/// object type but missing from the payload projects `null`.
pub(super) fn plan<'r, 'v>(
    registry: &'r ResolverRegistry,
    parent: Parent<'v>,
    node: &SelectionNode,
) -> Result<Plan<'r, 'v>, ResolverError> {
    let types = registry.types();
    if let Some(handle) = parent
        .type_name
        .and_then(|type_name| registry.get(type_name, &node.name))
    {
        let signature = handle.signature();
        validate_arguments(types, signature, &node.arguments)?;
        validate_selection(types, &signature.path(), signature.return_type(), node)?;
        return Ok(Plan::Invoke(handle));
    }

    let declared = parent
        .type_name
        .and_then(|type_name| types.object(type_name))
        .and_then(|object| object.field(&node.name));
    let property = parent
        .value
        .and_then(Value::as_object)
        .and_then(|object| object.get(&node.name))
        .or_else(|| declared.map(|_| &NULL));
    let Some(value) = property else {
        return Err(ResolverError::NotFound {
            type_name: parent.type_name.unwrap_or("<payload>").to_owned(),
            field_name: node.name.clone(),
        });
    };
    if !node.arguments.is_empty() {
        return Err(ResolverError::InvalidArgument {
            field: node.name.clone(),
            message: "payload properties take no arguments".to_owned(),
        });
    }
    if let Some(field) = declared {
        let path = format!("{}.{}", parent.type_name.unwrap_or_default(), node.name);
        validate_selection(types, &path, field.return_type(), node)?;
    }
    Ok(Plan::Project {
        value,
        type_name: declared.map(|field| field.return_type().named_type()),
    })
}

fn validate_selection(
    types: &TypeDefinitions,
    field: &str,
    ty: &TypeRef,
    node: &SelectionNode,
) -> Result<(), ResolverError> {
    if node.is_composite() && types.is_leaf(ty) {
        return Err(ResolverError::InvalidSelection {
            field: field.to_owned(),
            message: format!("{} has no fields to select", ty.named_type()),
        });
    }
    Ok(())
}

/// Checks supplied arguments against the declared ones.
///
/// Enum and input object arguments are checked against `types`; values of
/// undeclared composite types are passed through.
pub(super) fn validate_arguments(
    types: &TypeDefinitions,
    signature: &FieldSignature,
    supplied: &Map<String, Value>,
) -> Result<(), ResolverError> {
    let invalid = |message: String| ResolverError::InvalidArgument {
        field: signature.path(),
        message,
    };

    if let Some(unknown) = supplied
        .keys()
        .find(|name| signature.argument(name).is_none())
    {
        return Err(invalid(format!("unknown argument '{unknown}'")));
    }

    let check = Check { types };
    for decl in signature.arguments() {
        match supplied.get(decl.name()) {
            None | Some(Value::Null) if decl.is_required() => {
                return Err(invalid(format!(
                    "missing required argument '{}: {}'",
                    decl.name(),
                    decl.ty()
                )));
            }
            Some(value) if !value.is_null() => check
                .value(&format!("argument '{}'", decl.name()), decl.ty(), value, 0)
                .map_err(invalid)?,
            _ => {}
        }
    }
    Ok(())
}

/// Deepest input object nesting checked before giving up.
const MAX_INPUT_DEPTH: usize = 32;

/// Type checks for argument values.
struct Check<'t> {
    types: &'t TypeDefinitions,
}

impl Check<'_> {
    fn value(&self, label: &str, ty: &TypeRef, value: &Value, depth: usize) -> Result<(), String> {
        if value.is_null() {
            return if ty.is_non_null() {
                Err(format!("{label} does not accept null"))
            } else {
                Ok(())
            };
        }
        match ty.nullable() {
            TypeRef::List(inner) => match value {
                Value::Array(items) => items
                    .iter()
                    .try_for_each(|item| self.value(label, inner, item, depth)),
                _ => Err(mismatch(label, ty, value)),
            },
            TypeRef::Named(name) => match ScalarType::from_name(name) {
                Some(scalar) => {
                    if scalar_accepts(scalar, value) {
                        Ok(())
                    } else {
                        Err(mismatch(label, ty, value))
                    }
                }
                None => self.declared(label, name, ty, value, depth),
            },
            TypeRef::NonNull(_) => Err(mismatch(label, ty, value)),
        }
    }

    fn declared(
        &self,
        label: &str,
        name: &str,
        ty: &TypeRef,
        value: &Value,
        depth: usize,
    ) -> Result<(), String> {
        match self.types.get(name) {
            None | Some(TypeDefinition::Scalar(_)) => Ok(()),
            Some(TypeDefinition::Object(_)) => {
                Err(format!("{label} uses output type {name} as an input"))
            }
            Some(TypeDefinition::Enum(def)) => match value.as_str() {
                Some(variant) if def.contains(variant) => Ok(()),
                Some(variant) => Err(format!("{label} expects {ty}, found unknown value '{variant}'")),
                None => Err(mismatch(label, ty, value)),
            },
            Some(TypeDefinition::Input(def)) => {
                let Some(object) = value.as_object() else {
                    return Err(mismatch(label, ty, value));
                };
                if depth >= MAX_INPUT_DEPTH {
                    return Err(format!("{label} nests input objects too deeply"));
                }
                if let Some(unknown) = object.keys().find(|key| def.field(key).is_none()) {
                    return Err(format!("{label} has no field '{unknown}' in {name}"));
                }
                def.fields().iter().try_for_each(|field| {
                    let nested = format!("{label} field '{}'", field.name());
                    match object.get(field.name()) {
                        None if field.is_required() => {
                            Err(format!("{nested} is required by {name}"))
                        }
                        None => Ok(()),
                        Some(item) => self.value(&nested, field.ty(), item, depth + 1),
                    }
                })
            }
        }
    }
}

fn scalar_accepts(scalar: ScalarType, value: &Value) -> bool {
    match scalar {
        ScalarType::Int => value.is_i64(),
        ScalarType::Float => value.is_number(),
        ScalarType::Boolean => value.is_boolean(),
        ScalarType::Id => value.is_string() || value.is_i64(),
        ScalarType::String | ScalarType::DateTime => value.is_string(),
    }
}

fn mismatch(label: &str, ty: &TypeRef, value: &Value) -> String {
    format!("{label} expects {ty}, found {value}")
}
