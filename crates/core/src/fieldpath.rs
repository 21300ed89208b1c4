//! Typed accessors over loosely-typed document trees.
//!
//! Paths are given as field segments rather than dotted strings because
//! annotation keys routinely contain dots and slashes.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use kube::core::TypeMeta;
use serde_json::Value;

use crate::Object;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    #[error("{path}: no such field")]
    NotFound { path: String },
    #[error("{path}: expected {expected}, found {found}")]
    WrongShape { path: String, expected: &'static str, found: &'static str },
    #[error("empty field path")]
    EmptyPath,
}

impl FieldPathError {
    pub fn is_not_found(&self) -> bool { matches!(self, FieldPathError::NotFound { .. }) }
}

/// Human name of a value's variant, used in shape errors.
pub fn shape_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

fn not_found(fields: &[&str]) -> FieldPathError {
    FieldPathError::NotFound { path: fields.join(".") }
}

fn wrong_shape(fields: &[&str], expected: &'static str, found: &Value) -> FieldPathError {
    FieldPathError::WrongShape { path: fields.join("."), expected, found: shape_of(found) }
}

/// Accessors on a rendered object. Lookups never panic; a path that crosses a
/// non-mapping value yields [`FieldPathError::WrongShape`].
pub trait ObjectExt {
    fn nested(&self, fields: &[&str]) -> Result<&Value, FieldPathError>;
    fn nested_object(&self, fields: &[&str]) -> Result<&Object, FieldPathError>;
    fn nested_str(&self, fields: &[&str]) -> Result<&str, FieldPathError>;
    /// Mapping whose values must all be strings.
    fn nested_string_map(&self, fields: &[&str]) -> Result<BTreeMap<String, String>, FieldPathError>;
    /// Set a value, creating intermediate mappings as needed.
    fn set_nested(&mut self, fields: &[&str], value: Value) -> Result<(), FieldPathError>;
    /// Remove a value; order of the remaining keys is preserved.
    fn remove_nested(&mut self, fields: &[&str]) -> Option<Value>;

    /// apiVersion/kind pair. Missing or non-string fields read as "".
    fn type_meta(&self) -> TypeMeta;
    /// `metadata.name`, or "" when unset.
    fn object_name(&self) -> &str;
    /// Value of one `metadata.annotations` entry; `Ok(None)` when absent.
    fn annotation(&self, key: &str) -> Result<Option<&str>, FieldPathError>;
    fn remove_annotation(&mut self, key: &str) -> Option<Value>;
}

impl ObjectExt for Object {
    fn nested(&self, fields: &[&str]) -> Result<&Value, FieldPathError> {
        let (first, rest) = fields.split_first().ok_or(FieldPathError::EmptyPath)?;
        let mut cur = self.get(*first).ok_or_else(|| not_found(&fields[..1]))?;
        for (i, field) in rest.iter().enumerate() {
            let obj = cur.as_object().ok_or_else(|| wrong_shape(&fields[..=i], "mapping", cur))?;
            cur = obj.get(*field).ok_or_else(|| not_found(&fields[..i + 2]))?;
        }
        Ok(cur)
    }

    fn nested_object(&self, fields: &[&str]) -> Result<&Object, FieldPathError> {
        let v = self.nested(fields)?;
        v.as_object().ok_or_else(|| wrong_shape(fields, "mapping", v))
    }

    fn nested_str(&self, fields: &[&str]) -> Result<&str, FieldPathError> {
        let v = self.nested(fields)?;
        v.as_str().ok_or_else(|| wrong_shape(fields, "string", v))
    }

    fn nested_string_map(&self, fields: &[&str]) -> Result<BTreeMap<String, String>, FieldPathError> {
        let obj = self.nested_object(fields)?;
        let mut out = BTreeMap::new();
        for (k, v) in obj {
            let s = v.as_str().ok_or_else(|| {
                let mut path: Vec<&str> = fields.to_vec();
                path.push(k);
                wrong_shape(&path, "string", v)
            })?;
            out.insert(k.clone(), s.to_string());
        }
        Ok(out)
    }

    fn set_nested(&mut self, fields: &[&str], value: Value) -> Result<(), FieldPathError> {
        let (last, parents) = fields.split_last().ok_or(FieldPathError::EmptyPath)?;
        let mut cur: &mut Object = self;
        for (i, field) in parents.iter().enumerate() {
            let entry = cur.entry(*field).or_insert_with(|| Value::Object(Object::new()));
            cur = match entry {
                Value::Object(obj) => obj,
                other => return Err(wrong_shape(&fields[..=i], "mapping", other)),
            };
        }
        cur.insert((*last).to_string(), value);
        Ok(())
    }

    fn remove_nested(&mut self, fields: &[&str]) -> Option<Value> {
        let (last, parents) = fields.split_last()?;
        let mut cur: &mut Object = self;
        for field in parents {
            cur = cur.get_mut(*field)?.as_object_mut()?;
        }
        cur.shift_remove(*last)
    }

    fn type_meta(&self) -> TypeMeta {
        let field = |k: &str| self.get(k).and_then(Value::as_str).unwrap_or_default().to_string();
        TypeMeta { api_version: field("apiVersion"), kind: field("kind") }
    }

    fn object_name(&self) -> &str {
        self.nested_str(&["metadata", "name"]).unwrap_or_default()
    }

    fn annotation(&self, key: &str) -> Result<Option<&str>, FieldPathError> {
        match self.nested_str(&["metadata", "annotations", key]) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn remove_annotation(&mut self, key: &str) -> Option<Value> {
        self.remove_nested(&["metadata", "annotations", key])
    }
}
