//! Validation schemas for configuration subtrees.
//!
//! A [`Schema`] parses and coerces a raw configuration subtree into a typed
//! value, supplies defaults for absent keys, and resolves *context
//! references*, named placeholders resolved from the fixed per-process
//! [`SchemaContext`] record. Schemas are registered per configuration path
//! and drive both the live value streams and the explicit validation pass.
//!
//! Defaults are tagged variants: a [`SchemaDefault`] is either a literal
//! value or a [`ContextRef`] resolved against the context passed into every
//! validation call. There is no reflection-based lookup.
//!
//! # Examples
//!
//! ```rust
//! use quillon_config::schema::{BooleanSchema, ContextRef, ObjectSchema, StringSchema};
//!
//! let schema = ObjectSchema::new()
//!     .field("host", StringSchema::new().with_default("localhost"))
//!     .field("branch", StringSchema::new().with_default(ContextRef::Branch))
//!     .field("enabled", BooleanSchema::new().with_default(true));
//! ```

use crate::env::SchemaContext;
use serde_json::{Map, Number, Value};
use std::fmt;

/// Error produced when a raw subtree does not satisfy a schema.
///
/// Carries the dotted key of the offending value relative to the schema root
/// (empty for the root itself). The rendered form is part of the service's
/// error-message contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    key: String,
    message: String,
}

impl SchemaError {
    fn root(message: impl Into<String>) -> Self {
        Self { key: String::new(), message: message.into() }
    }

    fn at_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self { key: key.into(), message: message.into() }
    }

    fn type_mismatch(expected: &str, actual: &str) -> Self {
        Self::root(format!("expected value of type [{expected}] but got [{actual}]"))
    }

    fn prefixed(self, parent: &str) -> Self {
        let key = if self.key.is_empty() {
            parent.to_string()
        } else {
            format!("{parent}.{}", self.key)
        };
        Self { key, message: self.message }
    }

    /// The dotted key of the offending value, empty for the schema root.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}]: {}", self.key, self.message)
        }
    }
}

impl std::error::Error for SchemaError {}

/// Named placeholder resolved from the process [`SchemaContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRef {
    /// VCS branch of the build.
    Branch,
    /// Release version.
    Version,
    /// Monotonic build number.
    BuildNum,
    /// VCS revision of the build.
    BuildSha,
    /// Development mode flag.
    Dev,
    /// Production mode flag.
    Prod,
}

impl ContextRef {
    fn resolve(self, context: &SchemaContext) -> Value {
        match self {
            Self::Branch => Value::String(context.branch.clone()),
            Self::Version => Value::String(context.version.clone()),
            Self::BuildNum => Value::Number(Number::from(context.build_num)),
            Self::BuildSha => Value::String(context.build_sha.clone()),
            Self::Dev => Value::Bool(context.dev),
            Self::Prod => Value::Bool(context.prod),
        }
    }
}

/// Default value for a schema field: a literal or a context reference.
#[derive(Debug, Clone)]
pub enum SchemaDefault {
    /// A fixed value used verbatim.
    Literal(Value),
    /// A placeholder resolved against the process context at validation
    /// time.
    Context(ContextRef),
}

impl SchemaDefault {
    fn resolve(&self, context: &SchemaContext) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Context(reference) => reference.resolve(context),
        }
    }
}

impl From<&str> for SchemaDefault {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for SchemaDefault {
    fn from(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
}

impl From<bool> for SchemaDefault {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}

impl From<i32> for SchemaDefault {
    fn from(value: i32) -> Self {
        Self::Literal(Value::Number(Number::from(value)))
    }
}

impl From<i64> for SchemaDefault {
    fn from(value: i64) -> Self {
        Self::Literal(Value::Number(Number::from(value)))
    }
}

impl From<u64> for SchemaDefault {
    fn from(value: u64) -> Self {
        Self::Literal(Value::Number(Number::from(value)))
    }
}

impl From<f64> for SchemaDefault {
    fn from(value: f64) -> Self {
        Self::Literal(Number::from_f64(value).map_or(Value::Null, Value::Number))
    }
}

impl From<Value> for SchemaDefault {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<ContextRef> for SchemaDefault {
    fn from(reference: ContextRef) -> Self {
        Self::Context(reference)
    }
}

/// Policy for object keys not declared by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unknowns {
    /// Reject unknown keys (`definition for this key is missing`).
    #[default]
    Forbid,
    /// Pass unknown keys through to the validated value.
    Allow,
    /// Drop unknown keys from the validated value.
    Ignore,
}

/// Validator/coercer for a configuration subtree.
#[derive(Debug, Clone)]
pub enum Schema {
    /// UTF-8 string value.
    String(StringSchema),
    /// Numeric value (integer or float; numeric strings coerce).
    Number(NumberSchema),
    /// Boolean value (`"true"`/`"false"` strings coerce).
    Boolean(BooleanSchema),
    /// Nested object with per-field schemas.
    Object(ObjectSchema),
    /// Sequence with a uniform item schema.
    Array(ArraySchema),
    /// Any value, passed through unvalidated.
    Any(AnySchema),
}

impl Schema {
    /// Validate `value` (the raw subtree, or `None` when absent) against
    /// this schema, producing the coerced, default-filled value.
    pub fn validate(
        &self,
        value: Option<&Value>,
        context: &SchemaContext,
    ) -> Result<Value, SchemaError> {
        match self {
            Self::String(schema) => schema.validate(value, context),
            Self::Number(schema) => schema.validate(value, context),
            Self::Boolean(schema) => schema.validate(value, context),
            Self::Object(schema) => schema.validate(value, context),
            Self::Array(schema) => schema.validate(value, context),
            Self::Any(schema) => schema.validate(value, context),
        }
    }

    /// View this schema as an object schema, if it is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Self::Object(schema) => Some(schema),
            _ => None,
        }
    }

    /// Relative dotted keys of every leaf this schema statically declares.
    ///
    /// An empty string denotes the schema's own path (non-object schemas).
    /// [`AnySchema`] and object schemas that allow unknowns cannot enumerate
    /// beyond their declared fields.
    #[must_use]
    pub(crate) fn known_leaves(&self) -> Vec<String> {
        let mut leaves = Vec::new();
        self.collect_known_leaves("", &mut leaves);
        leaves
    }

    fn collect_known_leaves(&self, prefix: &str, out: &mut Vec<String>) {
        match self {
            Self::Object(object) => {
                for (name, child) in &object.fields {
                    let key = if prefix.is_empty() {
                        name.clone()
                    } else {
                        format!("{prefix}.{name}")
                    };
                    match child {
                        Self::Object(_) => child.collect_known_leaves(&key, out),
                        _ => out.push(key),
                    }
                }
            },
            _ => out.push(prefix.to_string()),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn resolve_or_missing(
    value: Option<&Value>,
    default: Option<&SchemaDefault>,
    context: &SchemaContext,
    expected: &str,
) -> Result<Value, SchemaError> {
    match value {
        Some(value) => Ok(value.clone()),
        None => match default {
            Some(default) => Ok(default.resolve(context)),
            None => Err(SchemaError::type_mismatch(expected, "undefined")),
        },
    }
}

/// Schema for string values.
#[derive(Debug, Clone, Default)]
pub struct StringSchema {
    default: Option<SchemaDefault>,
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl StringSchema {
    /// Create a string schema with no constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `default` when the value is absent.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<SchemaDefault>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Require at least `min` characters.
    #[must_use]
    pub fn with_min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Require at most `max` characters.
    #[must_use]
    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    fn validate(
        &self,
        value: Option<&Value>,
        context: &SchemaContext,
    ) -> Result<Value, SchemaError> {
        let value = resolve_or_missing(value, self.default.as_ref(), context, "string")?;
        let Value::String(text) = &value else {
            return Err(SchemaError::type_mismatch("string", json_type_name(&value)));
        };

        let length = text.chars().count();
        if let Some(min) = self.min_length {
            if length < min {
                return Err(SchemaError::root(format!(
                    "value has length [{length}] but it must have a minimum length of [{min}]."
                )));
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(SchemaError::root(format!(
                    "value has length [{length}] but it must have a maximum length of [{max}]."
                )));
            }
        }
        Ok(value)
    }
}

impl From<StringSchema> for Schema {
    fn from(schema: StringSchema) -> Self {
        Self::String(schema)
    }
}

/// Schema for numeric values.
///
/// Accepts JSON numbers and numeric strings (environment overlays often
/// arrive as strings).
#[derive(Debug, Clone, Default)]
pub struct NumberSchema {
    default: Option<SchemaDefault>,
    min: Option<f64>,
    max: Option<f64>,
}

impl NumberSchema {
    /// Create a number schema with no constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `default` when the value is absent.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<SchemaDefault>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Require the value to be at least `min`.
    #[must_use]
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Require the value to be at most `max`.
    #[must_use]
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    fn validate(
        &self,
        value: Option<&Value>,
        context: &SchemaContext,
    ) -> Result<Value, SchemaError> {
        let value = resolve_or_missing(value, self.default.as_ref(), context, "number")?;
        let number = match &value {
            Value::Number(_) => value,
            Value::String(text) => {
                if let Ok(integer) = text.parse::<i64>() {
                    Value::Number(Number::from(integer))
                } else if let Some(float) = text.parse::<f64>().ok().and_then(Number::from_f64) {
                    Value::Number(float)
                } else {
                    return Err(SchemaError::type_mismatch("number", "string"));
                }
            },
            other => {
                return Err(SchemaError::type_mismatch("number", json_type_name(other)));
            },
        };

        let numeric = number.as_f64().unwrap_or_default();
        if let Some(min) = self.min {
            if numeric < min {
                return Err(SchemaError::root(format!(
                    "Value must be equal to or greater than [{min}]."
                )));
            }
        }
        if let Some(max) = self.max {
            if numeric > max {
                return Err(SchemaError::root(format!(
                    "Value must be equal to or lower than [{max}]."
                )));
            }
        }
        Ok(number)
    }
}

impl From<NumberSchema> for Schema {
    fn from(schema: NumberSchema) -> Self {
        Self::Number(schema)
    }
}

/// Schema for boolean values.
///
/// Accepts JSON booleans and the strings `"true"`/`"false"`.
#[derive(Debug, Clone, Default)]
pub struct BooleanSchema {
    default: Option<SchemaDefault>,
}

impl BooleanSchema {
    /// Create a boolean schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `default` when the value is absent.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<SchemaDefault>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn validate(
        &self,
        value: Option<&Value>,
        context: &SchemaContext,
    ) -> Result<Value, SchemaError> {
        let value = resolve_or_missing(value, self.default.as_ref(), context, "boolean")?;
        match &value {
            Value::Bool(_) => Ok(value),
            Value::String(text) if text == "true" => Ok(Value::Bool(true)),
            Value::String(text) if text == "false" => Ok(Value::Bool(false)),
            other => Err(SchemaError::type_mismatch("boolean", json_type_name(other))),
        }
    }
}

impl From<BooleanSchema> for Schema {
    fn from(schema: BooleanSchema) -> Self {
        Self::Boolean(schema)
    }
}

/// Schema for object values with per-field schemas.
///
/// A missing subtree validates as an empty object, so field defaults apply
/// even when the path is absent from the raw tree. Unknown keys are rejected
/// unless the policy says otherwise.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, Schema)>,
    unknowns: Unknowns,
}

impl ObjectSchema {
    /// Create an object schema with no declared fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field with its schema. Declaration order is preserved in
    /// the validated output and in diagnostics.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.fields.push((name.into(), schema.into()));
        self
    }

    /// Set the policy for keys not declared by the schema.
    #[must_use]
    pub fn with_unknowns(mut self, unknowns: Unknowns) -> Self {
        self.unknowns = unknowns;
        self
    }

    /// Whether the schema declares a field with the given name.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(field, _)| field == name)
    }

    fn validate(
        &self,
        value: Option<&Value>,
        context: &SchemaContext,
    ) -> Result<Value, SchemaError> {
        let empty = Map::new();
        let map = match value {
            None => &empty,
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(SchemaError::type_mismatch("object", json_type_name(other)));
            },
        };

        if self.unknowns == Unknowns::Forbid {
            for key in map.keys() {
                if !self.has_field(key) {
                    return Err(SchemaError::at_key(key, "definition for this key is missing"));
                }
            }
        }

        let mut validated = Map::new();
        for (name, field_schema) in &self.fields {
            match field_schema.validate(map.get(name), context) {
                Ok(value) => {
                    validated.insert(name.clone(), value);
                },
                Err(error) => return Err(error.prefixed(name)),
            }
        }

        if self.unknowns == Unknowns::Allow {
            for (key, value) in map {
                if !self.has_field(key) {
                    validated.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(Value::Object(validated))
    }
}

impl From<ObjectSchema> for Schema {
    fn from(schema: ObjectSchema) -> Self {
        Self::Object(schema)
    }
}

/// Schema for sequences with a uniform item schema.
#[derive(Debug, Clone, Default)]
pub struct ArraySchema {
    items: Option<Box<Schema>>,
    default: Option<SchemaDefault>,
}

impl ArraySchema {
    /// Create an array schema accepting any items.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate every item against `schema`.
    #[must_use]
    pub fn with_items(mut self, schema: impl Into<Schema>) -> Self {
        self.items = Some(Box::new(schema.into()));
        self
    }

    /// Use `default` when the value is absent.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<SchemaDefault>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn validate(
        &self,
        value: Option<&Value>,
        context: &SchemaContext,
    ) -> Result<Value, SchemaError> {
        let value = resolve_or_missing(value, self.default.as_ref(), context, "array")?;
        let Value::Array(items) = &value else {
            return Err(SchemaError::type_mismatch("array", json_type_name(&value)));
        };

        let Some(item_schema) = &self.items else {
            return Ok(value);
        };

        let mut validated = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match item_schema.validate(Some(item), context) {
                Ok(value) => validated.push(value),
                Err(error) => return Err(error.prefixed(&index.to_string())),
            }
        }
        Ok(Value::Array(validated))
    }
}

impl From<ArraySchema> for Schema {
    fn from(schema: ArraySchema) -> Self {
        Self::Array(schema)
    }
}

/// Schema accepting any value unchanged.
#[derive(Debug, Clone, Default)]
pub struct AnySchema {
    default: Option<SchemaDefault>,
}

impl AnySchema {
    /// Create a pass-through schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `default` when the value is absent.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<SchemaDefault>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn validate(
        &self,
        value: Option<&Value>,
        context: &SchemaContext,
    ) -> Result<Value, SchemaError> {
        match value {
            Some(value) => Ok(value.clone()),
            None => match &self.default {
                Some(default) => Ok(default.resolve(context)),
                None => Ok(Value::Null),
            },
        }
    }
}

impl From<AnySchema> for Schema {
    fn from(schema: AnySchema) -> Self {
        Self::Any(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> SchemaContext {
        SchemaContext {
            branch: "master".to_string(),
            version: "8.0.0".to_string(),
            build_num: 42,
            build_sha: "one".to_string(),
            dev: false,
            prod: true,
        }
    }

    #[test]
    fn string_schema_rejects_numbers_with_contract_message() {
        let schema = Schema::from(StringSchema::new());
        let error = schema.validate(Some(&json!(123)), &context()).unwrap_err();
        assert_eq!(error.to_string(), "expected value of type [string] but got [number]");
    }

    #[test]
    fn missing_value_without_default_reports_undefined() {
        let schema = Schema::from(StringSchema::new());
        let error = schema.validate(None, &context()).unwrap_err();
        assert_eq!(error.to_string(), "expected value of type [string] but got [undefined]");
    }

    #[test]
    fn defaults_fill_absent_values() {
        let schema = Schema::from(StringSchema::new().with_default("fallback"));
        assert_eq!(schema.validate(None, &context()).unwrap(), json!("fallback"));
    }

    #[test]
    fn context_references_resolve_against_the_process_record() {
        let schema = Schema::from(
            ObjectSchema::new()
                .field("branch", StringSchema::new().with_default(ContextRef::Branch))
                .field("build_num", NumberSchema::new().with_default(ContextRef::BuildNum))
                .field("dev", BooleanSchema::new().with_default(ContextRef::Dev))
                .field("prod", BooleanSchema::new().with_default(ContextRef::Prod)),
        );
        let value = schema.validate(Some(&json!({})), &context()).unwrap();
        assert_eq!(
            value,
            json!({"branch": "master", "build_num": 42, "dev": false, "prod": true})
        );
    }

    #[test]
    fn missing_object_subtree_validates_as_empty() {
        let schema = Schema::from(
            ObjectSchema::new().field("enabled", BooleanSchema::new().with_default(false)),
        );
        let value = schema.validate(None, &context()).unwrap();
        assert_eq!(value, json!({"enabled": false}));
    }

    #[test]
    fn unknown_keys_are_rejected_by_default() {
        let schema = Schema::from(ObjectSchema::new().field("known", StringSchema::new()));
        let error = schema
            .validate(Some(&json!({"known": "x", "mystery": 1})), &context())
            .unwrap_err();
        assert_eq!(error.to_string(), "[mystery]: definition for this key is missing");
    }

    #[test]
    fn unknown_key_policy_allow_and_ignore() {
        let raw = json!({"known": "x", "extra": 1});
        let allow = Schema::from(
            ObjectSchema::new().field("known", StringSchema::new()).with_unknowns(Unknowns::Allow),
        );
        assert_eq!(allow.validate(Some(&raw), &context()).unwrap(), raw);

        let ignore = Schema::from(
            ObjectSchema::new().field("known", StringSchema::new()).with_unknowns(Unknowns::Ignore),
        );
        assert_eq!(ignore.validate(Some(&raw), &context()).unwrap(), json!({"known": "x"}));
    }

    #[test]
    fn nested_field_errors_carry_dotted_keys() {
        let schema = Schema::from(
            ObjectSchema::new()
                .field("outer", ObjectSchema::new().field("inner", NumberSchema::new())),
        );
        let error = schema
            .validate(Some(&json!({"outer": {"inner": "not a number"}})), &context())
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "[outer.inner]: expected value of type [number] but got [string]"
        );
    }

    #[test]
    fn numeric_and_boolean_strings_coerce() {
        let number = Schema::from(NumberSchema::new());
        assert_eq!(number.validate(Some(&json!("42")), &context()).unwrap(), json!(42));
        assert_eq!(number.validate(Some(&json!("2.5")), &context()).unwrap(), json!(2.5));

        let boolean = Schema::from(BooleanSchema::new());
        assert_eq!(boolean.validate(Some(&json!("true")), &context()).unwrap(), json!(true));
    }

    #[test]
    fn number_range_constraints() {
        let schema = Schema::from(NumberSchema::new().with_min(1.0).with_max(10.0));
        assert!(schema.validate(Some(&json!(5)), &context()).is_ok());
        let error = schema.validate(Some(&json!(0)), &context()).unwrap_err();
        assert_eq!(error.to_string(), "Value must be equal to or greater than [1].");
    }

    #[test]
    fn array_items_validate_with_index_keys() {
        let schema = Schema::from(ArraySchema::new().with_items(NumberSchema::new()));
        assert_eq!(
            schema.validate(Some(&json!([1, 2, 3])), &context()).unwrap(),
            json!([1, 2, 3])
        );
        let error = schema.validate(Some(&json!([1, "x"])), &context()).unwrap_err();
        assert_eq!(error.to_string(), "[1]: expected value of type [number] but got [string]");
    }

    #[test]
    fn known_leaves_enumerate_declared_fields() {
        let schema = Schema::from(
            ObjectSchema::new()
                .field("string", StringSchema::new())
                .field("nested", ObjectSchema::new().field("inner", NumberSchema::new())),
        );
        assert_eq!(schema.known_leaves(), vec!["string", "nested.inner"]);

        let scalar = Schema::from(StringSchema::new());
        assert_eq!(scalar.known_leaves(), vec![""]);
    }
}
