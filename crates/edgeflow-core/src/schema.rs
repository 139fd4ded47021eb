//! Schema and type validation of parameter values
//!
//! Every declared parameter is checked independently and all failures are
//! reported together. Inside one parameter, checking stops at the first
//! violation; a record is never partially validated.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{SchemaError, SchemaErrors};
use crate::model::{Parameter, RawParameters, RecordType, Template, TypeRef, Value};

/// Validated parameter values, in declaration order.
///
/// Absent nullable parameters are present here as [`Value::Unset`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    values: IndexMap<String, Value>,
}

impl ParameterSet {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Validate raw values against the template's parameter declarations.
pub fn validate_parameters(
    template: &Template,
    raw: &RawParameters,
) -> Result<ParameterSet, SchemaErrors> {
    let mut errors = Vec::new();
    let mut values = IndexMap::new();

    for (name, param) in &template.parameters {
        match validate_parameter(name, param, raw.get(name), &template.types) {
            Ok(value) => {
                values.insert(name.clone(), value);
            }
            Err(reason) => errors.push(SchemaError::new(name, reason)),
        }
    }

    for name in raw.keys() {
        if !template.parameters.contains_key(name) {
            errors.push(SchemaError::new(name, "not declared by the template"));
        }
    }

    if !errors.is_empty() {
        return Err(SchemaErrors(errors));
    }

    debug!(count = values.len(), "Parameters validated");
    Ok(ParameterSet { values })
}

fn validate_parameter(
    name: &str,
    param: &Parameter,
    supplied: Option<&serde_json::Value>,
    types: &IndexMap<String, RecordType>,
) -> Result<Value, String> {
    let value = match supplied.or(param.default.as_ref()) {
        Some(serde_json::Value::Null) | None if param.nullable => return Ok(Value::Unset),
        Some(value) => value,
        None => return Err("required parameter has no value and no default".to_string()),
    };

    check_type(value, &param.ty, types)?;
    check_allowed(value, &param.allowed)?;

    if let Some(len) = length_of(value) {
        if let Some(min) = param.min_length
            && len < min
        {
            return Err(format!("length {len} is below the minimum of {min}"));
        }
        if let Some(max) = param.max_length
            && len > max
        {
            return Err(format!("length {len} exceeds the maximum of {max}"));
        }
    }

    if let Some(n) = value.as_i64() {
        if let Some(min) = param.min_value
            && n < min
        {
            return Err(format!("{n} is below the minimum of {min}"));
        }
        if let Some(max) = param.max_value
            && n > max
        {
            return Err(format!("{n} exceeds the maximum of {max}"));
        }
    }

    debug!(parameter = %name, "Parameter accepted");
    Ok(Value::from_json(value))
}

fn check_type(
    value: &serde_json::Value,
    ty: &TypeRef,
    types: &IndexMap<String, RecordType>,
) -> Result<(), String> {
    let matches = match ty {
        TypeRef::Any => true,
        TypeRef::String => value.is_string(),
        TypeRef::Int => value.is_i64() || value.is_u64(),
        TypeRef::Bool => value.is_boolean(),
        TypeRef::Object => value.is_object(),
        TypeRef::Array(element) => {
            let items = value
                .as_array()
                .ok_or_else(|| mismatch(ty, value))?;
            for (index, item) in items.iter().enumerate() {
                check_type(item, element, types).map_err(|e| format!("[{index}]: {e}"))?;
            }
            true
        }
        TypeRef::Named(name) => {
            let record = types
                .get(name)
                .ok_or_else(|| format!("unknown type '{name}'"))?;
            check_record(value, name, record, types)?;
            true
        }
    };

    if matches { Ok(()) } else { Err(mismatch(ty, value)) }
}

fn check_record(
    value: &serde_json::Value,
    type_name: &str,
    record: &RecordType,
    types: &IndexMap<String, RecordType>,
) -> Result<(), String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("expected {type_name}, found {}", json_kind(value)))?;

    for key in object.keys() {
        if !record.fields.contains_key(key) {
            return Err(format!("unknown field '{key}' for {type_name}"));
        }
    }

    for (field, decl) in &record.fields {
        match object.get(field) {
            None | Some(serde_json::Value::Null) if decl.nullable => {}
            None | Some(serde_json::Value::Null) => {
                return Err(format!("missing required field '{field}'"));
            }
            Some(field_value) => {
                check_type(field_value, &decl.ty, types)
                    .and_then(|_| check_allowed(field_value, &decl.allowed))
                    .map_err(|e| format!("field '{field}': {e}"))?;
            }
        }
    }

    Ok(())
}

fn check_allowed(value: &serde_json::Value, allowed: &[serde_json::Value]) -> Result<(), String> {
    if allowed.is_empty() || allowed.contains(value) {
        return Ok(());
    }
    let choices = allowed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(format!("{value} is not one of the allowed values: {choices}"))
}

fn length_of(value: &serde_json::Value) -> Option<usize> {
    match value {
        serde_json::Value::String(s) => Some(s.chars().count()),
        serde_json::Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn mismatch(ty: &TypeRef, value: &serde_json::Value) -> String {
    format!("expected {ty}, found {}", json_kind(value))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
