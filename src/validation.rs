//! Input validation against function-card JSON schemas
//!
//! Only structural checks happen here: required keys and JSON types. Values
//! that are present but unusable are left to the fail-open form parser.

use serde_json::Value;

/// Validate input against a JSON schema, returning a description of the first problem.
pub fn validate_input(input: &Value, schema: &Value) -> Result<(), String> {
    if !input.is_object() && !input.is_null() {
        return Err(format!("Input must be an object, got {}", type_name(input)));
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field_name in required {
            let field_str = field_name
                .as_str()
                .ok_or_else(|| "Invalid schema: required field not a string".to_string())?;

            if input.get(field_str).map_or(true, Value::is_null) {
                return Err(format!("Missing required field: {}", field_str));
            }
        }
    }

    if let (Some(properties), Some(input_obj)) = (
        schema.get("properties").and_then(|p| p.as_object()),
        input.as_object(),
    ) {
        for (key, value) in input_obj {
            if value.is_null() {
                continue;
            }
            if let Some(prop_schema) = properties.get(key) {
                validate_type(key, value, prop_schema)?;
            }
        }
    }

    Ok(())
}

/// `type` may be a single name or a list of accepted names.
fn validate_type(key: &str, value: &Value, schema: &Value) -> Result<(), String> {
    let accepted: Vec<&str> = match schema.get("type") {
        Some(Value::String(name)) => vec![name.as_str()],
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };

    if accepted.iter().any(|expected| matches_type(value, expected)) {
        Ok(())
    } else {
        Err(format!(
            "Type mismatch for {}: expected {}, got {}",
            key,
            accepted.join(" or "),
            type_name(value)
        ))
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true, // Unknown types pass validation
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
