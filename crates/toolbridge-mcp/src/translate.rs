//! Translation of server-declared tool definitions into [`ToolDescriptor`]s.
//!
//! Pure functions: nothing here touches the network.

use serde_json::Value;
use std::collections::HashSet;
use toolbridge_core::{BridgeError, BridgeResult};
use toolbridge_tools::{ParameterSchema, ToolDescriptor};

/// Translates one entry of a `tools/list` result.
///
/// Rejects entries without a non-empty string `name` or without an
/// object-shaped `inputSchema`. Every declared parameter keeps its type and
/// required flag.
pub fn translate_tool(raw: &Value) -> BridgeResult<ToolDescriptor> {
    let obj = raw
        .as_object()
        .ok_or_else(|| BridgeError::Protocol("tool definition must be a JSON object".into()))?;

    let name = match obj.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        Some(_) => {
            return Err(BridgeError::Protocol(
                "tool definition has an empty or non-string name".into(),
            ))
        }
        None => return Err(BridgeError::Protocol("tool definition is missing a name".into())),
    };

    let description = match obj.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(desc)) => desc.clone(),
        Some(_) => {
            return Err(BridgeError::Protocol(format!(
                "description of tool '{name}' must be a string"
            )))
        }
    };

    let schema = obj.get("inputSchema").ok_or_else(|| {
        BridgeError::Protocol(format!("tool '{name}' is missing an inputSchema"))
    })?;
    let parameters = ParameterSchema::from_json(schema)
        .map_err(|e| BridgeError::Protocol(format!("tool '{name}': {}", e.description())))?;

    Ok(ToolDescriptor::new(name, description, parameters))
}

/// Translates a whole `tools/list` page, keeping the server's order.
///
/// Fails on the first malformed entry and on duplicate names, since names
/// must be unique within a session.
pub fn translate_all(raws: &[Value]) -> BridgeResult<Vec<ToolDescriptor>> {
    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(raws.len());
    for raw in raws {
        let descriptor = translate_tool(raw)?;
        if !seen.insert(descriptor.name.clone()) {
            return Err(BridgeError::Protocol(format!(
                "server advertised tool '{}' more than once",
                descriptor.name
            )));
        }
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use toolbridge_core::ErrorKind;
    use toolbridge_tools::ParamType;

    fn echo_def() -> Value {
        serde_json::json!({
            "name": "echo",
            "description": "Echo back the provided text",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to echo back"}
                },
                "required": ["text"]
            }
        })
    }

    #[test]
    fn test_translation_is_lossless() {
        let raw = echo_def();
        let descriptor = translate_tool(&raw).unwrap();
        assert_eq!(descriptor.name, "echo");
        assert_eq!(descriptor.description, "Echo back the provided text");
        assert_eq!(descriptor.parameters.required(), ["text"]);
        let text = descriptor.parameters.property("text").unwrap();
        assert_eq!(text.types, vec![ParamType::String]);
        assert!(text.required);
        assert_eq!(descriptor.parameters.as_json(), &raw["inputSchema"]);
    }

    #[test]
    fn test_missing_description_defaults_to_empty() {
        let raw = serde_json::json!({"name": "ping", "inputSchema": {"type": "object"}});
        assert_eq!(translate_tool(&raw).unwrap().description, "");
    }

    #[test]
    fn test_rejects_missing_name_or_schema() {
        let cases = vec![
            serde_json::json!({"description": "no name", "inputSchema": {"type": "object"}}),
            serde_json::json!({"name": "  ", "inputSchema": {"type": "object"}}),
            serde_json::json!({"name": 5, "inputSchema": {"type": "object"}}),
            serde_json::json!({"name": "no_schema"}),
            serde_json::json!({"name": "bad_schema", "inputSchema": "object"}),
            serde_json::json!({"name": "bad_desc", "description": [], "inputSchema": {}}),
            serde_json::json!(["not", "an", "object"]),
        ];
        for raw in cases {
            let err = translate_tool(&raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Protocol, "{raw}");
        }
    }

    #[test]
    fn test_translate_all_preserves_order() {
        let raws: Vec<Value> = ["zeta", "alpha", "mid"]
            .iter()
            .map(|n| serde_json::json!({"name": n, "inputSchema": {"type": "object"}}))
            .collect();
        let names: Vec<String> = translate_all(&raws)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_translate_all_rejects_duplicates() {
        let err = translate_all(&[echo_def(), echo_def()]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
