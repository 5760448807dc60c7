use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolbridge_core::{Arguments, BridgeError, BridgeResult};

/// JSON-Schema primitive type names a parameter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// `"string"`
    String,
    /// `"number"`
    Number,
    /// `"integer"`
    Integer,
    /// `"boolean"`
    Boolean,
    /// `"array"`
    Array,
    /// `"object"`
    Object,
    /// `"null"`
    Null,
}

impl ParamType {
    /// Parses a JSON-Schema type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ParamType::String),
            "number" => Some(ParamType::Number),
            "integer" => Some(ParamType::Integer),
            "boolean" => Some(ParamType::Boolean),
            "array" => Some(ParamType::Array),
            "object" => Some(ParamType::Object),
            "null" => Some(ParamType::Null),
            _ => None,
        }
    }

    /// The JSON-Schema type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Null => "null",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Property name.
    pub name: String,
    /// Declared types. Empty when the schema leaves the type open.
    pub types: Vec<ParamType>,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Whether the property is listed under `required`.
    pub required: bool,
    /// The full property schema as declared (enum, default, items, ...).
    pub schema: Value,
}

/// Typed view of an object-shaped JSON schema.
///
/// The declared schema is kept verbatim alongside the parsed view so that
/// exporting it to a reasoning engine loses nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSchema {
    properties: Vec<ParameterSpec>,
    required: Vec<String>,
    raw: Value,
}

impl ParameterSchema {
    /// A schema with no parameters.
    pub fn empty() -> Self {
        Self {
            properties: Vec::new(),
            required: Vec::new(),
            raw: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Adds a single-typed parameter, keeping the declared schema in step.
    /// Used by local tools whose schema is fixed at compile time.
    ///
    /// Declaring a name again replaces the earlier declaration, including
    /// whether it is required.
    pub fn with_param(
        mut self,
        name: &str,
        ty: ParamType,
        description: &str,
        required: bool,
    ) -> Self {
        let schema = serde_json::json!({"type": ty.as_str(), "description": description});
        if let Some(obj) = self.raw.as_object_mut() {
            if let Some(props) = obj
                .entry("properties")
                .or_insert_with(|| serde_json::json!({}))
                .as_object_mut()
            {
                props.insert(name.to_string(), schema.clone());
            }
            if let Some(req) = obj.get_mut("required").and_then(Value::as_array_mut) {
                req.retain(|r| r.as_str() != Some(name));
            }
            if required {
                if let Some(req) = obj
                    .entry("required")
                    .or_insert_with(|| serde_json::json!([]))
                    .as_array_mut()
                {
                    req.push(Value::String(name.to_string()));
                }
            }
        }
        self.required.retain(|r| r != name);
        if required {
            self.required.push(name.to_string());
        }
        self.properties.retain(|p| p.name != name);
        self.properties.push(ParameterSpec {
            name: name.to_string(),
            types: vec![ty],
            description: Some(description.to_string()),
            required,
            schema,
        });
        self
    }

    /// Parses a declared schema, rejecting anything that is not a
    /// well-formed object schema.
    pub fn from_json(raw: &Value) -> BridgeResult<Self> {
        let obj = raw.as_object().ok_or_else(|| {
            BridgeError::Protocol("parameter schema must be a JSON object".into())
        })?;

        if let Some(ty) = obj.get("type") {
            if ty.as_str() != Some("object") {
                return Err(BridgeError::Protocol(format!(
                    "parameter schema type must be \"object\", got {ty}"
                )));
            }
        }

        let mut required: Vec<String> = Vec::new();
        if let Some(req) = obj.get("required") {
            let items = req.as_array().ok_or_else(|| {
                BridgeError::Protocol("\"required\" must be an array of strings".into())
            })?;
            for item in items {
                let name = item.as_str().ok_or_else(|| {
                    BridgeError::Protocol("\"required\" must be an array of strings".into())
                })?;
                if !required.iter().any(|r| r == name) {
                    required.push(name.to_string());
                }
            }
        }

        let mut properties = Vec::new();
        if let Some(props) = obj.get("properties") {
            let props = props.as_object().ok_or_else(|| {
                BridgeError::Protocol("\"properties\" must be a JSON object".into())
            })?;
            for (name, schema) in props {
                properties.push(parse_property(name, schema, &required)?);
            }
        }

        Ok(Self {
            properties,
            required,
            raw: raw.clone(),
        })
    }

    /// Declared parameters.
    pub fn properties(&self) -> &[ParameterSpec] {
        &self.properties
    }

    /// Looks up a declared parameter by name.
    pub fn property(&self, name: &str) -> Option<&ParameterSpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Names listed under `required`, in declaration order.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// The schema exactly as declared.
    pub fn as_json(&self) -> &Value {
        &self.raw
    }

    /// Checks that every required parameter is present.
    ///
    /// Unknown arguments are accepted and passed through untouched.
    pub fn validate(&self, args: &Arguments) -> BridgeResult<()> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|name| !args.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Validation(format!(
                "missing required argument(s): {}",
                missing.join(", ")
            )))
        }
    }
}

fn parse_property(name: &str, schema: &Value, required: &[String]) -> BridgeResult<ParameterSpec> {
    let obj = schema.as_object().ok_or_else(|| {
        BridgeError::Protocol(format!("schema for parameter '{name}' must be a JSON object"))
    })?;

    let types = match obj.get("type") {
        None => Vec::new(),
        Some(Value::String(ty)) => vec![parse_type(name, ty)?],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| {
                        BridgeError::Protocol(format!(
                            "type of parameter '{name}' must be a string or array of strings"
                        ))
                    })
                    .and_then(|ty| parse_type(name, ty))
            })
            .collect::<BridgeResult<Vec<_>>>()?,
        Some(other) => {
            return Err(BridgeError::Protocol(format!(
                "type of parameter '{name}' must be a string or array of strings, got {other}"
            )))
        }
    };

    Ok(ParameterSpec {
        name: name.to_string(),
        types,
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        required: required.iter().any(|r| r == name),
        schema: schema.clone(),
    })
}

fn parse_type(param: &str, ty: &str) -> BridgeResult<ParamType> {
    ParamType::parse(ty).ok_or_else(|| {
        BridgeError::Protocol(format!("parameter '{param}' declares unknown type '{ty}'"))
    })
}

/// Normalized declaration of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Declared parameters.
    pub parameters: ParameterSchema,
}

impl ToolDescriptor {
    /// Creates a descriptor.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// OpenAI-style function-calling declaration for this tool.
    pub fn to_function_spec(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters.as_json(),
            }
        })
    }
}
