//! Declared tool parameters and argument decoding
//!
//! Internal tools declare their parameters as a list of [`ParamSpec`]s. The
//! same list produces the JSON schema shown to the model and decodes the raw
//! argument payload before the tool body runs, so a tool never sees
//! arguments of the wrong shape.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::{Result, ToolError};

/// Helper module to build JSON schemas for tools
pub mod schema {
    use serde_json::{Value, json};

    /// Create a JSON schema for an object with properties
    ///
    /// # Example
    ///
    /// ```
    /// use agent_tools::params::schema;
    /// use serde_json::json;
    ///
    /// let schema = schema::object(
    ///     json!({
    ///         "query": schema::string("Search query"),
    ///         "limit": schema::integer("Maximum results"),
    ///     }),
    ///     &["query"],
    /// );
    /// assert_eq!(schema["required"][0], "query");
    /// ```
    pub fn object(properties: Value, required: &[&str]) -> Value {
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn string(description: &str) -> Value {
        typed("string", description)
    }

    pub fn number(description: &str) -> Value {
        typed("number", description)
    }

    pub fn integer(description: &str) -> Value {
        typed("integer", description)
    }

    pub fn boolean(description: &str) -> Value {
        typed("boolean", description)
    }

    pub fn array(description: &str, items: Value) -> Value {
        json!({
            "type": "array",
            "description": description,
            "items": items,
        })
    }

    fn typed(kind: &str, description: &str) -> Value {
        json!({
            "type": kind,
            "description": description,
        })
    }
}

/// JSON type of a declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array(Box<ParamType>),
}

impl ParamType {
    fn name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array(_) => "array",
        }
    }

    fn schema(&self, description: &str) -> Value {
        match self {
            ParamType::String => schema::string(description),
            ParamType::Integer => schema::integer(description),
            ParamType::Number => schema::number(description),
            ParamType::Boolean => schema::boolean(description),
            ParamType::Object => json!({ "type": "object", "description": description }),
            ParamType::Array(items) => schema::array(description, items.schema("")),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array(items) => value
                .as_array()
                .is_some_and(|values| values.iter().all(|v| items.matches(v))),
        }
    }
}

/// One declared parameter of an internal tool
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub required: bool,
}

impl ParamSpec {
    /// A required parameter
    pub fn new(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
            required: true,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer, description)
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean, description)
    }

    /// Mark the parameter as optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Decode step for this parameter: presence and type check
    fn decode(&self, raw: Option<&Value>) -> Result<Option<Value>> {
        match raw {
            None | Some(Value::Null) if self.required => Err(ToolError::InvalidArguments(format!(
                "missing required parameter '{}'",
                self.name
            ))),
            None | Some(Value::Null) => Ok(None),
            Some(value) if self.param_type.matches(value) => Ok(Some(value.clone())),
            Some(value) => Err(ToolError::InvalidArguments(format!(
                "parameter '{}' must be of type {}, got {}",
                self.name,
                self.param_type.name(),
                value
            ))),
        }
    }
}

/// JSON schema for a parameter list
pub fn parameters_schema(params: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    for param in params {
        properties.insert(param.name.clone(), param.param_type.schema(&param.description));
    }
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();
    schema::object(Value::Object(properties), &required)
}

/// Decoded, validated arguments handed to a tool body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    values: Map<String, Value>,
}

impl ToolArguments {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Typed access to a parameter that must be present
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.get_opt(name)?.ok_or_else(|| {
            ToolError::InvalidArguments(format!("missing required parameter '{name}'"))
        })
    }

    /// Typed access to an optional parameter
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                ToolError::InvalidArguments(format!("parameter '{name}': {e}"))
            }),
        }
    }

    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

/// Decode the model's raw argument payload against the declared parameters
///
/// An empty payload is treated as `{}`. In `strict` mode undeclared keys are
/// rejected; otherwise they are dropped.
pub fn decode_arguments(params: &[ParamSpec], raw: &str, strict: bool) -> Result<ToolArguments> {
    let raw = raw.trim();
    let parsed: Value = if raw.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(raw)
            .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))?
    };

    let Value::Object(input) = parsed else {
        return Err(ToolError::InvalidArguments(
            "arguments must be a JSON object".to_string(),
        ));
    };

    if strict {
        if let Some(unknown) = input
            .keys()
            .find(|key| !params.iter().any(|p| &p.name == *key))
        {
            return Err(ToolError::InvalidArguments(format!(
                "unexpected parameter '{unknown}'"
            )));
        }
    }

    let mut values = Map::new();
    for param in params {
        if let Some(value) = param.decode(input.get(&param.name))? {
            values.insert(param.name.clone(), value);
        }
    }
    Ok(ToolArguments::new(values))
}
