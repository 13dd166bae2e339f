//! Capability System
//!
//! Capabilities are the named, schema-described units of work the model may
//! invoke. They are registered in a [`CapabilityRegistry`](crate::registry::CapabilityRegistry)
//! and dispatched by the orchestrator.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{AssistantError, Result};

// ============================================================================
// Parameters
// ============================================================================

/// Ordered mapping of argument name to value
///
/// Values keep their JSON variant (string, number, bool, list, map, null);
/// the typed accessors below do the coercion at the capability boundary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// String value; numbers and booleans are rendered as text
    pub fn string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Borrowed string value, only for JSON strings
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Numeric value; numeric strings such as `"15"` are accepted
    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer value; integral floats and numeric strings are accepted
    pub fn i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean value; `"true"`/`"false"` strings are accepted
    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn require_string(&self, key: &str) -> Result<String> {
        self.string(key).ok_or_else(|| missing(key, "string"))
    }

    pub fn require_f64(&self, key: &str) -> Result<f64> {
        self.f64(key).ok_or_else(|| missing(key, "number"))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.i64(key).ok_or_else(|| missing(key, "integer"))
    }

    pub fn require_bool(&self, key: &str) -> Result<bool> {
        self.bool(key).ok_or_else(|| missing(key, "boolean"))
    }

    /// Primary input text: `input`, falling back to `action`, else empty
    pub fn primary_input(&self) -> String {
        self.string("input")
            .or_else(|| self.string("action"))
            .unwrap_or_default()
    }
}

fn missing(key: &str, expected: &str) -> AssistantError {
    AssistantError::Validation(format!("Missing or invalid {expected} parameter: {key}"))
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Parameters> for Value {
    fn from(params: Parameters) -> Self {
        Self::Object(params.0)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Schema for a single input property
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Enum of allowed values
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PropertySchema {
    pub fn new(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            description: description.into(),
            enum_values: None,
            default: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new("string", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::new("number", description)
    }

    pub fn with_enum<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// JSON-Schema object describing a capability's input
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,

    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".into(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an optional property
    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Add a required property
    pub fn required_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }
}

/// Tool definition sent to the provider so it knows what it may call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

// ============================================================================
// Execution
// ============================================================================

/// Result from capability execution
///
/// Build through the constructors: a successful result carries `output`
/// and/or `data`, a failed one carries `error_message`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    /// Whether execution succeeded
    pub success: bool,

    /// Text output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CapabilityResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            data: None,
            error_message: None,
            error_code: None,
        }
    }

    /// Successful result carrying only structured data
    pub fn data(data: Value) -> Self {
        Self {
            success: true,
            output: None,
            data: Some(data),
            error_message: None,
            error_code: None,
        }
    }

    pub fn success_with_data(output: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success(output)
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            data: None,
            error_message: Some(message.into()),
            error_code: None,
        }
    }

    pub fn failure_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            ..Self::failure(message)
        }
    }

    /// Text fed back to the model for this result
    ///
    /// Failures render as `Error: <message>`; successes as their output text,
    /// falling back to the serialized data.
    pub fn to_model_text(&self) -> String {
        if !self.success {
            return format!("Error: {}", self.error_message.as_deref().unwrap_or("unknown error"));
        }
        match (&self.output, &self.data) {
            (Some(output), _) if !output.is_empty() => output.clone(),
            (_, Some(data)) => data.to_string(),
            (Some(output), None) => output.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Everything a capability receives for one invocation
#[derive(Clone, Debug, Default)]
pub struct CapabilityContext {
    /// Primary text input (`input`, else `action`, else empty)
    pub input: String,

    /// Full argument map from the tool call
    pub parameters: Parameters,

    /// Fires when the caller abandons the turn
    pub cancellation: CancellationToken,

    /// Session the invocation belongs to, if any
    pub session_id: Option<String>,
}

impl CapabilityContext {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// Build a context from a tool call's argument map
    pub fn from_parameters(parameters: Parameters) -> Self {
        Self {
            input: parameters.primary_input(),
            parameters,
            ..Default::default()
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Capability trait - implement to add new capabilities
///
/// Expected failures should come back as [`CapabilityResult::failure`];
/// an `Err` is treated as an unexpected fault and reported to the model as
/// an exception.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique, case-sensitive name
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// Input schema for LLM function calling
    fn input_schema(&self) -> InputSchema {
        InputSchema::default()
    }

    /// Execute the capability
    async fn execute(&self, context: CapabilityContext) -> Result<CapabilityResult>;

    /// Definition advertised to the provider
    fn tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}
