// Tool abstractions for societies
//
// A tool is a named callable with a JSON input schema. Handlers are shared
// behind `Arc` so toolkits can hand out cheap clones of the same tool.

use async_trait::async_trait;
use parley_abstraction::ToolSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{Result, SocietyError};

/// Tool parameters schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameters {
    /// Type (always "object" for function parameters)
    #[serde(rename = "type")]
    pub param_type: String,
    /// Property definitions
    pub properties: BTreeMap<String, ToolPropertySchema>,
    /// Required property names
    pub required: Vec<String>,
}

impl ToolParameters {
    /// Create a new tool parameters schema
    pub fn new() -> Self {
        Self { param_type: "object".to_string(), properties: BTreeMap::new(), required: Vec::new() }
    }

    /// Add a property to the schema
    #[must_use]
    pub fn add_property(
        self,
        name: impl Into<String>,
        property_type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.add_schema(
            name,
            ToolPropertySchema {
                property_type: property_type.into(),
                description: description.into(),
                items: None,
                enum_values: None,
            },
            required,
        )
    }

    /// Add a string property restricted to `values`
    #[must_use]
    pub fn add_enum_property(
        self,
        name: impl Into<String>,
        values: &[&str],
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.add_schema(
            name,
            ToolPropertySchema {
                property_type: "string".to_string(),
                description: description.into(),
                items: None,
                enum_values: Some(values.iter().map(|v| (*v).to_string()).collect()),
            },
            required,
        )
    }

    /// Add an array property whose elements follow `items`
    #[must_use]
    pub fn add_array_property(
        self,
        name: impl Into<String>,
        items: Value,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.add_schema(
            name,
            ToolPropertySchema {
                property_type: "array".to_string(),
                description: description.into(),
                items: Some(items),
                enum_values: None,
            },
            required,
        )
    }

    fn add_schema(mut self, name: impl Into<String>, schema: ToolPropertySchema, required: bool) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool property schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPropertySchema {
    /// Property type
    #[serde(rename = "type")]
    pub property_type: String,
    /// Property description
    pub description: String,
    /// Element schema for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
    /// Allowed values
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

/// Arguments passed to tool handler
#[derive(Debug, Clone)]
pub struct ToolArguments {
    /// Tool the arguments were addressed to, for error messages
    pub tool: String,
    /// Parsed arguments as JSON value
    pub args: Value,
}

impl ToolArguments {
    /// Create new tool arguments
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self { tool: tool.into(), args }
    }

    /// Get argument as string
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.args.get(key)?.as_str().map(str::to_string)
    }

    /// Get a required, non-blank string argument
    pub fn require_string(&self, key: &str) -> Result<String> {
        self.get_string(key).filter(|s| !s.trim().is_empty()).ok_or_else(|| {
            SocietyError::invalid_args(&self.tool, format!("Missing required '{}' argument", key))
        })
    }

    /// Get argument as i64
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.args.get(key)?.as_i64()
    }

    /// Get argument as bool
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.args.get(key)?.as_bool()
    }

    /// Get argument as array
    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.args.get(key)?.as_array()
    }
}

/// Result from tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether execution succeeded
    pub success: bool,
    /// Output from the tool
    pub output: String,
    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), metadata: HashMap::new() }
    }

    /// Create an error result
    pub fn error(output: impl Into<String>) -> Self {
        Self { success: false, output: output.into(), metadata: HashMap::new() }
    }

    /// Add metadata to the result
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Handler for tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with given arguments
    ///
    /// `Err` means the call could not be carried out at all (bad arguments,
    /// missing file). A `ToolResult` with `success == false` means the tool
    /// ran and reports a failure, such as a script exiting non-zero.
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult>;
}

/// A callable tool
#[derive(Clone)]
pub struct Tool {
    /// Tool name (used in function calls)
    pub name: String,
    /// Tool description
    pub description: String,
    /// Parameter schema
    pub parameters: ToolParameters,
    /// Handler for executing the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    /// Create a new tool
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self { name: name.into(), description: description.into(), parameters, handler }
    }

    /// Execute this tool with given arguments
    pub async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
        self.handler.execute(args).await
    }

    /// Wire-neutral description sent to models.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: serde_json::to_value(&self.parameters)
                .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}})),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("handler", &"<handler>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
            let text = args.require_string("text")?;
            Ok(ToolResult::success(text).with_metadata("length", "4"))
        }
    }

    fn echo_tool() -> Tool {
        Tool::new(
            "echo",
            "Echo the input",
            ToolParameters::new()
                .add_property("text", "string", "Text to echo", true)
                .add_enum_property("mode", &["plain", "loud"], "Echo mode", false),
            Arc::new(EchoHandler),
        )
    }

    #[test]
    fn test_spec_is_json_schema() {
        let spec = echo_tool().spec();
        assert_eq!(spec.name, "echo");
        assert_eq!(spec.parameters["type"], "object");
        assert_eq!(spec.parameters["properties"]["text"]["type"], "string");
        assert_eq!(spec.parameters["properties"]["mode"]["enum"], json!(["plain", "loud"]));
        assert!(spec.parameters["properties"]["text"].get("items").is_none());
        assert_eq!(spec.parameters["required"], json!(["text"]));
    }

    #[test]
    fn test_array_property_carries_items() {
        let params = ToolParameters::new().add_array_property(
            "rows",
            json!({"type": "array", "items": {"type": "string"}}),
            "Rows",
            true,
        );
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["properties"]["rows"]["items"]["type"], "array");
    }

    #[tokio::test]
    async fn test_tool_execution() {
        let tool = echo_tool();
        let result = tool.execute(&ToolArguments::new("echo", json!({"text": "ping"}))).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "ping");
        assert_eq!(result.metadata.get("length"), Some(&"4".to_string()));
    }

    #[tokio::test]
    async fn test_missing_argument_is_invalid() {
        let tool = echo_tool();
        let err = tool.execute(&ToolArguments::new("echo", json!({"text": "  "}))).await.unwrap_err();
        assert!(matches!(err, SocietyError::InvalidToolArguments { ref tool, .. } if tool == "echo"));
    }
}
