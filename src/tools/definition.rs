use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire form of a tool schema, as offered to the model.
///
/// `parameters` is omitted for zero-parameter tools; several smaller models
/// reject an empty-but-present parameters object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub ok: bool,
    /// Text handed back to the model as the Tool-role message content.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl JsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolParam {
    pub name: String,
    pub json_type: JsonType,
    pub required: bool,
    pub description: String,
}

/// Schema metadata for one registered tool. Parameter order is preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParam>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn param(self, name: &str, json_type: JsonType, description: &str) -> Self {
        self.push_param(name, json_type, true, description)
    }

    pub fn optional_param(self, name: &str, json_type: JsonType, description: &str) -> Self {
        self.push_param(name, json_type, false, description)
    }

    fn push_param(mut self, name: &str, json_type: JsonType, required: bool, description: &str) -> Self {
        let description = if description.is_empty() {
            format!("{name} parameter")
        } else {
            description.to_string()
        };
        self.parameters.push(ToolParam {
            name: name.to_string(),
            json_type,
            required,
            description,
        });
        self
    }

    pub fn takes_no_arguments(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ToolParam> {
        self.parameters.iter().filter(|p| p.required)
    }

    pub fn to_definition(&self) -> ToolDefinition {
        let parameters = if self.parameters.is_empty() {
            None
        } else {
            let mut properties = serde_json::Map::new();
            for p in &self.parameters {
                properties.insert(
                    p.name.clone(),
                    serde_json::json!({ "type": p.json_type.as_str(), "description": p.description }),
                );
            }
            let required = self
                .required_params()
                .map(|p| Value::String(p.name.clone()))
                .collect::<Vec<_>>();
            Some(serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required
            }))
        };

        ToolDefinition {
            name: self.name.clone(),
            description: self.description.trim().to_string(),
            parameters,
        }
    }
}
