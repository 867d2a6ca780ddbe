use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use serde_json::Value;

use crate::error::AppError;
use crate::tools::definition::{ToolCall, ToolDefinition, ToolDescriptor, ToolResult};

/// Handler signature for a registered tool. `Ctx` is the read-only data
/// source the tool queries (the genealogy database in production).
pub type ToolHandler<Ctx> = fn(&Ctx, &Value) -> Result<Value, AppError>;

struct RegisteredTool<Ctx> {
    descriptor: ToolDescriptor,
    handler: ToolHandler<Ctx>,
}

/// Static name -> handler table built once at startup.
pub struct ToolRegistry<Ctx> {
    tools: Vec<RegisteredTool<Ctx>>,
    by_name: HashMap<String, usize>,
}

impl<Ctx> Default for ToolRegistry<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx> ToolRegistry<Ctx> {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: ToolDescriptor, handler: ToolHandler<Ctx>) -> Result<(), AppError> {
        if descriptor.name.trim().is_empty() {
            return Err(AppError::Config("Tool name must not be empty".to_string()));
        }
        if self.by_name.contains_key(&descriptor.name) {
            return Err(AppError::Config(format!(
                "Tool '{}' is registered twice",
                descriptor.name
            )));
        }
        self.by_name.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { descriptor, handler });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.descriptor.name.as_str()).collect()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&idx| &self.tools[idx].descriptor)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.descriptor.to_definition()).collect()
    }

    /// Run one model-requested call. Never fails: unknown tools, bad
    /// arguments, handler errors and handler panics all come back as text
    /// for the model to read.
    pub fn execute(&self, ctx: &Ctx, call: &ToolCall) -> ToolResult {
        let started = Instant::now();
        let (ok, content) = match self.invoke(ctx, &call.name, &call.arguments) {
            Ok(v) => (true, render_output(&v)),
            Err(msg) => (false, msg),
        };
        let duration_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;

        ToolResult {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            ok,
            content,
            duration_ms: Some(duration_ms),
        }
    }

    /// Look up `name` and call it. The `Err` side is already the message
    /// destined for the conversation.
    pub fn invoke(&self, ctx: &Ctx, name: &str, arguments: &Value) -> Result<Value, String> {
        let Some(&idx) = self.by_name.get(name) else {
            return Err(format!(
                "Unknown tool `{name}`. Available tools: {}",
                self.names().join(", ")
            ));
        };
        let tool = &self.tools[idx];

        let args = if tool.descriptor.takes_no_arguments() {
            Value::Object(serde_json::Map::new())
        } else {
            normalize_arguments(&tool.descriptor, arguments)
                .map_err(|e| format!("Error in calling tool `{name}`: {e}"))?
        };

        let handler = tool.handler;
        match catch_unwind(AssertUnwindSafe(|| handler(ctx, &args))) {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(format!("Error in calling tool `{name}`: {e}")),
            Err(_) => Err(format!("Error in calling tool `{name}`: the tool crashed")),
        }
    }
}

fn normalize_arguments(descriptor: &ToolDescriptor, arguments: &Value) -> Result<Value, AppError> {
    let parsed = match arguments {
        Value::String(raw) if raw.trim().is_empty() => Value::Object(serde_json::Map::new()),
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .map_err(|_| AppError::Message(format!("arguments are not valid JSON: {raw}")))?,
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };

    let Value::Object(map) = &parsed else {
        return Err(AppError::Message("arguments must be a JSON object".to_string()));
    };

    let missing = descriptor
        .required_params()
        .filter(|p| map.get(&p.name).map_or(true, Value::is_null))
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(AppError::Message(format!(
            "missing required argument(s): {}",
            missing.join(", ")
        )));
    }

    Ok(parsed)
}

/// Strings pass through untouched; everything else becomes compact JSON.
pub fn render_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn as_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

pub fn require_str(args: &Value, key: &str) -> Result<String, AppError> {
    as_str(args, key).ok_or_else(|| AppError::Message(format!("Missing {key}")))
}
