//! Explicit tool registry.
//!
//! Tools are added with discrete [`ToolRegistry::register`] calls at startup.
//! Parameter schemas are compiled once, at registration, and every dispatch is
//! validated against them before the tool body runs.

use jsonschema::{Draft, Validator};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::tools::{ToolContext, ToolFailure, ToolName, ToolResult};

/// Tool body. Receives schema-valid arguments.
pub type ToolFn = fn(&Value, &mut ToolContext<'_>) -> ToolResult;

/// Name, advertised schema and body of one tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: ToolName,
    pub description: &'static str,
    pub parameters: Value,
    pub invoke: ToolFn,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    Duplicate(ToolName),
    #[error("tool `{tool}` has an invalid parameter schema: {message}")]
    InvalidSchema { tool: ToolName, message: String },
}

struct Registered {
    descriptor: ToolDescriptor,
    validator: Validator,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if self.get(descriptor.name).is_some() {
            return Err(RegistryError::Duplicate(descriptor.name));
        }
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&descriptor.parameters)
            .map_err(|err| RegistryError::InvalidSchema {
                tool: descriptor.name,
                message: err.to_string(),
            })?;
        debug!(tool = %descriptor.name, "registered tool");
        self.tools.push(Registered {
            descriptor,
            validator,
        });
        Ok(())
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.tools
            .iter()
            .map(|tool| tool.descriptor.name.as_str())
            .collect()
    }

    pub fn contains(&self, name: ToolName) -> bool {
        self.get(name).is_some()
    }

    /// Function-calling schemas in the shape chat-completion APIs expect.
    pub fn schema_for_oracle(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.descriptor.name.as_str(),
                        "description": tool.descriptor.description,
                        "parameters": tool.descriptor.parameters,
                    }
                })
            })
            .collect()
    }

    /// Run tool `name` with already-parsed arguments.
    #[instrument(skip_all, fields(tool = name))]
    pub fn dispatch(&self, name: &str, args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
        let Some(tool) = name.parse::<ToolName>().ok().and_then(|parsed| self.get(parsed)) else {
            return ToolResult::failed(ToolFailure::UnknownTool {
                name: name.to_string(),
                available: self.names().into_iter().map(str::to_string).collect(),
            });
        };

        let errors: Vec<String> = tool
            .validator
            .iter_errors(args)
            .map(|err| err.to_string())
            .collect();
        if !errors.is_empty() {
            debug!(errors = errors.len(), "rejected tool arguments");
            return ToolResult::failed(ToolFailure::InvalidArguments {
                tool: name.to_string(),
                errors,
            });
        }

        (tool.descriptor.invoke)(args, ctx)
    }

    /// Like [`ToolRegistry::dispatch`] but takes the raw JSON text an oracle
    /// produced. Blank text means "no arguments".
    pub fn dispatch_raw(&self, name: &str, raw: &str, ctx: &mut ToolContext<'_>) -> ToolResult {
        let args = if raw.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(args) => args,
                Err(err) => {
                    return ToolResult::failed(ToolFailure::InvalidArguments {
                        tool: name.to_string(),
                        errors: vec![format!("arguments are not valid JSON: {err}")],
                    });
                }
            }
        };
        self.dispatch(name, &args, ctx)
    }

    fn get(&self, name: ToolName) -> Option<&Registered> {
        self.tools.iter().find(|tool| tool.descriptor.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestProject;
    use crate::tools::{fs, todo};

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for descriptor in [fs::tree(), fs::read_file(), todo::add(), todo::view()] {
            registry.register(descriptor).expect("register");
        }
        registry
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = registry();
        let err = registry.register(fs::tree()).expect_err("duplicate");
        assert!(matches!(err, RegistryError::Duplicate(ToolName::Tree)));
    }

    #[test]
    fn invalid_schema_is_rejected_at_registration() {
        let mut registry = ToolRegistry::new();
        let mut descriptor = todo::view();
        descriptor.parameters = json!({"type": "not-a-type"});
        let err = registry.register(descriptor).expect_err("invalid schema");
        assert!(matches!(err, RegistryError::InvalidSchema { .. }));
    }

    #[test]
    fn schemas_follow_registration_order() {
        let schemas = registry().schema_for_oracle();
        let names: Vec<&str> = schemas
            .iter()
            .filter_map(|schema| schema["function"]["name"].as_str())
            .collect();
        assert_eq!(names, vec!["tree", "read_file", "todo_add", "todo_view"]);
        assert_eq!(schemas[0]["type"], "function");
    }

    #[test]
    fn unknown_and_unregistered_tools_fail_with_unknown_tool() {
        let project = TestProject::new().expect("project");
        let mut session = project.session(false, false);
        let registry = registry();

        for name in ["shell", "write_file"] {
            let result = registry.dispatch(name, &json!({}), &mut session.context());
            match result.error {
                Some(ToolFailure::UnknownTool { name: got, available }) => {
                    assert_eq!(got, name);
                    assert!(available.contains(&"tree".to_string()));
                }
                other => panic!("expected UnknownTool, got {other:?}"),
            }
        }
    }

    #[test]
    fn arguments_are_validated_before_invocation() {
        let project = TestProject::new().expect("project");
        let mut session = project.session(false, false);
        let registry = registry();

        let result = registry.dispatch("todo_add", &json!({"text": 5}), &mut session.context());
        assert!(matches!(
            result.error,
            Some(ToolFailure::InvalidArguments { .. })
        ));
        assert!(session.tasks.is_empty());
    }

    #[test]
    fn raw_dispatch_handles_blank_and_malformed_json() {
        let project = TestProject::new().expect("project");
        let mut session = project.session(false, false);
        let registry = registry();

        let viewed = registry.dispatch_raw("todo_view", "", &mut session.context());
        assert!(viewed.success);

        let broken = registry.dispatch_raw("todo_add", "{\"text\": ", &mut session.context());
        match broken.error {
            Some(ToolFailure::InvalidArguments { errors, .. }) => {
                assert!(errors[0].starts_with("arguments are not valid JSON"));
            }
            other => panic!("expected InvalidArguments, got {other:?}"),
        }
    }
}
