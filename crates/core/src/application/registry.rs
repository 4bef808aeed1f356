// Tool Registry - immutable name -> descriptor map, built once at startup

use crate::domain::schema::input_schema;
use crate::domain::{ArgSpec, OUTPUT_DIR_ARG};
use crate::port::ToolAdapter;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Everything the server knows about one tool. Immutable once registered.
pub struct ToolDescriptor {
    name: String,
    description: String,
    schema: Vec<ArgSpec>,
    default_timeout: Duration,
    persists: bool,
    adapter: Arc<dyn ToolAdapter>,
}

impl ToolDescriptor {
    pub fn from_adapter(adapter: Arc<dyn ToolAdapter>) -> Self {
        Self {
            name: adapter.name().to_string(),
            description: adapter.description().to_string(),
            schema: adapter.schema(),
            default_timeout: adapter.default_timeout(),
            persists: adapter.persists_results(),
            adapter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &[ArgSpec] {
        &self.schema
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn persists(&self) -> bool {
        self.persists
    }

    pub fn adapter(&self) -> &dyn ToolAdapter {
        self.adapter.as_ref()
    }

    /// JSON Schema for the tool's arguments, as advertised to clients
    pub fn input_schema(&self) -> Value {
        if self.persists {
            let output_dir = json!({
                "type": "string",
                "description": "Folder (relative to the server's output root) to save results in",
            });
            input_schema(&self.schema, &[(OUTPUT_DIR_ARG, output_dir)])
        } else {
            input_schema(&self.schema, &[])
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("arguments", &self.schema.len())
            .field("default_timeout", &self.default_timeout)
            .field("persists", &self.persists)
            .finish()
    }
}

/// Registry of tools, read-only after initialization
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// - RegistryError::DuplicateTool if the name is already taken
    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) -> Result<(), RegistryError> {
        let descriptor = ToolDescriptor::from_adapter(adapter);
        if self.tools.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicateTool(descriptor.name().to_string()));
        }
        self.tools
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// # Errors
    /// - RegistryError::UnknownTool if no tool has this name
    pub fn lookup(&self, name: &str) -> Result<Arc<ToolDescriptor>, RegistryError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// All descriptors, sorted by name
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        self.tools.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// Test adapters (shared by application tests)
// ============================================================================

#[cfg(test)]
pub(crate) mod test_adapters {
    use crate::domain::{
        ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs,
        ValidationError,
    };
    use crate::port::{ParseError, ToolAdapter};
    use serde_json::{json, Value};
    use std::time::Duration;

    /// `echo <target>`; parses stdout lines into a list
    pub struct EchoAdapter {
        pub name: &'static str,
        pub fallback: ParseFallback,
    }

    impl EchoAdapter {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                fallback: ParseFallback::RawText,
            }
        }
    }

    impl ToolAdapter for EchoAdapter {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Echo a target"
        }

        fn schema(&self) -> Vec<ArgSpec> {
            vec![
                ArgSpec::required("target", ArgKind::String, "Target").with(Constraint::SafeText),
                ArgSpec::optional("mode", ArgKind::String, "Mode")
                    .with(Constraint::OneOf(&["lines", "strict"]))
                    .with_default("lines"),
                ArgSpec::optional("count", ArgKind::Integer, "Count")
                    .with(Constraint::IntRange { min: 1, max: 5 }),
            ]
        }

        fn default_timeout(&self) -> Duration {
            Duration::from_secs(30)
        }

        fn check(&self, args: &ValidatedArgs) -> Result<(), ValidationError> {
            if args.str("mode") == Some("strict") && !args.contains("count") {
                return Err(ValidationError::constraint(
                    "count",
                    "requires",
                    "strict mode requires 'count'",
                ));
            }
            Ok(())
        }

        fn build_command(&self, args: &ValidatedArgs) -> CommandSpec {
            CommandSpec::new("echo").arg(args.str("target").unwrap_or_default())
        }

        fn parse_output(&self, _args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
            if output.stdout.starts_with("garbage") {
                return Err(ParseError::Unrecognized("garbage".to_string()));
            }
            let lines: Vec<&str> = output.stdout.lines().collect();
            Ok(json!({ "lines": lines }))
        }

        fn accepts_exit_code(&self, code: i32) -> bool {
            code == 0 || code == 5
        }

        fn parse_fallback(&self) -> ParseFallback {
            self.fallback
        }

        fn persists_results(&self) -> bool {
            true
        }

        fn result_file_name(&self, args: &ValidatedArgs) -> Option<String> {
            args.str("target").map(|t| format!("{t}_echo.json"))
        }
    }
}
