//! Hello World Capability
//!
//! Greets a person by name. Useful as a smoke test for the tool loop.

use async_trait::async_trait;

use assistant_core::{
    Capability, CapabilityContext, CapabilityResult, InputSchema, PropertySchema,
    Result as CoreResult,
};

/// Greets the named person
#[derive(Debug, Default)]
pub struct HelloWorldCapability;

impl HelloWorldCapability {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Capability for HelloWorldCapability {
    fn name(&self) -> &str {
        "hello_world"
    }

    fn description(&self) -> &str {
        "Greets a person by name with a friendly welcome message."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().property(
            "input",
            PropertySchema::string("Name of the person to greet").with_default("World"),
        )
    }

    async fn execute(&self, context: CapabilityContext) -> CoreResult<CapabilityResult> {
        let name = [context.input.as_str(), context.parameters.str("name").unwrap_or_default()]
            .into_iter()
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
            .unwrap_or("World");

        Ok(CapabilityResult::success(format!(
            "Hello, {name}! Welcome to the personal assistant."
        )))
    }
}
