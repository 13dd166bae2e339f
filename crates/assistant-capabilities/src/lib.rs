//! # assistant-capabilities
//!
//! Built-in capabilities for the personal assistant.
//!
//! | name          | what it does                                   |
//! |---------------|------------------------------------------------|
//! | `hello_world` | greets a person by name                        |
//! | `system_info` | OS, kernel, host, CPU count and memory         |
//! | `calculator`  | add, subtract, multiply or divide two numbers  |

mod calculator;
mod hello_world;
mod system_info;

use std::sync::Arc;

use assistant_core::{Capability, CapabilityRegistry, Result};

pub use calculator::CalculatorCapability;
pub use hello_world::HelloWorldCapability;
pub use system_info::SystemInfoCapability;

/// Re-export capabilities for easy registration
pub mod tools {
    pub use crate::{CalculatorCapability, HelloWorldCapability, SystemInfoCapability};
}

/// Every built-in capability
pub fn defaults() -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(HelloWorldCapability::new()),
        Arc::new(SystemInfoCapability::new()),
        Arc::new(CalculatorCapability::new()),
    ]
}

/// Register every built-in capability; fails without side effects if any
/// name is already taken
pub fn register_defaults(registry: &CapabilityRegistry) -> Result<()> {
    registry.register_range(defaults())?;
    tracing::info!(count = registry.count(), "Registered built-in capabilities");
    Ok(())
}
