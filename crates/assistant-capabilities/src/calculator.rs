//! Calculator Capability
//!
//! Basic arithmetic on two numbers.

use async_trait::async_trait;
use serde_json::json;

use assistant_core::{
    Capability, CapabilityContext, CapabilityResult, InputSchema, PropertySchema,
    Result as CoreResult,
};

/// Arithmetic operation supported by the calculator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "add" | "+" | "plus" => Some(Self::Add),
            "subtract" | "-" | "minus" => Some(Self::Subtract),
            "multiply" | "*" | "times" => Some(Self::Multiply),
            "divide" | "/" => Some(Self::Divide),
            _ => None,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }
}

/// Two-operand calculator
#[derive(Debug, Default)]
pub struct CalculatorCapability;

impl CalculatorCapability {
    pub const fn new() -> Self {
        Self
    }
}

/// Render without a trailing `.0` for whole numbers
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

#[async_trait]
impl Capability for CalculatorCapability {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Performs basic arithmetic (add, subtract, multiply, divide) on two numbers."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required_property(
                "operation",
                PropertySchema::string("Operation to perform")
                    .with_enum(["add", "subtract", "multiply", "divide"]),
            )
            .required_property("a", PropertySchema::number("First operand"))
            .required_property("b", PropertySchema::number("Second operand"))
    }

    async fn execute(&self, context: CapabilityContext) -> CoreResult<CapabilityResult> {
        let params = &context.parameters;

        let Some(raw_op) = params.str("operation") else {
            return Ok(CapabilityResult::failure_with_code(
                "Missing required parameter 'operation'",
                "MISSING_PARAMETER",
            ));
        };
        let Some(op) = Operation::parse(raw_op) else {
            return Ok(CapabilityResult::failure_with_code(
                format!("Unknown operation '{raw_op}'. Use add, subtract, multiply or divide."),
                "UNKNOWN_OPERATION",
            ));
        };
        let (Some(a), Some(b)) = (params.f64("a"), params.f64("b")) else {
            return Ok(CapabilityResult::failure_with_code(
                "Parameters 'a' and 'b' must both be numbers",
                "INVALID_OPERAND",
            ));
        };

        let value = match op {
            Operation::Add => a + b,
            Operation::Subtract => a - b,
            Operation::Multiply => a * b,
            Operation::Divide if b == 0.0 => {
                return Ok(CapabilityResult::failure_with_code(
                    "Division by zero",
                    "DIVISION_BY_ZERO",
                ));
            }
            Operation::Divide => a / b,
        };

        tracing::debug!(?op, a, b, value, "calculator evaluated");

        Ok(CapabilityResult::success_with_data(
            format!(
                "{} {} {} = {}",
                format_number(a),
                op.symbol(),
                format_number(b),
                format_number(value)
            ),
            json!({ "result": value }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::Parameters;

    async fn run(params: Parameters) -> CapabilityResult {
        CalculatorCapability::new()
            .execute(CapabilityContext::from_parameters(params))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add() {
        let result = run(Parameters::new()
            .with("operation", "add")
            .with("a", 15)
            .with("b", 27))
        .await;

        assert_eq!(result.output.as_deref(), Some("15 + 27 = 42"));
        assert_eq!(result.data, Some(json!({ "result": 42.0 })));
    }

    #[tokio::test]
    async fn test_numeric_strings_and_fractions() {
        let result = run(Parameters::new()
            .with("operation", "divide")
            .with("a", "7")
            .with("b", 2))
        .await;

        assert_eq!(result.output.as_deref(), Some("7 / 2 = 3.5"));
    }

    #[tokio::test]
    async fn test_division_by_zero() {
        let result = run(Parameters::new()
            .with("operation", "divide")
            .with("a", 1)
            .with("b", 0))
        .await;

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("DIVISION_BY_ZERO"));
        assert_eq!(result.to_model_text(), "Error: Division by zero");
    }

    #[tokio::test]
    async fn test_unknown_operation_and_bad_operands() {
        let result = run(Parameters::new()
            .with("operation", "modulo")
            .with("a", 1)
            .with("b", 2))
        .await;
        assert_eq!(result.error_code.as_deref(), Some("UNKNOWN_OPERATION"));

        let result = run(Parameters::new().with("operation", "add").with("a", 1)).await;
        assert_eq!(result.error_code.as_deref(), Some("INVALID_OPERAND"));

        let result = run(Parameters::new()).await;
        assert_eq!(result.error_code.as_deref(), Some("MISSING_PARAMETER"));
    }
}
