//! Two-operand arithmetic tools: add, subtract, multiply, divide.
//!
//! Integer operands give integer results when the result is exact and fits
//! in an `i64`; everything else is computed in `f64`.

use async_trait::async_trait;
use serde_json::{Number, Value};
use toolrelay_core::error::ToolError;
use toolrelay_core::schema::{ParamType, ParameterSchema};
use toolrelay_core::tool::{Tool, ToolArguments};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

pub struct ArithmeticTool {
    op: Operation,
}

impl ArithmeticTool {
    pub fn new(op: Operation) -> Self {
        Self { op }
    }

    pub fn add() -> Self {
        Self::new(Operation::Add)
    }

    pub fn subtract() -> Self {
        Self::new(Operation::Subtract)
    }

    pub fn multiply() -> Self {
        Self::new(Operation::Multiply)
    }

    pub fn divide() -> Self {
        Self::new(Operation::Divide)
    }

    fn apply(&self, a: &Number, b: &Number) -> Result<Value, String> {
        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            let exact = match self.op {
                Operation::Add => x.checked_add(y),
                Operation::Subtract => x.checked_sub(y),
                Operation::Multiply => x.checked_mul(y),
                Operation::Divide => {
                    if y == 0 {
                        return Err("Division by zero".into());
                    }
                    match x.checked_rem(y) {
                        Some(0) => x.checked_div(y),
                        _ => None,
                    }
                }
            };
            if let Some(v) = exact {
                return Ok(Value::from(v));
            }
        }

        let (x, y) = match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err("operands are not representable as f64".into()),
        };
        let v = match self.op {
            Operation::Add => x + y,
            Operation::Subtract => x - y,
            Operation::Multiply => x * y,
            Operation::Divide => {
                if y == 0.0 {
                    return Err("Division by zero".into());
                }
                x / y
            }
        };
        Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| format!("result is not a finite number: {v}"))
    }
}

#[async_trait]
impl Tool for ArithmeticTool {
    fn name(&self) -> &str {
        match self.op {
            Operation::Add => "add_numbers",
            Operation::Subtract => "subtract_numbers",
            Operation::Multiply => "multiply_numbers",
            Operation::Divide => "divide_numbers",
        }
    }

    fn description(&self) -> &str {
        match self.op {
            Operation::Add => {
                "Add two numbers. Use this when the user asks for the sum of two numbers."
            }
            Operation::Subtract => {
                "Subtract the second number from the first. Use this when the user asks for a difference."
            }
            Operation::Multiply => {
                "Multiply two numbers. Use this when the user asks for the product of two numbers."
            }
            Operation::Divide => {
                "Divide the first number by the second. Use this when the user asks for a quotient."
            }
        }
    }

    fn parameters(&self) -> ParameterSchema {
        let (first, second) = match self.op {
            Operation::Add => ("The first number to add.", "The second number to add."),
            Operation::Subtract => ("The number to subtract from.", "The number to subtract."),
            Operation::Multiply => ("The first factor.", "The second factor."),
            Operation::Divide => ("The dividend.", "The divisor."),
        };
        ParameterSchema::new()
            .required("num1", ParamType::Number, first)
            .required("num2", ParamType::Number, second)
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<Value, ToolError> {
        let a = arguments.number("num1")?;
        let b = arguments.number("num2")?;
        self.apply(a, b).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason,
        })
    }
}
