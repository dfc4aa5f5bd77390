//! Expression-evaluation tool.
//!
//! Evaluates arithmetic and scientific expressions with `evalexpr`. Standard
//! function names (`sqrt`, `sin`, `ln`, ...) and the constants `pi` and `e`
//! are rewritten onto evalexpr's `math::` namespace before evaluation, and
//! `**` is accepted as an alternative to `^`.

use async_trait::async_trait;
use evalexpr::ContextWithMutableVariables;
use std::error::Error;

use crate::agentflow::context::AgentContext;
use crate::agentflow::tool::{JsonMap, Tool, ToolOutput, ToolParameter, ToolParameterType};

pub const TOOL_NAME: &str = "calculator";

/// Functions rewritten onto evalexpr's `math::` namespace. Longer names
/// first so `asin` is not mangled into `a math::sin`.
const FUNCTIONS: [&str; 14] = [
    "atan2", "sinh", "cosh", "tanh", "asin", "acos", "atan", "sqrt", "abs", "ln", "exp", "sin",
    "cos", "tan",
];

/// A stateless scientific calculator.
pub struct CalculatorTool;

impl CalculatorTool {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate an expression to a float.
    pub fn evaluate(&self, expression: &str) -> Result<f64, Box<dyn Error + Send + Sync>> {
        let prepared = prepare_expression(expression);

        let mut context: evalexpr::HashMapContext = evalexpr::HashMapContext::new();
        let _ = context.set_value(
            "math::PI".to_string(),
            evalexpr::Value::Float(std::f64::consts::PI),
        );
        let _ = context.set_value(
            "math::E".to_string(),
            evalexpr::Value::Float(std::f64::consts::E),
        );

        match evalexpr::eval_with_context(&prepared, &context) {
            Ok(value) => value
                .as_number()
                .map_err(|_| "result is not a number".into()),
            Err(e) => Err(format!("evaluation error: {}", e).into()),
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite standard math notation into evalexpr's dialect.
fn prepare_expression(expression: &str) -> String {
    let mut prepared = expression.trim().replace("**", "^");

    for func in &FUNCTIONS {
        prepared = prefix_function(&prepared, func);
    }

    prepared = replace_constant(&prepared, "pi", "math::PI");
    prepared = replace_constant(&prepared, "e", "math::E");
    prepared
}

/// Prefix standalone `func(` occurrences with `math::`, skipping ones that
/// are already prefixed or part of a longer identifier.
fn prefix_function(expr: &str, func: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let func_chars: Vec<char> = func.chars().collect();
    let mut result = String::new();
    let mut i = 0usize;

    while i < chars.len() {
        if i + func_chars.len() < chars.len() + 1
            && chars[i..i + func_chars.len()] == func_chars[..]
        {
            let boundary_before = i == 0 || (!chars[i - 1].is_alphanumeric() && chars[i - 1] != ':');
            let next = chars.get(i + func_chars.len());
            if boundary_before && next == Some(&'(') {
                result.push_str("math::");
                result.push_str(func);
                i += func_chars.len();
                continue;
            }
        }
        result.push(chars[i]);
        i += 1;
    }
    result
}

/// Replace a standalone constant name, leaving longer identifiers alone.
fn replace_constant(expr: &str, constant: &str, replacement: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let constant_chars: Vec<char> = constant.chars().collect();
    let mut result = String::new();
    let mut i = 0usize;

    while i < chars.len() {
        if i + constant_chars.len() <= chars.len()
            && chars[i..i + constant_chars.len()] == constant_chars[..]
        {
            let before_ok = i == 0 || (!chars[i - 1].is_alphanumeric() && chars[i - 1] != ':');
            let after_idx = i + constant_chars.len();
            let after_ok = after_idx >= chars.len()
                || (!chars[after_idx].is_alphanumeric() && chars[after_idx] != ':');
            if before_ok && after_ok {
                result.push_str(replacement);
                i += constant_chars.len();
                continue;
            }
        }
        result.push(chars[i]);
        i += 1;
    }
    result
}

#[async_trait]
impl Tool for CalculatorTool {
    fn get_name(&self) -> &str {
        TOOL_NAME
    }

    fn get_description(&self) -> &str {
        "Evaluates a mathematical expression and returns the numeric result."
    }

    fn get_argument_schema(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::new("expression", ToolParameterType::String)
            .with_description("The expression to evaluate, e.g. 'sqrt(16) + 2^3'")
            .required()]
    }

    async fn execute(
        &self,
        _context: &AgentContext,
        arguments: &JsonMap,
    ) -> Result<ToolOutput, Box<dyn Error + Send + Sync>> {
        let expression = arguments
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or("missing required argument 'expression'")?;
        let result = self.evaluate(expression)?;
        Ok(ToolOutput::Value(serde_json::json!(result)))
    }
}
