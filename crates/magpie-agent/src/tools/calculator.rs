//! Arithmetic expression evaluation.

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::tool::{Tool, ToolContext};

/// Validated parameters for the calculator tool.
///
/// Tool inputs arrive as loose JSON; each tool converts them into a typed
/// record once, at the boundary.
#[derive(Debug, Clone)]
pub struct CalculatorParams {
    /// The expression to evaluate.
    pub expr: String,
}

impl TryFrom<serde_json::Value> for CalculatorParams {
    type Error = AgentError;

    fn try_from(args: serde_json::Value) -> Result<Self> {
        let expr = args
            .get("expr")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::Tool("missing required parameter 'expr'".to_string()))?;
        if expr.trim().is_empty() {
            return Err(AgentError::Tool("'expr' must not be empty".to_string()));
        }
        Ok(Self {
            expr: expr.to_string(),
        })
    }
}

/// Evaluates arithmetic expressions: `+ - * /`, parentheses, unary minus.
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, /, and parentheses."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expr": {
                    "type": "string",
                    "description": "The arithmetic expression to evaluate, e.g. \"2+2\" or \"(3.5*4)/2\""
                }
            },
            "required": ["expr"]
        })
    }

    async fn execute(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<String> {
        let params = CalculatorParams::try_from(args)?;
        let value = evaluate(&params.expr).map_err(AgentError::Tool)?;
        Ok(format_number(value))
    }
}

/// Render without a trailing `.0` for whole results.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expression parser
// ─────────────────────────────────────────────────────────────────────────────

/// Evaluate an expression string.
pub fn evaluate(expr: &str) -> std::result::Result<f64, String> {
    let mut parser = Parser {
        bytes: expr.as_bytes(),
        pos: 0,
    };
    let value = parser.expression()?;
    parser.skip_whitespace();
    if parser.pos < parser.bytes.len() {
        return Err(format!(
            "unexpected character '{}' at position {}",
            parser.bytes[parser.pos] as char,
            parser.pos
        ));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.bytes.get(self.pos).copied()
    }

    /// term (('+' | '-') term)*
    fn expression(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                b'+' => {
                    self.pos += 1;
                    value += self.term()?;
                }
                b'-' => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    /// factor (('*' | '/') factor)*
    fn term(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                b'*' => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                b'/' => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    /// number | '(' expression ')' | '-' factor
    fn factor(&mut self) -> std::result::Result<f64, String> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expression()?;
                if self.peek() != Some(b')') {
                    return Err("expected closing parenthesis".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(format!("unexpected character '{}'", c as char)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn number(&mut self) -> std::result::Result<f64, String> {
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_digit() || self.bytes[self.pos] == b'.')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        text.parse::<f64>()
            .map_err(|_| format!("invalid number '{}'", text))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(evaluate("2+2").unwrap(), 4.0);
        assert_eq!(evaluate("10 - 3").unwrap(), 7.0);
        assert_eq!(evaluate("6*7").unwrap(), 42.0);
        assert_eq!(evaluate("15/4").unwrap(), 3.75);
    }

    #[test]
    fn test_precedence_and_parens() {
        assert_eq!(evaluate("2+3*4").unwrap(), 14.0);
        assert_eq!(evaluate("(2+3)*4").unwrap(), 20.0);
        assert_eq!(evaluate("-(3+1)*2").unwrap(), -8.0);
    }

    #[test]
    fn test_errors() {
        assert!(evaluate("1/0").is_err());
        assert!(evaluate("2+").is_err());
        assert!(evaluate("(1+2").is_err());
        assert!(evaluate("2 + abc").is_err());
        assert!(evaluate("").is_err());
    }

    #[tokio::test]
    async fn test_tool_execution() {
        let tool = CalculatorTool;
        let result = tool
            .execute(
                serde_json::json!({"expr": "2+2"}),
                &crate::tool::ToolContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result, "4");
    }

    #[tokio::test]
    async fn test_tool_missing_expr() {
        let tool = CalculatorTool;
        let err = tool
            .execute(serde_json::json!({}), &crate::tool::ToolContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expr"));
    }

    #[test]
    fn test_params_validation() {
        let params = CalculatorParams::try_from(serde_json::json!({"expr": "1+1"})).unwrap();
        assert_eq!(params.expr, "1+1");

        assert!(CalculatorParams::try_from(serde_json::json!({"expr": "  "})).is_err());
        assert!(CalculatorParams::try_from(serde_json::json!({"expr": 5})).is_err());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(3.75), "3.75");
        assert_eq!(format_number(-2.0), "-2");
    }
}
