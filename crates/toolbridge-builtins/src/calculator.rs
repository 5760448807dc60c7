use async_trait::async_trait;
use serde_json::Value;
use toolbridge_core::{Arguments, BridgeError, BridgeResult, ErrorKind, InvocationResult};
use toolbridge_tools::{ParamType, ParameterSchema, ToolAdapter, ToolDescriptor};
use tracing::debug;

/// Parentheses nested deeper than this are rejected.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expression: &str) -> BridgeResult<Vec<Token>> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let token = match c {
            ' ' | '\t' => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal.parse::<f64>().map_err(|_| {
                    BridgeError::Validation(format!("invalid number '{literal}'"))
                })?;
                tokens.push(Token::Number(value));
                continue;
            }
            other => {
                return Err(BridgeError::Validation(format!(
                    "disallowed character '{other}' at position {i}; only numbers, + - * / and parentheses are allowed"
                )))
            }
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self, depth: usize) -> BridgeResult<f64> {
        let mut value = self.term(depth)?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term(depth)?;
            value = if op == Token::Plus { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self, depth: usize) -> BridgeResult<f64> {
        let mut value = self.factor(depth)?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let rhs = self.factor(depth)?;
            value = if op == Token::Star {
                value * rhs
            } else {
                if rhs == 0.0 {
                    return Err(BridgeError::Validation("division by zero".into()));
                }
                value / rhs
            };
        }
        Ok(value)
    }

    // factor := ('+' | '-') factor | number | '(' expr ')'
    fn factor(&mut self, depth: usize) -> BridgeResult<f64> {
        if depth > MAX_DEPTH {
            return Err(BridgeError::Validation("expression is nested too deeply".into()));
        }
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Minus) => Ok(-self.factor(depth + 1)?),
            Some(Token::Plus) => self.factor(depth + 1),
            Some(Token::LParen) => {
                let value = self.expr(depth + 1)?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(BridgeError::Validation("missing closing parenthesis".into())),
                }
            }
            Some(other) => Err(BridgeError::Validation(format!(
                "unexpected {} at token {}",
                describe(other),
                self.pos
            ))),
            None => Err(BridgeError::Validation("unexpected end of expression".into())),
        }
    }
}

fn describe(token: Token) -> &'static str {
    match token {
        Token::Number(_) => "number",
        Token::Plus => "'+'",
        Token::Minus => "'-'",
        Token::Star => "'*'",
        Token::Slash => "'/'",
        Token::LParen => "'('",
        Token::RParen => "')'",
    }
}

/// Evaluates an arithmetic expression over numbers, `+ - * /`, unary
/// minus and parentheses. Anything else is rejected before evaluation.
pub fn evaluate(expression: &str) -> BridgeResult<f64> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(BridgeError::Validation("expression is empty".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr(0)?;
    if let Some(extra) = parser.peek() {
        return Err(BridgeError::Validation(format!(
            "unexpected {} at token {}",
            describe(extra),
            parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(BridgeError::Validation("result is not a finite number".into()));
    }
    Ok(value)
}

/// Integral values print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Local arithmetic tool.
pub struct CalculatorTool {
    descriptor: ToolDescriptor,
}

impl CalculatorTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "calculator",
                "Evaluate an arithmetic expression using + - * / and parentheses",
                ParameterSchema::empty().with_param(
                    "expression",
                    ParamType::String,
                    "Arithmetic expression to evaluate (e.g. '2 + 3 * 4')",
                    true,
                ),
            ),
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAdapter for CalculatorTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: Arguments) -> BridgeResult<InvocationResult> {
        if let Err(e) = self.descriptor.parameters.validate(&args) {
            return Ok(InvocationResult::from_error(&e));
        }
        let Some(Value::String(expression)) = args.get("expression") else {
            return Ok(InvocationResult::failure(
                ErrorKind::Validation,
                "'expression' must be a string",
            ));
        };
        let expression = expression.trim();

        match evaluate(expression) {
            Ok(value) => Ok(InvocationResult::text(format!(
                "Calculation result: {expression} = {}",
                format_number(value)
            ))),
            Err(e) => {
                debug!(expression = %expression, error = %e, "calculation rejected");
                Ok(InvocationResult::failure(
                    ErrorKind::Validation,
                    format!("unable to calculate '{expression}': {}", e.description()),
                ))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn args(expression: &str) -> Arguments {
        let mut args = Arguments::new();
        args.insert("expression".into(), Value::String(expression.into()));
        args
    }

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate("-(3 - 5) * -2").unwrap(), -4.0);
        assert_eq!(evaluate("8 - 2 - 1").unwrap(), 5.0);
    }

    #[test]
    fn test_rejects_disallowed_input() {
        for bad in ["import os", "2 ** 3", "__import__('os')", "1.2.3", "(1 + 2", "1 +", "", "3 4"] {
            assert!(evaluate(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_division_by_zero() {
        let err = evaluate("1 / (2 - 2)").unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let expr = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(evaluate(&expr).is_err());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(132912.0), "132912");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-4.0), "-4");
    }

    #[tokio::test]
    async fn test_calculator_tool_success() {
        let tool = CalculatorTool::new();
        let result = tool.invoke(args("234 * 568")).await.unwrap();
        assert!(result.success);
        assert_eq!(
            result.to_display_string(),
            "Calculation result: 234 * 568 = 132912"
        );
    }

    #[tokio::test]
    async fn test_calculator_tool_failures() {
        let tool = CalculatorTool::new();
        let result = tool.invoke(args("import os")).await.unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::Validation));
        assert!(result.to_display_string().starts_with("Error: "));

        let missing = tool.invoke(Arguments::new()).await.unwrap();
        assert_eq!(missing.error_kind(), Some(ErrorKind::Validation));

        let mut wrong_type = Arguments::new();
        wrong_type.insert("expression".into(), serde_json::json!(42));
        let result = tool.invoke(wrong_type).await.unwrap();
        assert!(!result.success);
    }
}
