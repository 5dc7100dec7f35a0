//! Math tool — evaluates arithmetic expressions.
//!
//! Accepts digits, `+ - * / ^ ( ) .` and whitespace. `^` is exponentiation
//! (right-associative, binds tighter than unary minus) and a number or a
//! closing parenthesis directly before `(` multiplies: `2(3)` is `2*(3)`.
//! Every outcome, including rejected input, is reported as output text.

use async_trait::async_trait;
use neonchat_core::error::ToolError;
use neonchat_core::tool::Tool;

pub struct MathTool;

#[async_trait]
impl Tool for MathTool {
    fn name(&self) -> &str {
        "math"
    }

    fn description(&self) -> &str {
        "Evaluates mathematical expressions precisely. Use for numeric calculations, conversions, percentages and arithmetic expressions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to calculate (e.g. 2+2, 15*3.14, 100/7, 2^10)"
                }
            },
            "required": ["expression"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;
        Ok(evaluate_expression(expr))
    }
}

/// Evaluate `expr` and render the outcome as `"<expr> = <result>"` or as an
/// explanatory message.
pub fn evaluate_expression(expr: &str) -> String {
    if !is_whitelisted(expr) {
        return format!(
            "Unsupported expression: \"{expr}\". Use only numbers and basic operators (+, -, *, /, ^, ())."
        );
    }

    match evaluate(expr) {
        Ok(value) if value.is_finite() => format!("{expr} = {}", format_number(value)),
        Ok(_) => format!("Invalid result for: \"{expr}\""),
        Err(e) => format!("Could not evaluate \"{expr}\": {e}"),
    }
}

fn is_whitelisted(expr: &str) -> bool {
    expr.chars().all(|c| {
        c.is_ascii_digit() || matches!(c, '+' | '-' | '*' | '/' | '^' | '(' | ')' | '.' | ' ' | '\t' | '\n' | '\r')
    })
}

/// Integers print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ── Recursive-descent expression evaluator ────────────────────────────────

/// Evaluate an arithmetic expression. Division by zero yields an infinite
/// or NaN value rather than an error.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!(
            "Unexpected token at position {}: {:?}",
            parser.pos, parser.tokens[parser.pos]
        ));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '^' => { tokens.push(Token::Caret); i += 1; }
            '(' => {
                // Implicit multiplication: `2(` and `)(`
                if matches!(tokens.last(), Some(Token::Number(_)) | Some(Token::RParen)) {
                    tokens.push(Token::Star);
                }
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => { tokens.push(Token::RParen); i += 1; }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| format!("Invalid number: {num_str}"))?;
                tokens.push(Token::Number(num));
            }
            c => return Err(format!("Unexpected character: '{c}'")),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.consume();
                    left += self.parse_term()?;
                }
                Token::Minus => {
                    self.consume();
                    left -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term = unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<f64, String> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.consume();
                    left *= self.parse_unary()?;
                }
                Token::Slash => {
                    self.consume();
                    left /= self.parse_unary()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // unary = ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(-self.parse_unary()?)
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // power = primary ('^' unary)?
    fn parse_power(&mut self) -> Result<f64, String> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // primary = NUMBER | '(' expr ')'
    fn parse_primary(&mut self) -> Result<f64, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(*n),
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err("Expected closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("Unexpected token: {tok:?}")),
            None => Err("Unexpected end of expression".into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_multiplication_and_power() {
        assert_eq!(evaluate_expression("2(3)+4^2"), "2(3)+4^2 = 22");
    }

    #[test]
    fn operator_precedence() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(evaluate("2^3^2").unwrap(), 512.0);
    }

    #[test]
    fn power_binds_tighter_than_negation() {
        assert_eq!(evaluate("-2^2").unwrap(), -4.0);
        assert_eq!(evaluate("2^-1").unwrap(), 0.5);
    }

    #[test]
    fn adjacent_parentheses_multiply() {
        assert_eq!(evaluate("(1+1)(2+3)").unwrap(), 10.0);
    }

    #[test]
    fn decimals_and_division() {
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate_expression("100/8"), "100/8 = 12.5");
    }

    #[test]
    fn whitespace_is_allowed() {
        assert_eq!(evaluate_expression("1 +\n2"), "1 +\n2 = 3");
    }

    #[test]
    fn disallowed_characters_are_reported() {
        let out = evaluate_expression("sqrt(4)");
        assert!(out.starts_with("Unsupported expression: \"sqrt(4)\""));
    }

    #[test]
    fn division_by_zero_is_invalid_result() {
        assert_eq!(evaluate_expression("1/0"), "Invalid result for: \"1/0\"");
        assert_eq!(evaluate_expression("0/0"), "Invalid result for: \"0/0\"");
    }

    #[test]
    fn malformed_expression_is_reported() {
        let out = evaluate_expression("2 +");
        assert!(out.starts_with("Could not evaluate \"2 +\""));
        assert!(evaluate_expression("").starts_with("Could not evaluate"));
        assert!(evaluate_expression("1..2").contains("Invalid number"));
    }

    #[test]
    fn large_values_keep_float_formatting() {
        assert_eq!(evaluate_expression("10^20"), "10^20 = 100000000000000000000");
    }

    #[tokio::test]
    async fn tool_execute() {
        let out = MathTool
            .execute(serde_json::json!({"expression": "2+2"}))
            .await
            .unwrap();
        assert_eq!(out, "2+2 = 4");
    }

    #[tokio::test]
    async fn tool_missing_expression() {
        let result = MathTool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn schema_forbids_extra_properties() {
        let def = MathTool.to_definition();
        assert_eq!(def.name, "math");
        assert_eq!(def.parameters["additionalProperties"], false);
    }
}
