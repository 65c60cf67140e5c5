//! Calculator 工具：安全的算术表达式求值
//!
//! 递归下降解析，不执行任意代码。支持 `+ - * / % ^`、括号、一元负号、后缀 `!`，
//! 以及函数 `factorial(n)`、`sqrt(x)`、`abs(x)`。整数结果以 JSON 整数返回。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{Tool, ToolFault, ToolInput};

/// f64 可精确表示的最大阶乘参数
const MAX_FACTORIAL: f64 = 170.0;
/// 表达式长度上限
const MAX_EXPRESSION_LEN: usize = 1024;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, \
         postfix ! and the functions factorial(n), sqrt(x), abs(x). \
         Args: {\"expression\": \"5!\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression, e.g. \"factorial(5)\" or \"(2 + 3) * 4\""
                }
            },
            "required": ["expression"]
        })
    }

    async fn invoke(&self, input: &ToolInput) -> Result<Value, ToolFault> {
        let expression = input
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolFault::new("missing required argument `expression`"))?;
        let value = evaluate(expression).map_err(|e| {
            ToolFault::new(format!("cannot evaluate '{}': {}", expression, e.message))
                .with_detail(json!({ "expression": expression, "position": e.position }))
        })?;
        Ok(to_json_number(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
    pub position: usize,
}

impl EvalError {
    fn at(position: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// 求值入口
pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(EvalError::at(0, "expression is too long"));
    }
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(EvalError::at(0, "empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if let Some((at, token)) = parser.tokens.get(parser.pos) {
        return Err(EvalError::at(*at, format!("unexpected {:?}", token)));
    }
    if !value.is_finite() {
        return Err(EvalError::at(0, "result is not a finite number"));
    }
    Ok(value)
}

fn to_json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, EvalError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| EvalError::at(start, format!("bad number '{}'", text)))?;
                tokens.push((start, Token::Num(n)));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                tokens.push((start, Token::Ident(ident.to_lowercase())));
            }
            '+' | '-' | '*' | '/' | '%' | '^' | '!' => {
                tokens.push((i, Token::Op(c)));
                i += 1;
            }
            '(' => {
                tokens.push((i, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((i, Token::RParen));
                i += 1;
            }
            other => return Err(EvalError::at(i, format!("unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(at, _)| *at)
            .unwrap_or(0)
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut acc = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, EvalError> {
        let mut acc = self.unary()?;
        loop {
            let at = self.offset();
            let Some(op) = self.eat_op(&['*', '/', '%']) else {
                break;
            };
            let rhs = self.unary()?;
            if op != '*' && rhs == 0.0 {
                return Err(EvalError::at(at, "division by zero"));
            }
            acc = match op {
                '*' => acc * rhs,
                '/' => acc / rhs,
                _ => acc % rhs,
            };
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<f64, EvalError> {
        if self.eat_op(&['-']).is_some() {
            return Ok(-self.unary()?);
        }
        if self.eat_op(&['+']).is_some() {
            return self.unary();
        }
        self.power()
    }

    // 右结合：2^3^2 = 2^9
    fn power(&mut self) -> Result<f64, EvalError> {
        let base = self.postfix()?;
        if self.eat_op(&['^']).is_some() {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<f64, EvalError> {
        let mut value = self.primary()?;
        loop {
            let at = self.offset();
            if self.eat_op(&['!']).is_none() {
                break;
            }
            value = factorial(value).map_err(|msg| EvalError::at(at, msg))?;
        }
        Ok(value)
    }

    fn primary(&mut self) -> Result<f64, EvalError> {
        let at = self.offset();
        let token = self
            .tokens
            .get(self.pos)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| EvalError::at(at, "unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Token::Num(n) => Ok(n),
            Token::LParen => {
                let value = self.expr()?;
                self.expect_rparen()?;
                Ok(value)
            }
            Token::Ident(name) => {
                if self.peek() != Some(&Token::LParen) {
                    return Err(EvalError::at(at, format!("expected '(' after '{}'", name)));
                }
                self.pos += 1;
                let arg = self.expr()?;
                self.expect_rparen()?;
                match name.as_str() {
                    "factorial" | "fact" => factorial(arg).map_err(|msg| EvalError::at(at, msg)),
                    "sqrt" if arg < 0.0 => Err(EvalError::at(at, "sqrt of a negative number")),
                    "sqrt" => Ok(arg.sqrt()),
                    "abs" => Ok(arg.abs()),
                    other => Err(EvalError::at(at, format!("unknown function '{}'", other))),
                }
            }
            other => Err(EvalError::at(at, format!("unexpected {:?}", other))),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), EvalError> {
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            Ok(())
        } else {
            Err(EvalError::at(self.offset(), "expected ')'"))
        }
    }
}

fn factorial(n: f64) -> Result<f64, String> {
    if n < 0.0 || n.fract() != 0.0 {
        return Err(format!("factorial needs a non-negative integer, got {}", n));
    }
    if n > MAX_FACTORIAL {
        return Err(format!("factorial argument {} is too large", n));
    }
    Ok((1..=n as u64).fold(1.0, |acc, k| acc * k as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn input(expression: &str) -> ToolInput {
        let mut map = Map::new();
        map.insert("expression".to_string(), json!(expression));
        map
    }

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2").unwrap(), -4.0);
        assert_eq!(evaluate("7 % 4").unwrap(), 3.0);
    }

    #[test]
    fn test_factorial_forms() {
        assert_eq!(evaluate("5!").unwrap(), 120.0);
        assert_eq!(evaluate("factorial(5)").unwrap(), 120.0);
        assert_eq!(evaluate("0!").unwrap(), 1.0);
        assert!(evaluate("(-1)!").is_err());
        assert!(evaluate("2.5!").is_err());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(evaluate("1 / 0").unwrap_err().message, "division by zero");
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("import os").is_err());
        assert!(evaluate("sqrt(-4)").is_err());
        assert!(evaluate("(1 + 2").is_err());
    }

    #[tokio::test]
    async fn test_integral_result_is_json_integer() {
        let out = CalculatorTool.invoke(&input("factorial(5)")).await.unwrap();
        assert_eq!(out, json!(120));
        let out = CalculatorTool.invoke(&input("1 / 4")).await.unwrap();
        assert_eq!(out, json!(0.25));
    }

    #[tokio::test]
    async fn test_fault_reports_position() {
        let err = CalculatorTool.invoke(&input("1 + $")).await.unwrap_err();
        assert!(err.message.contains("unexpected character"));
        assert_eq!(err.detail["position"], 4);
    }
}
