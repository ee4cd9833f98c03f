//! Arithmetic evaluation of model formulas
//!
//! Formulas are small expressions over variable names, e.g.
//! `households * ownership_rate / 12`. Only `+ - * /`, unary minus and
//! parentheses are understood. A formula that still contains unknown words
//! after substitution is not evaluated; the product of the bound values is
//! used instead, which is what most free-form Fermi formulas intend.

use std::collections::BTreeMap;
use std::fmt;

/// Why a formula could not produce a value
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// Nothing to evaluate
    Empty,
    /// Structurally invalid expression
    Malformed(String),
    /// Division by zero
    DivisionByZero,
    /// Result overflowed or is undefined
    NonFinite,
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::Empty => write!(f, "empty formula"),
            FormulaError::Malformed(msg) => write!(f, "malformed formula: {}", msg),
            FormulaError::DivisionByZero => write!(f, "division by zero"),
            FormulaError::NonFinite => write!(f, "non-finite result"),
        }
    }
}

/// Evaluated formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Computed value
    pub value: f64,
    /// Whether the product-of-bindings fallback was used
    pub used_fallback: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Op(char),
    Open,
    Close,
    Residual(String),
}

fn tokenize(expression: &str, bindings: &BTreeMap<String, f64>) -> Vec<Token> {
    let lookup = |name: &str| {
        bindings.get(name).copied().or_else(|| {
            bindings
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| *v)
        })
    };

    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_')
            {
                i += 1;
            }
            let literal: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            match literal.parse() {
                Ok(value) => tokens.push(Token::Number(value)),
                Err(_) => tokens.push(Token::Residual(literal)),
            }
        } else if c.is_alphanumeric() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            match lookup(&name) {
                Some(value) => tokens.push(Token::Number(value)),
                None => tokens.push(Token::Residual(name)),
            }
        } else {
            tokens.push(match c {
                '+' | '-' | '*' | '/' => Token::Op(c),
                '×' | '·' => Token::Op('*'),
                '÷' => Token::Op('/'),
                '−' => Token::Op('-'),
                '(' | '[' => Token::Open,
                ')' | ']' => Token::Close,
                other => Token::Residual(other.to_string()),
            });
            i += 1;
        }
    }
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err(FormulaError::DivisionByZero);
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, FormulaError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Op('-')) => Ok(-self.factor()?),
            Some(Token::Op('+')) => self.factor(),
            Some(Token::Open) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err(FormulaError::Malformed("unbalanced parenthesis".to_string())),
                }
            }
            Some(other) => Err(FormulaError::Malformed(format!("unexpected {:?}", other))),
            None => Err(FormulaError::Malformed("unexpected end".to_string())),
        }
    }
}

/// Evaluate `formula` with `bindings`
///
/// A left-hand side (`total = a * b`) is ignored.
pub fn evaluate(
    formula: &str,
    bindings: &BTreeMap<String, f64>,
) -> Result<Evaluation, FormulaError> {
    let expression = formula.rsplit('=').next().unwrap_or(formula).trim();
    if expression.is_empty() {
        return Err(FormulaError::Empty);
    }

    let tokens = tokenize(expression, bindings);
    if tokens.iter().any(|t| matches!(t, Token::Residual(_))) {
        return product_of(bindings);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(FormulaError::Malformed(format!(
            "trailing input at token {}",
            parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(FormulaError::NonFinite);
    }
    Ok(Evaluation {
        value,
        used_fallback: false,
    })
}

fn product_of(bindings: &BTreeMap<String, f64>) -> Result<Evaluation, FormulaError> {
    if bindings.is_empty() {
        return Err(FormulaError::Malformed("no bound variables".to_string()));
    }
    let value: f64 = bindings.values().product();
    if !value.is_finite() {
        return Err(FormulaError::NonFinite);
    }
    Ok(Evaluation {
        value,
        used_fallback: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let b = bind(&[("a", 2.0), ("b", 3.0), ("c", 4.0)]);
        assert_eq!(evaluate("a + b * c", &b).unwrap().value, 14.0);
        assert_eq!(evaluate("(a + b) * c", &b).unwrap().value, 20.0);
        assert_eq!(evaluate("c / a - b", &b).unwrap().value, -1.0);
        assert_eq!(evaluate("-a * b", &b).unwrap().value, -6.0);
    }

    #[test]
    fn test_left_hand_side_and_unicode_operators() {
        let b = bind(&[("households", 1000.0), ("ownership_rate", 0.3)]);
        let eval = evaluate("pets = households × ownership_rate", &b).unwrap();
        assert!((eval.value - 300.0).abs() < 1e-9);
        assert!(!eval.used_fallback);
        assert_eq!(evaluate("households ÷ 4", &b).unwrap().value, 250.0);
    }

    #[test]
    fn test_numeric_literals() {
        let b = bind(&[("monthly", 10.0)]);
        assert_eq!(evaluate("monthly * 12", &b).unwrap().value, 120.0);
        assert_eq!(evaluate("monthly * 1_000", &b).unwrap().value, 10_000.0);
    }

    #[test]
    fn test_case_insensitive_binding() {
        let b = bind(&[("Population", 10.0)]);
        assert_eq!(evaluate("population * 2", &b).unwrap().value, 20.0);
    }

    #[test]
    fn test_unknown_identifier_falls_back_to_product() {
        let b = bind(&[("a", 2.0), ("b", 5.0)]);
        let eval = evaluate("a * b * mystery", &b).unwrap();
        assert!(eval.used_fallback);
        assert_eq!(eval.value, 10.0);

        let eval = evaluate("a ^ b", &b).unwrap();
        assert!(eval.used_fallback);
    }

    #[test]
    fn test_errors() {
        let b = bind(&[("a", 2.0), ("zero", 0.0)]);
        assert_eq!(evaluate("a / zero", &b), Err(FormulaError::DivisionByZero));
        assert_eq!(evaluate("  ", &b), Err(FormulaError::Empty));
        assert!(matches!(evaluate("a * * a", &b), Err(FormulaError::Malformed(_))));
        assert!(matches!(evaluate("(a * a", &b), Err(FormulaError::Malformed(_))));
        assert!(matches!(evaluate("a a", &b), Err(FormulaError::Malformed(_))));
        assert!(evaluate("x", &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_overflow_is_non_finite() {
        let b = bind(&[("big", 1e300)]);
        assert_eq!(evaluate("big * big", &b), Err(FormulaError::NonFinite));
    }
}
