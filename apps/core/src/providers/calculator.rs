use thiserror::Error;

use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Provider, ProviderError, QueryContext};
use crate::router::is_arithmetic;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unexpected '{0}'")]
    Unexpected(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NotFinite,
    #[error("expression nests deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// Nesting limit for parentheses, unary signs and exponents.
pub const MAX_DEPTH: usize = 256;

/// Arithmetic answers for the default set. Silent unless the residual is
/// an expression that evaluates.
pub struct Calculator;

impl Provider for Calculator {
    fn id(&self) -> ProviderId {
        ProviderId::Calculator
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let expression = query.residual.trim();
        if !is_arithmetic(expression) {
            return Ok(Vec::new());
        }
        let Ok(value) = evaluate(expression) else {
            return Ok(Vec::new());
        };
        let result = format_number(value);
        Ok(vec![Candidate::new(
            format!("calc:{expression}"),
            format!("= {result}"),
            Action::CopyText { text: result },
        )
        .with_subtitle("Copy to clipboard")
        .with_icon("accessories-calculator")
        .pinned()])
    }
}

pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    let mut parser = Parser {
        chars: expression.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(&c) = parser.chars.get(parser.pos) {
        return Err(EvalError::Unexpected(c));
    }
    if !value.is_finite() {
        return Err(EvalError::NotFinite);
    }
    Ok(value)
}

/// Integers print without a fraction; everything else keeps up to ten
/// decimals with trailing zeros trimmed.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let fixed = format!("{value:.10}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

// expr   := term (('+' | '-') term)*
// term   := unary (('*' | '/' | '%') unary)*
// unary  := ('-' | '+') unary | power
// power  := atom ('^' unary)?
// atom   := number | '(' expr ')'
struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, EvalError> {
        let mut value = self.unary()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err(EvalError::DivisionByZero),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    // Every nesting path (parentheses, signs, exponents) passes through here.
    fn unary(&mut self) -> Result<f64, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, EvalError> {
        let base = self.atom()?;
        if self.peek() == Some('^') {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                match self.bump() {
                    Some(')') => Ok(value),
                    Some(c) => Err(EvalError::Unexpected(c)),
                    None => Err(EvalError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(EvalError::Unexpected(c)),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn number(&mut self) -> Result<f64, EvalError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| EvalError::Unexpected(self.chars[start]))
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate, format_number, Calculator, EvalError};
    use crate::model::Action;
    use crate::registry::{Provider, QueryContext};

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("2+3*4").unwrap(), 14.0);
        assert_eq!(evaluate("(2+3)*4").unwrap(), 20.0);
        assert_eq!(evaluate("2^3^2").unwrap(), 512.0);
        assert_eq!(evaluate("-2^2").unwrap(), -4.0);
        assert_eq!(evaluate("10 % 4").unwrap(), 2.0);
        assert_eq!(evaluate("7 / 2").unwrap(), 3.5);
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(evaluate("1/0"), Err(EvalError::DivisionByZero));
        assert_eq!(evaluate("(1+2"), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate("1+2)"), Err(EvalError::Unexpected(')')));
        assert!(evaluate("1..2+1").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected_without_recursing_forever() {
        let parens = "(".repeat(200_000) + "1+1";
        assert_eq!(evaluate(&parens), Err(EvalError::TooDeep));
        let signs = "-".repeat(200_000) + "1";
        assert_eq!(evaluate(&signs), Err(EvalError::TooDeep));
        let powers = "2^".repeat(100_000) + "1";
        assert_eq!(evaluate(&powers), Err(EvalError::TooDeep));

        let shallow = "(".repeat(50) + "1+1" + &")".repeat(50);
        assert_eq!(evaluate(&shallow), Ok(2.0));
    }

    #[test]
    fn calculator_stays_silent_on_runaway_input() {
        let query = "(".repeat(10_000) + "1+1";
        assert!(Calculator.search(&QueryContext::new(&query)).unwrap().is_empty());
    }

    #[test]
    fn formats_results() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(-2.5), "-2.5");
    }

    #[test]
    fn answers_only_arithmetic() {
        let candidates = Calculator.search(&QueryContext::new("2 + 2")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "= 4");
        assert!(candidates[0].always_show);
        assert_eq!(
            candidates[0].action,
            Action::CopyText {
                text: "4".to_string()
            }
        );

        assert!(Calculator.search(&QueryContext::new("firefox")).unwrap().is_empty());
        assert!(Calculator.search(&QueryContext::new("1/0")).unwrap().is_empty());
    }
}
