use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("Energy expression is empty")]
    Empty,
    #[error("Unexpected '{0}' in energy expression")]
    UnexpectedToken(String),
    #[error("Energy expression ends with an operator")]
    DanglingOperator,
    #[error("Calculation ids start at 1")]
    ZeroId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Term {
    sign: f64,
    /// 0-based calculation index.
    index: usize,
}

/// Signed sum of calculation energies written with 1-based ids, e.g. `1 - 2 - 3`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyExpression {
    terms: Vec<Term>,
}

impl EnergyExpression {
    /// 0-based indices of the calculations the expression reads.
    pub fn calculations(&self) -> impl Iterator<Item = usize> + '_ {
        self.terms.iter().map(|t| t.index)
    }

    /// Evaluates against per-calculation totals; `None` when any referenced calculation is
    /// missing, failed or has no energy.
    pub fn evaluate(&self, totals: &[Option<f64>]) -> Option<f64> {
        self.terms.iter().try_fold(0.0, |acc, term| {
            totals
                .get(term.index)
                .copied()
                .flatten()
                .map(|e| acc + term.sign * e)
        })
    }
}

impl FromStr for EnergyExpression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut terms = Vec::new();
        let mut sign = 1.0;
        let mut expect_operand = true;
        let mut chars = s.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else if c == '+' || c == '-' {
                chars.next();
                let op = if c == '-' { -1.0 } else { 1.0 };
                if expect_operand {
                    if !terms.is_empty() || sign < 0.0 {
                        return Err(ExpressionError::UnexpectedToken(c.to_string()));
                    }
                    sign = op;
                } else {
                    sign = op;
                    expect_operand = true;
                }
            } else if c.is_ascii_digit() {
                if !expect_operand {
                    return Err(ExpressionError::UnexpectedToken(c.to_string()));
                }
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let id: usize = digits
                    .parse()
                    .map_err(|_| ExpressionError::UnexpectedToken(digits.clone()))?;
                if id == 0 {
                    return Err(ExpressionError::ZeroId);
                }
                terms.push(Term {
                    sign,
                    index: id - 1,
                });
                sign = 1.0;
                expect_operand = false;
            } else {
                return Err(ExpressionError::UnexpectedToken(c.to_string()));
            }
        }
        if terms.is_empty() {
            return Err(ExpressionError::Empty);
        }
        if expect_operand {
            return Err(ExpressionError::DanglingOperator);
        }
        Ok(Self { terms })
    }
}

impl fmt::Display for EnergyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, term) in self.terms.iter().enumerate() {
            match (n, term.sign < 0.0) {
                (0, true) => write!(f, "-{}", term.index + 1)?,
                (0, false) => write!(f, "{}", term.index + 1)?,
                (_, true) => write!(f, " - {}", term.index + 1)?,
                (_, false) => write!(f, " + {}", term.index + 1)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_energy_expression_subtracts_components() {
        let expr: EnergyExpression = "1 - 2 - 3".parse().unwrap();
        assert_eq!(expr.calculations().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(expr.evaluate(&[Some(-10.0), Some(-4.0), Some(-3.5)]), Some(-2.5));
        assert_eq!(expr.to_string(), "1 - 2 - 3");
    }

    #[test]
    fn compact_and_signed_forms_parse() {
        let expr: EnergyExpression = "-2+1".parse().unwrap();
        assert_eq!(expr.evaluate(&[Some(1.0), Some(5.0)]), Some(-4.0));
        assert_eq!(expr.to_string(), "-2 + 1");
    }

    #[test]
    fn missing_energies_make_the_expression_undefined() {
        let expr: EnergyExpression = "1 - 2".parse().unwrap();
        assert_eq!(expr.evaluate(&[Some(1.0), None]), None);
        assert_eq!(expr.evaluate(&[Some(1.0)]), None);
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert_eq!("".parse::<EnergyExpression>(), Err(ExpressionError::Empty));
        assert_eq!("1 -".parse::<EnergyExpression>(), Err(ExpressionError::DanglingOperator));
        assert_eq!("0 + 1".parse::<EnergyExpression>(), Err(ExpressionError::ZeroId));
        assert!(matches!(
            "1 2".parse::<EnergyExpression>(),
            Err(ExpressionError::UnexpectedToken(_))
        ));
        assert!(matches!(
            "1 * 2".parse::<EnergyExpression>(),
            Err(ExpressionError::UnexpectedToken(_))
        ));
    }
}
