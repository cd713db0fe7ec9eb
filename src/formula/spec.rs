//! Parsed model formulas and their linear design expansion.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::data::DataTable;
use crate::domain::ParameterVector;
use crate::error::MupeError;
use crate::formula::FormulaError;
use crate::formula::bind::BoundExpr;
use crate::formula::expr::{BinOp, Expr};
use crate::formula::parse::parse_formula;

/// Column name used for the intercept coefficient.
pub const INTERCEPT: &str = "(Intercept)";

/// A model formula `response ~ predictor`.
///
/// For linear fits the predictor is read as a sum of design terms; for nonlinear
/// fits it is an arbitrary expression over columns and named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    response: Expr,
    predictor: Expr,
}

impl ModelSpec {
    pub fn parse(text: &str) -> Result<Self, FormulaError> {
        let (response, predictor) = parse_formula(text)?;
        Ok(Self {
            response,
            predictor,
        })
    }

    pub fn response(&self) -> &Expr {
        &self.response
    }

    pub fn predictor(&self) -> &Expr {
        &self.predictor
    }

    /// Symbols referenced by the predictor side.
    pub fn predictor_symbols(&self) -> BTreeSet<String> {
        self.predictor.symbols()
    }

    /// Evaluate the response side on every row (columns only).
    pub fn response_values(&self, data: &DataTable) -> Result<Vec<f64>, MupeError> {
        let bound = BoundExpr::bind(&self.response, data, &[])?;
        (0..data.n_rows())
            .map(|row| {
                let y = bound.eval(data, row, &[]);
                if y.is_finite() {
                    Ok(y)
                } else {
                    Err(MupeError::NonFiniteData {
                        term: self.response.to_string(),
                        observation: row,
                    })
                }
            })
            .collect()
    }

    /// Read the predictor as `term + term + ...` (R-style).
    ///
    /// - the intercept is implicit; `+ 1` keeps it, `0 +` or `- 1` removes it
    /// - wrap arithmetic in `I(...)` to use it as a single term
    pub fn linear_terms(&self) -> Result<LinearTerms, FormulaError> {
        let mut flat = Vec::new();
        flatten_sum(&self.predictor, true, &mut flat);

        let mut intercept = true;
        let mut terms: Vec<Expr> = Vec::new();
        let mut seen = BTreeSet::new();
        for (positive, term) in flat {
            match term {
                Expr::Number(v) if *v == 1.0 => intercept = positive,
                Expr::Number(v) if *v == 0.0 => intercept = !positive,
                Expr::Number(v) => {
                    return Err(FormulaError::UnsupportedTerm {
                        term: v.to_string(),
                        reason: "constants other than 0 and 1 have no meaning as a linear term",
                    });
                }
                other if !positive => {
                    return Err(FormulaError::UnsupportedTerm {
                        term: other.to_string(),
                        reason: "only the intercept can be removed with '-'",
                    });
                }
                other => {
                    let name = other.to_string();
                    if !seen.insert(name.clone()) {
                        return Err(FormulaError::DuplicateTerm(name));
                    }
                    terms.push(other.clone());
                }
            }
        }

        if !intercept && terms.is_empty() {
            return Err(FormulaError::NoTerms);
        }
        Ok(LinearTerms { intercept, terms })
    }

    /// Build the response vector and design matrix for a linear fit.
    pub fn linear_design(&self, data: &DataTable) -> Result<Design, MupeError> {
        let terms = self.linear_terms()?;
        let x = terms.design_matrix(data)?;
        let y = self.response_values(data)?;
        Ok(Design {
            names: terms.names(),
            x,
            y: DVector::from_vec(y),
        })
    }

    /// Evaluate the predictor with named parameter values on every row.
    pub fn evaluate_nonlinear(&self, data: &DataTable, params: &ParameterVector) -> Result<Vec<f64>, MupeError> {
        let bound = BoundExpr::bind(&self.predictor, data, params.names())?;
        Ok((0..data.n_rows())
            .map(|row| bound.eval(data, row, params.values()))
            .collect())
    }
}

fn flatten_sum<'a>(expr: &'a Expr, positive: bool, out: &mut Vec<(bool, &'a Expr)>) {
    match expr {
        Expr::Binary {
            op: BinOp::Add,
            lhs,
            rhs,
        } => {
            flatten_sum(lhs, positive, out);
            flatten_sum(rhs, positive, out);
        }
        Expr::Binary {
            op: BinOp::Sub,
            lhs,
            rhs,
        } => {
            flatten_sum(lhs, positive, out);
            flatten_sum(rhs, !positive, out);
        }
        Expr::Neg(inner) => flatten_sum(inner, !positive, out),
        other => out.push((positive, other)),
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.response, self.predictor)
    }
}

impl FromStr for ModelSpec {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ModelSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        ModelSpec::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Design terms of a linear formula.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTerms {
    intercept: bool,
    terms: Vec<Expr>,
}

impl LinearTerms {
    pub fn n_columns(&self) -> usize {
        self.terms.len() + usize::from(self.intercept)
    }

    /// Coefficient names in column order.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.n_columns());
        if self.intercept {
            names.push(INTERCEPT.to_string());
        }
        names.extend(self.terms.iter().map(Expr::to_string));
        names
    }

    /// One row per observation, one column per term.
    pub fn design_matrix(&self, data: &DataTable) -> Result<DMatrix<f64>, MupeError> {
        let n = data.n_rows();
        let mut x = DMatrix::zeros(n, self.n_columns());
        let mut col = 0;
        if self.intercept {
            x.column_mut(0).fill(1.0);
            col = 1;
        }
        for term in &self.terms {
            let bound = BoundExpr::bind(term, data, &[])?;
            for row in 0..n {
                let v = bound.eval(data, row, &[]);
                if !v.is_finite() {
                    return Err(MupeError::NonFiniteData {
                        term: term.to_string(),
                        observation: row,
                    });
                }
                x[(row, col)] = v;
            }
            col += 1;
        }
        Ok(x)
    }
}

/// Response and design matrix for a linear least-squares problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    pub names: Vec<String>,
    pub x: DMatrix<f64>,
    pub y: DVector<f64>,
}

impl Design {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.x.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(text: &str) -> ModelSpec {
        ModelSpec::parse(text).unwrap()
    }

    #[test]
    fn intercept_is_implicit() {
        let terms = spec("y ~ x1 + log(x2)").linear_terms().unwrap();
        assert_eq!(terms.names(), vec!["(Intercept)", "x1", "log(x2)"]);
    }

    #[test]
    fn intercept_can_be_removed() {
        for text in ["y ~ 0 + x1", "y ~ x1 - 1", "y ~ -1 + x1"] {
            let terms = spec(text).linear_terms().unwrap();
            assert_eq!(terms.names(), vec!["x1"], "{text}");
            assert_eq!(terms.n_columns(), 1);
        }
        assert_eq!(spec("y ~ 1 + x1").linear_terms().unwrap().names(), vec!["(Intercept)", "x1"]);
    }

    #[test]
    fn rejects_meaningless_terms() {
        assert!(matches!(
            spec("y ~ x1 - x2").linear_terms(),
            Err(FormulaError::UnsupportedTerm { .. })
        ));
        assert!(matches!(
            spec("y ~ x1 + 2").linear_terms(),
            Err(FormulaError::UnsupportedTerm { .. })
        ));
        assert_eq!(
            spec("y ~ x1 + x1").linear_terms(),
            Err(FormulaError::DuplicateTerm("x1".to_string()))
        );
        assert_eq!(spec("y ~ 0").linear_terms(), Err(FormulaError::NoTerms));
    }

    #[test]
    fn builds_design_matrix() {
        let data = DataTable::from_columns([("x1", vec![1.0, 2.0, 3.0]), ("y", vec![2.0, 4.0, 6.0])]).unwrap();
        let design = spec("log(y) ~ x1 + I(x1^2)").linear_design(&data).unwrap();
        assert_eq!(design.names, vec!["(Intercept)", "x1", "I(x1^2)"]);
        assert_eq!(design.x.shape(), (3, 3));
        assert_eq!(design.x[(2, 0)], 1.0);
        assert_eq!(design.x[(2, 2)], 9.0);
        assert!((design.y[1] - 4.0_f64.ln()).abs() < 1e-15);
    }

    #[test]
    fn non_finite_terms_are_reported() {
        let data = DataTable::from_columns([("x1", vec![1.0, 0.0]), ("y", vec![1.0, 1.0])]).unwrap();
        let err = spec("y ~ log(x1)").linear_design(&data).unwrap_err();
        assert_eq!(
            err,
            MupeError::NonFiniteData {
                term: "log(x1)".to_string(),
                observation: 1
            }
        );
    }

    #[test]
    fn serializes_as_formula_text() {
        let model = spec("y~b0*x1^b1");
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, "\"y ~ b0 * x1^b1\"");
        let back: ModelSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
    }
}
