//! Expressions bound to a data table and a parameter list.
//!
//! Binding resolves every symbol to either a parameter slot or a column index
//! once, so evaluation inside the solver loops is a plain tree walk.
//!
//! Gradients with respect to the parameters are computed in forward mode: each
//! node carries its value plus one partial derivative per parameter.

use crate::data::DataTable;
use crate::error::MupeError;
use crate::formula::expr::{BinOp, Expr, Func};

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Const(f64),
    Column(usize),
    Param(usize),
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Func, Box<Node>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundExpr {
    root: Node,
    n_params: usize,
}

impl BoundExpr {
    /// Resolve `expr` against `params` first, then the columns of `data`.
    pub fn bind(expr: &Expr, data: &DataTable, params: &[String]) -> Result<Self, MupeError> {
        Ok(Self {
            root: bind_node(expr, data, params)?,
            n_params: params.len(),
        })
    }

    pub fn n_params(&self) -> usize {
        self.n_params
    }

    pub fn eval(&self, data: &DataTable, row: usize, params: &[f64]) -> f64 {
        debug_assert_eq!(params.len(), self.n_params);
        value(&self.root, data, row, params)
    }

    /// Value at `row`, writing `d value / d params[j]` into `grad[j]`.
    pub fn eval_gradient(&self, data: &DataTable, row: usize, params: &[f64], grad: &mut [f64]) -> f64 {
        debug_assert_eq!(params.len(), self.n_params);
        debug_assert_eq!(grad.len(), self.n_params);
        let dual = dual(&self.root, data, row, params);
        grad.copy_from_slice(&dual.d);
        dual.v
    }
}

fn bind_node(expr: &Expr, data: &DataTable, params: &[String]) -> Result<Node, MupeError> {
    let node = match expr {
        Expr::Number(v) => Node::Const(*v),
        Expr::Symbol(name) => {
            if let Some(idx) = params.iter().position(|p| p == name) {
                Node::Param(idx)
            } else if let Some(idx) = data.column_index(name) {
                Node::Column(idx)
            } else {
                return Err(MupeError::MissingColumn(name.clone()));
            }
        }
        Expr::Neg(inner) => Node::Neg(Box::new(bind_node(inner, data, params)?)),
        Expr::Binary { op, lhs, rhs } => Node::Binary(
            *op,
            Box::new(bind_node(lhs, data, params)?),
            Box::new(bind_node(rhs, data, params)?),
        ),
        Expr::Call { func, arg } => Node::Call(*func, Box::new(bind_node(arg, data, params)?)),
    };
    Ok(node)
}

fn value(node: &Node, data: &DataTable, row: usize, params: &[f64]) -> f64 {
    match node {
        Node::Const(v) => *v,
        Node::Column(idx) => data.column_at(*idx)[row],
        Node::Param(idx) => params[*idx],
        Node::Neg(inner) => -value(inner, data, row, params),
        Node::Binary(op, lhs, rhs) => op.apply(value(lhs, data, row, params), value(rhs, data, row, params)),
        Node::Call(func, arg) => func.apply(value(arg, data, row, params)),
    }
}

/// Value and gradient.
struct Dual {
    v: f64,
    d: Vec<f64>,
}

impl Dual {
    fn constant(v: f64, n: usize) -> Self {
        Self { v, d: vec![0.0; n] }
    }

    fn map(self, v: f64, scale: f64) -> Self {
        Self {
            v,
            d: self.d.into_iter().map(|d| d * scale).collect(),
        }
    }
}

fn dual(node: &Node, data: &DataTable, row: usize, params: &[f64]) -> Dual {
    let n = params.len();
    match node {
        Node::Const(v) => Dual::constant(*v, n),
        Node::Column(idx) => Dual::constant(data.column_at(*idx)[row], n),
        Node::Param(idx) => {
            let mut out = Dual::constant(params[*idx], n);
            out.d[*idx] = 1.0;
            out
        }
        Node::Neg(inner) => {
            let a = dual(inner, data, row, params);
            let v = -a.v;
            a.map(v, -1.0)
        }
        Node::Call(func, arg) => {
            let a = dual(arg, data, row, params);
            let scale = if a.d.iter().all(|d| *d == 0.0) {
                0.0
            } else {
                func.derivative(a.v)
            };
            let v = func.apply(a.v);
            a.map(v, scale)
        }
        Node::Binary(op, lhs, rhs) => {
            let a = dual(lhs, data, row, params);
            let b = dual(rhs, data, row, params);
            let v = op.apply(a.v, b.v);
            let d = a
                .d
                .iter()
                .zip(&b.d)
                .map(|(&da, &db)| match op {
                    BinOp::Add => da + db,
                    BinOp::Sub => da - db,
                    BinOp::Mul => da * b.v + a.v * db,
                    BinOp::Div => (da * b.v - a.v * db) / (b.v * b.v),
                    BinOp::Pow => {
                        // Only differentiate the pieces that depend on the
                        // parameter so `0^b` and `a^const` stay finite.
                        let mut g = 0.0;
                        if da != 0.0 {
                            g += b.v * a.v.powf(b.v - 1.0) * da;
                        }
                        if db != 0.0 {
                            g += v * a.v.ln() * db;
                        }
                        g
                    }
                })
                .collect();
            Dual { v, d }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse_expr;

    fn table() -> DataTable {
        DataTable::from_columns([("x1", vec![0.5, 2.0, 7.0]), ("x2", vec![1.0, -1.0, 3.0])]).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn evaluates_columns_and_params() {
        let data = table();
        let expr = parse_expr("b0 * x1^b1 + x2").unwrap();
        let bound = BoundExpr::bind(&expr, &data, &names(&["b0", "b1"])).unwrap();
        let v = bound.eval(&data, 1, &[3.0, 2.0]);
        assert!((v - (3.0 * 4.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn unknown_symbol_is_missing_column() {
        let data = table();
        let expr = parse_expr("b0 * x9").unwrap();
        let err = BoundExpr::bind(&expr, &data, &names(&["b0"])).unwrap_err();
        assert_eq!(err, MupeError::MissingColumn("x9".to_string()));
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let data = table();
        let params = names(&["b0", "b1", "b2"]);
        let point = [1.3, 0.7, -0.4];
        for text in [
            "b0 * x1^b1",
            "b0 * exp(b2 * x1) + b1 / (x1 + b0)",
            "sqrt(b0 * x1) - log(b1 + x1) * cos(b2)",
            "b0^2 * sin(b1 * x2) + abs(b2) * log10(x1)",
            "-b0 * x1^-b1 + I(b2 * x2^2)",
        ] {
            let expr = parse_expr(text).unwrap();
            let bound = BoundExpr::bind(&expr, &data, &params).unwrap();
            for row in 0..data.n_rows() {
                let mut grad = [0.0; 3];
                let v = bound.eval_gradient(&data, row, &point, &mut grad);
                assert!((v - bound.eval(&data, row, &point)).abs() < 1e-12);
                for j in 0..3 {
                    let h = 1e-6;
                    let mut up = point;
                    let mut down = point;
                    up[j] += h;
                    down[j] -= h;
                    let numeric = (bound.eval(&data, row, &up) - bound.eval(&data, row, &down)) / (2.0 * h);
                    assert!(
                        (grad[j] - numeric).abs() < 1e-5 * (1.0 + numeric.abs()),
                        "{text} row {row} param {j}: {} vs {numeric}",
                        grad[j]
                    );
                }
            }
        }
    }
}
