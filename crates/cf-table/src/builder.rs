//! Typed expression builder.
//!
//! The string front end in [`crate::expr`] only discovers a misspelled
//! column name when the expression is evaluated. The builder starts from
//! a table instead: [`EventTable::col`] and [`EventTable::array_col`]
//! check the schema up front, so a typo or a kind mismatch fails at
//! construction time.
//!
//! ```
//! # use cf_table::{Column, EventTable, lit};
//! # fn main() -> cf_core::Result<()> {
//! let t = EventTable::from_columns(vec![
//!     ("pt".to_string(), Column::scalar(vec![450.0, 320.0])),
//!     ("eta".to_string(), Column::scalar(vec![0.5, -2.6])),
//! ])?;
//! let sel = t.col("pt")?.gt(400.0).and(t.col("eta")?.abs().lt(2.4));
//! assert_eq!(t.filter(&sel.build())?.n_rows(), 1);
//! # Ok(())
//! # }
//! ```

use std::ops::{Add, Div, Mul, Neg, Not, Sub};

use cf_core::{Error, Result};

use crate::column::Column;
use crate::expr::{BinOp, CompiledExpr, Expr, Func};
use crate::table::EventTable;

/// Literal constant.
pub fn lit(v: f64) -> TypedExpr {
    TypedExpr {
        ast: Expr::Number(v),
        scalars: Vec::new(),
        arrays: Vec::new(),
        repr: format!("{v}"),
        atomic: true,
    }
}

/// A schema-checked expression under construction.
#[derive(Debug, Clone)]
pub struct TypedExpr {
    ast: Expr,
    scalars: Vec<String>,
    arrays: Vec<String>,
    repr: String,
    atomic: bool,
}

/// A schema-checked reference to an array column.
#[derive(Debug, Clone)]
pub struct ArrayCol {
    name: String,
    width: usize,
}

impl From<f64> for TypedExpr {
    fn from(v: f64) -> Self {
        lit(v)
    }
}

impl From<TypedExpr> for CompiledExpr {
    fn from(e: TypedExpr) -> Self {
        e.build()
    }
}

fn find_or_push(list: &mut Vec<String>, name: &str) -> usize {
    if let Some(i) = list.iter().position(|n| n == name) {
        i
    } else {
        list.push(name.to_string());
        list.len() - 1
    }
}

/// Rebuild `e` with its column indices translated into a merged table.
fn remap(e: &Expr, smap: &[usize], amap: &[usize]) -> Expr {
    match e {
        Expr::Number(n) => Expr::Number(*n),
        Expr::Var(i) => Expr::Var(smap[*i]),
        Expr::Item { array, index } => Expr::Item {
            array: amap[*array],
            index: Box::new(remap(index, smap, amap)),
        },
        Expr::UnaryNeg(a) => Expr::UnaryNeg(Box::new(remap(a, smap, amap))),
        Expr::UnaryNot(a) => Expr::UnaryNot(Box::new(remap(a, smap, amap))),
        Expr::BinOp(op, a, b) => Expr::BinOp(
            *op,
            Box::new(remap(a, smap, amap)),
            Box::new(remap(b, smap, amap)),
        ),
        Expr::Call(f, args) => {
            Expr::Call(*f, args.iter().map(|a| remap(a, smap, amap)).collect())
        }
    }
}

fn wrap(repr: &str, atomic: bool) -> String {
    if atomic {
        repr.to_string()
    } else {
        format!("({repr})")
    }
}

impl TypedExpr {
    /// Finish building and produce a [`CompiledExpr`].
    pub fn build(self) -> CompiledExpr {
        CompiledExpr::from_parts(self.ast, self.scalars, self.arrays, self.repr)
    }

    fn binary(self, op: BinOp, op_str: &str, rhs: TypedExpr) -> TypedExpr {
        let lhs_repr = wrap(&self.repr, self.atomic);
        let rhs_repr = wrap(&rhs.repr, rhs.atomic);
        let mut scalars = self.scalars;
        let mut arrays = self.arrays;
        let smap: Vec<usize> = rhs
            .scalars
            .iter()
            .map(|n| find_or_push(&mut scalars, n))
            .collect();
        let amap: Vec<usize> = rhs
            .arrays
            .iter()
            .map(|n| find_or_push(&mut arrays, n))
            .collect();
        let rhs_ast = remap(&rhs.ast, &smap, &amap);
        TypedExpr {
            ast: Expr::BinOp(op, Box::new(self.ast), Box::new(rhs_ast)),
            scalars,
            arrays,
            repr: format!("{lhs_repr} {op_str} {rhs_repr}"),
            atomic: false,
        }
    }

    fn call1(self, f: Func, name: &str) -> TypedExpr {
        TypedExpr {
            repr: format!("{}({})", name, self.repr),
            ast: Expr::Call(f, vec![self.ast]),
            scalars: self.scalars,
            arrays: self.arrays,
            atomic: true,
        }
    }

    fn call2(self, f: Func, name: &str, rhs: TypedExpr) -> TypedExpr {
        let repr = format!("{}({}, {})", name, self.repr, rhs.repr);
        let mut scalars = self.scalars;
        let mut arrays = self.arrays;
        let smap: Vec<usize> = rhs
            .scalars
            .iter()
            .map(|n| find_or_push(&mut scalars, n))
            .collect();
        let amap: Vec<usize> = rhs
            .arrays
            .iter()
            .map(|n| find_or_push(&mut arrays, n))
            .collect();
        let rhs_ast = remap(&rhs.ast, &smap, &amap);
        TypedExpr {
            ast: Expr::Call(f, vec![self.ast, rhs_ast]),
            scalars,
            arrays,
            repr,
            atomic: true,
        }
    }

    /// `self == rhs` (1.0 or 0.0)
    pub fn eq(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.binary(BinOp::Eq, "==", rhs.into())
    }
    /// `self != rhs` (1.0 or 0.0)
    pub fn ne(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.binary(BinOp::Ne, "!=", rhs.into())
    }
    /// `self < rhs` (1.0 or 0.0)
    pub fn lt(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.binary(BinOp::Lt, "<", rhs.into())
    }
    /// `self <= rhs` (1.0 or 0.0)
    pub fn le(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.binary(BinOp::Le, "<=", rhs.into())
    }
    /// `self > rhs` (1.0 or 0.0)
    pub fn gt(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.binary(BinOp::Gt, ">", rhs.into())
    }
    /// `self >= rhs` (1.0 or 0.0)
    pub fn ge(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.binary(BinOp::Ge, ">=", rhs.into())
    }
    /// Logical AND (operands are true when > 0.0).
    pub fn and(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.binary(BinOp::And, "&&", rhs.into())
    }
    /// Logical OR (operands are true when > 0.0).
    pub fn or(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.binary(BinOp::Or, "||", rhs.into())
    }

    /// `abs(self)`
    pub fn abs(self) -> TypedExpr {
        self.call1(Func::Abs, "abs")
    }
    /// `sqrt(self)`
    pub fn sqrt(self) -> TypedExpr {
        self.call1(Func::Sqrt, "sqrt")
    }
    /// Natural logarithm.
    pub fn log(self) -> TypedExpr {
        self.call1(Func::Log, "log")
    }
    /// `exp(self)`
    pub fn exp(self) -> TypedExpr {
        self.call1(Func::Exp, "exp")
    }
    /// `self` raised to `rhs`.
    pub fn pow(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.call2(Func::Pow, "pow", rhs.into())
    }
    /// Elementwise minimum.
    pub fn min(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.call2(Func::Min, "min", rhs.into())
    }
    /// Elementwise maximum.
    pub fn max(self, rhs: impl Into<TypedExpr>) -> TypedExpr {
        self.call2(Func::Max, "max", rhs.into())
    }
}

// --- Arithmetic: TypedExpr op TypedExpr ---

impl Add for TypedExpr {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.binary(BinOp::Add, "+", rhs)
    }
}

impl Sub for TypedExpr {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.binary(BinOp::Sub, "-", rhs)
    }
}

impl Mul for TypedExpr {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        self.binary(BinOp::Mul, "*", rhs)
    }
}

impl Div for TypedExpr {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        self.binary(BinOp::Div, "/", rhs)
    }
}

impl Neg for TypedExpr {
    type Output = Self;
    fn neg(self) -> Self {
        TypedExpr {
            repr: format!("-{}", wrap(&self.repr, self.atomic)),
            ast: Expr::UnaryNeg(Box::new(self.ast)),
            scalars: self.scalars,
            arrays: self.arrays,
            atomic: true,
        }
    }
}

impl Not for TypedExpr {
    type Output = Self;
    fn not(self) -> Self {
        TypedExpr {
            repr: format!("!{}", wrap(&self.repr, self.atomic)),
            ast: Expr::UnaryNot(Box::new(self.ast)),
            scalars: self.scalars,
            arrays: self.arrays,
            atomic: true,
        }
    }
}

impl ArrayCol {
    /// Number of values per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Element at a fixed position, checked against the column width.
    pub fn at_index(&self, i: usize) -> Result<TypedExpr> {
        if i >= self.width {
            return Err(Error::Expression(format!(
                "index {} out of range for array column '{}' of width {}",
                i, self.name, self.width
            )));
        }
        Ok(self.at(lit(i as f64)))
    }

    /// Element at a computed position. Out-of-range values evaluate to NaN.
    pub fn at(&self, index: impl Into<TypedExpr>) -> TypedExpr {
        let index = index.into();
        let mut scalars = index.scalars;
        let mut arrays = Vec::new();
        let self_idx = find_or_push(&mut arrays, &self.name);
        let amap: Vec<usize> = index
            .arrays
            .iter()
            .map(|n| find_or_push(&mut arrays, n))
            .collect();
        let smap: Vec<usize> = (0..scalars.len()).collect();
        let index_ast = remap(&index.ast, &smap, &amap);
        TypedExpr {
            repr: format!("{}[{}]", self.name, index.repr),
            ast: Expr::Item {
                array: self_idx,
                index: Box::new(index_ast),
            },
            scalars,
            arrays,
            atomic: true,
        }
    }
}

impl EventTable {
    /// Schema-checked reference to a scalar column.
    pub fn col(&self, name: &str) -> Result<TypedExpr> {
        match self.column(name) {
            Some(Column::Scalar(_)) => Ok(TypedExpr {
                ast: Expr::Var(0),
                scalars: vec![name.to_string()],
                arrays: Vec::new(),
                repr: name.to_string(),
                atomic: true,
            }),
            Some(Column::Array { .. }) => Err(Error::Expression(format!(
                "array column '{name}' must be referenced with array_col"
            ))),
            None => Err(Error::UnknownColumn(name.to_string())),
        }
    }

    /// Schema-checked reference to an array column.
    pub fn array_col(&self, name: &str) -> Result<ArrayCol> {
        match self.column(name) {
            Some(Column::Array { width, .. }) => Ok(ArrayCol {
                name: name.to_string(),
                width: *width,
            }),
            Some(Column::Scalar(_)) => Err(Error::Expression(format!(
                "scalar column '{name}' cannot be indexed"
            ))),
            None => Err(Error::UnknownColumn(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventTable {
        EventTable::from_columns(vec![
            ("pt".to_string(), Column::scalar(vec![450.0, 320.0, 510.0])),
            ("eta".to_string(), Column::scalar(vec![0.5, -2.6, 2.1])),
            ("t_idx".to_string(), Column::scalar(vec![1.0, 0.0, 2.0])),
            (
                "jet_msd".to_string(),
                Column::array(2, vec![95.0, 170.0, 120.0, 60.0, 140.0, 155.0]).unwrap(),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn typos_fail_at_build_time() {
        let t = sample();
        match t.col("ptt") {
            Err(Error::UnknownColumn(name)) => assert_eq!(name, "ptt"),
            other => panic!("expected UnknownColumn, got {other:?}"),
        }
        assert!(t.col("jet_msd").is_err());
        assert!(t.array_col("pt").is_err());
        assert!(t.array_col("jet_msd").is_ok());
    }

    #[test]
    fn matches_string_front_end() {
        let t = sample();
        let built = t
            .col("pt")
            .unwrap()
            .gt(400.0)
            .and(t.col("eta").unwrap().abs().lt(2.4))
            .build();
        let parsed = CompiledExpr::compile("pt > 400 && abs(eta) < 2.4").unwrap();
        assert_eq!(t.evaluate(&built).unwrap(), t.evaluate(&parsed).unwrap());
        assert_eq!(built.source(), "(pt > 400) && (abs(eta) < 2.4)");
    }

    #[test]
    fn shared_columns_merge_once() {
        let t = sample();
        let a = t.col("pt").unwrap();
        let b = t.col("eta").unwrap();
        let c = t.col("pt").unwrap();
        let e = ((a + b) * (c + lit(1.0))).build();
        assert_eq!(e.required_scalars, vec!["pt", "eta"]);
        let parsed = CompiledExpr::compile("(pt + eta) * (pt + 1)").unwrap();
        assert_eq!(t.evaluate(&e).unwrap(), t.evaluate(&parsed).unwrap());
    }

    #[test]
    fn unary_operators_render_with_parens() {
        let t = sample();
        let e = -(t.col("pt").unwrap() - lit(400.0));
        assert_eq!(e.repr, "-(pt - 400)");
        let v = t.evaluate(&e.build()).unwrap();
        assert_eq!(v, vec![-50.0, 80.0, -110.0]);

        let e = !t.col("pt").unwrap().gt(400.0);
        assert_eq!(e.repr, "!(pt > 400)");
        let v = t.evaluate(&e.build()).unwrap();
        assert_eq!(v, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn array_access() {
        let t = sample();
        let arr = t.array_col("jet_msd").unwrap();
        assert_eq!(arr.width(), 2);
        assert!(arr.at_index(2).is_err());

        let lead = arr.at_index(0).unwrap().build();
        assert_eq!(t.evaluate(&lead).unwrap(), vec![95.0, 120.0, 140.0]);

        let picked = arr.at(t.col("t_idx").unwrap()).build();
        let v = t.evaluate(&picked).unwrap();
        assert_eq!(v[0], 170.0);
        assert_eq!(v[1], 120.0);
        assert!(v[2].is_nan());
    }

    #[test]
    fn renders_function_calls() {
        let t = sample();
        let e = t.col("pt").unwrap().pow(2.0).sqrt();
        assert_eq!(e.repr, "sqrt(pow(pt, 2))");
    }
}
