//! Expression engine for evaluating selections and derived quantities
//! from string expressions over table columns.
//!
//! Supports arithmetic (+, -, *, /), comparisons (==, !=, <, <=, >, >=),
//! boolean operators (&&, ||, !), built-in functions (abs, sqrt, log,
//! exp, pow, min, max), and element access on array columns
//! (`dijet_pt[0]`, `fatjet_msd[top_idx]`).
//!
//! Every value is an `f64`. Comparisons and boolean operators produce
//! 1.0 or 0.0, and any value > 0.0 counts as true.

use cf_core::{Error, Result};
use rayon::prelude::*;

/// Row count above which bulk evaluation runs on the rayon pool.
const PAR_ROW_THRESHOLD: usize = 16_384;

// ── AST ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Number(f64),
    Var(usize),  // index into required_scalars
    Item {
        array: usize, // index into required_arrays
        index: Box<Expr>,
    },
    UnaryNeg(Box<Expr>),
    UnaryNot(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
}

// ── Compiled expression ────────────────────────────────────────

/// A borrowed array column: row-major data with a fixed per-row width.
#[derive(Debug, Clone, Copy)]
pub struct ArraySlice<'a> {
    /// Row-major values of length `width * n_rows`.
    pub data: &'a [f64],
    /// Number of values per row.
    pub width: usize,
}

/// A compiled expression ready for evaluation.
///
/// Bare identifiers refer to scalar columns; indexed identifiers
/// (`name[...]`) refer to array columns.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    ast: Expr,
    source: String,
    /// Scalar column names referenced by this expression (ordered by first
    /// occurrence).
    pub required_scalars: Vec<String>,
    /// Array column names referenced by this expression (ordered by first
    /// occurrence).
    pub required_arrays: Vec<String>,
}

impl CompiledExpr {
    /// Parse and compile an expression string.
    ///
    /// Identifiers in the expression correspond to column names.
    pub fn compile(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser::new(&tokens);
        let ast = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(Error::Expression(format!(
                "unexpected token after expression: {:?}",
                parser.tokens[parser.pos]
            )));
        }
        let scalars = std::mem::take(&mut parser.scalars);
        let arrays = std::mem::take(&mut parser.arrays);
        if let Some(name) = scalars.iter().find(|s| arrays.contains(s)) {
            return Err(Error::Expression(format!(
                "column '{name}' is used both bare and indexed"
            )));
        }
        Ok(CompiledExpr {
            ast,
            source: input.to_string(),
            required_scalars: scalars,
            required_arrays: arrays,
        })
    }

    /// Assemble a compiled expression from pre-built parts. Used by the
    /// typed builder; the caller guarantees index consistency.
    pub(crate) fn from_parts(
        ast: Expr,
        scalars: Vec<String>,
        arrays: Vec<String>,
        source: String,
    ) -> Self {
        CompiledExpr {
            ast,
            source,
            required_scalars: scalars,
            required_arrays: arrays,
        }
    }

    /// The expression text this was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the expression for a single row.
    ///
    /// `scalars` must match `required_scalars` in length and order;
    /// `arrays` holds one row slice per entry of `required_arrays`.
    pub fn eval_row(&self, scalars: &[f64], arrays: &[&[f64]]) -> f64 {
        let cols: Vec<&[f64]> = scalars.iter().map(std::slice::from_ref).collect();
        let arrs: Vec<ArraySlice> = arrays
            .iter()
            .map(|a| ArraySlice {
                data: a,
                width: a.len(),
            })
            .collect();
        let ctx = EvalCtx {
            scalars: &cols,
            arrays: &arrs,
            row: 0,
        };
        eval_expr(&self.ast, &ctx)
    }

    /// Evaluate the expression for all rows (column-wise).
    ///
    /// `scalars` and `arrays` must match `required_scalars` and
    /// `required_arrays` in length and order; every column must hold
    /// `n_rows` rows.
    pub fn eval_bulk(
        &self,
        n_rows: usize,
        scalars: &[&[f64]],
        arrays: &[ArraySlice],
    ) -> Vec<f64> {
        debug_assert_eq!(scalars.len(), self.required_scalars.len());
        debug_assert_eq!(arrays.len(), self.required_arrays.len());
        if scalars.is_empty() && arrays.is_empty() {
            // Constant expression, evaluate once
            let ctx = EvalCtx {
                scalars,
                arrays,
                row: 0,
            };
            return vec![eval_expr(&self.ast, &ctx); n_rows];
        }
        let eval_at = |row: usize| {
            let ctx = EvalCtx {
                scalars,
                arrays,
                row,
            };
            eval_expr(&self.ast, &ctx)
        };
        if n_rows >= PAR_ROW_THRESHOLD {
            (0..n_rows).into_par_iter().map(eval_at).collect()
        } else {
            (0..n_rows).map(eval_at).collect()
        }
    }
}

// ── Evaluation ─────────────────────────────────────────────────

struct EvalCtx<'a> {
    scalars: &'a [&'a [f64]],
    arrays: &'a [ArraySlice<'a>],
    row: usize,
}

fn eval_expr(e: &Expr, ctx: &EvalCtx) -> f64 {
    match e {
        Expr::Number(n) => *n,
        Expr::Var(i) => ctx.scalars[*i][ctx.row],
        Expr::Item { array, index } => {
            let idx = eval_expr(index, ctx);
            let a = &ctx.arrays[*array];
            // Out-of-range or non-finite indices yield NaN, which fails
            // any predicate the value feeds into.
            if !idx.is_finite() || idx < 0.0 || idx >= a.width as f64 {
                f64::NAN
            } else {
                a.data[ctx.row * a.width + idx as usize]
            }
        }
        Expr::UnaryNeg(a) => -eval_expr(a, ctx),
        Expr::UnaryNot(a) => {
            if eval_expr(a, ctx) > 0.0 {
                0.0
            } else {
                1.0
            }
        }
        Expr::BinOp(op, a, b) => {
            let lhs = eval_expr(a, ctx);
            let rhs = eval_expr(b, ctx);
            match op {
                BinOp::Add => lhs + rhs,
                BinOp::Sub => lhs - rhs,
                BinOp::Mul => lhs * rhs,
                BinOp::Div => lhs / rhs,
                BinOp::Eq => {
                    if (lhs - rhs).abs() < f64::EPSILON {
                        1.0
                    } else {
                        0.0
                    }
                }
                BinOp::Ne => {
                    if (lhs - rhs).abs() >= f64::EPSILON {
                        1.0
                    } else {
                        0.0
                    }
                }
                BinOp::Lt => {
                    if lhs < rhs {
                        1.0
                    } else {
                        0.0
                    }
                }
                BinOp::Le => {
                    if lhs <= rhs {
                        1.0
                    } else {
                        0.0
                    }
                }
                BinOp::Gt => {
                    if lhs > rhs {
                        1.0
                    } else {
                        0.0
                    }
                }
                BinOp::Ge => {
                    if lhs >= rhs {
                        1.0
                    } else {
                        0.0
                    }
                }
                BinOp::And => {
                    if lhs > 0.0 && rhs > 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
                BinOp::Or => {
                    if lhs > 0.0 || rhs > 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
            }
        }
        Expr::Call(f, args) => {
            let a0 = || eval_expr(&args[0], ctx);
            let a1 = || eval_expr(&args[1], ctx);
            match f {
                Func::Abs => a0().abs(),
                Func::Sqrt => a0().sqrt(),
                Func::Log => a0().ln(),
                Func::Exp => a0().exp(),
                Func::Pow => a0().powf(a1()),
                Func::Min => a0().min(a1()),
                Func::Max => a0().max(a1()),
            }
        }
    }
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    if !input.is_ascii() {
        return Err(Error::Expression(format!(
            "expression contains non-ASCII characters: '{input}'"
        )));
    }
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators
        if i + 1 < chars.len() {
            let two = &input[i..i + 2];
            let tok = match two {
                "&&" => Some(Token::And),
                "||" => Some(Token::Or),
                "==" => Some(Token::Eq),
                "!=" => Some(Token::Ne),
                "<=" => Some(Token::Le),
                ">=" => Some(Token::Ge),
                _ => None,
            };
            if let Some(t) = tok {
                tokens.push(t);
                i += 2;
                continue;
            }
        }

        match c {
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '+' || chars[i] == '-')
                            && i > start
                            && (chars[i - 1] == 'e' || chars[i - 1] == 'E')))
                {
                    i += 1;
                }
                let s = &input[start..i];
                let n: f64 = s
                    .parse()
                    .map_err(|_| Error::Expression(format!("invalid number: '{}'", s)))?;
                tokens.push(Token::Num(n));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(input[start..i].to_string()));
            }
            _ => {
                return Err(Error::Expression(format!("unexpected character: '{}'", c)));
            }
        }
    }

    Ok(tokens)
}

// ── Parser (recursive descent) ─────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    scalars: Vec<String>,
    arrays: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            scalars: Vec::new(),
            arrays: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            other => Err(Error::Expression(format!(
                "expected {:?}, got {:?}",
                expected, other
            ))),
        }
    }

    fn resolve_scalar(&mut self, name: &str) -> usize {
        if let Some(i) = self.scalars.iter().position(|b| b == name) {
            i
        } else {
            self.scalars.push(name.to_string());
            self.scalars.len() - 1
        }
    }

    fn resolve_array(&mut self, name: &str) -> usize {
        if let Some(i) = self.arrays.iter().position(|b| b == name) {
            i
        } else {
            self.arrays.push(name.to_string());
            self.arrays.len() - 1
        }
    }

    // ── Grammar rules ──────────────────────────────────────────

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Expr::BinOp(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(Expr::BinOp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    let rhs = self.parse_mul()?;
                    lhs = Expr::BinOp(BinOp::Add, Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Minus) => {
                    self.advance();
                    let rhs = self.parse_mul()?;
                    lhs = Expr::BinOp(BinOp::Sub, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::BinOp(BinOp::Mul, Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Slash) => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::BinOp(BinOp::Div, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Expr::UnaryNeg(Box::new(e)))
            }
            Some(Token::Not) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Expr::UnaryNot(Box::new(e)))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance().cloned() {
            Some(Token::Num(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => {
                // Function call
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance(); // consume '('
                    let func = match name.as_str() {
                        "abs" => Func::Abs,
                        "sqrt" => Func::Sqrt,
                        "log" => Func::Log,
                        "exp" => Func::Exp,
                        "pow" => Func::Pow,
                        "min" => Func::Min,
                        "max" => Func::Max,
                        _ => {
                            return Err(Error::Expression(format!(
                                "unknown function: '{}'",
                                name
                            )));
                        }
                    };
                    let mut args = vec![self.parse_or()?];
                    while matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                        args.push(self.parse_or()?);
                    }
                    self.expect(&Token::RParen)?;
                    return Ok(Expr::Call(func, args));
                }
                // Array element access
                if matches!(self.peek(), Some(Token::LBracket)) {
                    self.advance(); // consume '['
                    let index = self.parse_or()?;
                    self.expect(&Token::RBracket)?;
                    let idx = self.resolve_array(&name);
                    return Ok(Expr::Item {
                        array: idx,
                        index: Box::new(index),
                    });
                }
                // Scalar column reference
                let idx = self.resolve_scalar(&name);
                Ok(Expr::Var(idx))
            }
            other => Err(Error::Expression(format!(
                "expected number, identifier, or '(', got {:?}",
                other
            ))),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
