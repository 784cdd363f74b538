//! Pipeline IR expressions and the scalar type lattice.
//!
//! This module defines:
//! - [`Type`]: scalar element types (signed, unsigned, float) with their byte widths.
//! - [`Expr`]: the **pre-lowering expression IR** that the cost model and the
//!   bounds machinery walk. Expressions are pure value computations: immediates,
//!   variables, arithmetic, selects, lets, and calls into other pipeline
//!   functions, input images, extern stages, or intrinsics.
//! - [`LoweredKind`]: a sentinel for node kinds that only exist **after**
//!   lowering (loads, stores, loops, allocations). The scheduler operates
//!   strictly pre-lowering; a `Lowered` node reaching the cost visitor is an
//!   internal contract violation and aborts.
//!
//! # Notes
//! * Calls to pipeline functions carry a cheap shared [`Function`] handle, so
//!   call graphs can be discovered from the expressions alone.
//! * `Expr` implements the usual arithmetic operators (`+`, `-`, `*`, `/`) for
//!   both `Expr` and `i64` right-hand sides, which keeps test pipelines and
//!   index arithmetic readable.

use crate::func::Function;
use std::fmt;
use std::ops;

/// Scalar element type: kind plus bit width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// Signed integer of the given bit width.
    Int(u8),
    /// Unsigned integer of the given bit width.
    UInt(u8),
    /// IEEE float of the given bit width.
    Float(u8),
}

impl Type {
    pub const I8: Type = Type::Int(8);
    pub const I16: Type = Type::Int(16);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);
    pub const U8: Type = Type::UInt(8);
    pub const U16: Type = Type::UInt(16);
    pub const U32: Type = Type::UInt(32);
    pub const F32: Type = Type::Float(32);
    pub const F64: Type = Type::Float(64);
    /// Single-bit boolean, the result type of comparisons.
    pub const BOOL: Type = Type::UInt(1);

    /// Bit width of the type.
    pub fn bits(self) -> u8 {
        match self {
            Type::Int(b) | Type::UInt(b) | Type::Float(b) => b,
        }
    }

    /// Width in bytes, rounded up; a load of this type moves this many bytes.
    pub fn bytes(self) -> i64 {
        i64::from(self.bits().div_ceil(8).max(1))
    }
}

/// Binary operators on expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// True for operators producing a boolean result.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

/// What a [`Expr::Call`] refers to.
///
/// The scheduler treats each kind differently: pipeline and image calls are
/// memory accesses with an inferable footprint, extern calls are opaque (and
/// heavily penalized by the cost model so they are not fused across), and
/// intrinsics are ordinary cheap operations.
#[derive(Clone, Debug)]
pub enum CallTarget {
    /// A call into another pipeline function, carrying its shared handle.
    Pipeline(Function),
    /// A read from an external input image.
    Image(String),
    /// An opaque extern stage.
    Extern(String),
    /// A known intrinsic (abs, sqrt, ...).
    Intrinsic(String),
}

impl CallTarget {
    /// The name of the called entity.
    pub fn name(&self) -> String {
        match self {
            CallTarget::Pipeline(f) => f.name(),
            CallTarget::Image(n) | CallTarget::Extern(n) | CallTarget::Intrinsic(n) => n.clone(),
        }
    }
}

impl PartialEq for CallTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CallTarget::Pipeline(a), CallTarget::Pipeline(b)) => a.name() == b.name(),
            (CallTarget::Image(a), CallTarget::Image(b))
            | (CallTarget::Extern(a), CallTarget::Extern(b))
            | (CallTarget::Intrinsic(a), CallTarget::Intrinsic(b)) => a == b,
            _ => false,
        }
    }
}

/// Node kinds that only exist after lowering.
///
/// The auto-scheduler consumes pre-lowering IR only; these are modeled so the
/// cost visitor can detect and reject them loudly instead of miscounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoweredKind {
    Load,
    Store,
    For,
    Realize,
    Allocate,
    Free,
    Block,
}

/// A pre-lowering pipeline IR expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    IntImm(i64),
    UIntImm(u64),
    FloatImm(f64),
    StringImm(String),
    /// A free or loop variable, referenced by name.
    Var(String),
    Cast(Type, Box<Expr>),
    Binary {
        op: BinOp,
        a: Box<Expr>,
        b: Box<Expr>,
    },
    Not(Box<Expr>),
    Select {
        cond: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    Call {
        target: CallTarget,
        args: Vec<Expr>,
        ty: Type,
    },
    /// Post-lowering node; must never reach the cost visitor.
    Lowered(LoweredKind),
}

impl Expr {
    /// Result type of the expression.
    ///
    /// Immediates default to 32-bit kinds, variables are treated as `i32` loop
    /// indices, and calls carry their type explicitly. This is enough type
    /// information for byte-width accounting; the scheduler never needs a full
    /// type checker.
    pub fn ty(&self) -> Type {
        match self {
            Expr::IntImm(_) | Expr::Var(_) => Type::I32,
            Expr::UIntImm(_) => Type::U32,
            Expr::FloatImm(_) => Type::F32,
            Expr::StringImm(_) => Type::U8,
            Expr::Cast(t, _) => *t,
            Expr::Binary { op, a, .. } => {
                if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or) {
                    Type::BOOL
                } else {
                    a.ty()
                }
            }
            Expr::Not(_) => Type::BOOL,
            Expr::Select { if_true, .. } => if_true.ty(),
            Expr::Let { body, .. } => body.ty(),
            Expr::Call { ty, .. } => *ty,
            Expr::Lowered(_) => Type::I32,
        }
    }

    pub fn binary(op: BinOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary {
            op,
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    /// Pre-order walk over this expression and all children.
    pub fn walk(&self, visit: &mut impl FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::Cast(_, e) | Expr::Not(e) => e.walk(visit),
            Expr::Binary { a, b, .. } => {
                a.walk(visit);
                b.walk(visit);
            }
            Expr::Select {
                cond,
                if_true,
                if_false,
            } => {
                cond.walk(visit);
                if_true.walk(visit);
                if_false.walk(visit);
            }
            Expr::Let { value, body, .. } => {
                value.walk(visit);
                body.walk(visit);
            }
            Expr::Call { args, .. } => {
                for a in args {
                    a.walk(visit);
                }
            }
            _ => {}
        }
    }

    /// Replace every free occurrence of `name` with `with`.
    pub fn substitute(&self, name: &str, with: &Expr) -> Expr {
        match self {
            Expr::Var(v) if v == name => with.clone(),
            Expr::Cast(t, e) => Expr::Cast(*t, Box::new(e.substitute(name, with))),
            Expr::Not(e) => Expr::Not(Box::new(e.substitute(name, with))),
            Expr::Binary { op, a, b } => Expr::Binary {
                op: *op,
                a: Box::new(a.substitute(name, with)),
                b: Box::new(b.substitute(name, with)),
            },
            Expr::Select {
                cond,
                if_true,
                if_false,
            } => Expr::Select {
                cond: Box::new(cond.substitute(name, with)),
                if_true: Box::new(if_true.substitute(name, with)),
                if_false: Box::new(if_false.substitute(name, with)),
            },
            Expr::Let { name: n, value, body } => {
                let value = value.substitute(name, with);
                // An inner binding of the same name shadows the substitution.
                let body = if n == name {
                    (**body).clone()
                } else {
                    body.substitute(name, with)
                };
                Expr::Let {
                    name: n.clone(),
                    value: Box::new(value),
                    body: Box::new(body),
                }
            }
            Expr::Call { target, args, ty } => Expr::Call {
                target: target.clone(),
                args: args.iter().map(|a| a.substitute(name, with)).collect(),
                ty: *ty,
            },
            other => other.clone(),
        }
    }

    /// All pipeline functions called anywhere in the expression, deduplicated
    /// by name.
    pub fn called_functions(&self) -> Vec<Function> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Call {
                target: CallTarget::Pipeline(f),
                ..
            } = e
            {
                if !out.iter().any(|g: &Function| g.name() == f.name()) {
                    out.push(f.clone());
                }
            }
        });
        out
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntImm(v) => write!(f, "{v}"),
            Expr::UIntImm(v) => write!(f, "{v}"),
            Expr::FloatImm(v) => write!(f, "{v}"),
            Expr::StringImm(s) => write!(f, "{s:?}"),
            Expr::Var(v) => write!(f, "{v}"),
            Expr::Cast(t, e) => write!(f, "{t:?}({e})"),
            Expr::Binary { op, a, b } => write!(f, "({a} {op:?} {b})"),
            Expr::Not(e) => write!(f, "!{e}"),
            Expr::Select {
                cond,
                if_true,
                if_false,
            } => write!(f, "select({cond}, {if_true}, {if_false})"),
            Expr::Let { name, value, body } => write!(f, "(let {name} = {value} in {body})"),
            Expr::Call { target, args, .. } => {
                write!(f, "{}(", target.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::Lowered(k) => write!(f, "<lowered {k:?}>"),
        }
    }
}

/// Integer immediate.
pub fn lit(v: i64) -> Expr {
    Expr::IntImm(v)
}

/// Float immediate.
pub fn flit(v: f64) -> Expr {
    Expr::FloatImm(v)
}

/// Variable reference.
pub fn var(name: &str) -> Expr {
    Expr::Var(name.to_string())
}

pub fn min(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinOp::Min, a, b)
}

pub fn max(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinOp::Max, a, b)
}

pub fn select(cond: Expr, if_true: Expr, if_false: Expr) -> Expr {
    Expr::Select {
        cond: Box::new(cond),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
    }
}

pub fn cast(ty: Type, e: Expr) -> Expr {
    Expr::Cast(ty, Box::new(e))
}

/// A read from an external input image.
pub fn image(name: &str, ty: Type, args: Vec<Expr>) -> Expr {
    Expr::Call {
        target: CallTarget::Image(name.to_string()),
        args,
        ty,
    }
}

/// A call to an opaque extern stage.
pub fn extern_call(name: &str, ty: Type, args: Vec<Expr>) -> Expr {
    Expr::Call {
        target: CallTarget::Extern(name.to_string()),
        args,
        ty,
    }
}

/// A call to a known intrinsic.
pub fn intrinsic(name: &str, ty: Type, args: Vec<Expr>) -> Expr {
    Expr::Call {
        target: CallTarget::Intrinsic(name.to_string()),
        args,
        ty,
    }
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }
        impl ops::$trait<i64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: i64) -> Expr {
                Expr::binary($op, self, Expr::IntImm(rhs))
            }
        }
    };
}

impl_binop!(Add, add, BinOp::Add);
impl_binop!(Sub, sub, BinOp::Sub);
impl_binop!(Mul, mul, BinOp::Mul);
impl_binop!(Div, div, BinOp::Div);
impl_binop!(Rem, rem, BinOp::Mod);
