//! Symbolic simplifier: recursive constant folding plus the algebraic
//! identities the bounds machinery relies on. Interval endpoints built from
//! literal inputs must fold all the way down to `IntImm`.

use crate::expr::{BinOp, Expr, Type};

fn as_int(e: &Expr) -> Option<i64> {
    match e {
        Expr::IntImm(v) => Some(*v),
        Expr::UIntImm(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

fn as_float(e: &Expr) -> Option<f64> {
    match e {
        Expr::FloatImm(v) => Some(*v),
        _ => None,
    }
}

fn bool_imm(v: bool) -> Expr {
    Expr::IntImm(i64::from(v))
}

fn fold_int(op: BinOp, a: i64, b: i64) -> Option<Expr> {
    let v = match op {
        BinOp::Add => a.checked_add(b)?,
        BinOp::Sub => a.checked_sub(b)?,
        BinOp::Mul => a.checked_mul(b)?,
        // Euclidean semantics; fold only when the divisor is nonzero.
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            a.div_euclid(b)
        }
        BinOp::Mod => {
            if b == 0 {
                return None;
            }
            a.rem_euclid(b)
        }
        BinOp::Min => a.min(b),
        BinOp::Max => a.max(b),
        BinOp::Eq => return Some(bool_imm(a == b)),
        BinOp::Ne => return Some(bool_imm(a != b)),
        BinOp::Lt => return Some(bool_imm(a < b)),
        BinOp::Le => return Some(bool_imm(a <= b)),
        BinOp::Gt => return Some(bool_imm(a > b)),
        BinOp::Ge => return Some(bool_imm(a >= b)),
        BinOp::And => return Some(bool_imm(a != 0 && b != 0)),
        BinOp::Or => return Some(bool_imm(a != 0 || b != 0)),
    };
    Some(Expr::IntImm(v))
}

fn fold_float(op: BinOp, a: f64, b: f64) -> Option<Expr> {
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return None;
            }
            a / b
        }
        BinOp::Min => a.min(b),
        BinOp::Max => a.max(b),
        BinOp::Eq => return Some(bool_imm(a == b)),
        BinOp::Ne => return Some(bool_imm(a != b)),
        BinOp::Lt => return Some(bool_imm(a < b)),
        BinOp::Le => return Some(bool_imm(a <= b)),
        BinOp::Gt => return Some(bool_imm(a > b)),
        BinOp::Ge => return Some(bool_imm(a >= b)),
        _ => return None,
    };
    Some(Expr::FloatImm(v))
}

fn simplify_binary(op: BinOp, a: Expr, b: Expr) -> Expr {
    if let (Some(x), Some(y)) = (as_int(&a), as_int(&b)) {
        if let Some(folded) = fold_int(op, x, y) {
            return folded;
        }
    }
    if let (Some(x), Some(y)) = (as_float(&a), as_float(&b)) {
        if let Some(folded) = fold_float(op, x, y) {
            return folded;
        }
    }
    match op {
        BinOp::Add => {
            if as_int(&a) == Some(0) {
                return b;
            }
            if as_int(&b) == Some(0) {
                return a;
            }
        }
        BinOp::Sub => {
            if as_int(&b) == Some(0) {
                return a;
            }
            if a == b {
                return Expr::IntImm(0);
            }
        }
        BinOp::Mul => {
            if as_int(&a) == Some(0) || as_int(&b) == Some(0) {
                return Expr::IntImm(0);
            }
            if as_int(&a) == Some(1) {
                return b;
            }
            if as_int(&b) == Some(1) {
                return a;
            }
        }
        BinOp::Div => {
            if as_int(&b) == Some(1) {
                return a;
            }
            if as_int(&a) == Some(0) {
                return Expr::IntImm(0);
            }
        }
        BinOp::Min | BinOp::Max => {
            if a == b {
                return a;
            }
        }
        _ => {}
    }
    Expr::binary(op, a, b)
}

/// Simplify an expression bottom-up.
pub fn simplify(e: &Expr) -> Expr {
    match e {
        Expr::Cast(ty, inner) => {
            let inner = simplify(inner);
            match (&inner, ty) {
                (Expr::IntImm(v), Type::Int(_)) | (Expr::IntImm(v), Type::UInt(_)) => {
                    Expr::IntImm(*v)
                }
                (Expr::IntImm(v), Type::Float(_)) => Expr::FloatImm(*v as f64),
                (Expr::FloatImm(v), Type::Int(_)) => Expr::IntImm(*v as i64),
                (Expr::FloatImm(v), Type::Float(_)) => Expr::FloatImm(*v),
                _ => Expr::Cast(*ty, Box::new(inner)),
            }
        }
        Expr::Binary { op, a, b } => simplify_binary(*op, simplify(a), simplify(b)),
        Expr::Not(inner) => {
            let inner = simplify(inner);
            match as_int(&inner) {
                Some(v) => bool_imm(v == 0),
                None => Expr::Not(Box::new(inner)),
            }
        }
        Expr::Select {
            cond,
            if_true,
            if_false,
        } => {
            let cond = simplify(cond);
            match as_int(&cond) {
                Some(v) if v != 0 => simplify(if_true),
                Some(_) => simplify(if_false),
                None => Expr::Select {
                    cond: Box::new(cond),
                    if_true: Box::new(simplify(if_true)),
                    if_false: Box::new(simplify(if_false)),
                },
            }
        }
        Expr::Let { name, value, body } => {
            let value = simplify(value);
            // Fold cheap bindings into the body; anything else stays a let.
            if matches!(value, Expr::IntImm(_) | Expr::UIntImm(_) | Expr::FloatImm(_) | Expr::Var(_))
            {
                return simplify(&body.substitute(name, &value));
            }
            Expr::Let {
                name: name.clone(),
                value: Box::new(value),
                body: Box::new(simplify(body)),
            }
        }
        Expr::Call { target, args, ty } => Expr::Call {
            target: target.clone(),
            args: args.iter().map(simplify).collect(),
            ty: *ty,
        },
        other => other.clone(),
    }
}
