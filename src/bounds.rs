//! Region inference: interval evaluation of index expressions.
//!
//! [`bounds_of_expr`] computes a symbolic interval for an expression evaluated
//! over a scope of per-variable intervals. [`boxes_required`] uses it to find,
//! for each pipeline function or input image called inside an expression, the
//! bounding box of accesses made into it.

use crate::expr::{self, BinOp, CallTarget, Expr};
use crate::interval::{merge_regions, DimBounds, DimBox, Interval, RegionMap};
use crate::simplify::simplify;

/// Interval of values `e` can take when each scope variable ranges over its
/// interval. Free variables outside the scope stay symbolic as the degenerate
/// interval `[v, v]`; constructs we cannot bound tightly (calls used as
/// indices, string handles) also collapse to a degenerate symbolic interval,
/// which downstream code resolves with user estimates or treats as unknown.
pub fn bounds_of_expr(e: &Expr, scope: &DimBounds) -> Interval {
    match e {
        Expr::IntImm(_) | Expr::UIntImm(_) | Expr::FloatImm(_) => Interval::point(e.clone()),
        Expr::Var(v) => scope
            .get(v)
            .cloned()
            .unwrap_or_else(|| Interval::point(e.clone())),
        Expr::Cast(_, inner) => bounds_of_expr(inner, scope),
        Expr::Not(_) => Interval::new(Expr::IntImm(0), Expr::IntImm(1)),
        Expr::Binary { op, a, b } => {
            let ia = bounds_of_expr(a, scope);
            let ib = bounds_of_expr(b, scope);
            binary_bounds(*op, &ia, &ib, e)
        }
        Expr::Select {
            if_true, if_false, ..
        } => bounds_of_expr(if_true, scope).hull(&bounds_of_expr(if_false, scope)),
        Expr::Let { name, value, body } => {
            let mut inner = scope.clone();
            inner.insert(name.clone(), bounds_of_expr(value, scope));
            bounds_of_expr(body, &inner)
        }
        _ => Interval::point(e.clone()),
    }
}

fn binary_bounds(op: BinOp, a: &Interval, b: &Interval, original: &Expr) -> Interval {
    let s = |e: Expr| simplify(&e);
    match op {
        BinOp::Add => Interval::new(
            s(a.min.clone() + b.min.clone()),
            s(a.max.clone() + b.max.clone()),
        ),
        BinOp::Sub => Interval::new(
            s(a.min.clone() - b.max.clone()),
            s(a.max.clone() - b.min.clone()),
        ),
        // The extremes of a product or quotient are at endpoint combinations.
        BinOp::Mul => corners(a, b, |x, y| x * y),
        BinOp::Div => corners(a, b, |x, y| x / y),
        BinOp::Mod => match b.literal() {
            Some((lo, hi)) if lo > 0 => Interval::new(Expr::IntImm(0), Expr::IntImm(hi - 1)),
            _ => Interval::point(original.clone()),
        },
        BinOp::Min => Interval::new(
            s(expr::min(a.min.clone(), b.min.clone())),
            s(expr::min(a.max.clone(), b.max.clone())),
        ),
        BinOp::Max => Interval::new(
            s(expr::max(a.min.clone(), b.min.clone())),
            s(expr::max(a.max.clone(), b.max.clone())),
        ),
        _ => Interval::new(Expr::IntImm(0), Expr::IntImm(1)),
    }
}

fn corners(a: &Interval, b: &Interval, f: impl Fn(Expr, Expr) -> Expr) -> Interval {
    let products = [
        simplify(&f(a.min.clone(), b.min.clone())),
        simplify(&f(a.min.clone(), b.max.clone())),
        simplify(&f(a.max.clone(), b.min.clone())),
        simplify(&f(a.max.clone(), b.max.clone())),
    ];
    let mut lo = products[0].clone();
    let mut hi = products[0].clone();
    for p in &products[1..] {
        lo = simplify(&expr::min(lo, p.clone()));
        hi = simplify(&expr::max(hi, p.clone()));
    }
    Interval::new(lo, hi)
}

/// For every pipeline function or input image called anywhere inside `e`
/// evaluated over `scope`, the bounding box of the accessed region, hulled
/// across call sites.
pub fn boxes_required(e: &Expr, scope: &DimBounds) -> RegionMap {
    let mut regions = RegionMap::new();
    collect(e, scope, &mut regions);
    regions
}

/// Like [`boxes_required`], but merging into an existing map of known boxes.
pub fn boxes_required_into(e: &Expr, scope: &DimBounds, regions: &mut RegionMap) {
    collect(e, scope, regions);
}

fn collect(e: &Expr, scope: &DimBounds, regions: &mut RegionMap) {
    match e {
        Expr::Call { target, args, .. } => {
            for a in args {
                collect(a, scope, regions);
            }
            if matches!(target, CallTarget::Pipeline(_) | CallTarget::Image(_)) {
                let reg = DimBox::new(args.iter().map(|a| bounds_of_expr(a, scope)).collect());
                merge_regions(regions, RegionMap::from([(target.name(), reg)]));
            }
        }
        Expr::Cast(_, inner) | Expr::Not(inner) => collect(inner, scope, regions),
        Expr::Binary { a, b, .. } => {
            collect(a, scope, regions);
            collect(b, scope, regions);
        }
        Expr::Select {
            cond,
            if_true,
            if_false,
        } => {
            collect(cond, scope, regions);
            collect(if_true, scope, regions);
            collect(if_false, scope, regions);
        }
        Expr::Let { name, value, body } => {
            collect(value, scope, regions);
            let mut inner = scope.clone();
            inner.insert(name.clone(), bounds_of_expr(value, scope));
            collect(body, &inner, regions);
        }
        _ => {}
    }
}
