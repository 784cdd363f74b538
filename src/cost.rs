//! The expression cost visitor and the region cost model.
//!
//! [`CostVisitor`] walks one expression and yields `(arith_ops, bytes_loaded)`
//! for a single point of evaluation. [`CostModel`] lifts per-point costs to
//! regions: multiply by box areas, rewrite expressions for inlined producers,
//! and size working sets along the realization order.
//!
//! Costs are `Option<i64>` once regions are involved: `None` means "some
//! extent could not be resolved to a literal", and it absorbs through every
//! operation. The partitioner treats unknown costs as strictly worse than any
//! finite cost.

use crate::env::{find_direct_calls, realization_order, Env};
use crate::expr::{CallTarget, Expr, Type};
use crate::func::{FStage, Function, OUTERMOST};
use crate::interval::{DimBounds, DimBox, Interval, RegionMap};
use std::collections::{BTreeMap, BTreeSet};

/// Per-point cost of evaluating an expression once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExprCost {
    /// Arithmetic operation count.
    pub ops: i64,
    /// Bytes loaded from pipeline functions and input images.
    pub bytes: i64,
}

impl ExprCost {
    pub fn add(self, other: ExprCost) -> ExprCost {
        ExprCost {
            ops: self.ops + other.ops,
            bytes: self.bytes + other.bytes,
        }
    }
}

/// Cost of computing a region: arithmetic and memory components, either of
/// which may be unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionCost {
    pub arith: Option<i64>,
    pub memory: Option<i64>,
}

impl RegionCost {
    pub fn zero() -> RegionCost {
        RegionCost {
            arith: Some(0),
            memory: Some(0),
        }
    }

    pub fn unknown() -> RegionCost {
        RegionCost {
            arith: None,
            memory: None,
        }
    }

    pub fn add(self, other: RegionCost) -> RegionCost {
        RegionCost {
            arith: cost_add(self.arith, other.arith),
            memory: cost_add(self.memory, other.memory),
        }
    }

    pub fn is_known(self) -> bool {
        self.arith.is_some() && self.memory.is_some()
    }
}

/// Unknown-absorbing addition.
pub fn cost_add(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    Some(a?.saturating_add(b?))
}

/// Unknown-absorbing multiplication.
pub fn cost_mul(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    Some(a?.saturating_mul(b?))
}

/// Penalty charged for calling an opaque extern stage. Large enough that the
/// partitioner never finds it profitable to fuse across one.
const EXTERN_OP_COST: i64 = 999;

/// Accumulates arithmetic and load costs over one expression.
#[derive(Default)]
pub struct CostVisitor {
    pub ops: i64,
    pub bytes: i64,
}

impl CostVisitor {
    /// Cost of evaluating `e` at one point.
    pub fn cost_of(e: &Expr) -> ExprCost {
        let mut v = CostVisitor::default();
        v.visit(e);
        ExprCost {
            ops: v.ops,
            bytes: v.bytes,
        }
    }

    pub fn visit(&mut self, e: &Expr) {
        match e {
            Expr::IntImm(_)
            | Expr::UIntImm(_)
            | Expr::FloatImm(_)
            | Expr::StringImm(_)
            | Expr::Var(_) => {}
            Expr::Cast(_, inner) => {
                self.ops += 1;
                self.visit(inner);
            }
            Expr::Binary { a, b, .. } => {
                self.ops += 1;
                self.visit(a);
                self.visit(b);
            }
            Expr::Not(inner) => {
                self.ops += 1;
                self.visit(inner);
            }
            Expr::Select {
                cond,
                if_true,
                if_false,
            } => {
                self.ops += 1;
                self.visit(cond);
                self.visit(if_true);
                self.visit(if_false);
            }
            // Binding is free; the simplifier is responsible for let folding.
            Expr::Let { value, body, .. } => {
                self.visit(value);
                self.visit(body);
            }
            Expr::Call { target, args, ty } => {
                match target {
                    CallTarget::Pipeline(_) | CallTarget::Image(_) => {
                        self.bytes += ty.bytes();
                    }
                    CallTarget::Extern(_) => self.ops += EXTERN_OP_COST,
                    CallTarget::Intrinsic(_) => self.ops += 1,
                }
                for a in args {
                    self.visit(a);
                }
            }
            Expr::Lowered(kind) => {
                panic!("internal error: lowered IR node {kind:?} reached the cost visitor; costs are defined on pre-lowering expressions only");
            }
        }
    }
}

/// Analytical cost model over a pipeline environment.
pub struct CostModel {
    env: Env,
    /// Per-function, per-stage point cost, built once at construction.
    func_cost: BTreeMap<String, Vec<ExprCost>>,
    /// Element types of input images, discovered from call sites.
    image_types: BTreeMap<String, Type>,
    /// Producers-first traversal order over the whole environment.
    order: Vec<String>,
}

impl CostModel {
    pub fn new(env: Env) -> CostModel {
        let mut func_cost = BTreeMap::new();
        let mut image_types = BTreeMap::new();
        for (name, f) in env.iter() {
            func_cost.insert(name.clone(), Self::build_stage_costs(f));
            for e in Self::stage_exprs_all(f) {
                e.walk(&mut |node| {
                    if let Expr::Call {
                        target: CallTarget::Image(img),
                        ty,
                        ..
                    } = node
                    {
                        image_types.entry(img.clone()).or_insert(*ty);
                    }
                });
            }
        }
        let all: Vec<Function> = env.iter().map(|(_, f)| f.clone()).collect();
        let order = realization_order(&all, &env);
        CostModel {
            env,
            func_cost,
            image_types,
            order,
        }
    }

    fn stage_exprs_all(f: &Function) -> Vec<Expr> {
        let mut out = f.values();
        for u in f.updates() {
            out.extend(u.args);
            out.extend(u.values);
        }
        out
    }

    /// Expressions that contribute to one stage's point cost: all value
    /// expressions, plus left-hand-side argument expressions for updates
    /// (reduction-domain index arithmetic is real work).
    fn stage_exprs(f: &Function, stage: usize) -> Vec<Expr> {
        let mut out = f.stage_values(stage);
        if stage > 0 {
            out.extend(f.stage_args(stage));
        }
        out
    }

    fn build_stage_costs(f: &Function) -> Vec<ExprCost> {
        (0..f.num_stages())
            .map(|k| {
                Self::stage_exprs(f, k)
                    .iter()
                    .map(CostVisitor::cost_of)
                    .fold(ExprCost::default(), ExprCost::add)
            })
            .collect()
    }

    /// Iteratively substitute calls to pure functions named in `inlines` by
    /// their definitions, until a fixed point. Functions with updates are
    /// never inlined.
    pub fn perform_inline(e: &Expr, inlines: &BTreeSet<String>) -> Expr {
        let mut cur = e.clone();
        loop {
            let next = inline_once(&cur, inlines);
            if next == cur {
                return cur;
            }
            cur = next;
        }
    }

    /// Per-point cost of one stage, with producers in `inlines` expanded into
    /// the stage's expressions first.
    pub fn stage_point_cost(&self, s: &FStage, inlines: &BTreeSet<String>) -> ExprCost {
        if inlines.is_empty() {
            return self.func_cost[&s.func][s.stage];
        }
        let f = self
            .env
            .get(&s.func)
            .unwrap_or_else(|| panic!("internal error: unknown function {}", s.func));
        Self::stage_exprs(f, s.stage)
            .iter()
            .map(|e| CostVisitor::cost_of(&CostModel::perform_inline(e, inlines)))
            .fold(ExprCost::default(), ExprCost::add)
    }

    /// Cost of evaluating one stage over a region of its pure dimensions.
    ///
    /// The stage's own iteration box is the region on the pure variables plus
    /// the stage's reduction domains; the cost is its area times the per-point
    /// cost.
    pub fn stage_region_cost(
        &self,
        s: &FStage,
        region: &DimBox,
        inlines: &BTreeSet<String>,
    ) -> RegionCost {
        let f = match self.env.get(&s.func) {
            Some(f) => f.clone(),
            None => return RegionCost::unknown(),
        };
        let area = match stage_box(&f, s.stage, region).area() {
            Some(a) => a,
            None => return RegionCost::unknown(),
        };
        let point = self.stage_point_cost(s, inlines);
        RegionCost {
            arith: Some(area.saturating_mul(point.ops)),
            memory: Some(area.saturating_mul(point.bytes)),
        }
    }

    /// Cost of computing a set of regions, skipping pure functions that are
    /// inlined (their cost lands inside their consumers' rewritten
    /// expressions).
    pub fn region_cost(&self, regions: &RegionMap, inlines: &BTreeSet<String>) -> RegionCost {
        let mut total = RegionCost::zero();
        for (name, reg) in regions {
            let Some(f) = self.env.get(name) else {
                continue;
            };
            if inlines.contains(name) && f.is_pure() {
                continue;
            }
            let stages = f.num_stages();
            for k in 0..stages {
                total = total.add(self.stage_region_cost(&FStage::new(name, k), reg, inlines));
            }
            if !total.is_known() {
                return RegionCost::unknown();
            }
        }
        total
    }

    /// Bytes of storage for one function over a region: area times the byte
    /// width of one (possibly tuple-valued) element.
    pub fn region_size(&self, name: &str, reg: &DimBox) -> Option<i64> {
        let f = self.env.get(name)?;
        let bytes: i64 = f.output_types().iter().map(|t| t.bytes()).sum();
        Some(reg.area()?.saturating_mul(bytes.max(1)))
    }

    /// Bytes of an input-image region, using the element type observed at its
    /// call sites.
    pub fn input_region_size(&self, regions: &RegionMap) -> Option<i64> {
        let mut total = 0i64;
        for (name, reg) in regions {
            let bytes = self.image_types.get(name).map_or(4, |t| t.bytes());
            total = total.saturating_add(reg.area()?.saturating_mul(bytes));
        }
        Some(total)
    }

    /// High-water mark of live intermediate bytes while computing the given
    /// regions in realization order.
    ///
    /// On visiting a function its storage goes live; once its last in-set
    /// consumer has been visited the storage is released. Inlined functions
    /// occupy no storage.
    pub fn working_set_size(&self, regions: &RegionMap, inlines: &BTreeSet<String>) -> Option<i64> {
        let in_set: BTreeSet<&String> = regions.keys().collect();

        // In-set consumer counts per producer.
        let mut consumers: BTreeMap<String, usize> = BTreeMap::new();
        for name in &in_set {
            let Some(f) = self.env.get(name) else { continue };
            for p in find_direct_calls(f) {
                if p != **name && in_set.contains(&p) {
                    *consumers.entry(p).or_insert(0) += 1;
                }
            }
        }

        let mut sizes: BTreeMap<&String, i64> = BTreeMap::new();
        for (name, reg) in regions {
            if !self.env.contains(name) {
                continue;
            }
            let size = if inlines.contains(name) {
                0
            } else {
                self.region_size(name, reg)?
            };
            sizes.insert(name, size);
        }

        let mut live = 0i64;
        let mut high_water = 0i64;
        for name in &self.order {
            let Some(&size) = sizes.get(name) else { continue };
            live = live.saturating_add(size);
            high_water = high_water.max(live);
            let Some(f) = self.env.get(name) else { continue };
            for p in find_direct_calls(f) {
                if p == *name {
                    continue;
                }
                if let Some(c) = consumers.get_mut(&p) {
                    *c -= 1;
                    if *c == 0 {
                        live -= sizes.get(&p).copied().unwrap_or(0);
                    }
                }
            }
        }
        Some(high_water)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }
}

/// The iteration box of one stage over a region of its pure dimensions:
/// the region's intervals on the pure variables, the reduction domains on the
/// stage's reduction variables, extracted in dimension order.
pub fn stage_box(f: &Function, stage: usize, region: &DimBox) -> DimBox {
    let bounds = stage_bounds_from_region(f, stage, region);
    let mut dims = Vec::new();
    for d in f.dims(stage) {
        if d == OUTERMOST {
            continue;
        }
        if let Some(iv) = bounds.get(&d) {
            dims.push(iv.clone());
        }
    }
    DimBox::new(dims)
}

/// Per-variable bounds for one stage: pure variables from the region box,
/// reduction variables from their declared domains.
pub fn stage_bounds_from_region(f: &Function, stage: usize, region: &DimBox) -> DimBounds {
    let mut bounds = DimBounds::new();
    for (i, arg) in f.args().iter().enumerate() {
        if i < region.rank() {
            bounds.insert(arg.clone(), region.get(i).clone());
        }
    }
    for rv in f.stage_rvars(stage) {
        bounds.insert(
            rv.name.clone(),
            Interval::from_min_extent_expr(&rv.min, &rv.extent),
        );
    }
    bounds
}

fn inline_once(e: &Expr, inlines: &BTreeSet<String>) -> Expr {
    match e {
        Expr::Call {
            target: CallTarget::Pipeline(f),
            args,
            ..
        } if inlines.contains(&f.name()) && f.is_pure() => {
            let args: Vec<Expr> = args.iter().map(|a| inline_once(a, inlines)).collect();
            let mut body = f
                .values()
                .into_iter()
                .next()
                .unwrap_or(Expr::IntImm(0));
            for (formal, actual) in f.args().iter().zip(&args) {
                body = body.substitute(formal, actual);
            }
            body
        }
        Expr::Cast(t, inner) => Expr::Cast(*t, Box::new(inline_once(inner, inlines))),
        Expr::Not(inner) => Expr::Not(Box::new(inline_once(inner, inlines))),
        Expr::Binary { op, a, b } => Expr::Binary {
            op: *op,
            a: Box::new(inline_once(a, inlines)),
            b: Box::new(inline_once(b, inlines)),
        },
        Expr::Select {
            cond,
            if_true,
            if_false,
        } => Expr::Select {
            cond: Box::new(inline_once(cond, inlines)),
            if_true: Box::new(inline_once(if_true, inlines)),
            if_false: Box::new(inline_once(if_false, inlines)),
        },
        Expr::Let { name, value, body } => Expr::Let {
            name: name.clone(),
            value: Box::new(inline_once(value, inlines)),
            body: Box::new(inline_once(body, inlines)),
        },
        Expr::Call { target, args, ty } => Expr::Call {
            target: target.clone(),
            args: args.iter().map(|a| inline_once(a, inlines)).collect(),
            ty: *ty,
        },
        other => other.clone(),
    }
}
