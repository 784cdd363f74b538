//! Pipeline functions, stages, and the schedule directive facade.
//!
//! A [`Function`] is a named pipeline node: a pure definition (one value
//! expression per tuple component over the pure argument variables) plus an
//! ordered list of update definitions, each with its own reduction domain.
//!
//! The `Function` itself is a cheaply cloneable shared handle; all clones see
//! the same underlying [`FunctionContents`]. Schedule primitives
//! (`compute_root`, `split`, `reorder`, `vectorize`, `parallel`,
//! `compute_inline`) are applied through the handle and recorded as
//! [`Directive`]s, which double as the textual log of the emitted schedule.
//!
//! Stages are addressed by [`FStage`]: `(function name, stage number)`, where
//! stage 0 is the pure definition and stage `k >= 1` is the `k`-th update.

use crate::expr::{Expr, Type};
use crate::simplify::simplify;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Name of the implicit trailing outermost dimension of every stage.
pub const OUTERMOST: &str = "__outermost";

/// A reduction variable with its literal-expression domain `[min, min+extent)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReductionVariable {
    pub name: String,
    pub min: Expr,
    pub extent: Expr,
}

impl ReductionVariable {
    pub fn new(name: &str, min: i64, extent: i64) -> ReductionVariable {
        ReductionVariable {
            name: name.to_string(),
            min: Expr::IntImm(min),
            extent: Expr::IntImm(extent),
        }
    }
}

/// One update definition: left-hand-side argument expressions, right-hand-side
/// values, and the reduction variables both sides may reference.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateDefinition {
    pub args: Vec<Expr>,
    pub values: Vec<Expr>,
    pub rvars: Vec<ReductionVariable>,
}

/// A user-supplied estimate for one output dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    pub var: String,
    pub min: Expr,
    pub extent: Expr,
}

/// An applied schedule primitive, recorded in application order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Directive {
    ComputeRoot,
    ComputeInline,
    Split {
        stage: usize,
        dim: String,
        outer: String,
        inner: String,
        factor: i64,
    },
    Reorder {
        stage: usize,
        dims: Vec<String>,
    },
    Vectorize {
        stage: usize,
        dim: String,
    },
    Parallel {
        stage: usize,
        dim: String,
    },
}

impl Directive {
    /// Render the directive the way it would be written against the pipeline
    /// API, e.g. `Blur.update(0).split(x, x_o, x_i, 64)`.
    pub fn render(&self, func: &str) -> String {
        let prefix = |stage: usize| {
            if stage == 0 {
                func.to_string()
            } else {
                format!("{func}.update({})", stage - 1)
            }
        };
        match self {
            Directive::ComputeRoot => format!("{func}.compute_root()"),
            Directive::ComputeInline => format!("{func}.compute_inline()"),
            Directive::Split {
                stage,
                dim,
                outer,
                inner,
                factor,
            } => format!("{}.split({dim}, {outer}, {inner}, {factor})", prefix(*stage)),
            Directive::Reorder { stage, dims } => {
                format!("{}.reorder([{}])", prefix(*stage), dims.join(", "))
            }
            Directive::Vectorize { stage, dim } => {
                format!("{}.vectorize({dim})", prefix(*stage))
            }
            Directive::Parallel { stage, dim } => {
                format!("{}.parallel({dim})", prefix(*stage))
            }
        }
    }
}

/// Inner shared state of a [`Function`].
pub(crate) struct FunctionContents {
    pub name: String,
    pub args: Vec<String>,
    pub values: Vec<Expr>,
    pub updates: Vec<UpdateDefinition>,
    pub estimates: Vec<Estimate>,
    pub directives: Vec<Directive>,
}

/// Shared handle to a pipeline function.
///
/// Cloning is cheap; all clones refer to the same definition and schedule
/// state. Equality compares names.
#[derive(Clone)]
pub struct Function {
    inner: Arc<Mutex<FunctionContents>>,
}

impl Function {
    /// Create an undefined function over the given pure argument variables.
    pub fn new(name: &str, args: &[&str]) -> Function {
        Function {
            inner: Arc::new(Mutex::new(FunctionContents {
                name: name.to_string(),
                args: args.iter().map(|a| (*a).to_string()).collect(),
                values: Vec::new(),
                updates: Vec::new(),
                estimates: Vec::new(),
                directives: Vec::new(),
            })),
        }
    }

    /// Define the pure stage.
    pub fn define(&self, values: Vec<Expr>) -> &Function {
        self.inner.lock().unwrap().values = values;
        self
    }

    /// Append an update definition.
    pub fn define_update(
        &self,
        args: Vec<Expr>,
        values: Vec<Expr>,
        rvars: Vec<ReductionVariable>,
    ) -> &Function {
        self.inner
            .lock()
            .unwrap()
            .updates
            .push(UpdateDefinition { args, values, rvars });
        self
    }

    /// Attach a literal output estimate for one dimension.
    pub fn set_estimate(&self, var: &str, min: i64, extent: i64) -> &Function {
        self.set_estimate_expr(var, Expr::IntImm(min), Expr::IntImm(extent))
    }

    /// Attach an estimate with arbitrary (possibly non-literal) bounds.
    pub fn set_estimate_expr(&self, var: &str, min: Expr, extent: Expr) -> &Function {
        let mut g = self.inner.lock().unwrap();
        g.estimates.retain(|e| e.var != var);
        g.estimates.push(Estimate {
            var: var.to_string(),
            min,
            extent,
        });
        self
    }

    pub fn name(&self) -> String {
        self.inner.lock().unwrap().name.clone()
    }

    pub fn args(&self) -> Vec<String> {
        self.inner.lock().unwrap().args.clone()
    }

    pub fn values(&self) -> Vec<Expr> {
        self.inner.lock().unwrap().values.clone()
    }

    pub fn updates(&self) -> Vec<UpdateDefinition> {
        self.inner.lock().unwrap().updates.clone()
    }

    pub fn estimates(&self) -> Vec<Estimate> {
        self.inner.lock().unwrap().estimates.clone()
    }

    /// The estimate attached to a dimension, if any.
    pub fn estimate_for(&self, var: &str) -> Option<Estimate> {
        self.inner
            .lock()
            .unwrap()
            .estimates
            .iter()
            .find(|e| e.var == var)
            .cloned()
    }

    /// Result types, one per tuple component of the pure definition.
    pub fn output_types(&self) -> Vec<Type> {
        self.inner.lock().unwrap().values.iter().map(Expr::ty).collect()
    }

    /// True when the function has no update definitions.
    pub fn is_pure(&self) -> bool {
        self.inner.lock().unwrap().updates.is_empty()
    }

    /// Pure definition plus updates.
    pub fn num_stages(&self) -> usize {
        1 + self.inner.lock().unwrap().updates.len()
    }

    /// Index of the final stage.
    pub fn last_stage(&self) -> usize {
        self.num_stages() - 1
    }

    /// A call into this function at the given index arguments.
    pub fn at(&self, args: Vec<Expr>) -> Expr {
        let ty = self.output_types().first().copied().unwrap_or(Type::I32);
        Expr::Call {
            target: crate::expr::CallTarget::Pipeline(self.clone()),
            args,
            ty,
        }
    }

    /// Reduction variables of a stage (empty for the pure stage).
    pub fn stage_rvars(&self, stage: usize) -> Vec<ReductionVariable> {
        if stage == 0 {
            Vec::new()
        } else {
            self.inner.lock().unwrap().updates[stage - 1].rvars.clone()
        }
    }

    /// Value expressions of a stage.
    pub fn stage_values(&self, stage: usize) -> Vec<Expr> {
        if stage == 0 {
            self.values()
        } else {
            self.inner.lock().unwrap().updates[stage - 1].values.clone()
        }
    }

    /// Left-hand-side argument expressions of a stage. For the pure stage
    /// these are the pure variables themselves.
    pub fn stage_args(&self, stage: usize) -> Vec<Expr> {
        if stage == 0 {
            self.args().into_iter().map(Expr::Var).collect()
        } else {
            self.inner.lock().unwrap().updates[stage - 1].args.clone()
        }
    }

    /// Ordered dimension list of a stage, innermost first: pure variables,
    /// then the stage's reduction variables, then the implicit outermost.
    pub fn dims(&self, stage: usize) -> Vec<String> {
        let mut out = self.args();
        out.extend(self.stage_rvars(stage).into_iter().map(|r| r.name));
        out.push(OUTERMOST.to_string());
        out
    }

    /// Handle addressing one stage of this function for scheduling.
    pub fn stage(&self, stage: usize) -> Stage {
        Stage {
            func: self.clone(),
            stage,
        }
    }

    pub fn compute_root(&self) {
        self.push_directive(Directive::ComputeRoot);
    }

    pub fn compute_inline(&self) {
        self.push_directive(Directive::ComputeInline);
    }

    /// All directives applied so far, in order.
    pub fn directives(&self) -> Vec<Directive> {
        self.inner.lock().unwrap().directives.clone()
    }

    fn push_directive(&self, d: Directive) {
        self.inner.lock().unwrap().directives.push(d);
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name())
    }
}

/// Handle addressing one stage of a function for schedule application.
#[derive(Clone)]
pub struct Stage {
    func: Function,
    stage: usize,
}

impl Stage {
    pub fn split(&self, dim: &str, outer: &str, inner: &str, factor: i64) {
        self.func.push_directive(Directive::Split {
            stage: self.stage,
            dim: dim.to_string(),
            outer: outer.to_string(),
            inner: inner.to_string(),
            factor,
        });
    }

    pub fn reorder(&self, dims: &[String]) {
        self.func.push_directive(Directive::Reorder {
            stage: self.stage,
            dims: dims.to_vec(),
        });
    }

    pub fn vectorize(&self, dim: &str) {
        self.func.push_directive(Directive::Vectorize {
            stage: self.stage,
            dim: dim.to_string(),
        });
    }

    pub fn parallel(&self, dim: &str) {
        self.func.push_directive(Directive::Parallel {
            stage: self.stage,
            dim: dim.to_string(),
        });
    }
}

/// Identifier of one stage of one function.
///
/// Ordering is lexicographic on `(name, stage_num)`, which is what makes the
/// partitioner's candidate iteration deterministic.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FStage {
    pub func: String,
    pub stage: usize,
}

impl FStage {
    pub fn new(func: &str, stage: usize) -> FStage {
        FStage {
            func: func.to_string(),
            stage,
        }
    }
}

impl fmt::Display for FStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stage == 0 {
            write!(f, "{}", self.func)
        } else {
            write!(f, "{}.update({})", self.func, self.stage - 1)
        }
    }
}

/// Validate that every estimate of `f` has literal bounds, returning the
/// simplified `(min, extent)` per dimension in argument order.
pub(crate) fn literal_estimates(f: &Function) -> Result<Vec<(String, i64, i64)>, crate::error::UserError> {
    let mut out = Vec::new();
    for arg in f.args() {
        let est = f
            .estimate_for(&arg)
            .ok_or_else(|| crate::error::UserError::MissingEstimate {
                func: f.name(),
                var: arg.clone(),
            })?;
        let min = simplify(&est.min);
        let extent = simplify(&est.extent);
        match (min, extent) {
            (Expr::IntImm(m), Expr::IntImm(e)) => out.push((arg, m, e)),
            _ => {
                return Err(crate::error::UserError::NonLiteralEstimate {
                    func: f.name(),
                    var: arg,
                });
            }
        }
    }
    Ok(out)
}
