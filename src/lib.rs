//! # Tileflow
//!
//! An **analytical auto-scheduler** for staged image-processing pipelines.
//! Given a DAG of pure and reduction functions, user estimates for the output
//! extents, and a handful of machine parameters, Tileflow decides per stage
//! which producers to fuse (by inlining or at tile granularity), how to tile
//! each output, how to order loops, and where to vectorize and parallelize.
//! It applies those decisions through the pipeline's schedule primitives and
//! returns a printable record of everything it did.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tileflow::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! // A brighten stage over an input image.
//! let bright = Function::new("bright", &["x", "y"]);
//! bright.define(vec![image("input", Type::F32, vec![var("x"), var("y")]) * flit(1.5)]);
//! bright.set_estimate("x", 0, 1024);
//! bright.set_estimate("y", 0, 1024);
//!
//! // Generate and apply a schedule for a 16-core, 8-lane machine.
//! let report = generate_schedule(&[bright], &MachineParams::generic())?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## How it works
//!
//! 1. **Bounds.** [`DependenceAnalysis`] pushes the output estimates upstream,
//!    producing a concrete bounding box for every function in the pipeline.
//! 2. **Costs.** [`CostModel`] prices every stage per point (arithmetic ops
//!    and bytes loaded), then lifts point costs to regions and working sets.
//! 3. **Search.** [`Partitioner`] starts with one group per stage and
//!    greedily applies the best fusion until nothing helps: first inlining
//!    pure producers, then absorbing producers at tile granularity, choosing
//!    tile sizes from a canonical configuration grid.
//! 4. **Emission.** [`ScheduleEmitter`] lowers the final groups into
//!    `compute_root` / `compute_inline` / `split` / `reorder` / `vectorize` /
//!    `parallel` directives and collects them into a [`ScheduleReport`].
//!
//! The scheduler is single-threaded, deterministic, and entirely in-memory:
//! the same pipeline and machine parameters always produce the same schedule.
//!
//! ## Errors
//!
//! Missing or non-literal output estimates surface as [`UserError`] before any
//! analysis runs. Extents the bounds machinery cannot resolve mid-search are
//! *not* errors; they make the affected fusion choice unattractive and the
//! search moves on.

pub mod bounds;
pub mod cost;
pub mod dependence;
pub mod emitter;
pub mod env;
pub mod error;
pub mod expr;
pub mod func;
pub mod interval;
pub mod partition;
pub mod simplify;

pub use crate::bounds::{bounds_of_expr, boxes_required};
pub use crate::cost::{CostModel, CostVisitor, ExprCost, RegionCost};
pub use crate::dependence::DependenceAnalysis;
pub use crate::emitter::{
    natural_vector_size, DirectiveRecord, GroupSummary, ScheduleEmitter, ScheduleReport,
};
pub use crate::env::{find_direct_calls, find_transitive_calls, realization_order, Env};
pub use crate::error::UserError;
pub use crate::expr::{
    cast, extern_call, flit, image, intrinsic, lit, max, min, select, var, BinOp, CallTarget,
    Expr, LoweredKind, Type,
};
pub use crate::func::{
    Directive, Estimate, FStage, Function, ReductionVariable, Stage, UpdateDefinition, OUTERMOST,
};
pub use crate::interval::{DimBounds, DimBox, Interval, RegionMap};
pub use crate::partition::{FusionChoice, Group, GroupAnalysis, GroupingLevel, Partitioner};
pub use crate::simplify::simplify;

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;

/// Description of the target machine. These are tuning knobs, not a wire
/// format; [`MachineParams::generic`] gives reproducible defaults and
/// `Default` adapts the core count to the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MachineParams {
    /// Cores to keep busy.
    pub parallelism: i64,
    /// Vector lanes, counted in 32-bit elements.
    pub vec_len: i64,
    /// Bytes of fast memory a tile's intermediates should fit in.
    pub fast_mem_size: i64,
    /// Weight of memory cost against arithmetic cost in fusion decisions.
    pub balance: i64,
}

impl MachineParams {
    /// The documented compile-time defaults, independent of the host.
    pub const fn generic() -> MachineParams {
        MachineParams {
            parallelism: 16,
            vec_len: 8,
            fast_mem_size: 1024,
            balance: 10,
        }
    }
}

impl Default for MachineParams {
    fn default() -> Self {
        MachineParams {
            parallelism: i64::try_from(num_cpus::get()).unwrap_or(16).max(1),
            ..MachineParams::generic()
        }
    }
}

/// Generate and apply a schedule for the pipeline rooted at `outputs`.
///
/// Every schedule primitive the scheduler decides on is applied to the
/// [`Function`] handles as a side effect; the returned [`ScheduleReport`]
/// records the same decisions in emission order.
///
/// # Errors
///
/// Returns [`UserError`] when any output dimension is missing a literal
/// estimate.
pub fn generate_schedule(outputs: &[Function], arch: &MachineParams) -> Result<ScheduleReport> {
    for f in outputs {
        func::literal_estimates(f)?;
    }

    let env = find_transitive_calls(outputs);
    log::debug!("pipeline environment has {} functions", env.len());

    let dep = DependenceAnalysis::new(env.clone());
    let pipeline_bounds = dep.get_pipeline_bounds(outputs);
    let costs = CostModel::new(env.clone());

    let output_names: BTreeSet<String> = outputs.iter().map(Function::name).collect();
    let mut partitioner = Partitioner::new(
        env.clone(),
        dep,
        costs,
        pipeline_bounds.clone(),
        output_names,
        arch.clone(),
    );
    partitioner.group(GroupingLevel::Inline);
    partitioner.group(GroupingLevel::FastMem);

    let analyses = partitioner.final_analyses();
    let emitter = ScheduleEmitter::new(&env, arch, &pipeline_bounds);
    let report = emitter.emit(partitioner.groups(), &analyses);
    log::debug!(
        "emitted {} directives over {} groups",
        report.directives.len(),
        report.groups.len()
    );
    Ok(report)
}
