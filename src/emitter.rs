//! Schedule emission: lower the finalized groups into concrete schedule
//! directives and a printable report.
//!
//! For every functionally inlined producer a `compute_inline` is emitted;
//! every group output then receives, in order: `compute_root` (pure stages),
//! tile splits, a `reorder` placing intra-tile loops innermost, vectorization
//! of the innermost pure dimension, and parallelization of outer loops until
//! the machine's parallelism budget is met.

use crate::expr::Type;
use crate::func::{Directive, FStage, Function, OUTERMOST};
use crate::interval::RegionMap;
use crate::partition::{Group, GroupAnalysis};
use crate::{Env, MachineParams};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// Ceiling division for signed integers (stable equivalent of the unstable
/// `i64::div_ceil`).
fn div_ceil_i64(a: i64, b: i64) -> i64 {
    let d = a / b;
    let r = a % b;
    if (r > 0 && b > 0) || (r < 0 && b < 0) {
        d + 1
    } else {
        d
    }
}

/// One emitted schedule directive, with its rendered form.
#[derive(Clone, Debug, Serialize)]
pub struct DirectiveRecord {
    pub func: String,
    pub stage: usize,
    pub text: String,
}

/// Summary of one final group.
#[derive(Clone, Debug, Serialize)]
pub struct GroupSummary {
    pub output: FStage,
    pub members: Vec<FStage>,
    pub inlined: Vec<String>,
    pub tiled_producers: Vec<String>,
    pub tile_sizes: BTreeMap<String, i64>,
    pub reuse: BTreeMap<String, Option<i64>>,
    pub analysis: GroupAnalysis,
}

/// The complete emitted schedule: a textual record suitable for logging, plus
/// enough structure to serialize or inspect programmatically.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScheduleReport {
    pub directives: Vec<DirectiveRecord>,
    pub groups: Vec<GroupSummary>,
    pub warnings: Vec<String>,
}

impl ScheduleReport {
    /// Export the report to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing schedule report")
    }

    /// Write the report to a file in JSON format.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)
            .with_context(|| format!("writing schedule report to {}", path.as_ref().display()))
    }
}

impl Display for ScheduleReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "╔═══════════════════════════════════════════════════════════════╗"
        )?;
        writeln!(
            f,
            "║                     GENERATED SCHEDULE                        ║"
        )?;
        writeln!(
            f,
            "╚═══════════════════════════════════════════════════════════════╝"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ GROUPS ─────────────────────────────────────────────────────┐"
        )?;
        for g in &self.groups {
            writeln!(f, "│")?;
            writeln!(f, "│ Group at {}", g.output)?;
            let members = g
                .members
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "│   members: [{members}]")?;
            if !g.inlined.is_empty() {
                writeln!(f, "│   inlined: [{}]", g.inlined.join(", "))?;
            }
            if !g.tiled_producers.is_empty() {
                writeln!(f, "│   tiled producers: [{}]", g.tiled_producers.join(", "))?;
            }
            if !g.tile_sizes.is_empty() {
                let tiles = g
                    .tile_sizes
                    .iter()
                    .map(|(d, t)| format!("{d}={t}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(f, "│   tile sizes: {{{tiles}}}")?;
            }
            let fmt_cost =
                |c: Option<i64>| c.map_or_else(|| "unknown".to_string(), |v| v.to_string());
            writeln!(
                f,
                "│   cost: arith={}, mem={}, parallelism={}",
                fmt_cost(g.analysis.arith_cost),
                fmt_cost(g.analysis.mem_cost),
                fmt_cost(g.analysis.parallelism)
            )?;
        }
        writeln!(f, "│")?;
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ DIRECTIVES ─────────────────────────────────────────────────┐"
        )?;
        for d in &self.directives {
            writeln!(f, "│ {}", d.text)?;
        }
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )?;

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "┌─ WARNINGS ───────────────────────────────────────────────────┐"
            )?;
            for w in &self.warnings {
                writeln!(f, "│ {w}")?;
            }
            writeln!(
                f,
                "└──────────────────────────────────────────────────────────────┘"
            )?;
        }
        Ok(())
    }
}

/// Widest natural vector length over a type for the target: `vec_len` counts
/// 32-bit lanes, wider/narrower types scale by their byte width.
pub fn natural_vector_size(ty: Type, arch: &MachineParams) -> i64 {
    ((arch.vec_len * 4) / ty.bytes()).max(1)
}

/// Applies schedule directives onto the pipeline's function handles and
/// collects the report.
pub struct ScheduleEmitter<'a> {
    env: &'a Env,
    arch: &'a MachineParams,
    pipeline_bounds: &'a RegionMap,
}

impl<'a> ScheduleEmitter<'a> {
    pub fn new(env: &'a Env, arch: &'a MachineParams, pipeline_bounds: &'a RegionMap) -> Self {
        ScheduleEmitter {
            env,
            arch,
            pipeline_bounds,
        }
    }

    /// Emit the schedule for the final groups, applying every directive to the
    /// function handles as a side effect.
    pub fn emit(
        &self,
        groups: &BTreeMap<FStage, Group>,
        analyses: &BTreeMap<FStage, GroupAnalysis>,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        let mut inlined_all: BTreeSet<String> = BTreeSet::new();
        for g in groups.values() {
            inlined_all.extend(g.inlined.iter().cloned());
        }
        for name in &inlined_all {
            if let Some(f) = self.env.get(name) {
                f.compute_inline();
                report.directives.push(DirectiveRecord {
                    func: name.clone(),
                    stage: 0,
                    text: Directive::ComputeInline.render(name),
                });
            }
        }

        for (key, g) in groups {
            self.emit_group(g, &mut report);
            report.groups.push(GroupSummary {
                output: g.output.clone(),
                members: g.members.clone(),
                inlined: g.inlined.iter().cloned().collect(),
                tiled_producers: g.tiled_inline.iter().cloned().collect(),
                tile_sizes: g.tile_sizes.clone(),
                reuse: g.reuse.clone(),
                analysis: analyses.get(key).copied().unwrap_or_default(),
            });
        }
        report
    }

    fn emit_group(&self, g: &Group, report: &mut ScheduleReport) {
        let Some(f) = self.env.get(&g.output.func) else {
            return;
        };
        let stage_idx = g.output.stage;
        let stage = f.stage(stage_idx);
        let fname = f.name();
        let mut record = |d: Directive| {
            report.directives.push(DirectiveRecord {
                func: fname.clone(),
                stage: stage_idx,
                text: d.render(&fname),
            });
        };

        if stage_idx == 0 {
            f.compute_root();
            record(Directive::ComputeRoot);
        }

        let dims: Vec<String> = f
            .dims(stage_idx)
            .into_iter()
            .filter(|d| d != OUTERMOST)
            .collect();
        let rvar_names: BTreeSet<String> = f
            .stage_rvars(stage_idx)
            .into_iter()
            .map(|r| r.name)
            .collect();

        // Current loop extents, updated as splits are applied.
        let mut estimates: BTreeMap<String, i64> = BTreeMap::new();
        if let Some(full) = self.pipeline_bounds.get(&fname) {
            for (i, arg) in f.args().iter().enumerate() {
                if let Some(e) = full.get(i).extent() {
                    estimates.insert(arg.clone(), e);
                }
            }
        }
        for rv in f.stage_rvars(stage_idx) {
            if let Some(e) =
                crate::interval::Interval::from_min_extent_expr(&rv.min, &rv.extent).extent()
            {
                estimates.insert(rv.name.clone(), e);
            }
        }

        // Tile splits. Untiled dims stay intra-tile; a size-1 tile leaves the
        // original dim as a tile loop.
        let mut inners: Vec<String> = Vec::new();
        let mut outers: Vec<String> = Vec::new();
        let mut inner_name: BTreeMap<String, String> = BTreeMap::new();
        for d in &dims {
            match g.tile_sizes.get(d) {
                Some(&t) if t > 1 => {
                    let outer = format!("{d}_o");
                    let inner = format!("{d}_i");
                    stage.split(d, &outer, &inner, t);
                    record(Directive::Split {
                        stage: stage_idx,
                        dim: d.clone(),
                        outer: outer.clone(),
                        inner: inner.clone(),
                        factor: t,
                    });
                    let old = estimates.get(d).copied();
                    estimates.insert(inner.clone(), t);
                    if let Some(old) = old {
                        estimates.insert(outer.clone(), div_ceil_i64(old, t));
                    }
                    inner_name.insert(d.clone(), inner.clone());
                    inners.push(inner);
                    outers.push(outer);
                }
                Some(_) => {
                    outers.push(d.clone());
                }
                None => {
                    inners.push(d.clone());
                }
            }
        }

        if !outers.is_empty() {
            let order: Vec<String> = inners.iter().chain(outers.iter()).cloned().collect();
            stage.reorder(&order);
            record(Directive::Reorder {
                stage: stage_idx,
                dims: order,
            });
        }

        // Innermost-first loop order after tiling.
        let mut loop_order: Vec<String> = inners.iter().chain(outers.iter()).cloned().collect();

        // Vectorize the innermost pure dimension if a full vector fits.
        let vector_width = f
            .output_types()
            .iter()
            .map(|t| natural_vector_size(*t, self.arch))
            .max()
            .unwrap_or(self.arch.vec_len);
        let mut vectorized: Option<String> = None;
        let candidate = f
            .args()
            .first()
            .map(|d| inner_name.get(d).cloned().unwrap_or_else(|| d.clone()));
        if let Some(cand) = candidate {
            let eligible = !outers.contains(&cand);
            if eligible && estimates.get(&cand).copied().unwrap_or(0) >= vector_width {
                let vo = format!("{cand}_vo");
                let vi = format!("{cand}_vi");
                stage.split(&cand, &vo, &vi, vector_width);
                stage.vectorize(&vi);
                record(Directive::Split {
                    stage: stage_idx,
                    dim: cand.clone(),
                    outer: vo.clone(),
                    inner: vi.clone(),
                    factor: vector_width,
                });
                record(Directive::Vectorize {
                    stage: stage_idx,
                    dim: vi.clone(),
                });
                let old = estimates.get(&cand).copied().unwrap_or(vector_width);
                estimates.insert(vi.clone(), vector_width);
                estimates.insert(vo.clone(), div_ceil_i64(old, vector_width));
                if let Some(pos) = loop_order.iter().position(|d| *d == cand) {
                    loop_order.splice(pos..=pos, [vi.clone(), vo]);
                }
                vectorized = Some(vi);
            }
        }

        // Parallelize from the outermost loop inward until the machine's
        // parallelism budget is covered. With tiling only tile loops are
        // eligible; reduction loops must be race-free to qualify.
        let parallel_candidates: Vec<String> = if outers.is_empty() {
            loop_order
                .iter()
                .rev()
                .filter(|d| Some(*d) != vectorized.as_ref())
                .cloned()
                .collect()
        } else {
            outers.iter().rev().cloned().collect()
        };
        let mut attained = 1i64;
        for d in parallel_candidates {
            if attained >= self.arch.parallelism {
                break;
            }
            if rvar_names.contains(&d) && !can_parallelize_rvar(f, stage_idx, &d) {
                continue;
            }
            stage.parallel(&d);
            record(Directive::Parallel {
                stage: stage_idx,
                dim: d.clone(),
            });
            attained = attained.saturating_mul(estimates.get(&d).copied().unwrap_or(1));
        }
        if attained < self.arch.parallelism {
            let w = format!(
                "schedule for {} reaches parallelism {attained}, below the machine's {}",
                g.output, self.arch.parallelism
            );
            log::warn!("{w}");
            report.warnings.push(w);
        }
    }
}

/// A reduction variable can be parallelized only when each of its values
/// writes a disjoint slice: it must appear bare as one left-hand-side
/// argument and in no other.
pub fn can_parallelize_rvar(f: &Function, stage: usize, rvar: &str) -> bool {
    if stage == 0 {
        return true;
    }
    let args = f.stage_args(stage);
    let mut appears_bare = false;
    for arg in &args {
        match arg {
            crate::expr::Expr::Var(v) if v == rvar => appears_bare = true,
            other => {
                let mut uses = false;
                other.walk(&mut |e| {
                    if let crate::expr::Expr::Var(v) = e {
                        if v == rvar {
                            uses = true;
                        }
                    }
                });
                if uses {
                    return false;
                }
            }
        }
    }
    appears_bare
}
