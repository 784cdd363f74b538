//! Dependence analysis over the pipeline graph.
//!
//! Given a stage and a bounds box for it, this module answers: which region of
//! every upstream function is required, how much of that region two adjacent
//! tiles would both touch, and what the concrete bounds of the whole pipeline
//! are once the user's output estimates are propagated upstream.

use crate::bounds::boxes_required_into;
use crate::env::Env;
use crate::expr::Expr;
use crate::func::{FStage, Function, OUTERMOST};
use crate::interval::{merge_regions, DimBounds, DimBox, Interval, RegionMap};
use crate::simplify::simplify;
use std::collections::VecDeque;

/// Work-queue ceiling for transitive region propagation. A well-formed
/// pipeline DAG drains long before this; hitting it means a dependence cycle.
const MAX_QUEUE_STEPS: usize = 1 << 16;

pub struct DependenceAnalysis {
    env: Env,
}

impl DependenceAnalysis {
    pub fn new(env: Env) -> DependenceAnalysis {
        DependenceAnalysis { env }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Bounds for one stage: the pure-variable bounds overlaid with the
    /// stage's reduction domains.
    pub fn get_stage_bounds(&self, s: &FStage, pure_bounds: &DimBounds) -> DimBounds {
        let mut bounds = pure_bounds.clone();
        if let Some(f) = self.env.get(&s.func) {
            for rv in f.stage_rvars(s.stage) {
                bounds.insert(
                    rv.name.clone(),
                    Interval::from_min_extent_expr(&rv.min, &rv.extent),
                );
            }
        }
        bounds
    }

    /// Region of every upstream function required to evaluate `s` over
    /// `bounds` (which must cover the stage's pure and reduction variables).
    ///
    /// Transitive: producers found in the stage's expressions are queued with
    /// bounds derived from their required boxes, and every stage of a producer
    /// is visited so reduction domains widen the propagated regions.
    pub fn regions_required_stage(&self, s: &FStage, bounds: &DimBounds) -> RegionMap {
        let mut regions = RegionMap::new();
        let mut queue: VecDeque<(FStage, DimBounds)> = VecDeque::new();
        queue.push_back((s.clone(), bounds.clone()));

        let mut steps = 0usize;
        while let Some((cur, cur_bounds)) = queue.pop_front() {
            steps += 1;
            if steps > MAX_QUEUE_STEPS {
                log::warn!(
                    "region propagation from {} did not drain; pipeline has a dependence cycle",
                    s
                );
                break;
            }
            let Some(f) = self.env.get(&cur.func).cloned() else {
                continue;
            };

            // Scope: every dim of the stage except the implicit outermost.
            let mut scope = DimBounds::new();
            for d in f.dims(cur.stage) {
                if d == OUTERMOST {
                    continue;
                }
                if let Some(iv) = cur_bounds.get(&d) {
                    scope.insert(d, iv.clone());
                }
            }

            let mut local = RegionMap::new();
            for e in f.stage_values(cur.stage) {
                boxes_required_into(&e, &scope, &mut local);
            }
            if cur.stage > 0 {
                for e in f.stage_args(cur.stage) {
                    boxes_required_into(&e, &scope, &mut local);
                }
            }

            for (gname, gbox) in &local {
                if *gname == cur.func || !self.env.contains(gname) {
                    continue;
                }
                let g = self.env.get(gname).cloned().unwrap();
                if g.args().len() != gbox.rank() {
                    log::warn!("call into {gname} with {} indices, expected {}; skipping propagation", gbox.rank(), g.args().len());
                    continue;
                }
                let mut pure_bounds = DimBounds::new();
                for (i, arg) in g.args().iter().enumerate() {
                    pure_bounds.insert(arg.clone(), gbox.get(i).clone());
                }
                for k in 0..g.num_stages() {
                    let gs = FStage::new(gname, k);
                    let stage_bounds = self.get_stage_bounds(&gs, &pure_bounds);
                    queue.push_back((gs, stage_bounds));
                }
            }
            merge_regions(&mut regions, local);
        }

        self.finalize_regions(&mut regions);
        regions
    }

    /// Whole-function required regions: per-stage region maps merged by hull.
    pub fn regions_required(&self, f: &Function, pure_bounds: &DimBounds) -> RegionMap {
        let mut regions = RegionMap::new();
        for k in 0..f.num_stages() {
            let s = FStage::new(&f.name(), k);
            let stage_bounds = self.get_stage_bounds(&s, pure_bounds);
            merge_regions(&mut regions, self.regions_required_stage(&s, &stage_bounds));
        }
        regions
    }

    /// Overlap between the regions required by two adjacent tiles along `var`:
    /// the intersection of the regions at `bounds` and at `bounds` shifted by
    /// the variable's extent. Functions absent on the shifted side, and
    /// provably empty intersections, are dropped.
    pub fn redundant_regions(&self, s: &FStage, var: &str, bounds: &DimBounds) -> RegionMap {
        let Some(iv) = bounds.get(var) else {
            return RegionMap::new();
        };
        let Some(extent) = iv.extent() else {
            return RegionMap::new();
        };

        let orig = self.regions_required_stage(s, bounds);
        let mut shifted_bounds = bounds.clone();
        shifted_bounds.insert(var.to_string(), iv.shifted(extent));
        let shifted = self.regions_required_stage(s, &shifted_bounds);

        let mut overlap = RegionMap::new();
        for (name, b1) in orig {
            let Some(b2) = shifted.get(&name) else {
                continue;
            };
            if b1.rank() != b2.rank() {
                continue;
            }
            let inter = b1.intersect(b2);
            if !inter.is_known_empty() {
                overlap.insert(name, inter);
            }
        }
        overlap
    }

    /// One redundant-region map per non-outermost dim of the stage, in
    /// dimension order.
    pub fn overlap_regions(&self, s: &FStage, bounds: &DimBounds) -> Vec<(String, RegionMap)> {
        let Some(f) = self.env.get(&s.func) else {
            return Vec::new();
        };
        f.dims(s.stage)
            .into_iter()
            .filter(|d| d != OUTERMOST)
            .map(|d| {
                let r = self.redundant_regions(s, &d, bounds);
                (d, r)
            })
            .collect()
    }

    /// Concrete bounds for every function in the pipeline: outputs seeded
    /// with their estimate boxes, producers with the hull of everything their
    /// consumers require.
    pub fn get_pipeline_bounds(&self, outputs: &[Function]) -> RegionMap {
        let mut bounds = RegionMap::new();
        for f in outputs {
            let mut pure_bounds = DimBounds::new();
            let mut out_box = Vec::new();
            for arg in f.args() {
                let iv = match f.estimate_for(&arg) {
                    Some(est) => Interval::from_min_extent_expr(&est.min, &est.extent),
                    None => Interval::point(Expr::Var(arg.clone())),
                };
                pure_bounds.insert(arg.clone(), iv.clone());
                out_box.push(iv);
            }
            merge_regions(
                &mut bounds,
                RegionMap::from([(f.name(), DimBox::new(out_box))]),
            );
            merge_regions(&mut bounds, self.regions_required(f, &pure_bounds));
        }
        bounds
    }

    /// Simplify box endpoints; endpoints that stay non-literal on a function
    /// with user estimates fall back to the estimate bounds.
    fn finalize_regions(&self, regions: &mut RegionMap) {
        for (name, reg) in regions.iter_mut() {
            let func = self.env.get(name).cloned();
            let args = func.as_ref().map(Function::args);
            for (i, iv) in reg.iter_mut().enumerate() {
                iv.min = simplify(&iv.min);
                iv.max = simplify(&iv.max);
                let (Some(f), Some(args)) = (&func, &args) else {
                    continue;
                };
                let Some(arg) = args.get(i) else { continue };
                let Some(est) = f.estimate_for(arg) else {
                    continue;
                };
                let est_iv = Interval::from_min_extent_expr(&est.min, &est.extent);
                if !matches!(iv.min, Expr::IntImm(_)) {
                    iv.min = est_iv.min.clone();
                }
                if !matches!(iv.max, Expr::IntImm(_)) {
                    iv.max = est_iv.max.clone();
                }
            }
        }
    }
}
