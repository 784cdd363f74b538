//! Greedy fixpoint partitioner over fusion choices.
//!
//! The partitioner starts with one group per stage and repeatedly applies the
//! single best-looking merge until no merge helps, first at [`GroupingLevel::Inline`]
//! (expand pure producers into their consumers' expressions), then at
//! [`GroupingLevel::FastMem`] (materialize a producer at the tile granularity
//! of its single consumer).
//!
//! Every candidate merge is priced by synthesizing the fused group and running
//! the analytical cost model over it; results are memoized in a fusion cache
//! keyed by `(producer, consumer stage)` and selectively invalidated when a
//! merge rewrites the group graph.
//!
//! Candidate collection iterates groups in [`FStage`] order and the tile
//! configuration list is traversed in generation order, so identical inputs
//! always produce the identical schedule.

use crate::cost::{cost_add, cost_mul, CostModel};
use crate::dependence::DependenceAnalysis;
use crate::env::Env;
use crate::func::FStage;
use crate::interval::{DimBounds, Interval, RegionMap};
use crate::MachineParams;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

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

/// The two rounds of the grouping loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupingLevel {
    /// Expand pure producers into consumer expressions; no storage remains.
    Inline,
    /// Store the producer at tile granularity inside the consumer's loop nest.
    FastMem,
}

/// A set of stages computed at the granularity of one output stage's tiling.
#[derive(Clone, Debug)]
pub struct Group {
    /// The stage with no successor inside the group.
    pub output: FStage,
    /// Member stages, in splice order.
    pub members: Vec<FStage>,
    /// Functions expanded into their consumers; these get `compute_inline`.
    pub inlined: BTreeSet<String>,
    /// Producers absorbed at tile granularity. They stay materialized, but the
    /// cost analysis accounts their arithmetic inside their consumers.
    pub tiled_inline: BTreeSet<String>,
    /// Tile size per pure dimension; omission leaves the dimension untiled.
    pub tile_sizes: BTreeMap<String, i64>,
    /// Bytes of producer data shared between adjacent positions along each
    /// dimension; `None` when the overlap could not be resolved.
    pub reuse: BTreeMap<String, Option<i64>>,
}

impl Group {
    fn solo(stage: FStage) -> Group {
        Group {
            output: stage.clone(),
            members: vec![stage],
            inlined: BTreeSet::new(),
            tiled_inline: BTreeSet::new(),
            tile_sizes: BTreeMap::new(),
            reuse: BTreeMap::new(),
        }
    }

    /// Function names of all members.
    pub fn member_functions(&self) -> BTreeSet<String> {
        self.members.iter().map(|s| s.func.clone()).collect()
    }

    /// Every name the cost analysis treats as expanded into its consumers.
    pub fn cost_inlines(&self) -> BTreeSet<String> {
        self.inlined.union(&self.tiled_inline).cloned().collect()
    }
}

/// Result of analyzing one group. `None` components mean the group could not
/// be analyzed; such an analysis compares as strictly worse than any known one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroupAnalysis {
    pub arith_cost: Option<i64>,
    pub mem_cost: Option<i64>,
    pub parallelism: Option<i64>,
}

impl GroupAnalysis {
    pub fn unknown() -> GroupAnalysis {
        GroupAnalysis::default()
    }

    pub fn is_known(&self) -> bool {
        self.arith_cost.is_some() && self.mem_cost.is_some() && self.parallelism.is_some()
    }
}

/// A candidate fusion: absorb `prod` into the group whose output is `cons`.
///
/// Equality and ordering deliberately ignore `tile_sizes`, so a cache probe
/// without tile sizes finds the stored entry that carries the chosen ones.
#[derive(Clone, Debug)]
pub struct FusionChoice {
    pub prod: String,
    pub cons: FStage,
    pub tile_sizes: BTreeMap<String, i64>,
}

impl FusionChoice {
    fn probe(prod: &str, cons: FStage) -> FusionChoice {
        FusionChoice {
            prod: prod.to_string(),
            cons,
            tile_sizes: BTreeMap::new(),
        }
    }
}

impl PartialEq for FusionChoice {
    fn eq(&self, other: &Self) -> bool {
        self.prod == other.prod && self.cons == other.cons
    }
}

impl Eq for FusionChoice {}

impl PartialOrd for FusionChoice {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FusionChoice {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.prod, &self.cons).cmp(&(&other.prod, &other.cons))
    }
}

const TILE_SIZE_VARIANTS: [i64; 8] = [1, 4, 8, 16, 32, 64, 128, 256];

/// Greedy fusion search state.
pub struct Partitioner {
    env: Env,
    dep: DependenceAnalysis,
    costs: CostModel,
    arch: MachineParams,
    outputs: BTreeSet<String>,
    pipeline_bounds: RegionMap,
    /// Group per output stage. The key always equals the group's output.
    groups: BTreeMap<FStage, Group>,
    /// Producer stage to consumer stages. Call edges target the producer's
    /// final stage; each stage also feeds the next stage of its function.
    children: BTreeMap<FStage, BTreeSet<FStage>>,
    fusion_cache: BTreeMap<FusionChoice, GroupAnalysis>,
    group_costs: BTreeMap<FStage, GroupAnalysis>,
}

impl Partitioner {
    pub fn new(
        env: Env,
        dep: DependenceAnalysis,
        costs: CostModel,
        pipeline_bounds: RegionMap,
        outputs: BTreeSet<String>,
        arch: MachineParams,
    ) -> Partitioner {
        let mut groups = BTreeMap::new();
        let mut children: BTreeMap<FStage, BTreeSet<FStage>> = BTreeMap::new();

        for (name, f) in env.iter() {
            for k in 0..f.num_stages() {
                let stage = FStage::new(name, k);
                groups.insert(stage.clone(), Group::solo(stage.clone()));
                if k >= 1 {
                    children
                        .entry(FStage::new(name, k - 1))
                        .or_default()
                        .insert(stage.clone());
                }
                let mut exprs = f.stage_values(k);
                if k > 0 {
                    exprs.extend(f.stage_args(k));
                }
                for e in exprs {
                    for callee in e.called_functions() {
                        let cn = callee.name();
                        if cn != *name && env.contains(&cn) {
                            // Reading a function reads its final state.
                            children
                                .entry(FStage::new(&cn, callee.last_stage()))
                                .or_default()
                                .insert(stage.clone());
                        }
                    }
                }
            }
        }

        let mut p = Partitioner {
            env,
            dep,
            costs,
            arch,
            outputs,
            pipeline_bounds,
            groups,
            children,
            fusion_cache: BTreeMap::new(),
            group_costs: BTreeMap::new(),
        };
        p.initialize_reuse();
        p
    }

    /// Per-stage reuse: the producer bytes shared between adjacent unit tiles
    /// along each dimension.
    fn initialize_reuse(&mut self) {
        let keys: Vec<FStage> = self.groups.keys().cloned().collect();
        for key in keys {
            let unit: BTreeMap<String, i64> = match self.env.get(&key.func) {
                Some(f) => f.args().into_iter().map(|a| (a, 1)).collect(),
                None => continue,
            };
            let Some((pure_bounds, _)) = self.tile_bounds(&key, &unit) else {
                continue;
            };
            let stage_bounds = self.dep.get_stage_bounds(&key, &pure_bounds);
            let overlaps = self.dep.overlap_regions(&key, &stage_bounds);
            let mut reuse = BTreeMap::new();
            for (dim, regions) in overlaps {
                let mut total: Option<i64> = Some(0);
                for (name, reg) in &regions {
                    if *name == key.func {
                        continue;
                    }
                    total = cost_add(total, reg.area());
                }
                reuse.insert(dim, total);
            }
            self.groups.get_mut(&key).unwrap().reuse = reuse;
        }
    }

    pub fn groups(&self) -> &BTreeMap<FStage, Group> {
        &self.groups
    }

    pub fn children(&self) -> &BTreeMap<FStage, BTreeSet<FStage>> {
        &self.children
    }

    /// The analysis of each surviving group, for reporting.
    pub fn final_analyses(&mut self) -> BTreeMap<FStage, GroupAnalysis> {
        let keys: Vec<FStage> = self.groups.keys().cloned().collect();
        keys.into_iter()
            .map(|k| {
                let a = self.group_analysis(&k);
                (k, a)
            })
            .collect()
    }

    /// Run the greedy fixpoint at one level: repeatedly apply the best
    /// positive-benefit merge until a full pass finds none.
    pub fn group(&mut self, level: GroupingLevel) {
        // Entries cached at the other level price a different kind of fusion.
        self.fusion_cache.clear();
        loop {
            let candidates = self.collect_candidates(level);
            let mut best: Option<(i64, FStage)> = None;
            for key in candidates {
                let benefit = match level {
                    GroupingLevel::Inline => self.evaluate_inline_candidate(&key),
                    GroupingLevel::FastMem => self.evaluate_fast_mem_candidate(&key),
                };
                if let Some(b) = benefit {
                    if b > 0 && best.as_ref().is_none_or(|(bb, _)| b > *bb) {
                        best = Some((b, key));
                    }
                }
            }
            let Some((benefit, key)) = best else { break };
            log::debug!("{level:?} merge of {} (benefit {benefit})", key.func);
            match level {
                GroupingLevel::Inline => self.apply_inline_merge(&key.func),
                GroupingLevel::FastMem => self.apply_fast_mem_merge(&key.func),
            }
        }
    }

    /// Groups eligible for fusion: the group's output must be the final stage
    /// of its function, the function must not be a pipeline output, and it
    /// must have at least one consumer.
    fn collect_candidates(&self, level: GroupingLevel) -> Vec<FStage> {
        self.groups
            .keys()
            .filter(|key| {
                let Some(f) = self.env.get(&key.func) else {
                    return false;
                };
                if key.stage != f.last_stage() || self.outputs.contains(&key.func) {
                    return false;
                }
                if level == GroupingLevel::Inline && !f.is_pure() {
                    return false;
                }
                match self.children.get(key) {
                    Some(consumers) if !consumers.is_empty() => {
                        if level == GroupingLevel::FastMem {
                            let fns: BTreeSet<&String> =
                                consumers.iter().map(|c| &c.func).collect();
                            fns.len() == 1
                        } else {
                            true
                        }
                    }
                    _ => false,
                }
            })
            .cloned()
            .collect()
    }

    /// Group keys of every group containing one of the given stages.
    fn group_keys_containing(&self, stages: &BTreeSet<FStage>) -> BTreeSet<FStage> {
        stages
            .iter()
            .map(|s| self.find_group_key(s))
            .collect()
    }

    fn find_group_key(&self, s: &FStage) -> FStage {
        for (key, g) in &self.groups {
            if g.members.contains(s) {
                return key.clone();
            }
        }
        panic!("internal error: stage {s} is not a member of any group");
    }

    /// Splice every stage group of `prod` into a copy of the consumer group.
    /// Inline marks are aggregated into the surviving (fused) group only.
    fn splice_into(&self, prod: &str, cons_key: &FStage, level: GroupingLevel) -> Group {
        let mut fused = self.groups[cons_key].clone();
        let last = self.env.get(prod).map_or(0, |f| f.last_stage());
        for k in 0..=last {
            let pg = &self.groups[&FStage::new(prod, k)];
            for m in &pg.members {
                if !fused.members.contains(m) {
                    fused.members.push(m.clone());
                }
            }
            fused.inlined.extend(pg.inlined.iter().cloned());
            fused.tiled_inline.extend(pg.tiled_inline.iter().cloned());
            match level {
                GroupingLevel::Inline => {
                    for m in &pg.members {
                        fused.inlined.insert(m.func.clone());
                    }
                }
                GroupingLevel::FastMem => {
                    fused.tiled_inline.insert(prod.to_string());
                }
            }
        }
        fused
    }

    /// Benefit of inlining `key`'s function into all of its consumers.
    ///
    /// The fused groups are synthesized with unit tiles on the consumer's pure
    /// dimensions, so their memory cost prices the per-point load traffic of
    /// the expanded expressions.
    fn evaluate_inline_candidate(&mut self, key: &FStage) -> Option<i64> {
        let prod = key.func.clone();
        let consumers = self.children.get(key)?.clone();
        let cons_keys = self.group_keys_containing(&consumers);

        let mut old = Vec::new();
        let last = self.env.get(&prod)?.last_stage();
        for k in 0..=last {
            let a = self.group_analysis(&FStage::new(&prod, k));
            old.push(a);
        }
        for ck in &cons_keys {
            old.push(self.group_analysis(ck));
        }

        let mut new = Vec::new();
        for ck in &cons_keys {
            let probe = FusionChoice::probe(&prod, self.groups[ck].output.clone());
            let analysis = if let Some(a) = self.fusion_cache.get(&probe).copied() {
                a
            } else {
                let mut fused = self.splice_into(&prod, ck, GroupingLevel::Inline);
                fused.tile_sizes = self
                    .env
                    .get(&fused.output.func)
                    .map(|f| f.args().into_iter().map(|a| (a, 1)).collect())
                    .unwrap_or_default();
                let a = self.analyze_group(&fused);
                self.fusion_cache.insert(probe, a);
                a
            };
            new.push(analysis);
        }
        self.estimate_benefit(&old, &new)
    }

    /// Benefit of absorbing `key`'s function into its single consumer group at
    /// the best tile granularity found for the fused group.
    fn evaluate_fast_mem_candidate(&mut self, key: &FStage) -> Option<i64> {
        let prod = key.func.clone();
        let consumers = self.children.get(key)?.clone();
        let cons_keys = self.group_keys_containing(&consumers);
        // All consuming stages must already share one group; a producer
        // materialized at one group's tiles cannot serve another group.
        if cons_keys.len() != 1 {
            return None;
        }
        let ck = cons_keys.first().unwrap().clone();

        let probe = FusionChoice::probe(&prod, self.groups[&ck].output.clone());
        let analysis = if let Some(a) = self.fusion_cache.get(&probe).copied() {
            a
        } else {
            let fused = self.splice_into(&prod, &ck, GroupingLevel::FastMem);
            let (tiles, a) = self.find_best_tile_config(&fused);
            self.fusion_cache.insert(
                FusionChoice {
                    prod: prod.clone(),
                    cons: self.groups[&ck].output.clone(),
                    tile_sizes: tiles,
                },
                a,
            );
            a
        };

        // Fusing must not destroy the parallelism budget.
        if analysis.parallelism? < self.arch.parallelism {
            return None;
        }

        let mut old = Vec::new();
        let last = self.env.get(&prod)?.last_stage();
        for k in 0..=last {
            let a = self.group_analysis(&FStage::new(&prod, k));
            old.push(a);
        }
        old.push(self.group_analysis(&ck));
        self.estimate_benefit(&old, &[analysis])
    }

    /// `(old - new)` arithmetic plus balance-weighted `(old - new)` memory.
    /// Unknown anywhere makes the whole benefit unknown.
    fn estimate_benefit(&self, old: &[GroupAnalysis], new: &[GroupAnalysis]) -> Option<i64> {
        let sum = |xs: &[GroupAnalysis]| {
            xs.iter().fold((Some(0i64), Some(0i64)), |(a, m), x| {
                (cost_add(a, x.arith_cost), cost_add(m, x.mem_cost))
            })
        };
        let (oa, om) = sum(old);
        let (na, nm) = sum(new);
        let d_arith = oa?.saturating_sub(na?);
        let d_mem = om?.saturating_sub(nm?);
        Some(d_arith.saturating_add(self.arch.balance.saturating_mul(d_mem)))
    }

    fn apply_inline_merge(&mut self, prod: &str) {
        let last_key = FStage::new(prod, self.env.get(prod).map_or(0, |f| f.last_stage()));
        let consumers = self.children.get(&last_key).cloned().unwrap_or_default();
        let cons_keys = self.group_keys_containing(&consumers);

        for ck in &cons_keys {
            // The evaluation of the applied choice must still be cached.
            self.cache_remove(&FusionChoice::probe(prod, self.groups[ck].output.clone()));
        }
        for ck in &cons_keys {
            let fused = self.splice_into(prod, ck, GroupingLevel::Inline);
            self.groups.insert(ck.clone(), fused);
        }
        self.finish_merge(prod, &cons_keys);
    }

    fn apply_fast_mem_merge(&mut self, prod: &str) {
        let last_key = FStage::new(prod, self.env.get(prod).map_or(0, |f| f.last_stage()));
        let consumers = self.children.get(&last_key).cloned().unwrap_or_default();
        let cons_keys = self.group_keys_containing(&consumers);
        assert_eq!(
            cons_keys.len(),
            1,
            "internal error: fast-mem merge of {prod} with multiple consumer groups"
        );
        let ck = cons_keys.first().unwrap().clone();

        let (choice, _) = self.cache_remove(&FusionChoice::probe(prod, self.groups[&ck].output.clone()));
        let mut fused = self.splice_into(prod, &ck, GroupingLevel::FastMem);
        fused.tile_sizes = choice.tile_sizes;
        self.groups.insert(ck.clone(), fused);
        self.finish_merge(prod, &cons_keys);
    }

    /// Shared tail of both merges: dissolve the producer's stage groups,
    /// redirect edges that entered the producer to the consumer groups, drop
    /// stale analyses, and invalidate every cache entry touching the merge.
    fn finish_merge(&mut self, prod: &str, cons_keys: &BTreeSet<FStage>) {
        let last = self.env.get(prod).map_or(0, |f| f.last_stage());
        let prod_stages: BTreeSet<FStage> =
            (0..=last).map(|k| FStage::new(prod, k)).collect();

        for s in &prod_stages {
            self.groups.remove(s);
            self.group_costs.remove(s);
            self.children.remove(s);
        }
        for ck in cons_keys {
            self.group_costs.remove(ck);
        }

        let replacement: BTreeSet<FStage> =
            cons_keys.iter().map(|ck| self.groups[ck].output.clone()).collect();
        for targets in self.children.values_mut() {
            if targets.iter().any(|t| prod_stages.contains(t)) {
                targets.retain(|t| !prod_stages.contains(t));
                targets.extend(replacement.iter().cloned());
            }
        }

        let mut touched: BTreeSet<String> = BTreeSet::new();
        touched.insert(prod.to_string());
        for ck in cons_keys {
            touched.extend(self.groups[ck].member_functions());
        }
        self.fusion_cache
            .retain(|k, _| !touched.contains(&k.prod) && !touched.contains(&k.cons.func));
    }

    /// Remove a cache entry that must be present, returning the stored key
    /// (which carries the chosen tile sizes) and its analysis.
    fn cache_remove(&mut self, probe: &FusionChoice) -> (FusionChoice, GroupAnalysis) {
        self.fusion_cache
            .remove_entry(probe)
            .unwrap_or_else(|| {
                panic!(
                    "internal error: fusion cache asked to remove an entry it does not hold ({} -> {})",
                    probe.prod, probe.cons
                )
            })
    }

    fn group_analysis(&mut self, key: &FStage) -> GroupAnalysis {
        if let Some(a) = self.group_costs.get(key) {
            return *a;
        }
        let a = self.analyze_group(&self.groups[key]);
        self.group_costs.insert(key.clone(), a);
        a
    }

    /// Pure-variable bounds for one tile of the stage's output region, plus
    /// the number of tiles. A tile size is only applied to a dimension whose
    /// estimated extent is at least twice the size.
    fn tile_bounds(
        &self,
        out: &FStage,
        tile_sizes: &BTreeMap<String, i64>,
    ) -> Option<(DimBounds, i64)> {
        let f = self.env.get(&out.func)?;
        let full = self.pipeline_bounds.get(&out.func)?;
        let mut bounds = DimBounds::new();
        let mut tiles = 1i64;
        for (i, arg) in f.args().iter().enumerate() {
            let iv = full.get(i);
            let (lo, hi) = iv.literal()?;
            let extent = hi - lo + 1;
            match tile_sizes.get(arg) {
                Some(&t) if t >= 1 && extent >= 2 * t => {
                    bounds.insert(arg.clone(), Interval::from_min_extent(lo, t));
                    tiles = tiles.saturating_mul(div_ceil_i64(extent, t));
                }
                _ => {
                    bounds.insert(arg.clone(), iv.clone());
                }
            }
        }
        Some((bounds, tiles))
    }

    /// Analyze one group: per-tile cost of the members, the one-time cost of
    /// the output stage over its full region, and the per-tile memory traffic
    /// given whether the tile's intermediates fit in fast memory.
    pub fn analyze_group(&self, g: &Group) -> GroupAnalysis {
        let out = &g.output;
        let Some((tile_pure_bounds, estimate_tiles)) = self.tile_bounds(out, &g.tile_sizes)
        else {
            return GroupAnalysis::unknown();
        };
        let Some(full_box) = self.pipeline_bounds.get(&out.func) else {
            return GroupAnalysis::unknown();
        };

        let stage_bounds = self.dep.get_stage_bounds(out, &tile_pure_bounds);
        let footprint = self.dep.regions_required_stage(out, &stage_bounds);

        let member_fns = g.member_functions();
        let mut group_reg = RegionMap::new();
        let mut prod_reg = RegionMap::new();
        let mut input_reg = RegionMap::new();
        for (name, reg) in footprint {
            if name == out.func {
                // The output's own region is priced once by the out-cost term.
                continue;
            }
            if member_fns.contains(&name) {
                group_reg.insert(name, reg);
            } else if self.env.contains(&name) {
                prod_reg.insert(name, reg);
            } else {
                input_reg.insert(name, reg);
            }
        }

        // Arithmetic: members absorbed for cost count inside their consumers'
        // rewritten expressions, so tiling does not change the total.
        let cost_inlines = g.cost_inlines();
        let tile_arith = self.costs.region_cost(&group_reg, &cost_inlines);
        let out_cost = self.costs.stage_region_cost(out, full_box, &cost_inlines);

        // Memory: materialized members generate real traffic when the tile's
        // intermediate footprint spills out of fast memory.
        let tile_mem = self.costs.region_cost(&group_reg, &g.inlined);
        let tile_input = cost_add(
            self.costs.working_set_size(&prod_reg, &BTreeSet::new()),
            self.costs.input_region_size(&input_reg),
        );
        let tile_intermediate = self.costs.working_set_size(&group_reg, &g.inlined);

        let (Some(tile_arith), Some(out_arith)) = (tile_arith.arith, out_cost.arith) else {
            return GroupAnalysis::unknown();
        };
        let (Some(tile_mem), Some(tile_input), Some(tile_intermediate)) =
            (tile_mem.memory, tile_input, tile_intermediate)
        else {
            return GroupAnalysis::unknown();
        };

        let spill = if tile_intermediate > self.arch.fast_mem_size {
            tile_mem
        } else {
            0
        };
        let per_tile_mem = tile_input.saturating_add(spill);

        GroupAnalysis {
            arith_cost: cost_add(
                cost_mul(Some(tile_arith), Some(estimate_tiles)),
                Some(out_arith),
            ),
            mem_cost: cost_mul(Some(per_tile_mem), Some(estimate_tiles)),
            parallelism: Some(estimate_tiles),
        }
    }

    /// Canonical tile configurations over the pure dimensions of `out`, in
    /// deterministic order: skewed shapes first, then squares. Dimension 0 is
    /// clamped up to 64 to keep the innermost loop long enough to vectorize.
    pub fn generate_tile_configs(&self, out: &FStage) -> Vec<BTreeMap<String, i64>> {
        let Some(f) = self.env.get(&out.func) else {
            return Vec::new();
        };
        let Some(full) = self.pipeline_bounds.get(&out.func) else {
            return Vec::new();
        };
        let dims = f.args();
        let mut extents = Vec::new();
        for i in 0..dims.len() {
            match full.get(i).extent() {
                Some(e) => extents.push(e),
                None => return Vec::new(),
            }
        }
        let clamp = |j: usize, s: i64| if j == 0 { s.max(64) } else { s };

        let mut configs = Vec::new();
        for i in 0..dims.len() {
            for &s in &TILE_SIZE_VARIANTS {
                let mut c = BTreeMap::new();
                for (j, d) in dims.iter().enumerate() {
                    let t = if j < i { clamp(j, s) } else { 256 };
                    if extents[j] >= 2 * t {
                        c.insert(d.clone(), t);
                    }
                }
                configs.push(c);
            }
        }
        for &s in &TILE_SIZE_VARIANTS {
            let mut c = BTreeMap::new();
            for (j, d) in dims.iter().enumerate() {
                let t = clamp(j, s);
                if extents[j] >= 2 * t {
                    c.insert(d.clone(), t);
                }
            }
            configs.push(c);
        }
        configs
    }

    /// Walk the configuration grid and keep the configuration with
    /// non-increasing arithmetic cost and strictly decreasing memory cost,
    /// starting from no tiling. Unknown analyses never win; if everything is
    /// unknown the no-tile configuration is returned.
    pub fn find_best_tile_config(&self, g: &Group) -> (BTreeMap<String, i64>, GroupAnalysis) {
        let mut no_tile = g.clone();
        no_tile.tile_sizes = BTreeMap::new();
        let mut best_config = BTreeMap::new();
        let mut best = self.analyze_group(&no_tile);

        for config in self.generate_tile_configs(&g.output) {
            let mut cand = g.clone();
            cand.tile_sizes = config.clone();
            let a = self.analyze_group(&cand);
            if !a.is_known() {
                continue;
            }
            let accept = if !best.is_known() {
                true
            } else {
                a.arith_cost <= best.arith_cost && a.mem_cost < best.mem_cost
            };
            if accept {
                best_config = config;
                best = a;
            }
        }
        (best_config, best)
    }

    pub fn pipeline_bounds(&self) -> &RegionMap {
        &self.pipeline_bounds
    }
}
