use anyhow::Result;
use tileflow::*;

fn input2(x: Expr, y: Expr) -> Expr {
    image("I", Type::F32, vec![x, y])
}

/// blur_x(x, y) = I(x-1, y) + I(x, y) + I(x+1, y)
/// blur_y(x, y) = blur_x(x, y-1) + blur_x(x, y) + blur_x(x, y+1)
fn blur_pipeline() -> (Function, Function) {
    let bx = Function::new("blur_x", &["x", "y"]);
    bx.define(vec![
        input2(var("x") - 1, var("y"))
            + input2(var("x"), var("y"))
            + input2(var("x") + 1, var("y")),
    ]);
    let by = Function::new("blur_y", &["x", "y"]);
    by.define(vec![
        bx.at(vec![var("x"), var("y") - 1])
            + bx.at(vec![var("x"), var("y")])
            + bx.at(vec![var("x"), var("y") + 1]),
    ]);
    by.set_estimate("x", 0, 1024);
    by.set_estimate("y", 0, 1024);
    (bx, by)
}

fn bounds_2d(x: (i64, i64), y: (i64, i64)) -> DimBounds {
    [
        ("x".to_string(), Interval::from_min_extent(x.0, x.1)),
        ("y".to_string(), Interval::from_min_extent(y.0, y.1)),
    ]
    .into()
}

#[test]
fn regions_required_chase_transitive_producers() -> Result<()> {
    let p = Function::new("p", &["x"]);
    p.define(vec![image("I", Type::F32, vec![var("x")]) * flit(2.0)]);
    let c = Function::new("c", &["x"]);
    c.define(vec![p.at(vec![var("x")]) + p.at(vec![var("x") + 1])]);

    let env = find_transitive_calls(&[c.clone()]);
    let dep = DependenceAnalysis::new(env);

    let bounds: DimBounds = [("x".to_string(), Interval::from_min_extent(0, 1024))].into();
    let regions = dep.regions_required_stage(&FStage::new("c", 0), &bounds);

    assert_eq!(regions["p"].get(0).literal(), Some((0, 1024)));
    // The image is reached through p with p's widened bounds.
    assert_eq!(regions["I"].get(0).literal(), Some((0, 1024)));
    Ok(())
}

#[test]
fn stage_bounds_overlay_reduction_domains() {
    let r = Function::new("r", &["x"]);
    r.define(vec![flit(0.0)]);
    r.define_update(
        vec![var("x")],
        vec![r.at(vec![var("x")]) + input2(var("x"), var("k"))],
        vec![ReductionVariable::new("k", 0, 64)],
    );
    let env = find_transitive_calls(&[r.clone()]);
    let dep = DependenceAnalysis::new(env);

    let pure: DimBounds = [("x".to_string(), Interval::from_min_extent(0, 128))].into();
    let with_rdom = dep.get_stage_bounds(&FStage::new("r", 1), &pure);
    assert_eq!(with_rdom["x"].literal(), Some((0, 127)));
    assert_eq!(with_rdom["k"].literal(), Some((0, 63)));
}

#[test]
fn reductions_widen_required_regions() {
    let r = Function::new("r", &["x"]);
    r.define(vec![flit(0.0)]);
    r.define_update(
        vec![var("x")],
        vec![r.at(vec![var("x")]) + input2(var("x"), var("k"))],
        vec![ReductionVariable::new("k", 0, 64)],
    );
    let out = Function::new("out", &["x"]);
    out.define(vec![r.at(vec![var("x")]) + flit(1.0)]);

    let env = find_transitive_calls(&[out.clone()]);
    let dep = DependenceAnalysis::new(env);

    let bounds: DimBounds = [("x".to_string(), Interval::from_min_extent(0, 256))].into();
    let regions = dep.regions_required_stage(&FStage::new("out", 0), &bounds);

    // Visiting every stage of r pulls in the whole reduction domain of I.
    assert_eq!(regions["I"].get(0).literal(), Some((0, 255)));
    assert_eq!(regions["I"].get(1).literal(), Some((0, 63)));
    assert_eq!(regions["r"].get(0).literal(), Some((0, 255)));
}

#[test]
fn blur_halo_propagates_through_both_stages() {
    let (_bx, by) = blur_pipeline();
    let env = find_transitive_calls(&[by.clone()]);
    let dep = DependenceAnalysis::new(env);

    let regions = dep.regions_required_stage(&FStage::new("blur_y", 0), &bounds_2d((0, 64), (0, 64)));
    // One row of halo on blur_x in y, then one more column of halo on I in x.
    assert_eq!(regions["blur_x"].get(0).literal(), Some((0, 63)));
    assert_eq!(regions["blur_x"].get(1).literal(), Some((-1, 64)));
    assert_eq!(regions["I"].get(0).literal(), Some((-1, 64)));
    assert_eq!(regions["I"].get(1).literal(), Some((-1, 64)));
}

#[test]
fn redundant_regions_are_empty_for_pointwise_consumers() {
    let p = Function::new("p", &["x"]);
    p.define(vec![image("I", Type::F32, vec![var("x")]) * flit(2.0)]);
    let c = Function::new("c", &["x"]);
    c.define(vec![p.at(vec![var("x")]) + flit(1.0)]);

    let env = find_transitive_calls(&[c.clone()]);
    let dep = DependenceAnalysis::new(env);

    // Two adjacent unit tiles of c touch disjoint points of p.
    let bounds: DimBounds = [("x".to_string(), Interval::from_min_extent(0, 1))].into();
    let overlap = dep.redundant_regions(&FStage::new("c", 0), "x", &bounds);
    assert!(overlap.is_empty());
}

#[test]
fn redundant_regions_capture_stencil_overlap() {
    let (_bx, by) = blur_pipeline();
    let env = find_transitive_calls(&[by.clone()]);
    let dep = DependenceAnalysis::new(env);

    let overlap = dep.redundant_regions(
        &FStage::new("blur_y", 0),
        "y",
        &bounds_2d((0, 64), (0, 64)),
    );
    // Adjacent 64-row tiles share two rows of blur_x at the seam.
    let shared = overlap.get("blur_x").expect("blur_x overlaps");
    assert_eq!(shared.get(1).literal(), Some((63, 64)));
    assert_eq!(shared.area(), Some(64 * 2));
}

#[test]
fn overlap_regions_follow_dimension_order() {
    let (_bx, by) = blur_pipeline();
    let env = find_transitive_calls(&[by.clone()]);
    let dep = DependenceAnalysis::new(env);

    let per_dim = dep.overlap_regions(&FStage::new("blur_y", 0), &bounds_2d((0, 64), (0, 64)));
    let dims: Vec<&str> = per_dim.iter().map(|(d, _)| d.as_str()).collect();
    assert_eq!(dims, ["x", "y"]);
}

#[test]
fn pipeline_bounds_seed_outputs_and_widen_producers() -> Result<()> {
    let (_bx, by) = blur_pipeline();
    let env = find_transitive_calls(&[by.clone()]);
    let dep = DependenceAnalysis::new(env);

    let bounds = dep.get_pipeline_bounds(&[by]);
    assert_eq!(bounds["blur_y"].area(), Some(1024 * 1024));
    assert_eq!(bounds["blur_x"].get(1).literal(), Some((-1, 1024)));
    assert_eq!(bounds["I"].area(), Some(1026 * 1026));
    Ok(())
}

#[test]
fn estimates_resolve_symbolic_endpoints() {
    // f reads I at a data-dependent position; the bounds machinery cannot
    // resolve it, but f's own estimate pins the fallback.
    let idx = Function::new("idx", &["x"]);
    idx.define(vec![cast(Type::I32, image("I", Type::F32, vec![var("x")]))]);
    let f = Function::new("f", &["x"]);
    f.define(vec![image(
        "I",
        Type::F32,
        vec![idx.at(vec![var("x")])],
    )]);
    f.set_estimate("x", 0, 100);

    let env = find_transitive_calls(&[f.clone()]);
    let dep = DependenceAnalysis::new(env);
    let bounds = dep.get_pipeline_bounds(&[f]);

    // The image access through the data-dependent index stays unknown.
    assert_eq!(bounds["I"].area(), None);
    assert_eq!(bounds["f"].area(), Some(100));
}
