//! End-to-end scheduling scenarios.

use anyhow::Result;
use tileflow::*;

fn texts(report: &ScheduleReport) -> Vec<String> {
    report.directives.iter().map(|d| d.text.clone()).collect()
}

fn has(report: &ScheduleReport, needle: &str) -> bool {
    report.directives.iter().any(|d| d.text == needle)
}

#[test]
fn single_pointwise_output_vectorizes_and_parallelizes() -> Result<()> {
    let f = Function::new("F", &["x", "y"]);
    f.define(vec![image("I", Type::F32, vec![var("x"), var("y")]) + flit(1.0)]);
    f.set_estimate("x", 0, 1024);
    f.set_estimate("y", 0, 1024);

    let report = generate_schedule(&[f.clone()], &MachineParams::generic())?;

    assert!(has(&report, "F.compute_root()"));
    assert!(has(&report, "F.split(x, x_vo, x_vi, 8)"));
    assert!(has(&report, "F.vectorize(x_vi)"));
    assert!(has(&report, "F.parallel(y)"));
    // No fusion candidates: one group, nothing inlined, nothing tiled.
    assert_eq!(report.groups.len(), 1);
    assert!(report.groups[0].inlined.is_empty());
    assert!(report.groups[0].tile_sizes.is_empty());
    assert!(!texts(&report).iter().any(|t| t.contains("compute_inline")));

    // The directives were applied to the function handle as a side effect.
    let applied = f.directives();
    assert!(applied.contains(&Directive::ComputeRoot));
    assert!(applied.iter().any(|d| matches!(
        d,
        Directive::Split { dim, factor: 8, .. } if dim == "x"
    )));
    Ok(())
}

#[test]
fn pointwise_producer_is_inlined_into_its_consumer() -> Result<()> {
    let p = Function::new("P", &["x"]);
    p.define(vec![image("I", Type::F32, vec![var("x")]) * flit(2.0)]);
    let c = Function::new("C", &["x"]);
    c.define(vec![p.at(vec![var("x")]) + p.at(vec![var("x") + 1])]);
    c.set_estimate("x", 0, 1024);

    let report = generate_schedule(&[c.clone()], &MachineParams::generic())?;

    assert!(has(&report, "P.compute_inline()"));
    let root_count = report
        .directives
        .iter()
        .filter(|d| d.text.contains("compute_root"))
        .count();
    assert_eq!(root_count, 1);
    assert!(has(&report, "C.compute_root()"));
    assert!(has(&report, "C.vectorize(x_vi)"));

    assert_eq!(report.groups.len(), 1);
    assert!(report.groups[0].inlined.contains(&"P".to_string()));
    assert!(p.directives().contains(&Directive::ComputeInline));
    Ok(())
}

#[test]
fn reductions_are_never_inlined() -> Result<()> {
    let r = Function::new("R", &["x"]);
    r.define(vec![flit(0.0)]);
    r.define_update(
        vec![var("x")],
        vec![r.at(vec![var("x")]) + image("I", Type::F32, vec![var("x"), var("k")])],
        vec![ReductionVariable::new("k", 0, 64)],
    );
    let out = Function::new("Out", &["x"]);
    out.define(vec![r.at(vec![var("x")]) + flit(1.0)]);
    out.set_estimate("x", 0, 1024);

    let report = generate_schedule(&[out.clone()], &MachineParams::generic())?;

    assert!(!texts(&report).iter().any(|t| t.contains("compute_inline")));
    assert!(has(&report, "R.compute_root()"));
    assert!(has(&report, "Out.compute_root()"));
    // Both the reduction and the consumer vectorize along x.
    assert!(has(&report, "Out.vectorize(x_vi)"));
    assert!(has(&report, "R.vectorize(x_vi)"));
    assert!(has(&report, "R.update(0).vectorize(x_vi)"));
    // The reduction loop itself is not parallelized.
    assert!(!has(&report, "R.update(0).parallel(k)"));
    Ok(())
}

#[test]
fn stencil_chain_fuses_at_tile_granularity() -> Result<()> {
    let bx = Function::new("blur_x", &["x", "y"]);
    bx.define(vec![
        image("I", Type::F32, vec![var("x") - 1, var("y")])
            + image("I", Type::F32, vec![var("x"), var("y")])
            + image("I", Type::F32, vec![var("x") + 1, var("y")]),
    ]);
    let by = Function::new("blur_y", &["x", "y"]);
    by.define(vec![
        bx.at(vec![var("x"), var("y") - 1])
            + bx.at(vec![var("x"), var("y")])
            + bx.at(vec![var("x"), var("y") + 1]),
    ]);
    by.set_estimate("x", 0, 1024);
    by.set_estimate("y", 0, 1024);

    let arch = MachineParams {
        fast_mem_size: 1 << 19,
        ..MachineParams::generic()
    };
    let report = generate_schedule(&[by.clone()], &arch)?;

    // One fused group: blur_x is absorbed for cost but stays materialized.
    assert_eq!(report.groups.len(), 1);
    let g = &report.groups[0];
    assert_eq!(g.output, FStage::new("blur_y", 0));
    assert!(g.tiled_producers.contains(&"blur_x".to_string()));
    assert!(!texts(&report).iter().any(|t| t.contains("compute_inline")));

    // A non-trivial tile over both dimensions, from the configuration grid.
    let tx = *g.tile_sizes.get("x").expect("x tiled");
    let ty = *g.tile_sizes.get("y").expect("y tiled");
    assert!(tx > 1 && ty > 1);
    assert!(has(&report, &format!("blur_y.split(x, x_o, x_i, {tx})")));
    assert!(has(&report, &format!("blur_y.split(y, y_o, y_i, {ty})")));
    assert!(has(&report, "blur_y.reorder([x_i, y_i, x_o, y_o])"));

    // Vectorized on the inner x, parallelized on the outer loops.
    assert!(has(&report, "blur_y.split(x_i, x_i_vo, x_i_vi, 8)"));
    assert!(has(&report, "blur_y.vectorize(x_i_vi)"));
    assert!(has(&report, "blur_y.parallel(y_o)"));
    Ok(())
}

#[test]
fn fast_mem_leaves_multi_consumer_producers_alone() -> Result<()> {
    let p = Function::new("P", &["x"]);
    p.define(vec![image("I", Type::F32, vec![var("x")]) * flit(2.0)]);
    let c1 = Function::new("C1", &["x"]);
    c1.define(vec![p.at(vec![var("x")]) + flit(1.0)]);
    let c2 = Function::new("C2", &["x"]);
    c2.define(vec![p.at(vec![var("x")]) * flit(2.0)]);
    c1.set_estimate("x", 0, 1024);
    c2.set_estimate("x", 0, 1024);

    let report = generate_schedule(&[c1.clone(), c2.clone()], &MachineParams::generic())?;

    // Inline grouping may absorb the cheap producer into both consumers, but
    // nothing is tiled together.
    assert!(has(&report, "C1.compute_root()"));
    assert!(has(&report, "C2.compute_root()"));
    for g in &report.groups {
        assert!(g.tile_sizes.is_empty());
        assert!(g.tiled_producers.is_empty());
    }
    // With a positive aggregate benefit the producer is inlined into both.
    assert!(has(&report, "P.compute_inline()"));
    assert_eq!(
        report
            .directives
            .iter()
            .filter(|d| d.text == "P.compute_inline()")
            .count(),
        1
    );
    Ok(())
}

#[test]
fn missing_estimates_fail_loudly() {
    let f = Function::new("F", &["x", "y"]);
    f.define(vec![image("I", Type::F32, vec![var("x"), var("y")]) + flit(1.0)]);
    f.set_estimate("x", 0, 1024);

    let err = generate_schedule(&[f], &MachineParams::generic()).unwrap_err();
    match err.downcast_ref::<UserError>() {
        Some(UserError::MissingEstimate { func, var }) => {
            assert_eq!(func, "F");
            assert_eq!(var, "y");
        }
        other => panic!("expected a missing-estimate error, got {other:?}"),
    }
}

#[test]
fn non_literal_estimates_fail_loudly() {
    let f = Function::new("F", &["x"]);
    f.define(vec![image("I", Type::F32, vec![var("x")]) + flit(1.0)]);
    f.set_estimate_expr("x", lit(0), var("n"));

    let err = generate_schedule(&[f], &MachineParams::generic()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<UserError>(),
        Some(UserError::NonLiteralEstimate { .. })
    ));
}

#[test]
fn scheduling_is_deterministic_across_runs() -> Result<()> {
    let build = || {
        let bx = Function::new("blur_x", &["x", "y"]);
        bx.define(vec![
            image("I", Type::F32, vec![var("x") - 1, var("y")])
                + image("I", Type::F32, vec![var("x"), var("y")])
                + image("I", Type::F32, vec![var("x") + 1, var("y")]),
        ]);
        let by = Function::new("blur_y", &["x", "y"]);
        by.define(vec![
            bx.at(vec![var("x"), var("y") - 1])
                + bx.at(vec![var("x"), var("y")])
                + bx.at(vec![var("x"), var("y") + 1]),
        ]);
        by.set_estimate("x", 0, 1024);
        by.set_estimate("y", 0, 1024);
        by
    };
    let arch = MachineParams {
        fast_mem_size: 1 << 19,
        ..MachineParams::generic()
    };
    let a = generate_schedule(&[build()], &arch)?;
    let b = generate_schedule(&[build()], &arch)?;
    assert_eq!(texts(&a), texts(&b));
    Ok(())
}
