//! Tests for the schedule report: display, JSON export, file output.

use anyhow::Result;
use tileflow::*;

fn simple_report() -> Result<ScheduleReport> {
    let f = Function::new("F", &["x", "y"]);
    f.define(vec![image("I", Type::F32, vec![var("x"), var("y")]) + flit(1.0)]);
    f.set_estimate("x", 0, 1024);
    f.set_estimate("y", 0, 1024);
    generate_schedule(&[f], &MachineParams::generic())
}

#[test]
fn display_contains_expected_sections() -> Result<()> {
    let report = simple_report()?;
    let output = format!("{report}");

    assert!(output.contains("GENERATED SCHEDULE"));
    assert!(output.contains("GROUPS"));
    assert!(output.contains("DIRECTIVES"));
    assert!(output.contains("F.compute_root()"));
    assert!(output.contains("cost:"));

    println!("{output}");
    Ok(())
}

#[test]
fn report_round_trips_through_json() -> Result<()> {
    let report = simple_report()?;
    let json = report.to_json()?;
    let value: serde_json::Value = serde_json::from_str(&json)?;

    let directives = value["directives"].as_array().expect("directives array");
    assert!(!directives.is_empty());
    assert!(directives
        .iter()
        .any(|d| d["text"] == "F.compute_root()"));
    let groups = value["groups"].as_array().expect("groups array");
    assert_eq!(groups.len(), 1);
    Ok(())
}

#[test]
fn report_saves_to_file() -> Result<()> {
    let report = simple_report()?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("schedule.json");
    report.save_to_file(&path)?;

    let contents = std::fs::read_to_string(&path)?;
    assert!(contents.contains("compute_root"));
    Ok(())
}

#[test]
fn warnings_surface_when_parallelism_is_unreachable() -> Result<()> {
    // Eight output points on a sixteen-core machine: nothing to spread.
    let f = Function::new("tiny", &["x"]);
    f.define(vec![image("I", Type::F32, vec![var("x")]) + flit(1.0)]);
    f.set_estimate("x", 0, 8);

    let report = generate_schedule(&[f], &MachineParams::generic())?;
    assert!(!report.warnings.is_empty());
    assert!(report.warnings[0].contains("parallelism"));
    Ok(())
}
