use anyhow::Result;
use tileflow::*;

fn scope_1d(var_name: &str, min: i64, extent: i64) -> DimBounds {
    [(var_name.to_string(), Interval::from_min_extent(min, extent))].into()
}

#[test]
fn simplifier_folds_constants() {
    assert_eq!(simplify(&(lit(2) + lit(3))), lit(5));
    assert_eq!(simplify(&(lit(7) * lit(6))), lit(42));
    assert_eq!(simplify(&min(lit(3), lit(9))), lit(3));
    assert_eq!(simplify(&max(lit(3), lit(9))), lit(9));
    // Euclidean division and remainder.
    assert_eq!(simplify(&(lit(-7) / lit(2))), lit(-4));
    assert_eq!(simplify(&(lit(-7) % lit(2))), lit(1));
}

#[test]
fn simplifier_applies_identities() {
    assert_eq!(simplify(&(var("x") + 0)), var("x"));
    assert_eq!(simplify(&(var("x") * 1)), var("x"));
    assert_eq!(simplify(&(var("x") * 0)), lit(0));
    assert_eq!(simplify(&(var("x") - var("x"))), lit(0));
    assert_eq!(simplify(&min(var("x"), var("x"))), var("x"));
    assert_eq!(
        simplify(&select(Expr::binary(BinOp::Lt, lit(1), lit(2)), var("a"), var("b"))),
        var("a")
    );
}

#[test]
fn simplifier_folds_immediate_lets() {
    let e = Expr::Let {
        name: "t".to_string(),
        value: Box::new(lit(4)),
        body: Box::new(var("t") + var("t")),
    };
    assert_eq!(simplify(&e), lit(8));
}

#[test]
fn interval_extent_requires_literal_endpoints() {
    assert_eq!(Interval::from_min_extent(0, 10).extent(), Some(10));
    assert_eq!(Interval::new(var("n"), lit(9)).extent(), None);
}

#[test]
fn hull_area_dominates_both_operands() {
    let a = DimBox::new(vec![Interval::from_min_extent(0, 10)]);
    let b = DimBox::new(vec![Interval::from_min_extent(20, 10)]);
    let h = a.hull(&b);
    assert_eq!(h.get(0).literal(), Some((0, 29)));
    let ha = h.area().unwrap();
    assert!(ha >= a.area().unwrap());
    assert!(ha >= b.area().unwrap());
}

#[test]
fn self_intersection_preserves_area() {
    let a = DimBox::new(vec![
        Interval::from_min_extent(-3, 16),
        Interval::from_min_extent(5, 7),
    ]);
    assert_eq!(a.intersect(&a).area(), a.area());
}

#[test]
fn disjoint_intersection_has_zero_area() {
    let a = DimBox::new(vec![Interval::from_min_extent(0, 10)]);
    let b = DimBox::new(vec![Interval::from_min_extent(50, 10)]);
    let inter = a.intersect(&b);
    assert!(inter.is_known_empty());
    assert_eq!(inter.area(), Some(0));
}

#[test]
fn unknown_extent_poisons_area_but_zero_wins() {
    let unknown = DimBox::new(vec![
        Interval::new(var("n"), var("m")),
        Interval::from_min_extent(0, 4),
    ]);
    assert_eq!(unknown.area(), None);

    // A known-empty dimension makes the area zero even alongside unknowns.
    let empty = DimBox::new(vec![
        Interval::new(var("n"), var("m")),
        Interval::from_min_extent(5, -2),
    ]);
    assert_eq!(empty.area(), Some(0));
}

#[test]
fn bounds_of_affine_expressions() {
    let scope = scope_1d("x", 0, 64);
    assert_eq!(
        bounds_of_expr(&(var("x") - 1), &scope).literal(),
        Some((-1, 62))
    );
    assert_eq!(
        bounds_of_expr(&(var("x") + 1), &scope).literal(),
        Some((1, 64))
    );
    assert_eq!(
        bounds_of_expr(&(var("x") * 2), &scope).literal(),
        Some((0, 126))
    );
}

#[test]
fn bounds_of_select_hull_both_branches() {
    let scope = scope_1d("x", 0, 10);
    let e = select(
        Expr::binary(BinOp::Lt, var("x"), lit(5)),
        var("x") - 2,
        var("x") + 2,
    );
    assert_eq!(bounds_of_expr(&e, &scope).literal(), Some((-2, 11)));
}

#[test]
fn bounds_of_let_bind_value_interval() {
    let scope = scope_1d("x", 0, 10);
    let e = Expr::Let {
        name: "t".to_string(),
        value: Box::new(var("x") * 2),
        body: Box::new(var("t") + 1),
    };
    assert_eq!(bounds_of_expr(&e, &scope).literal(), Some((1, 19)));
}

#[test]
fn free_variables_stay_symbolic() {
    let scope = scope_1d("x", 0, 10);
    let iv = bounds_of_expr(&(var("x") + var("offset")), &scope);
    assert_eq!(iv.literal(), None);
}

#[test]
fn boxes_required_hulls_across_call_sites() -> Result<()> {
    let p = Function::new("p", &["x"]);
    p.define(vec![image("I", Type::F32, vec![var("x")]) * flit(2.0)]);

    let e = p.at(vec![var("x") - 1]) + p.at(vec![var("x") + 1]);
    let scope = scope_1d("x", 0, 64);
    let regions = boxes_required(&e, &scope);

    let pbox = regions.get("p").expect("p accessed");
    assert_eq!(pbox.get(0).literal(), Some((-1, 64)));
    // The image read lives inside p's body and is not accessed here directly.
    assert!(!regions.contains_key("I"));
    Ok(())
}

#[test]
fn boxes_required_covers_multidimensional_stencils() {
    let e = image("I", Type::F32, vec![var("x") - 1, var("y")])
        + image("I", Type::F32, vec![var("x") + 1, var("y")]);
    let mut scope = scope_1d("x", 0, 32);
    scope.insert("y".to_string(), Interval::from_min_extent(0, 8));
    let regions = boxes_required(&e, &scope);
    let ibox = regions.get("I").expect("image accessed");
    assert_eq!(ibox.rank(), 2);
    assert_eq!(ibox.get(0).literal(), Some((-1, 32)));
    assert_eq!(ibox.get(1).literal(), Some((0, 7)));
    assert_eq!(ibox.area(), Some(34 * 8));
}
