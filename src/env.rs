//! Pipeline environment: call discovery and realization order.
//!
//! The environment is the set of functions reachable from the pipeline
//! outputs. It is discovered by walking call expressions, and it provides the
//! producers-first topological order the cost model traverses when sizing
//! working sets.

use crate::expr::Expr;
use crate::func::Function;
use std::collections::{BTreeMap, BTreeSet};

/// All functions reachable from the pipeline outputs, by name.
#[derive(Clone, Default)]
pub struct Env {
    funcs: BTreeMap<String, Function>,
}

impl Env {
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.funcs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Functions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Function)> {
        self.funcs.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.funcs.keys()
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

/// Every expression of every stage of `f`, including left-hand-side argument
/// expressions of updates.
fn all_exprs(f: &Function) -> Vec<Expr> {
    let mut out = f.values();
    for u in f.updates() {
        out.extend(u.args);
        out.extend(u.values);
    }
    out
}

/// Names of pipeline functions `f` calls directly in any of its definitions.
pub fn find_direct_calls(f: &Function) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for e in all_exprs(f) {
        for callee in e.called_functions() {
            out.insert(callee.name());
        }
    }
    out
}

/// Discover all functions transitively reachable from the outputs.
pub fn find_transitive_calls(outputs: &[Function]) -> Env {
    let mut env = Env::default();
    let mut stack: Vec<Function> = outputs.to_vec();
    while let Some(f) = stack.pop() {
        if env.contains(&f.name()) {
            continue;
        }
        env.funcs.insert(f.name(), f.clone());
        for e in all_exprs(&f) {
            for callee in e.called_functions() {
                if !env.contains(&callee.name()) {
                    stack.push(callee);
                }
            }
        }
    }
    env
}

/// Producers-first topological order over the environment.
///
/// Callees are visited in name order at every node, so two runs over the same
/// pipeline give the same order. Self-calls (reductions reading their own
/// previous value) do not count as dependencies.
pub fn realization_order(outputs: &[Function], env: &Env) -> Vec<String> {
    let mut order = Vec::new();
    let mut visited = BTreeSet::new();
    let mut names: Vec<String> = outputs.iter().map(Function::name).collect();
    names.sort();
    for name in names {
        visit(&name, env, &mut visited, &mut order);
    }
    order
}

fn visit(name: &str, env: &Env, visited: &mut BTreeSet<String>, order: &mut Vec<String>) {
    if visited.contains(name) {
        return;
    }
    visited.insert(name.to_string());
    if let Some(f) = env.get(name) {
        for callee in find_direct_calls(f) {
            if callee != name {
                visit(&callee, env, visited, order);
            }
        }
    }
    order.push(name.to_string());
}
