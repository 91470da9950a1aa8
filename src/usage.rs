//! Parameter usage classification.
//!
//! A parameter is `reassigned` when the function body writes to the name
//! itself: plain or augmented assignment, a swap, or use as a loop target.
//! Mutating through the parameter (`xs.append(...)`, `d[k] = v`) does not
//! count; that is a property of the value, not the binding. Nested function
//! bodies are separate scopes and are skipped.

use crate::east::{ArgUsage, Expr, Param, Stmt, StmtKind};
use std::collections::{BTreeMap, BTreeSet};

pub fn classify(params: &[Param], body: &[Stmt]) -> BTreeMap<String, ArgUsage> {
    let mut written = BTreeSet::new();
    collect_writes(body, &mut written);

    params
        .iter()
        .map(|p| {
            let usage = if written.contains(p.name.as_str()) {
                ArgUsage::Reassigned
            } else {
                ArgUsage::Readonly
            };
            (p.name.clone(), usage)
        })
        .collect()
}

fn collect_writes(body: &[Stmt], written: &mut BTreeSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { target, .. } => record_target(target, written),
            StmtKind::AnnAssign { target, .. } => record_target(target, written),
            StmtKind::AugAssign { target, .. } => record_target(target, written),
            StmtKind::Swap { left, right } => {
                record_target(left, written);
                record_target(right, written);
            }
            StmtKind::ForRange { target, body, .. } => {
                record_target(target, written);
                collect_writes(body, written);
            }
            StmtKind::For { target, body, .. } => {
                record_target(target, written);
                collect_writes(body, written);
            }
            StmtKind::If { body, orelse, .. } => {
                collect_writes(body, written);
                collect_writes(orelse, written);
            }
            StmtKind::While { body, .. } => collect_writes(body, written),
            StmtKind::Try {
                body,
                handlers,
                finalbody,
            } => {
                collect_writes(body, written);
                for h in handlers {
                    collect_writes(&h.body, written);
                }
                collect_writes(finalbody, written);
            }
            // Nested scopes do not write the enclosing parameters.
            StmtKind::FunctionDef { .. } | StmtKind::ClassDef { .. } => {}
            _ => {}
        }
    }
}

fn record_target(target: &Expr, written: &mut BTreeSet<String>) {
    use crate::east::ExprKind;
    match &target.kind {
        ExprKind::Name { id } => {
            written.insert(id.clone());
        }
        ExprKind::Tuple { elts } => {
            for e in elts {
                record_target(e, written);
            }
        }
        // Attribute/subscript stores mutate the value, not the binding.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConvertCtx;
    use crate::lines;
    use crate::stmt::{BlockParser, FlowTypes, Scope};

    fn function_usage(src: &str) -> BTreeMap<String, ArgUsage> {
        let (logical, _) = lines::merge(src);
        let ctx = ConvertCtx::default();
        let mut parser = BlockParser::new(&logical, &ctx);
        let mut scope = Scope::default();
        let mut flow = FlowTypes::default();
        let stmts = parser.parse_block(0, &mut scope, &mut flow).unwrap();
        match &stmts[0].kind {
            StmtKind::FunctionDef { arg_usage, .. } => arg_usage.clone(),
            other => panic!("expected FunctionDef, got {:?}", other),
        }
    }

    #[test]
    fn untouched_parameter_is_readonly() {
        let usage = function_usage("def f(a: int) -> int:\n    return a + 1\n");
        assert_eq!(usage["a"], ArgUsage::Readonly);
    }

    #[test]
    fn rebound_parameter_is_reassigned() {
        let usage = function_usage("def f(a: int) -> int:\n    a = a + 1\n    return a\n");
        assert_eq!(usage["a"], ArgUsage::Reassigned);
    }

    #[test]
    fn augmented_write_is_reassignment() {
        let usage = function_usage("def f(n: int) -> int:\n    n += 1\n    return n\n");
        assert_eq!(usage["n"], ArgUsage::Reassigned);
    }

    #[test]
    fn container_mutation_stays_readonly() {
        let usage = function_usage(
            "def f(xs: list[int]) -> None:\n    xs.append(1)\n    xs[0] = 2\n",
        );
        assert_eq!(usage["xs"], ArgUsage::Readonly);
    }

    #[test]
    fn loop_target_shadowing_counts_as_write() {
        let usage = function_usage(
            "def f(i: int, xs: list[int]) -> None:\n    for i in xs:\n        pass\n",
        );
        assert_eq!(usage["i"], ArgUsage::Reassigned);
        assert_eq!(usage["xs"], ArgUsage::Readonly);
    }

    #[test]
    fn nested_function_writes_are_ignored() {
        let usage = function_usage(
            "def f(a: int) -> int:\n    def g(a: int) -> int:\n        a = 2\n        return a\n    return a\n",
        );
        assert_eq!(usage["a"], ArgUsage::Readonly);
    }
}
