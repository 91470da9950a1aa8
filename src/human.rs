//! Human-readable rendering of a converted module, for quick inspection
//! next to the machine JSON payload.

use crate::east::*;
use std::fmt::Write;

pub fn render(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Module {}", module.source_path);
    if let Some(doc) = &module.docstring {
        let _ = writeln!(out, "  doc: {}", first_line(doc));
    }
    if !module.meta.import_bindings.is_empty() {
        let _ = writeln!(out, "  imports:");
        for b in &module.meta.import_bindings {
            match b.binding_kind {
                BindingKind::Module => {
                    let _ = writeln!(out, "    module {} as {}", b.module_id, b.local_name);
                }
                BindingKind::Symbol => {
                    let _ = writeln!(
                        out,
                        "    symbol {}.{} as {}",
                        b.module_id, b.export_name, b.local_name
                    );
                }
            }
        }
    }
    for stmt in &module.body {
        render_stmt(&mut out, stmt, 1);
    }
    if !module.main_guard_body.is_empty() {
        let _ = writeln!(out, "  main guard:");
        for stmt in &module.main_guard_body {
            render_stmt(&mut out, stmt, 2);
        }
    }
    out
}

fn render_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let pad = "  ".repeat(depth);
    match &stmt.kind {
        StmtKind::FunctionDef {
            name,
            params,
            return_type,
            is_generator,
            body,
            ..
        } => {
            let sig: Vec<String> = params
                .iter()
                .map(|p| format!("{}: {}", p.name, p.ty))
                .collect();
            let marker = if *is_generator { " (generator)" } else { "" };
            let _ = writeln!(
                out,
                "{}def {}({}) -> {}{}",
                pad,
                name,
                sig.join(", "),
                return_type,
                marker
            );
            for s in body {
                render_stmt(out, s, depth + 1);
            }
        }
        StmtKind::ClassDef {
            name,
            base,
            fields,
            is_enum,
            is_dataclass,
            body,
            ..
        } => {
            let kind = if *is_enum {
                "enum"
            } else if *is_dataclass {
                "dataclass"
            } else {
                "class"
            };
            match base {
                Some(b) => {
                    let _ = writeln!(out, "{}{} {}({})", pad, kind, name, b);
                }
                None => {
                    let _ = writeln!(out, "{}{} {}", pad, kind, name);
                }
            }
            for (field, ty) in fields {
                let _ = writeln!(out, "{}  field {}: {}", pad, field, ty);
            }
            for s in body {
                render_stmt(out, s, depth + 1);
            }
        }
        StmtKind::Return { value } => match value {
            Some(v) => {
                let _ = writeln!(out, "{}return {} :: {}", pad, v.repr, v.resolved_type);
            }
            None => {
                let _ = writeln!(out, "{}return", pad);
            }
        },
        StmtKind::Assign {
            target,
            value,
            declare,
            ..
        } => {
            let verb = if *declare { "let" } else { "set" };
            let _ = writeln!(
                out,
                "{}{} {} = {} :: {}",
                pad, verb, target.repr, value.repr, value.resolved_type
            );
        }
        StmtKind::AnnAssign {
            target,
            annotation,
            value,
        } => match value {
            Some(v) => {
                let _ = writeln!(out, "{}let {}: {} = {}", pad, target.repr, annotation, v.repr);
            }
            None => {
                let _ = writeln!(out, "{}declare {}: {}", pad, target.repr, annotation);
            }
        },
        StmtKind::AugAssign { target, op, value } => {
            let _ = writeln!(out, "{}{} {}= {}", pad, target.repr, op.symbol(), value.repr);
        }
        StmtKind::Swap { left, right } => {
            let _ = writeln!(out, "{}swap {} <-> {}", pad, left.repr, right.repr);
        }
        StmtKind::If { test, body, orelse } => {
            let _ = writeln!(out, "{}if {}", pad, test.repr);
            for s in body {
                render_stmt(out, s, depth + 1);
            }
            if !orelse.is_empty() {
                let _ = writeln!(out, "{}else", pad);
                for s in orelse {
                    render_stmt(out, s, depth + 1);
                }
            }
        }
        StmtKind::ForRange {
            target,
            start,
            stop,
            step,
            range_mode,
            body,
            ..
        } => {
            let _ = writeln!(
                out,
                "{}for {} in range({}, {}, {}) [{:?}]",
                pad, target.repr, start.repr, stop.repr, step.repr, range_mode
            );
            for s in body {
                render_stmt(out, s, depth + 1);
            }
        }
        StmtKind::For {
            target,
            target_type,
            iter,
            body,
        } => {
            let _ = writeln!(
                out,
                "{}for {}: {} in {}",
                pad, target.repr, target_type, iter.repr
            );
            for s in body {
                render_stmt(out, s, depth + 1);
            }
        }
        StmtKind::While { test, body } => {
            let _ = writeln!(out, "{}while {}", pad, test.repr);
            for s in body {
                render_stmt(out, s, depth + 1);
            }
        }
        StmtKind::Try {
            body,
            handlers,
            finalbody,
        } => {
            let _ = writeln!(out, "{}try", pad);
            for s in body {
                render_stmt(out, s, depth + 1);
            }
            for h in handlers {
                let what = h.exc_type.as_deref().unwrap_or("*");
                match &h.name {
                    Some(n) => {
                        let _ = writeln!(out, "{}except {} as {}", pad, what, n);
                    }
                    None => {
                        let _ = writeln!(out, "{}except {}", pad, what);
                    }
                }
                for s in &h.body {
                    render_stmt(out, s, depth + 1);
                }
            }
            if !finalbody.is_empty() {
                let _ = writeln!(out, "{}finally", pad);
                for s in finalbody {
                    render_stmt(out, s, depth + 1);
                }
            }
        }
        StmtKind::Raise { exc, cause } => match (exc, cause) {
            (Some(e), Some(c)) => {
                let _ = writeln!(out, "{}raise {} from {}", pad, e.repr, c.repr);
            }
            (Some(e), None) => {
                let _ = writeln!(out, "{}raise {}", pad, e.repr);
            }
            _ => {
                let _ = writeln!(out, "{}raise", pad);
            }
        },
        StmtKind::Yield { value } => match value {
            Some(v) => {
                let _ = writeln!(out, "{}yield {} :: {}", pad, v.repr, v.resolved_type);
            }
            None => {
                let _ = writeln!(out, "{}yield", pad);
            }
        },
        StmtKind::Import { bindings } | StmtKind::ImportFrom { bindings, .. } => {
            let names: Vec<&str> = bindings.iter().map(|b| b.local_name.as_str()).collect();
            let _ = writeln!(out, "{}import {}", pad, names.join(", "));
        }
        StmtKind::Expr { value } => {
            let _ = writeln!(out, "{}expr {} :: {}", pad, value.repr, value.resolved_type);
        }
        StmtKind::Pass {} => {
            let _ = writeln!(out, "{}pass", pad);
        }
        StmtKind::Break {} => {
            let _ = writeln!(out, "{}break", pad);
        }
        StmtKind::Continue {} => {
            let _ = writeln!(out, "{}continue", pad);
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert_source;

    #[test]
    fn renders_nested_structure() {
        let module = convert_source(
            "def add(a: int, b: int) -> int:\n    return a + b\n",
            "demo.py",
        )
        .unwrap();
        let text = render(&module);
        assert!(text.starts_with("Module demo.py"));
        assert!(text.contains("def add(a: int64, b: int64) -> int64"));
        assert!(text.contains("return a + b :: int64"));
    }

    #[test]
    fn renders_range_plan() {
        let module = convert_source("for i in range(5):\n    pass\n", "loop.py").unwrap();
        let text = render(&module);
        assert!(text.contains("for i in range(0, 5, 1) [Ascending]"));
    }
}
