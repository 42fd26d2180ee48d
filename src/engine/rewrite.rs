//! Source rewriter
//!
//! Wraps a variant's statements in one zero-argument suspendable unit and
//! marks every call whose callee is a bare name in the proxy set as a
//! suspension point. The pass is purely syntactic: it never consults runtime
//! values, and attribute-style calls (`tools.search(...)`) or calls through an
//! alias are left unmarked.

use super::ast::*;
use super::error::ScriptResult;
use super::parser::parse_source;
use std::collections::BTreeSet;

/// Name of the wrapper unit. Names starting with `__` never appear in results.
pub const UNIT_NAME: &str = "__unit_exec";

/// The compiled form of one variant.
#[derive(Debug, Clone)]
pub struct SuspendableUnit {
    pub name: &'static str,
    pub body: Vec<Stmt>,
    pub suspension_points: usize,
}

/// Parse `source` and rewrite it against `proxies`.
///
/// Syntax errors surface here and the variant is never executed.
pub fn rewrite_source(source: &str, proxies: &BTreeSet<String>) -> ScriptResult<SuspendableUnit> {
    let body = parse_source(source)?;
    Ok(rewrite(body, proxies))
}

pub fn rewrite(mut body: Vec<Stmt>, proxies: &BTreeSet<String>) -> SuspendableUnit {
    let mut marker = Marker {
        proxies,
        marked: 0,
    };
    marker.block(&mut body);
    tracing::debug!(
        unit = UNIT_NAME,
        statements = body.len(),
        suspension_points = marker.marked,
        "rewrote variant"
    );
    SuspendableUnit {
        name: UNIT_NAME,
        body,
        suspension_points: marker.marked,
    }
}

struct Marker<'a> {
    proxies: &'a BTreeSet<String>,
    marked: usize,
}

impl Marker<'_> {
    fn block(&mut self, body: &mut [Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Expr(e) => self.expr(e),
            Stmt::Assign { targets, value } => {
                targets.iter_mut().for_each(|t| self.target(t));
                self.expr(value);
            }
            Stmt::AugAssign { target, value, .. } => {
                self.target(target);
                self.expr(value);
            }
            Stmt::If { branches, orelse } => {
                for (cond, body) in branches {
                    self.expr(cond);
                    self.block(body);
                }
                self.block(orelse);
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.target(target);
                self.expr(iter);
                self.block(body);
                self.block(orelse);
            }
            Stmt::While { cond, body, orelse } => {
                self.expr(cond);
                self.block(body);
                self.block(orelse);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.block(body);
                for handler in handlers {
                    if let Some(kind) = &mut handler.kind {
                        self.expr(kind);
                    }
                    self.block(&mut handler.body);
                }
                self.block(orelse);
                self.block(finalbody);
            }
            Stmt::With { items, body } => {
                for (ctx, alias) in items {
                    self.expr(ctx);
                    if let Some(alias) = alias {
                        self.target(alias);
                    }
                }
                self.block(body);
            }
            Stmt::FunctionDef(def) => self.function(def),
            Stmt::Return(value) | Stmt::Raise(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::Assert { test, msg } => {
                self.expr(test);
                if let Some(msg) = msg {
                    self.expr(msg);
                }
            }
            Stmt::Delete(targets) => targets.iter_mut().for_each(|t| self.target(t)),
            Stmt::Import(_) | Stmt::Pass | Stmt::Break | Stmt::Continue => {}
        }
    }

    fn function(&mut self, def: &mut std::sync::Arc<FunctionDef>) {
        let def = std::sync::Arc::make_mut(def);
        for param in &mut def.params {
            if let Some(default) = &mut param.default {
                self.expr(default);
            }
        }
        self.block(&mut def.body);
    }

    fn target(&mut self, target: &mut Target) {
        match target {
            Target::Name(_) => {}
            Target::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            Target::Attribute { value, .. } => self.expr(value),
            Target::Unpack(targets) => targets.iter_mut().for_each(|t| self.target(t)),
        }
    }

    fn expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::None
            | Expr::Bool(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::Str(_)
            | Expr::Name(_) => {}
            Expr::FString(parts) => {
                for part in parts {
                    if let FPart::Expr { expr, .. } = part {
                        self.expr(expr);
                    }
                }
            }
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
                items.iter_mut().for_each(|e| self.expr(e))
            }
            Expr::Dict(entries) => {
                for entry in entries {
                    match entry {
                        DictEntry::Pair(k, v) => {
                            self.expr(k);
                            self.expr(v);
                        }
                        DictEntry::Splat(e) => self.expr(e),
                    }
                }
            }
            Expr::Starred(e) | Expr::Await(e) => self.expr(e),
            Expr::BinOp { left, right, .. } | Expr::BoolOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Compare { left, rest } => {
                self.expr(left);
                rest.iter_mut().for_each(|(_, e)| self.expr(e));
            }
            Expr::IfExp { cond, body, orelse } => {
                self.expr(cond);
                self.expr(body);
                self.expr(orelse);
            }
            Expr::Call(call) => {
                self.expr(&mut call.func);
                call.args.iter_mut().for_each(|e| self.expr(e));
                for kw in &mut call.kwargs {
                    match kw {
                        Keyword::Named(_, e) | Keyword::Splat(e) => self.expr(e),
                    }
                }
                if let Expr::Name(name) = call.func.as_ref() {
                    if self.proxies.contains(name) {
                        call.suspend = true;
                        self.marked += 1;
                    }
                }
            }
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part);
                }
            }
            Expr::Comprehension(comp) => {
                match &mut comp.kind {
                    CompKind::List(e) | CompKind::Set(e) => self.expr(e),
                    CompKind::Dict(k, v) => {
                        self.expr(k);
                        self.expr(v);
                    }
                }
                for clause in &mut comp.clauses {
                    match clause {
                        CompClause::For { target, iter } => {
                            self.target(target);
                            self.expr(iter);
                        }
                        CompClause::If(cond) => self.expr(cond),
                    }
                }
            }
            Expr::Lambda(def) => self.function(def),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy_set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn first_call(stmt: &Stmt) -> &Call {
        match stmt {
            Stmt::Assign {
                value: Expr::Call(call),
                ..
            }
            | Stmt::Expr(Expr::Call(call)) => call,
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn test_marks_bare_proxy_calls_only() {
        let unit = rewrite_source(
            "result = search('x')\nlength = len(result)\ntools.search('y')\n",
            &proxy_set(&["search"]),
        )
        .unwrap();
        assert_eq!(unit.name, UNIT_NAME);
        assert_eq!(unit.suspension_points, 1);
        assert!(first_call(&unit.body[0]).suspend);
        assert!(!first_call(&unit.body[1]).suspend);
        assert!(!first_call(&unit.body[2]).suspend);
    }

    #[test]
    fn test_marks_nested_calls_inside_functions_and_comprehensions() {
        let source = "def go(q):\n    return search(q)\nrows = [fetch(u) for u in search('a')]\n";
        let unit = rewrite_source(source, &proxy_set(&["search", "fetch"])).unwrap();
        assert_eq!(unit.suspension_points, 3);
    }

    #[test]
    fn test_syntax_errors_fail_before_execution() {
        let err = rewrite_source("x = (1,\n", &proxy_set(&[])).unwrap_err();
        assert_eq!(err.kind, crate::engine::error::ErrorKind::SyntaxError);
    }
}
