//! Tree-walking interpreter for a rewritten unit.
//!
//! Execution is a single cooperative task. The only `.await` points that reach
//! outside the engine are marked proxy calls (and explicit `await` on a pending
//! invocation), so suspensions happen in source order, one at a time.

use super::ast::*;
use super::builtins::{self, extremum_candidates, pick_extremum, sort_by_keys, Builtin, CallArgs};
use super::context::ExecutionContext;
use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::format::render_field;
use super::methods;
use super::ops;
use super::rewrite::SuspendableUnit;
use super::stdlib;
use super::value::{Closure, Dict, Module, PendingCall, Value};
use crate::tools::ProxyTable;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;

/// Nested user-function calls allowed before `RuntimeError`.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 100;

/// Nested expression evaluations, across calls, allowed before `RuntimeError`.
pub const MAX_EVAL_DEPTH: usize = 100;

/// Non-local exits from a statement.
#[derive(Debug)]
enum Signal {
    Raise(ScriptError),
    Return(Value),
    Break,
    Continue,
}

impl From<ScriptError> for Signal {
    fn from(err: ScriptError) -> Self {
        Signal::Raise(err)
    }
}

type Flow = Result<(), Signal>;

/// What a unit produced when it ran to completion.
#[derive(Debug, Clone)]
pub struct UnitOutput {
    /// Explicit `return` value; `None` when the unit fell off the end.
    pub returned: Option<Value>,
    /// Top-level bindings, minus `__`-prefixed scaffolding names.
    pub bindings: Vec<(String, Value)>,
    pub stdout: String,
    pub suspensions: usize,
}

pub struct Interpreter<'a> {
    context: &'a ExecutionContext,
    proxies: &'a ProxyTable,
    globals: HashMap<String, Value>,
    /// Function frames, innermost last.
    frames: Vec<HashMap<String, Value>>,
    /// Exceptions currently being handled, for bare `raise`.
    handling: Vec<ScriptError>,
    stdout: String,
    suspensions: usize,
    echo_prints: bool,
    max_call_depth: usize,
    eval_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a ExecutionContext, proxies: &'a ProxyTable) -> Self {
        Self {
            context,
            proxies,
            globals: HashMap::new(),
            frames: Vec::new(),
            handling: Vec::new(),
            stdout: String::new(),
            suspensions: 0,
            echo_prints: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            eval_depth: 0,
        }
    }

    /// Mirror `print` output into the log as well as the captured buffer.
    pub fn echo_prints(mut self, echo: bool) -> Self {
        self.echo_prints = echo;
        self
    }

    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Run the unit to completion, awaiting each suspension point in order.
    pub async fn run_unit(mut self, unit: &SuspendableUnit) -> ScriptResult<UnitOutput> {
        let returned = match self.exec_block(&unit.body).await {
            Ok(()) => None,
            Err(Signal::Return(value)) => Some(value),
            Err(Signal::Raise(err)) => return Err(err),
            Err(Signal::Break) | Err(Signal::Continue) => {
                return Err(ScriptError::syntax("'break' or 'continue' outside loop"))
            }
        };
        let mut bindings: Vec<(String, Value)> = self
            .globals
            .into_iter()
            .filter(|(name, _)| !name.starts_with("__"))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(UnitOutput {
            returned,
            bindings,
            stdout: self.stdout,
            suspensions: self.suspensions,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    //  SCOPES
    // ─────────────────────────────────────────────────────────────────────

    fn lookup(&self, name: &str) -> ScriptResult<Value> {
        if let Some(value) = self.frames.last().and_then(|frame| frame.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        self.context
            .lookup(name)
            .cloned()
            .ok_or_else(|| ScriptError::name_error(name))
    }

    fn scope(&mut self) -> &mut HashMap<String, Value> {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.globals,
        }
    }

    fn set_local(&mut self, name: &str, value: Value) {
        self.scope().insert(name.to_string(), value);
    }

    /// Write an updated container back to the scope `name` resolves from.
    ///
    /// A name only visible through the unit or the context lands in the unit
    /// globals, so mutations inside a function outlive its frame.
    fn write_back(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if frame.contains_key(name) => {
                frame.insert(name.to_string(), value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    //  STATEMENTS
    // ─────────────────────────────────────────────────────────────────────

    fn exec_block<'s>(&'s mut self, body: &'s [Stmt]) -> BoxFuture<'s, Flow> {
        async move {
            for stmt in body {
                self.exec(stmt).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn exec(&mut self, stmt: &Stmt) -> Flow {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr).await?;
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval(value).await?;
                for target in targets {
                    self.assign(target, value.clone()).await?;
                }
            }
            Stmt::AugAssign { target, op, value } => self.aug_assign(target, *op, value).await?,
            Stmt::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond).await?.truthy() {
                        return self.exec_block(body).await;
                    }
                }
                return self.exec_block(orelse).await;
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let items = self.eval(iter).await?.iterate()?;
                for item in items {
                    self.assign(target, item).await?;
                    match self.exec_block(body).await {
                        Err(Signal::Break) => return Ok(()),
                        Err(Signal::Continue) | Ok(()) => {}
                        Err(other) => return Err(other),
                    }
                }
                return self.exec_block(orelse).await;
            }
            Stmt::While { cond, body, orelse } => {
                while self.eval(cond).await?.truthy() {
                    match self.exec_block(body).await {
                        Err(Signal::Break) => return Ok(()),
                        Err(Signal::Continue) | Ok(()) => {}
                        Err(other) => return Err(other),
                    }
                }
                return self.exec_block(orelse).await;
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody).await,
            Stmt::With { items, body } => {
                for (ctx, alias) in items {
                    let value = self.eval(ctx).await?;
                    if let Some(alias) = alias {
                        self.assign(alias, value).await?;
                    }
                }
                return self.exec_block(body).await;
            }
            Stmt::FunctionDef(def) => {
                let closure = self.make_closure(def).await?;
                self.set_local(&def.name, closure);
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr).await?,
                    None => Value::None,
                };
                return Err(Signal::Return(value));
            }
            Stmt::Raise(value) => {
                let err = match value {
                    Some(expr) => {
                        let value = self.eval(expr).await?;
                        to_exception(value)?
                    }
                    None => self.handling.last().cloned().ok_or_else(|| {
                        ScriptError::new(ErrorKind::RuntimeError, "No active exception to reraise")
                    })?,
                };
                return Err(Signal::Raise(err));
            }
            Stmt::Assert { test, msg } => {
                if !self.eval(test).await?.truthy() {
                    let message = match msg {
                        Some(msg) => self.eval(msg).await?.to_display(),
                        None => String::new(),
                    };
                    return Err(ScriptError::new(ErrorKind::AssertionError, message).into());
                }
            }
            Stmt::Delete(targets) => {
                for target in targets {
                    self.delete(target).await?;
                }
            }
            Stmt::Import(items) => {
                for item in items {
                    let value = resolve_import(&item.path)?;
                    self.set_local(&item.bind, value);
                }
            }
            Stmt::Pass => {}
            Stmt::Break => return Err(Signal::Break),
            Stmt::Continue => return Err(Signal::Continue),
        }
        Ok(())
    }

    async fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[Handler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
    ) -> Flow {
        let outcome = match self.exec_block(body).await {
            Ok(()) => self.exec_block(orelse).await,
            Err(Signal::Raise(err)) => self.handle(err, handlers).await,
            Err(other) => Err(other),
        };
        if !finalbody.is_empty() {
            self.exec_block(finalbody).await?;
        }
        outcome
    }

    async fn handle(&mut self, err: ScriptError, handlers: &[Handler]) -> Flow {
        for handler in handlers {
            let matched = match &handler.kind {
                None => true,
                Some(kind) => {
                    let kind = self.eval(kind).await?;
                    exception_matches(&kind, &err)?
                }
            };
            if !matched {
                continue;
            }
            if let Some(alias) = &handler.alias {
                self.set_local(alias, Value::Exception(err.clone()));
            }
            self.handling.push(err);
            let flow = self.exec_block(&handler.body).await;
            self.handling.pop();
            if let Some(alias) = &handler.alias {
                self.scope().remove(alias);
            }
            return flow;
        }
        Err(Signal::Raise(err))
    }

    async fn make_closure(&mut self, def: &Arc<FunctionDef>) -> ScriptResult<Value> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr).await?),
                None => None,
            });
        }
        // Unit-level definitions read globals live; nested ones snapshot the frame.
        let captured = match self.frames.last() {
            Some(frame) => frame.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => Vec::new(),
        };
        Ok(Value::Function(Arc::new(Closure {
            def: Arc::clone(def),
            defaults,
            captured,
        })))
    }

    // ─────────────────────────────────────────────────────────────────────
    //  ASSIGNMENT
    // ─────────────────────────────────────────────────────────────────────

    fn assign<'s>(&'s mut self, target: &'s Target, value: Value) -> BoxFuture<'s, ScriptResult<()>> {
        async move {
            match target {
                Target::Name(name) => {
                    self.set_local(name, value);
                    Ok(())
                }
                Target::Subscript { value: place, index } => {
                    self.store_subscript(place, index, value).await
                }
                Target::Attribute { value: place, attr } => {
                    let owner = self.eval(place).await?;
                    Err(ScriptError::new(
                        ErrorKind::AttributeError,
                        format!(
                            "'{}' object attribute '{}' is read-only",
                            owner.type_name(),
                            attr
                        ),
                    ))
                }
                Target::Unpack(targets) => {
                    let items = value.iterate()?;
                    if items.len() != targets.len() {
                        let message = if items.len() < targets.len() {
                            format!(
                                "not enough values to unpack (expected {}, got {})",
                                targets.len(),
                                items.len()
                            )
                        } else {
                            format!("too many values to unpack (expected {})", targets.len())
                        };
                        return Err(ScriptError::value_error(message));
                    }
                    for (target, item) in targets.iter().zip(items) {
                        self.assign(target, item).await?;
                    }
                    Ok(())
                }
            }
        }
        .boxed()
    }

    async fn store_subscript(&mut self, place: &Expr, index: &Expr, value: Value) -> ScriptResult<()> {
        if matches!(index, Expr::Slice { .. }) {
            return Err(ScriptError::type_error("slice assignment is not supported"));
        }
        let container = self.eval(place).await?;
        let index = self.eval(index).await?;
        let updated = ops::set_item(container, index, value)?;
        self.store(place, updated).await
    }

    /// Write an updated container back to the place it was read from.
    ///
    /// Temporaries (call results, literals) have no place; the update is dropped.
    fn store<'s>(&'s mut self, place: &'s Expr, value: Value) -> BoxFuture<'s, ScriptResult<()>> {
        async move {
            match place {
                Expr::Name(name) => {
                    self.write_back(name, value);
                    Ok(())
                }
                Expr::Subscript {
                    value: container,
                    index,
                } => self.store_subscript(container, index, value).await,
                _ => Ok(()),
            }
        }
        .boxed()
    }

    async fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> ScriptResult<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value).await?;
                let updated = ops::binary(op, &current, &rhs)?;
                self.set_local(name, updated);
                Ok(())
            }
            Target::Subscript { value: place, index } => {
                let container = self.eval(place).await?;
                let key = self.eval(index).await?;
                let current = ops::get_item(&container, &key)?;
                let rhs = self.eval(value).await?;
                let updated = ops::binary(op, &current, &rhs)?;
                let container = ops::set_item(container, key, updated)?;
                self.store(place, container).await
            }
            other => self.assign(other, Value::None).await,
        }
    }

    fn delete<'s>(&'s mut self, target: &'s Target) -> BoxFuture<'s, ScriptResult<()>> {
        async move {
            match target {
                Target::Name(name) => match self.scope().remove(name) {
                    Some(_) => Ok(()),
                    None => Err(ScriptError::name_error(name)),
                },
                Target::Subscript { value: place, index } => {
                    let container = self.eval(place).await?;
                    let key = self.eval(index).await?;
                    let updated = ops::del_item(container, &key)?;
                    self.store(place, updated).await
                }
                Target::Attribute { attr, .. } => Err(ScriptError::new(
                    ErrorKind::AttributeError,
                    format!("cannot delete attribute '{}'", attr),
                )),
                Target::Unpack(targets) => {
                    for target in targets {
                        self.delete(target).await?;
                    }
                    Ok(())
                }
            }
        }
        .boxed()
    }

    // ─────────────────────────────────────────────────────────────────────
    //  EXPRESSIONS
    // ─────────────────────────────────────────────────────────────────────

    fn eval<'s>(&'s mut self, expr: &'s Expr) -> BoxFuture<'s, ScriptResult<Value>> {
        async move {
            if self.eval_depth >= MAX_EVAL_DEPTH {
                return Err(ScriptError::new(
                    ErrorKind::RuntimeError,
                    "maximum recursion depth exceeded",
                ));
            }
            self.eval_depth += 1;
            let value = self.eval_inner(expr).await;
            self.eval_depth -= 1;
            value
        }
        .boxed()
    }

    async fn eval_inner(&mut self, expr: &Expr) -> ScriptResult<Value> {
        Ok(match expr {
            Expr::None => Value::None,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::Float(f) => Value::Float(*f),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FPart::Lit(text) => out.push_str(text),
                        FPart::Expr {
                            expr,
                            conversion,
                            spec,
                        } => {
                            let value = self.eval(expr).await?;
                            out.push_str(&render_field(
                                &value,
                                *conversion,
                                spec.as_deref().unwrap_or(""),
                            )?);
                        }
                    }
                }
                Value::Str(out)
            }
            Expr::Name(name) => self.lookup(name)?,
            Expr::List(items) => Value::List(self.eval_items(items).await?),
            Expr::Tuple(items) => Value::Tuple(self.eval_items(items).await?),
            Expr::Set(items) => Value::Set(builtins::dedupe(self.eval_items(items).await?)?),
            Expr::Dict(entries) => {
                let mut dict = Dict::new();
                for entry in entries {
                    match entry {
                        DictEntry::Pair(k, v) => {
                            let key = self.eval(k).await?;
                            let value = self.eval(v).await?;
                            dict.insert(key, value)?;
                        }
                        DictEntry::Splat(e) => match self.eval(e).await? {
                            Value::Dict(other) => {
                                for (k, v) in other.iter() {
                                    dict.insert(k.clone(), v.clone())?;
                                }
                            }
                            other => {
                                return Err(ScriptError::type_error(format!(
                                    "'{}' object is not a mapping",
                                    other.type_name()
                                )))
                            }
                        },
                    }
                }
                Value::Dict(dict)
            }
            Expr::Starred(_) => {
                return Err(ScriptError::syntax("can't use starred expression here"))
            }
            Expr::BinOp { left, op, right } => {
                let l = self.eval(left).await?;
                let r = self.eval(right).await?;
                ops::binary(*op, &l, &r)?
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand).await?;
                ops::unary(*op, &v)?
            }
            Expr::BoolOp { op, left, right } => {
                let l = self.eval(left).await?;
                match (op, l.truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => l,
                    _ => self.eval(right).await?,
                }
            }
            Expr::Compare { left, rest } => {
                let mut current = self.eval(left).await?;
                for (op, expr) in rest {
                    let next = self.eval(expr).await?;
                    if !ops::compare_op(*op, &current, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Value::Bool(true)
            }
            Expr::IfExp { cond, body, orelse } => {
                if self.eval(cond).await?.truthy() {
                    self.eval(body).await?
                } else {
                    self.eval(orelse).await?
                }
            }
            Expr::Call(call) => self.eval_call(call).await?,
            Expr::Attribute { value, attr } => {
                let owner = self.eval(value).await?;
                methods::get_attribute(&owner, attr)?
            }
            Expr::Subscript { value, index } => {
                let container = self.eval(value).await?;
                match index.as_ref() {
                    Expr::Slice { lower, upper, step } => {
                        let lower = self.slice_bound(lower.as_deref()).await?;
                        let upper = self.slice_bound(upper.as_deref()).await?;
                        let step = self.slice_bound(step.as_deref()).await?;
                        ops::get_slice(&container, lower, upper, step)?
                    }
                    other => {
                        let key = self.eval(other).await?;
                        ops::get_item(&container, &key)?
                    }
                }
            }
            Expr::Slice { .. } => {
                return Err(ScriptError::syntax("slice outside of a subscript"))
            }
            Expr::Comprehension(comp) => self.eval_comprehension(comp).await?,
            Expr::Lambda(def) => self.make_closure(def).await?,
            Expr::Await(inner) => {
                let value = self.eval(inner).await?;
                self.complete(value).await?
            }
        })
    }

    async fn eval_items(&mut self, items: &[Expr]) -> ScriptResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Expr::Starred(inner) => out.extend(self.eval(inner).await?.iterate()?),
                other => out.push(self.eval(other).await?),
            }
        }
        Ok(out)
    }

    async fn slice_bound(&mut self, bound: Option<&Expr>) -> ScriptResult<Option<i64>> {
        let Some(expr) = bound else {
            return Ok(None);
        };
        match self.eval(expr).await? {
            Value::None => Ok(None),
            other => other.as_int().map(Some).ok_or_else(|| {
                ScriptError::type_error("slice indices must be integers or None")
            }),
        }
    }

    async fn eval_comprehension(&mut self, comp: &Comprehension) -> ScriptResult<Value> {
        // Loop variables do not leak into the enclosing scope.
        let mut names = Vec::new();
        for clause in &comp.clauses {
            if let CompClause::For { target, .. } = clause {
                target_names(target, &mut names);
            }
        }
        let saved: Vec<(String, Option<Value>)> = names
            .into_iter()
            .map(|name| {
                let previous = self.scope().get(&name).cloned();
                (name, previous)
            })
            .collect();

        let mut out = Vec::new();
        let result = self.comprehension_clause(comp, 0, &mut out).await;

        for (name, previous) in saved {
            match previous {
                Some(value) => self.set_local(&name, value),
                None => {
                    self.scope().remove(&name);
                }
            }
        }
        result?;

        Ok(match &comp.kind {
            CompKind::List(_) => Value::List(out),
            CompKind::Set(_) => Value::Set(builtins::dedupe(out)?),
            CompKind::Dict(_, _) => {
                let mut dict = Dict::new();
                for pair in out {
                    if let Value::Tuple(mut kv) = pair {
                        if let (Some(v), Some(k)) = (kv.pop(), kv.pop()) {
                            dict.insert(k, v)?;
                        }
                    }
                }
                Value::Dict(dict)
            }
        })
    }

    fn comprehension_clause<'s>(
        &'s mut self,
        comp: &'s Comprehension,
        index: usize,
        out: &'s mut Vec<Value>,
    ) -> BoxFuture<'s, ScriptResult<()>> {
        async move {
            let Some(clause) = comp.clauses.get(index) else {
                match &comp.kind {
                    CompKind::List(e) | CompKind::Set(e) => out.push(self.eval(e).await?),
                    CompKind::Dict(k, v) => {
                        let key = self.eval(k).await?;
                        let value = self.eval(v).await?;
                        out.push(Value::Tuple(vec![key, value]));
                    }
                }
                return Ok(());
            };
            match clause {
                CompClause::For { target, iter } => {
                    let items = self.eval(iter).await?.iterate()?;
                    for item in items {
                        self.assign(target, item).await?;
                        self.comprehension_clause(comp, index + 1, out).await?;
                    }
                }
                CompClause::If(cond) => {
                    if self.eval(cond).await?.truthy() {
                        self.comprehension_clause(comp, index + 1, out).await?;
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    // ─────────────────────────────────────────────────────────────────────
    //  CALLS
    // ─────────────────────────────────────────────────────────────────────

    async fn eval_args(&mut self, call: &Call) -> ScriptResult<CallArgs> {
        let positional = self.eval_items(&call.args).await?;
        let mut keywords = Vec::with_capacity(call.kwargs.len());
        for kw in &call.kwargs {
            match kw {
                Keyword::Named(name, expr) => {
                    let value = self.eval(expr).await?;
                    keywords.push((name.clone(), value));
                }
                Keyword::Splat(expr) => match self.eval(expr).await? {
                    Value::Dict(d) => {
                        for (k, v) in d.iter() {
                            match k {
                                Value::Str(name) => keywords.push((name.clone(), v.clone())),
                                _ => return Err(ScriptError::type_error("keywords must be strings")),
                            }
                        }
                    }
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok(CallArgs {
            positional,
            keywords,
        })
    }

    async fn eval_call(&mut self, call: &Call) -> ScriptResult<Value> {
        if let Expr::Attribute { value: place, attr } = call.func.as_ref() {
            let receiver = self.eval(place).await?;
            if !matches!(
                receiver,
                Value::Module(_) | Value::Exception(_) | Value::Builtin(_) | Value::ExceptionType(_)
            ) {
                let args = self.eval_args(call).await?;
                let (result, updated) = self.call_method(&receiver, attr, args).await?;
                if let Some(updated) = updated {
                    self.store(place, updated).await?;
                }
                return Ok(result);
            }
            let func = methods::get_attribute(&receiver, attr)?;
            let args = self.eval_args(call).await?;
            return self.call_value(func, args, call.suspend).await;
        }
        let func = self.eval(&call.func).await?;
        let args = self.eval_args(call).await?;
        self.call_value(func, args, call.suspend).await
    }

    async fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        mut args: CallArgs,
    ) -> ScriptResult<methods::MethodOutcome> {
        if let (Value::List(items), "sort") = (receiver, name) {
            if let Some(key) = args.take_keyword("key").filter(|k| !matches!(k, Value::None)) {
                let reverse = args.keyword("reverse").map(Value::truthy).unwrap_or(false);
                let keys = self.map_key(&key, items).await?;
                let sorted = sort_by_keys(items.clone(), keys, reverse)?;
                return Ok((Value::None, Some(Value::List(sorted))));
            }
        }
        methods::call_method(receiver, name, args)
    }

    /// Call any callable value. `suspend` is the rewriter's mark on the call site.
    fn call_value<'s>(
        &'s mut self,
        func: Value,
        args: CallArgs,
        suspend: bool,
    ) -> BoxFuture<'s, ScriptResult<Value>> {
        async move {
            let result = match func {
                Value::Proxy(operation) => {
                    let args = proxy_args(args);
                    if suspend {
                        return self.invoke_proxy(&operation, args).await;
                    }
                    Value::Pending(Arc::new(PendingCall { operation, args }))
                }
                Value::Builtin(builtin) => self.call_builtin(builtin, args).await?,
                Value::Function(closure) => self.call_function(closure, args).await?,
                Value::ExceptionType(kind) => {
                    let message = match args.get(0) {
                        Some(arg) if kind == ErrorKind::KeyError => arg.repr(),
                        Some(arg) => arg.to_display(),
                        None => String::new(),
                    };
                    Value::Exception(ScriptError::new(kind, message))
                }
                other => {
                    return Err(ScriptError::type_error(format!(
                        "'{}' object is not callable",
                        other.type_name()
                    )))
                }
            };
            // A marked site whose name was rebound to something that returns
            // an invocation still suspends on it.
            if suspend {
                return self.complete(result).await;
            }
            Ok(result)
        }
        .boxed()
    }

    async fn invoke_proxy(&mut self, operation: &str, args: Vec<Value>) -> ScriptResult<Value> {
        let proxies = self.proxies;
        let proxy = proxies.get(operation).ok_or_else(|| {
            ScriptError::new(
                ErrorKind::ToolError,
                format!("tool '{}' is not registered", operation),
            )
        })?;
        let payload = args.iter().map(Value::to_json).collect();
        tracing::debug!(operation, index = self.suspensions, "suspending on tool call");
        let reply = proxy
            .invoke(payload)
            .await
            .map_err(|e| ScriptError::new(ErrorKind::ToolError, format!("{:#}", e)))?;
        self.suspensions += 1;
        tracing::debug!(operation, "tool call resumed");
        Ok(Value::from_json(&reply))
    }

    /// Finish a pending invocation; any other value is already complete.
    async fn complete(&mut self, value: Value) -> ScriptResult<Value> {
        match value {
            Value::Pending(call) => self.invoke_proxy(&call.operation, call.args.clone()).await,
            other => Ok(other),
        }
    }

    async fn call_builtin(&mut self, builtin: Builtin, mut args: CallArgs) -> ScriptResult<Value> {
        match builtin {
            Builtin::Print => {
                let sep = match args.keyword("sep") {
                    Some(Value::None) | None => " ".to_string(),
                    Some(v) => v.to_display(),
                };
                let end = match args.keyword("end") {
                    Some(Value::None) | None => "\n".to_string(),
                    Some(v) => v.to_display(),
                };
                let line = args
                    .positional
                    .iter()
                    .map(Value::to_display)
                    .collect::<Vec<_>>()
                    .join(&sep);
                if self.echo_prints {
                    tracing::info!(target: "variant", "{}", line);
                }
                self.stdout.push_str(&line);
                self.stdout.push_str(&end);
                Ok(Value::None)
            }
            Builtin::Sorted | Builtin::Min | Builtin::Max => {
                let key = args.take_keyword("key").filter(|k| !matches!(k, Value::None));
                let Some(key) = key else {
                    return builtins::call(builtin, args);
                };
                if builtin == Builtin::Sorted {
                    args.expect_range("sorted", 1, 1)?;
                    let reverse = args.keyword("reverse").map(Value::truthy).unwrap_or(false);
                    let items = args.positional[0].iterate()?;
                    let keys = self.map_key(&key, &items).await?;
                    return Ok(Value::List(sort_by_keys(items, keys, reverse)?));
                }
                let items = extremum_candidates(&args, builtin.name())?;
                let keys = self.map_key(&key, &items).await?;
                pick_extremum(builtin, items, keys, args.keyword("default").cloned())
            }
            other => builtins::call(other, args),
        }
    }

    async fn map_key(&mut self, key: &Value, items: &[Value]) -> ScriptResult<Vec<Value>> {
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let args = CallArgs::positional(vec![item.clone()]);
            keys.push(self.call_value(key.clone(), args, false).await?);
        }
        Ok(keys)
    }

    async fn call_function(&mut self, closure: Arc<Closure>, args: CallArgs) -> ScriptResult<Value> {
        if self.frames.len() >= self.max_call_depth {
            return Err(ScriptError::new(
                ErrorKind::RuntimeError,
                "maximum recursion depth exceeded",
            ));
        }
        let def = Arc::clone(&closure.def);
        let mut frame: HashMap<String, Value> = closure.captured.iter().cloned().collect();
        frame
            .entry(def.name.clone())
            .or_insert_with(|| Value::Function(Arc::clone(&closure)));
        bind_params(&def, &closure.defaults, args, &mut frame)?;

        self.frames.push(frame);
        let flow = self.exec_block(&def.body).await;
        self.frames.pop();

        match flow {
            Ok(()) => Ok(Value::None),
            Err(Signal::Return(value)) => Ok(value),
            Err(Signal::Raise(err)) => Err(err),
            Err(Signal::Break) | Err(Signal::Continue) => {
                Err(ScriptError::syntax("'break' or 'continue' outside loop"))
            }
        }
    }
}

fn bind_params(
    def: &FunctionDef,
    defaults: &[Option<Value>],
    args: CallArgs,
    frame: &mut HashMap<String, Value>,
) -> ScriptResult<()> {
    let name = &def.name;
    if args.positional.len() > def.params.len() {
        return Err(ScriptError::type_error(format!(
            "{}() takes {} positional arguments but {} were given",
            name,
            def.params.len(),
            args.positional.len()
        )));
    }
    let mut slots: Vec<Option<Value>> = vec![None; def.params.len()];
    for (slot, value) in slots.iter_mut().zip(args.positional) {
        *slot = Some(value);
    }
    for (key, value) in args.keywords {
        let Some(pos) = def.params.iter().position(|p| p.name == key) else {
            return Err(ScriptError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                name, key
            )));
        };
        if slots[pos].is_some() {
            return Err(ScriptError::type_error(format!(
                "{}() got multiple values for argument '{}'",
                name, key
            )));
        }
        slots[pos] = Some(value);
    }
    for (i, (param, slot)) in def.params.iter().zip(slots).enumerate() {
        let value = match slot.or_else(|| defaults.get(i).cloned().flatten()) {
            Some(value) => value,
            None => {
                return Err(ScriptError::type_error(format!(
                    "{}() missing required positional argument: '{}'",
                    name, param.name
                )))
            }
        };
        frame.insert(param.name.clone(), value);
    }
    Ok(())
}

/// Positional arguments for a tool call; keywords travel as a trailing mapping.
fn proxy_args(args: CallArgs) -> Vec<Value> {
    let mut out = args.positional;
    if !args.keywords.is_empty() {
        out.push(Value::Dict(Dict::from_str_map(args.keywords)));
    }
    out
}

fn to_exception(value: Value) -> ScriptResult<ScriptError> {
    match value {
        Value::Exception(err) => Ok(err),
        Value::ExceptionType(kind) => Ok(ScriptError::new(kind, "")),
        other => Err(ScriptError::type_error(format!(
            "exceptions must derive from BaseException, not {}",
            other.type_name()
        ))),
    }
}

fn exception_matches(kind: &Value, err: &ScriptError) -> ScriptResult<bool> {
    match kind {
        Value::ExceptionType(k) => Ok(err.kind.is_a(*k)),
        Value::Tuple(options) => {
            for option in options {
                if exception_matches(option, err)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(ScriptError::type_error(format!(
            "catching '{}' that does not inherit from BaseException is not allowed",
            other.type_name()
        ))),
    }
}

fn target_names(target: &Target, out: &mut Vec<String>) {
    match target {
        Target::Name(name) => out.push(name.clone()),
        Target::Unpack(targets) => targets.iter().for_each(|t| target_names(t, out)),
        Target::Subscript { .. } | Target::Attribute { .. } => {}
    }
}

/// Only the library modules the context already exposes can be imported.
fn resolve_import(path: &str) -> ScriptResult<Value> {
    let module = |name: &str| match name {
        "json" => Some(Module::Json),
        "os" => Some(Module::Os),
        "os.path" => Some(Module::OsPath),
        "pathlib" => Some(Module::Pathlib),
        _ => None,
    };
    if let Some(m) = module(path) {
        return Ok(Value::Module(m));
    }
    if let Some((parent, attr)) = path.rsplit_once('.') {
        if let Some(m) = module(parent) {
            return stdlib::module_attr(m, attr).map_err(|_| {
                ScriptError::new(
                    ErrorKind::ImportError,
                    format!("cannot import name '{}' from '{}'", attr, parent),
                )
            });
        }
    }
    let top = path.split('.').next().unwrap_or(path);
    Err(ScriptError::new(
        ErrorKind::ImportError,
        format!("No module named '{}'", top),
    ))
}
