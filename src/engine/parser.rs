//! Tree-sitter based parser for variant source
//!
//! Parses with the Python grammar and lowers the concrete tree into the owned
//! [`ast`](super::ast) types. Anything the interpreter cannot run is rejected
//! here as a `SyntaxError`, so a unit that lowers cleanly only fails at runtime.

use super::ast::*;
use super::error::{ScriptError, ScriptResult};
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use tree_sitter::{Node, Parser};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A failed set_language surfaces as a missing tree at parse time
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

/// Parse variant source into a statement sequence.
pub fn parse_source(source: &str) -> ScriptResult<Vec<Stmt>> {
    let tree = PYTHON_PARSER
        .with(|p| p.borrow_mut().parse(source, None))
        .ok_or_else(|| ScriptError::syntax("parser produced no tree"))?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(describe_syntax_error(&root, source));
    }
    Lowering {
        src: source,
        depth: Cell::new(0),
    }
    .block(&root)
}

fn describe_syntax_error(root: &Node, source: &str) -> ScriptError {
    let Some(node) = first_error_node(root) else {
        return ScriptError::syntax("invalid syntax");
    };
    let pos = node.start_position();
    let line = source.lines().nth(pos.row).unwrap_or("").trim();
    if node.is_missing() {
        ScriptError::syntax(format!(
            "expected '{}' (line {}, column {}): {}",
            node.kind(),
            pos.row + 1,
            pos.column + 1,
            line
        ))
    } else {
        ScriptError::syntax(format!(
            "invalid syntax (line {}, column {}): {}",
            pos.row + 1,
            pos.column + 1,
            line
        ))
    }
}

fn first_error_node<'t>(root: &Node<'t>) -> Option<Node<'t>> {
    let mut node = *root;
    loop {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        node = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|child| child.has_error())?;
    }
}

/// Blocks and expressions nested deeper than this are rejected.
const MAX_NESTING: usize = 100;

struct Lowering<'s> {
    src: &'s str,
    depth: Cell<usize>,
}

/// One level of nesting, released on drop.
struct Nested<'a>(&'a Cell<usize>);

impl Drop for Nested<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl<'s> Lowering<'s> {
    fn text(&self, node: &Node) -> &'s str {
        &self.src[node.byte_range()]
    }

    fn nest(&self, node: &Node) -> ScriptResult<Nested<'_>> {
        let depth = self.depth.get() + 1;
        if depth > MAX_NESTING {
            return Err(ScriptError::syntax(format!(
                "too many nested expressions (line {})",
                node.start_position().row + 1
            )));
        }
        self.depth.set(depth);
        Ok(Nested(&self.depth))
    }

    fn unsupported(&self, what: &str, node: &Node) -> ScriptError {
        ScriptError::syntax(format!(
            "unsupported {} (line {}): {}",
            what,
            node.start_position().row + 1,
            crate::util::truncate(self.text(node).lines().next().unwrap_or(""), 60)
        ))
    }

    fn field<'t>(&self, node: &Node<'t>, name: &str) -> ScriptResult<Node<'t>> {
        node.child_by_field_name(name).ok_or_else(|| {
            ScriptError::syntax(format!(
                "malformed {} (line {}): missing {}",
                node.kind(),
                node.start_position().row + 1,
                name
            ))
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    //  STATEMENTS
    // ─────────────────────────────────────────────────────────────────────

    fn block(&self, node: &Node) -> ScriptResult<Vec<Stmt>> {
        let _nested = self.nest(node)?;
        let mut out = Vec::new();
        for child in named_children(node) {
            self.stmt(&child, &mut out)?;
        }
        Ok(out)
    }

    fn stmt(&self, node: &Node, out: &mut Vec<Stmt>) -> ScriptResult<()> {
        let stmt = match node.kind() {
            "expression_statement" => self.expression_statement(node)?,
            "if_statement" => self.if_statement(node)?,
            "for_statement" => Stmt::For {
                target: self.target(&self.field(node, "left")?)?,
                iter: self.expr(&self.field(node, "right")?)?,
                body: self.block(&self.field(node, "body")?)?,
                orelse: self.else_body(node)?,
            },
            "while_statement" => Stmt::While {
                cond: self.expr(&self.field(node, "condition")?)?,
                body: self.block(&self.field(node, "body")?)?,
                orelse: self.else_body(node)?,
            },
            "try_statement" => self.try_statement(node)?,
            "with_statement" => self.with_statement(node)?,
            "function_definition" => {
                let name = self.text(&self.field(node, "name")?).to_string();
                let params = match node.child_by_field_name("parameters") {
                    Some(params) => self.params(&params)?,
                    None => Vec::new(),
                };
                let body = self.block(&self.field(node, "body")?)?;
                Stmt::FunctionDef(Arc::new(FunctionDef { name, params, body }))
            }
            "return_statement" => Stmt::Return(match first_named(node) {
                Some(value) => Some(self.expr(&value)?),
                None => None,
            }),
            "raise_statement" => Stmt::Raise(match first_named(node) {
                Some(value) => Some(self.expr(&value)?),
                None => None,
            }),
            "assert_statement" => {
                let parts = named_children(node);
                let test = parts
                    .first()
                    .ok_or_else(|| self.unsupported("empty assert", node))?;
                Stmt::Assert {
                    test: self.expr(test)?,
                    msg: match parts.get(1) {
                        Some(msg) => Some(self.expr(msg)?),
                        None => None,
                    },
                }
            }
            "delete_statement" => {
                let mut targets = Vec::new();
                for child in named_children(node) {
                    match self.target(&child)? {
                        Target::Unpack(inner) => targets.extend(inner),
                        other => targets.push(other),
                    }
                }
                Stmt::Delete(targets)
            }
            "import_statement" => self.import_statement(node)?,
            "import_from_statement" => self.import_from_statement(node)?,
            "pass_statement" | "global_statement" | "nonlocal_statement"
            | "future_import_statement" => Stmt::Pass,
            "break_statement" => Stmt::Break,
            "continue_statement" => Stmt::Continue,
            "class_definition" => return Err(self.unsupported("class definition", node)),
            "decorated_definition" => return Err(self.unsupported("decorator", node)),
            other => return Err(self.unsupported(&format!("statement '{}'", other), node)),
        };
        out.push(stmt);
        Ok(())
    }

    fn expression_statement(&self, node: &Node) -> ScriptResult<Stmt> {
        let children = named_children(node);
        if children.len() > 1 {
            let items = children
                .iter()
                .map(|c| self.expr(c))
                .collect::<ScriptResult<Vec<_>>>()?;
            return Ok(Stmt::Expr(Expr::Tuple(items)));
        }
        let Some(inner) = children.first() else {
            return Ok(Stmt::Pass);
        };
        match inner.kind() {
            "assignment" => self.assignment(inner),
            "augmented_assignment" => {
                let operator = self.text(&self.field(inner, "operator")?);
                let op = BinOp::from_token(operator)
                    .ok_or_else(|| self.unsupported("augmented operator", inner))?;
                Ok(Stmt::AugAssign {
                    target: self.target(&self.field(inner, "left")?)?,
                    op,
                    value: self.expr(&self.field(inner, "right")?)?,
                })
            }
            _ => Ok(Stmt::Expr(self.expr(inner)?)),
        }
    }

    fn assignment(&self, node: &Node) -> ScriptResult<Stmt> {
        let mut targets = vec![self.target(&self.field(node, "left")?)?];
        let Some(mut right) = node.child_by_field_name("right") else {
            // Bare annotation such as `x: int`
            return Ok(Stmt::Pass);
        };
        while right.kind() == "assignment" {
            targets.push(self.target(&self.field(&right, "left")?)?);
            right = self.field(&right, "right")?;
        }
        Ok(Stmt::Assign {
            targets,
            value: self.expr(&right)?,
        })
    }

    fn if_statement(&self, node: &Node) -> ScriptResult<Stmt> {
        let mut branches = vec![(
            self.expr(&self.field(node, "condition")?)?,
            self.block(&self.field(node, "consequence")?)?,
        )];
        let mut orelse = Vec::new();
        let mut cursor = node.walk();
        for alt in node.children_by_field_name("alternative", &mut cursor) {
            match alt.kind() {
                "elif_clause" => branches.push((
                    self.expr(&self.field(&alt, "condition")?)?,
                    self.block(&self.field(&alt, "consequence")?)?,
                )),
                "else_clause" => orelse = self.block(&self.field(&alt, "body")?)?,
                _ => {}
            }
        }
        Ok(Stmt::If { branches, orelse })
    }

    fn else_body(&self, node: &Node) -> ScriptResult<Vec<Stmt>> {
        match node.child_by_field_name("alternative") {
            Some(alt) => self.block(&self.field(&alt, "body")?),
            None => Ok(Vec::new()),
        }
    }

    fn try_statement(&self, node: &Node) -> ScriptResult<Stmt> {
        let body = self.block(&self.field(node, "body")?)?;
        let mut handlers = Vec::new();
        let mut orelse = Vec::new();
        let mut finalbody = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "except_clause" => handlers.push(self.except_clause(&child)?),
                "else_clause" => orelse = self.block(&self.field(&child, "body")?)?,
                "finally_clause" => {
                    if let Some(block) = find_kind(&child, "block") {
                        finalbody = self.block(&block)?;
                    }
                }
                "except_group_clause" => {
                    return Err(self.unsupported("except* clause", &child));
                }
                _ => {}
            }
        }
        Ok(Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn except_clause(&self, node: &Node) -> ScriptResult<Handler> {
        let children = named_children(node);
        let block = children
            .iter()
            .find(|c| c.kind() == "block")
            .ok_or_else(|| self.unsupported("except clause without body", node))?;
        let heads: Vec<&Node> = children.iter().filter(|c| c.kind() != "block").collect();

        let (kind, alias) = match heads.as_slice() {
            [] => (None, None),
            [single] if single.kind() == "as_pattern" => {
                let kind = first_named(single)
                    .ok_or_else(|| self.unsupported("except clause", node))?;
                let alias = single
                    .child_by_field_name("alias")
                    .map(|a| self.alias_name(&a));
                (Some(self.expr(&kind)?), alias)
            }
            [single] => (Some(self.expr(single)?), None),
            [kind, alias, ..] => (Some(self.expr(kind)?), Some(self.alias_name(alias))),
        };

        Ok(Handler {
            kind,
            alias,
            body: self.block(block)?,
        })
    }

    fn alias_name(&self, node: &Node) -> String {
        match first_named(node) {
            Some(inner) if node.kind() == "as_pattern_target" => self.text(&inner).to_string(),
            _ => self.text(node).to_string(),
        }
    }

    fn with_statement(&self, node: &Node) -> ScriptResult<Stmt> {
        let mut items = Vec::new();
        if let Some(clause) = find_kind(node, "with_clause") {
            for item in named_children(&clause) {
                if item.kind() != "with_item" {
                    continue;
                }
                let value = self.field(&item, "value")?;
                if value.kind() == "as_pattern" {
                    let expr = first_named(&value)
                        .ok_or_else(|| self.unsupported("with item", &item))?;
                    let target = match value.child_by_field_name("alias") {
                        Some(alias) => Some(self.pattern_target(&alias)?),
                        None => None,
                    };
                    items.push((self.expr(&expr)?, target));
                } else {
                    items.push((self.expr(&value)?, None));
                }
            }
        }
        Ok(Stmt::With {
            items,
            body: self.block(&self.field(node, "body")?)?,
        })
    }

    fn pattern_target(&self, node: &Node) -> ScriptResult<Target> {
        if node.kind() == "as_pattern_target" {
            if let Some(inner) = first_named(node) {
                return self.target(&inner);
            }
            return Ok(Target::Name(self.text(node).to_string()));
        }
        self.target(node)
    }

    fn import_statement(&self, node: &Node) -> ScriptResult<Stmt> {
        let mut items = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "dotted_name" => {
                    // `import os.path` binds the top-level package
                    let dotted = self.text(&child);
                    let top = dotted.split('.').next().unwrap_or(dotted).to_string();
                    items.push(ImportItem {
                        path: top.clone(),
                        bind: top,
                    });
                }
                "aliased_import" => {
                    let path = self.text(&self.field(&child, "name")?).to_string();
                    let bind = self.text(&self.field(&child, "alias")?).to_string();
                    items.push(ImportItem { path, bind });
                }
                _ => {}
            }
        }
        Ok(Stmt::Import(items))
    }

    fn import_from_statement(&self, node: &Node) -> ScriptResult<Stmt> {
        let module = self.field(node, "module_name")?;
        if module.kind() == "relative_import" {
            return Err(self.unsupported("relative import", node));
        }
        let module = self.text(&module);
        if find_kind(node, "wildcard_import").is_some() {
            return Err(self.unsupported("wildcard import", node));
        }
        let mut items = Vec::new();
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (path, bind) = match name.kind() {
                "aliased_import" => (
                    self.text(&self.field(&name, "name")?),
                    self.text(&self.field(&name, "alias")?),
                ),
                _ => {
                    let text = self.text(&name);
                    (text, text)
                }
            };
            items.push(ImportItem {
                path: format!("{}.{}", module, path),
                bind: bind.to_string(),
            });
        }
        Ok(Stmt::Import(items))
    }

    fn params(&self, node: &Node) -> ScriptResult<Vec<Param>> {
        let mut params = Vec::new();
        for child in named_children(node) {
            let param = match child.kind() {
                "identifier" => Param {
                    name: self.text(&child).to_string(),
                    default: None,
                },
                "typed_parameter" => {
                    let name = first_named(&child)
                        .ok_or_else(|| self.unsupported("parameter", &child))?;
                    if name.kind() != "identifier" {
                        return Err(self.unsupported("variadic parameter", &child));
                    }
                    Param {
                        name: self.text(&name).to_string(),
                        default: None,
                    }
                }
                "default_parameter" | "typed_default_parameter" => Param {
                    name: self.text(&self.field(&child, "name")?).to_string(),
                    default: Some(self.expr(&self.field(&child, "value")?)?),
                },
                "keyword_separator" | "positional_separator" => continue,
                _ => return Err(self.unsupported("variadic parameter", &child)),
            };
            params.push(param);
        }
        Ok(params)
    }

    // ─────────────────────────────────────────────────────────────────────
    //  TARGETS
    // ─────────────────────────────────────────────────────────────────────

    fn target(&self, node: &Node) -> ScriptResult<Target> {
        let _nested = self.nest(node)?;
        match node.kind() {
            "identifier" => Ok(Target::Name(self.text(node).to_string())),
            "subscript" => Ok(Target::Subscript {
                value: Box::new(self.expr(&self.field(node, "value")?)?),
                index: Box::new(self.subscript_index(node)?),
            }),
            "attribute" => Ok(Target::Attribute {
                value: Box::new(self.expr(&self.field(node, "object")?)?),
                attr: self.text(&self.field(node, "attribute")?).to_string(),
            }),
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "expression_list" => Ok(Target::Unpack(
                named_children(node)
                    .iter()
                    .map(|c| self.target(c))
                    .collect::<ScriptResult<Vec<_>>>()?,
            )),
            "parenthesized_expression" => match first_named(node) {
                Some(inner) => self.target(&inner),
                None => Err(self.unsupported("assignment target", node)),
            },
            _ => Err(self.unsupported("assignment target", node)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    //  EXPRESSIONS
    // ─────────────────────────────────────────────────────────────────────

    fn expr(&self, node: &Node) -> ScriptResult<Expr> {
        let _nested = self.nest(node)?;
        let expr = match node.kind() {
            "identifier" => Expr::Name(self.text(node).to_string()),
            "true" => Expr::Bool(true),
            "false" => Expr::Bool(false),
            "none" | "ellipsis" => Expr::None,
            "integer" => self.integer(node)?,
            "float" => {
                let cleaned = self.text(node).replace('_', "");
                let value = cleaned
                    .parse::<f64>()
                    .map_err(|_| self.unsupported("float literal", node))?;
                Expr::Float(value)
            }
            "string" => self.string(node)?,
            "concatenated_string" => {
                let mut parts = Vec::new();
                let mut formatted = false;
                for child in named_children(node) {
                    match self.string(&child)? {
                        Expr::Str(s) => parts.push(FPart::Lit(s)),
                        Expr::FString(inner) => {
                            formatted = true;
                            parts.extend(inner);
                        }
                        _ => {}
                    }
                }
                collapse_fstring(parts, formatted)
            }
            "list" => Expr::List(self.exprs(node)?),
            "tuple" | "expression_list" => Expr::Tuple(self.exprs(node)?),
            "set" => Expr::Set(self.exprs(node)?),
            "dictionary" => {
                let mut entries = Vec::new();
                for child in named_children(node) {
                    match child.kind() {
                        "pair" => entries.push(DictEntry::Pair(
                            self.expr(&self.field(&child, "key")?)?,
                            self.expr(&self.field(&child, "value")?)?,
                        )),
                        "dictionary_splat" => {
                            let inner = first_named(&child)
                                .ok_or_else(|| self.unsupported("dict splat", &child))?;
                            entries.push(DictEntry::Splat(self.expr(&inner)?));
                        }
                        _ => return Err(self.unsupported("dict entry", &child)),
                    }
                }
                Expr::Dict(entries)
            }
            "parenthesized_expression" => match first_named(node) {
                Some(inner) => self.expr(&inner)?,
                None => Expr::Tuple(Vec::new()),
            },
            "list_splat" => {
                let inner =
                    first_named(node).ok_or_else(|| self.unsupported("splat", node))?;
                Expr::Starred(Box::new(self.expr(&inner)?))
            }
            "binary_operator" => {
                let operator = self.text(&self.field(node, "operator")?);
                let op = BinOp::from_token(operator)
                    .ok_or_else(|| self.unsupported(&format!("operator '{}'", operator), node))?;
                Expr::BinOp {
                    left: Box::new(self.expr(&self.field(node, "left")?)?),
                    op,
                    right: Box::new(self.expr(&self.field(node, "right")?)?),
                }
            }
            "unary_operator" => {
                let op = match self.text(&self.field(node, "operator")?) {
                    "-" => UnaryOp::Neg,
                    "+" => UnaryOp::Pos,
                    "~" => UnaryOp::Invert,
                    other => {
                        return Err(self.unsupported(&format!("operator '{}'", other), node))
                    }
                };
                Expr::Unary {
                    op,
                    operand: Box::new(self.expr(&self.field(node, "argument")?)?),
                }
            }
            "not_operator" => Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.expr(&self.field(node, "argument")?)?),
            },
            "boolean_operator" => {
                let op = match self.text(&self.field(node, "operator")?) {
                    "and" => BoolOp::And,
                    _ => BoolOp::Or,
                };
                Expr::BoolOp {
                    op,
                    left: Box::new(self.expr(&self.field(node, "left")?)?),
                    right: Box::new(self.expr(&self.field(node, "right")?)?),
                }
            }
            "comparison_operator" => self.comparison(node)?,
            "conditional_expression" => {
                let parts = named_children(node);
                if parts.len() != 3 {
                    return Err(self.unsupported("conditional expression", node));
                }
                Expr::IfExp {
                    body: Box::new(self.expr(&parts[0])?),
                    cond: Box::new(self.expr(&parts[1])?),
                    orelse: Box::new(self.expr(&parts[2])?),
                }
            }
            "call" => self.call(node)?,
            "attribute" => Expr::Attribute {
                value: Box::new(self.expr(&self.field(node, "object")?)?),
                attr: self.text(&self.field(node, "attribute")?).to_string(),
            },
            "subscript" => Expr::Subscript {
                value: Box::new(self.expr(&self.field(node, "value")?)?),
                index: Box::new(self.subscript_index(node)?),
            },
            "slice" => self.slice(node)?,
            "list_comprehension" => {
                let body = self.expr(&self.field(node, "body")?)?;
                self.comprehension(node, CompKind::List(body))?
            }
            "generator_expression" => {
                let body = self.expr(&self.field(node, "body")?)?;
                self.comprehension(node, CompKind::List(body))?
            }
            "set_comprehension" => {
                let body = self.expr(&self.field(node, "body")?)?;
                self.comprehension(node, CompKind::Set(body))?
            }
            "dictionary_comprehension" => {
                let pair = self.field(node, "body")?;
                let key = self.expr(&self.field(&pair, "key")?)?;
                let value = self.expr(&self.field(&pair, "value")?)?;
                self.comprehension(node, CompKind::Dict(key, value))?
            }
            "lambda" => {
                let params = match node.child_by_field_name("parameters") {
                    Some(params) => self.params(&params)?,
                    None => Vec::new(),
                };
                let body = self.expr(&self.field(node, "body")?)?;
                Expr::Lambda(Arc::new(FunctionDef {
                    name: "<lambda>".to_string(),
                    params,
                    body: vec![Stmt::Return(Some(body))],
                }))
            }
            "await" => {
                let inner =
                    first_named(node).ok_or_else(|| self.unsupported("await", node))?;
                Expr::Await(Box::new(self.expr(&inner)?))
            }
            "named_expression" => return Err(self.unsupported("assignment expression", node)),
            "yield" => return Err(self.unsupported("yield", node)),
            other => return Err(self.unsupported(&format!("expression '{}'", other), node)),
        };
        Ok(expr)
    }

    fn exprs(&self, node: &Node) -> ScriptResult<Vec<Expr>> {
        named_children(node).iter().map(|c| self.expr(c)).collect()
    }

    fn integer(&self, node: &Node) -> ScriptResult<Expr> {
        let raw = self.text(node).replace('_', "").to_ascii_lowercase();
        let raw = raw.trim_end_matches('l');
        let parsed = if let Some(hex) = raw.strip_prefix("0x") {
            i64::from_str_radix(hex, 16)
        } else if let Some(oct) = raw.strip_prefix("0o") {
            i64::from_str_radix(oct, 8)
        } else if let Some(bin) = raw.strip_prefix("0b") {
            i64::from_str_radix(bin, 2)
        } else {
            raw.parse::<i64>()
        };
        match parsed {
            Ok(value) => Ok(Expr::Int(value)),
            Err(_) => Err(self.unsupported("integer literal", node)),
        }
    }

    fn comparison(&self, node: &Node) -> ScriptResult<Expr> {
        let mut left: Option<Expr> = None;
        let mut rest = Vec::new();
        let mut pending = String::new();
        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else { continue };
            if child.is_extra() {
                continue;
            }
            if child.is_named() {
                let operand = self.expr(&child)?;
                if left.is_none() {
                    left = Some(operand);
                } else {
                    let op = CmpOp::from_token(&pending).ok_or_else(|| {
                        self.unsupported(&format!("comparison '{}'", pending), node)
                    })?;
                    rest.push((op, operand));
                    pending.clear();
                }
            } else {
                if !pending.is_empty() {
                    pending.push(' ');
                }
                pending.push_str(child.kind());
            }
        }
        let left = left.ok_or_else(|| self.unsupported("comparison", node))?;
        Ok(Expr::Compare {
            left: Box::new(left),
            rest,
        })
    }

    fn call(&self, node: &Node) -> ScriptResult<Expr> {
        let func = self.expr(&self.field(node, "function")?)?;
        let arguments = self.field(node, "arguments")?;
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if arguments.kind() == "generator_expression" {
            args.push(self.expr(&arguments)?);
        } else {
            for arg in named_children(&arguments) {
                match arg.kind() {
                    "keyword_argument" => kwargs.push(Keyword::Named(
                        self.text(&self.field(&arg, "name")?).to_string(),
                        self.expr(&self.field(&arg, "value")?)?,
                    )),
                    "dictionary_splat" => {
                        let inner = first_named(&arg)
                            .ok_or_else(|| self.unsupported("keyword splat", &arg))?;
                        kwargs.push(Keyword::Splat(self.expr(&inner)?));
                    }
                    _ => args.push(self.expr(&arg)?),
                }
            }
        }
        Ok(Expr::Call(Call {
            func: Box::new(func),
            args,
            kwargs,
            suspend: false,
        }))
    }

    fn subscript_index(&self, node: &Node) -> ScriptResult<Expr> {
        let mut cursor = node.walk();
        let parts: Vec<Node> = node
            .children_by_field_name("subscript", &mut cursor)
            .collect();
        match parts.as_slice() {
            [] => Err(self.unsupported("subscript", node)),
            [single] => self.expr(single),
            many => Ok(Expr::Tuple(
                many.iter()
                    .map(|p| self.expr(p))
                    .collect::<ScriptResult<Vec<_>>>()?,
            )),
        }
    }

    fn slice(&self, node: &Node) -> ScriptResult<Expr> {
        let mut slots: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut slot = 0;
        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else { continue };
            if child.is_extra() {
                continue;
            }
            if child.is_named() {
                if slot < 3 {
                    slots[slot] = Some(Box::new(self.expr(&child)?));
                }
            } else if child.kind() == ":" {
                slot += 1;
            }
        }
        let [lower, upper, step] = slots;
        Ok(Expr::Slice { lower, upper, step })
    }

    fn comprehension(&self, node: &Node, kind: CompKind) -> ScriptResult<Expr> {
        let mut clauses = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "for_in_clause" => clauses.push(CompClause::For {
                    target: self.target(&self.field(&child, "left")?)?,
                    iter: self.expr(&self.field(&child, "right")?)?,
                }),
                "if_clause" => {
                    let cond = first_named(&child)
                        .ok_or_else(|| self.unsupported("comprehension filter", &child))?;
                    clauses.push(CompClause::If(self.expr(&cond)?));
                }
                _ => {}
            }
        }
        Ok(Expr::Comprehension(Box::new(Comprehension { kind, clauses })))
    }

    // ─────────────────────────────────────────────────────────────────────
    //  STRINGS
    // ─────────────────────────────────────────────────────────────────────

    fn string(&self, node: &Node) -> ScriptResult<Expr> {
        let mut raw = false;
        let mut formatted = false;
        let mut parts: Vec<FPart> = Vec::new();

        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else { continue };
            match child.kind() {
                "string_start" => {
                    let prefix: String = self
                        .text(&child)
                        .chars()
                        .take_while(|c| c.is_ascii_alphabetic())
                        .collect::<String>()
                        .to_ascii_lowercase();
                    raw = prefix.contains('r');
                    formatted = prefix.contains('f');
                }
                "string_content" | "escape_sequence" => {
                    let mut text = if raw {
                        self.text(&child).to_string()
                    } else {
                        unescape(self.text(&child))
                    };
                    if formatted {
                        text = text.replace("{{", "{").replace("}}", "}");
                    }
                    push_literal(&mut parts, text);
                }
                "escape_interpolation" => {
                    let brace = self.text(&child).chars().next().unwrap_or('{');
                    push_literal(&mut parts, brace.to_string());
                }
                "interpolation" => parts.push(self.interpolation(&child)?),
                _ => {}
            }
        }
        Ok(collapse_fstring(parts, formatted))
    }

    fn interpolation(&self, node: &Node) -> ScriptResult<FPart> {
        let expr_node = match node.child_by_field_name("expression") {
            Some(expr) => expr,
            None => named_children(node)
                .into_iter()
                .find(|c| !matches!(c.kind(), "type_conversion" | "format_specifier"))
                .ok_or_else(|| self.unsupported("f-string interpolation", node))?,
        };
        let conversion = find_kind(node, "type_conversion")
            .and_then(|c| self.text(&c).trim_start_matches('!').chars().next());
        let spec = find_kind(node, "format_specifier")
            .map(|s| self.text(&s).trim_start_matches(':').to_string());
        Ok(FPart::Expr {
            expr: self.expr(&expr_node)?,
            conversion,
            spec,
        })
    }
}

fn push_literal(parts: &mut Vec<FPart>, text: String) {
    if let Some(FPart::Lit(last)) = parts.last_mut() {
        last.push_str(&text);
    } else {
        parts.push(FPart::Lit(text));
    }
}

fn collapse_fstring(parts: Vec<FPart>, formatted: bool) -> Expr {
    if formatted {
        return Expr::FString(parts);
    }
    let mut out = String::new();
    for part in parts {
        if let FPart::Lit(text) = part {
            out.push_str(&text);
        }
    }
    Expr::Str(out)
}

fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| !c.is_extra())
        .collect()
}

fn first_named<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    named_children(node).into_iter().next()
}

fn find_kind<'t>(node: &Node<'t>, kind: &str) -> Option<Node<'t>> {
    named_children(node).into_iter().find(|c| c.kind() == kind)
}

/// Decode backslash escapes in a non-raw string literal body.
fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\n' => {}
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push(next);
                        out.push_str(&digits);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Stmt {
        let mut stmts = parse_source(src).unwrap();
        assert_eq!(stmts.len(), 1, "expected a single statement in {src:?}");
        stmts.remove(0)
    }

    #[test]
    fn test_assignment_with_call() {
        let stmt = parse_one("result = search(\"x\")");
        let Stmt::Assign { targets, value } = stmt else {
            panic!("expected assignment");
        };
        assert_eq!(targets, vec![Target::Name("result".to_string())]);
        let Expr::Call(call) = value else {
            panic!("expected call");
        };
        assert_eq!(*call.func, Expr::Name("search".to_string()));
        assert_eq!(call.args, vec![Expr::Str("x".to_string())]);
        assert!(!call.suspend);
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = parse_source("x = 1\ny = (2 +\n").unwrap_err();
        assert_eq!(err.kind, super::super::error::ErrorKind::SyntaxError);
        assert!(err.message.contains("line"), "{}", err.message);
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let long_chain = format!("x = {}1", "1 + ".repeat(300));
        let err = parse_source(&long_chain).unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: too many nested expressions (line 1)");

        let parens = format!("x = {}1{}", "(".repeat(500), ")".repeat(500));
        assert!(parse_source(&parens).is_err());

        let short_chain = format!("x = {}1", "1 + ".repeat(40));
        assert!(parse_source(&short_chain).is_ok());
    }

    #[test]
    fn test_fstring_parts() {
        let stmt = parse_one("msg = f\"hi {name!r:>5} {{ok}}\"");
        let Stmt::Assign { value, .. } = stmt else {
            panic!("expected assignment");
        };
        let Expr::FString(parts) = value else {
            panic!("expected f-string, got {value:?}");
        };
        assert_eq!(parts[0], FPart::Lit("hi ".to_string()));
        assert_eq!(
            parts[1],
            FPart::Expr {
                expr: Expr::Name("name".to_string()),
                conversion: Some('r'),
                spec: Some(">5".to_string()),
            }
        );
        assert_eq!(parts[2], FPart::Lit(" {ok}".to_string()));
    }

    #[test]
    fn test_escapes_decoded() {
        let stmt = parse_one("s = 'a\\tb\\n'");
        let Stmt::Assign { value, .. } = stmt else {
            panic!("expected assignment");
        };
        assert_eq!(value, Expr::Str("a\tb\n".to_string()));
    }

    #[test]
    fn test_chained_comparison_and_not_in() {
        let stmt = parse_one("ok = 1 < x <= 3 and y not in z");
        let Stmt::Assign { value, .. } = stmt else {
            panic!("expected assignment");
        };
        let Expr::BoolOp { left, right, .. } = value else {
            panic!("expected boolean operator");
        };
        let Expr::Compare { rest, .. } = *left else {
            panic!("expected comparison");
        };
        assert_eq!(rest.len(), 2);
        let Expr::Compare { rest, .. } = *right else {
            panic!("expected comparison");
        };
        assert_eq!(rest[0].0, CmpOp::NotIn);
    }

    #[test]
    fn test_try_except_alias() {
        let stmt = parse_one("try:\n    x = 1\nexcept ValueError as e:\n    x = 2\n");
        let Stmt::Try { handlers, .. } = stmt else {
            panic!("expected try");
        };
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].alias.as_deref(), Some("e"));
        assert_eq!(handlers[0].kind, Some(Expr::Name("ValueError".to_string())));
    }

    #[test]
    fn test_class_definition_rejected() {
        let err = parse_source("class Foo:\n    pass\n").unwrap_err();
        assert!(err.message.contains("unsupported class"), "{}", err.message);
    }

    #[test]
    fn test_from_import_paths() {
        let stmt = parse_one("from pathlib import Path as P");
        assert_eq!(
            stmt,
            Stmt::Import(vec![ImportItem {
                path: "pathlib.Path".to_string(),
                bind: "P".to_string(),
            }])
        );
    }
}
