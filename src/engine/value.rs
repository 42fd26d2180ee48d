//! Runtime values seen by variant code.
//!
//! Values are plain owned data. Containers are copied on read, and mutating
//! methods write the updated container back to the location they were called
//! on, so aliases never observe each other's mutations.

use super::ast::FunctionDef;
use super::builtins::Builtin;
use super::error::{ErrorKind, ScriptError, ScriptResult};
use serde_json::{Map, Number};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Set(Vec<Value>),
    Dict(Dict),
    Function(Arc<Closure>),
    Builtin(Builtin),
    /// Invocation proxy for the named tool operation.
    Proxy(String),
    /// A proxy invocation that was created but never suspended on.
    Pending(Arc<PendingCall>),
    ExceptionType(ErrorKind),
    Exception(ScriptError),
    Module(Module),
    Path(PathBuf),
    File(FileHandle),
}

/// User function plus the enclosing locals it was created in.
#[derive(Debug)]
pub struct Closure {
    pub def: Arc<FunctionDef>,
    pub defaults: Vec<Option<Value>>,
    pub captured: Vec<(String, Value)>,
}

#[derive(Debug)]
pub struct PendingCall {
    pub operation: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Json,
    Os,
    OsPath,
    Pathlib,
}

impl Module {
    pub fn name(&self) -> &'static str {
        match self {
            Module::Json => "json",
            Module::Os => "os",
            Module::OsPath => "os.path",
            Module::Pathlib => "pathlib",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileHandle {
    pub path: PathBuf,
    pub mode: FileMode,
}

/// Insertion-ordered mapping with value-equality keys.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.py_eq(key))
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: Value, value: Value) -> ScriptResult<()> {
        key.ensure_hashable()?;
        match self.entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k.py_eq(key))?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }

    pub fn from_str_map(map: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: map.into_iter().map(|(k, v)| (Value::Str(k), v)).collect(),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn type_name(&self) -> String {
        let name = match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Proxy(_) => "tool_proxy",
            Value::Pending(_) => "coroutine",
            Value::ExceptionType(_) => "type",
            Value::Exception(err) => return err.kind.as_str().to_string(),
            Value::Module(_) => "module",
            Value::Path(_) => "Path",
            Value::File(_) => "TextIOWrapper",
        };
        name.to_string()
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => !items.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            _ => true,
        }
    }

    /// Numeric view used by arithmetic and comparisons; bools count as ints.
    pub fn as_number(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn ensure_hashable(&self) -> ScriptResult<()> {
        match self {
            Value::List(_) | Value::Dict(_) | Value::Set(_) => Err(ScriptError::type_error(
                format!("unhashable type: '{}'", self.type_name()),
            )),
            Value::Tuple(items) => items.iter().try_for_each(Value::ensure_hashable),
            _ => Ok(()),
        }
    }

    pub fn py_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return match (a, b) {
                (Num::Int(x), Num::Int(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            };
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
            }
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.py_eq(y)))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.py_eq(w)).unwrap_or(false))
            }
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Proxy(a), Value::Proxy(b)) => a == b,
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::Path(a), Value::Path(b)) => a == b,
            (Value::File(a), Value::File(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Pending(a), Value::Pending(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Identity as far as value semantics allow: singletons and equal scalars.
    pub fn py_is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(_), Value::Int(_)) | (Value::Str(_), Value::Str(_)) => self.py_eq(other),
            (Value::List(_), _) | (Value::Dict(_), _) | (Value::Set(_), _) => false,
            _ => self.py_eq(other),
        }
    }

    /// Elements produced by iterating this value.
    pub fn iterate(&self) -> ScriptResult<Vec<Value>> {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.clone()),
            Value::Dict(d) => Ok(d.keys().cloned().collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::File(handle) => super::stdlib::read_lines(handle),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    //  TEXT
    // ─────────────────────────────────────────────────────────────────────

    /// `str(value)`
    pub fn to_display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Exception(err) => err.message.clone(),
            Value::Path(p) => p.display().to_string(),
            other => other.repr(),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => quote_str(s),
            Value::List(items) => format!("[{}]", join_repr(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_repr(items)),
            Value::Set(items) if items.is_empty() => "set()".to_string(),
            Value::Set(items) => format!("{{{}}}", join_repr(items)),
            Value::Dict(d) => {
                let body = d
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", body)
            }
            Value::Function(f) => format!("<function {}>", f.def.name),
            Value::Builtin(b) => format!("<built-in function {}>", b.name()),
            Value::Proxy(name) => format!("<tool proxy {}>", name),
            Value::Pending(call) => format!("<pending invocation {}>", call.operation),
            Value::ExceptionType(kind) => format!("<class '{}'>", kind),
            Value::Exception(err) => format!("{}({})", err.kind, quote_str(&err.message)),
            Value::Module(m) => format!("<module '{}'>", m.name()),
            Value::Path(p) => format!("Path({})", quote_str(&p.display().to_string())),
            Value::File(f) => format!("<file {}>", quote_str(&f.path.display().to_string())),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    //  JSON BRIDGE
    // ─────────────────────────────────────────────────────────────────────

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Dict(Dict::from_str_map(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))),
            )),
        }
    }

    /// Lossy conversion for reporting and for tool arguments.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Dict(d) => {
                let mut map = Map::new();
                for (k, v) in d.iter() {
                    map.insert(k.to_display(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::Exception(err) => serde_json::Value::String(err.to_string()),
            Value::Path(p) => serde_json::Value::String(p.display().to_string()),
            other => serde_json::Value::String(other.repr()),
        }
    }
}

/// Int-or-float view of a numeric value.
#[derive(Debug, Clone, Copy)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn as_f64(&self) -> f64 {
        match self {
            Num::Int(i) => *i as f64,
            Num::Float(f) => *f,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Num::Int(_))
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let formatted = format!("{:e}", f);
        if let Some((mantissa, exp)) = formatted.split_once('e') {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            return format!("{}e{}{:02}", mantissa, sign, exp.abs());
        }
        return formatted;
    }
    if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_float_formatting_matches_script_conventions() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
    }

    #[test]
    fn test_int_and_float_compare_equal() {
        assert!(Value::Int(2).py_eq(&Value::Float(2.0)));
        assert!(!Value::Int(2).py_eq(&Value::Str("2".into())));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
    }

    #[test]
    fn test_json_bridge_keeps_structure() {
        let json = json!({"name": "x", "items": [1, 2.5, null, true]});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
        assert_eq!(
            value.repr(),
            "{'items': [1, 2.5, None, True], 'name': 'x'}"
        );
    }

    #[test]
    fn test_dict_rejects_unhashable_keys() {
        let mut d = Dict::new();
        let err = d.insert(Value::List(vec![]), Value::None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn test_repr_quotes() {
        assert_eq!(Value::str("it's").repr(), "\"it's\"");
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).repr(), "(1,)");
    }
}
