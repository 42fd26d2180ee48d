//! Allow-listed callables.
//!
//! Everything a variant can call without importing lives here. `print` and
//! the `key=` forms of `sorted`/`min`/`max` need the interpreter and are
//! handled there before falling through to [`call`].

use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::ops;
use super::stdlib;
use super::value::{Dict, Num, Value};
use std::cmp::Ordering;

/// Largest `range()` the engine will materialize.
const MAX_RANGE_LEN: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Len,
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Tuple,
    Set,
    Enumerate,
    Range,
    Zip,
    Print,
    Type,
    Isinstance,
    Min,
    Max,
    Sum,
    Sorted,
    Reversed,
    Abs,
    Round,
    Any,
    All,
    Repr,
    Open,
    Path,
    JsonDumps,
    JsonLoads,
    JsonDump,
    JsonLoad,
    OsListdir,
    OsMakedirs,
    OsGetcwd,
    OsPathJoin,
    OsPathExists,
    OsPathBasename,
    OsPathDirname,
    OsPathIsfile,
    OsPathIsdir,
}

/// Names bound in every execution context, in addition to exception kinds.
pub const ALLOW_LIST: &[(&str, Builtin)] = &[
    ("len", Builtin::Len),
    ("str", Builtin::Str),
    ("int", Builtin::Int),
    ("float", Builtin::Float),
    ("bool", Builtin::Bool),
    ("list", Builtin::List),
    ("dict", Builtin::Dict),
    ("tuple", Builtin::Tuple),
    ("set", Builtin::Set),
    ("enumerate", Builtin::Enumerate),
    ("range", Builtin::Range),
    ("zip", Builtin::Zip),
    ("print", Builtin::Print),
    ("type", Builtin::Type),
    ("isinstance", Builtin::Isinstance),
    ("min", Builtin::Min),
    ("max", Builtin::Max),
    ("sum", Builtin::Sum),
    ("sorted", Builtin::Sorted),
    ("reversed", Builtin::Reversed),
    ("abs", Builtin::Abs),
    ("round", Builtin::Round),
    ("any", Builtin::Any),
    ("all", Builtin::All),
    ("repr", Builtin::Repr),
    ("open", Builtin::Open),
    ("Path", Builtin::Path),
];

/// Exception kinds a variant can raise or catch by name.
pub const EXCEPTION_KINDS: &[ErrorKind] = &[
    ErrorKind::Exception,
    ErrorKind::ValueError,
    ErrorKind::TypeError,
    ErrorKind::KeyError,
    ErrorKind::IndexError,
    ErrorKind::FileNotFoundError,
    ErrorKind::ZeroDivisionError,
    ErrorKind::AttributeError,
    ErrorKind::RuntimeError,
    ErrorKind::AssertionError,
];

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::List => "list",
            Builtin::Dict => "dict",
            Builtin::Tuple => "tuple",
            Builtin::Set => "set",
            Builtin::Enumerate => "enumerate",
            Builtin::Range => "range",
            Builtin::Zip => "zip",
            Builtin::Print => "print",
            Builtin::Type => "type",
            Builtin::Isinstance => "isinstance",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Sorted => "sorted",
            Builtin::Reversed => "reversed",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::Repr => "repr",
            Builtin::Open => "open",
            Builtin::Path => "Path",
            Builtin::JsonDumps => "dumps",
            Builtin::JsonLoads => "loads",
            Builtin::JsonDump => "dump",
            Builtin::JsonLoad => "load",
            Builtin::OsListdir => "listdir",
            Builtin::OsMakedirs => "makedirs",
            Builtin::OsGetcwd => "getcwd",
            Builtin::OsPathJoin => "join",
            Builtin::OsPathExists => "exists",
            Builtin::OsPathBasename => "basename",
            Builtin::OsPathDirname => "dirname",
            Builtin::OsPathIsfile => "isfile",
            Builtin::OsPathIsdir => "isdir",
        }
    }

    /// Builtins that double as type objects for `type()` and `isinstance()`.
    fn of_value(value: &Value) -> Option<Builtin> {
        Some(match value {
            Value::Bool(_) => Builtin::Bool,
            Value::Int(_) => Builtin::Int,
            Value::Float(_) => Builtin::Float,
            Value::Str(_) => Builtin::Str,
            Value::List(_) => Builtin::List,
            Value::Dict(_) => Builtin::Dict,
            Value::Tuple(_) => Builtin::Tuple,
            Value::Set(_) => Builtin::Set,
            Value::Path(_) => Builtin::Path,
            _ => return None,
        })
    }
}

/// Evaluated call arguments.
#[derive(Debug, Default, Clone)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keywords: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Positional argument `index`, falling back to keyword `name`.
    pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keyword(name))
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let pos = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(pos).1)
    }

    pub fn expect_range(&self, func: &str, min: usize, max: usize) -> ScriptResult<()> {
        let n = self.positional.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("exactly {}", min)
            } else if n < min {
                format!("at least {}", min)
            } else {
                format!("at most {}", max)
            };
            return Err(ScriptError::type_error(format!(
                "{}() takes {} argument{} ({} given)",
                func,
                expected,
                if min == max && min == 1 { "" } else { "s" },
                n
            )));
        }
        Ok(())
    }

    pub fn required(&self, index: usize, name: &str, func: &str) -> ScriptResult<&Value> {
        self.arg(index, name).ok_or_else(|| {
            ScriptError::type_error(format!(
                "{}() missing required argument: '{}'",
                func, name
            ))
        })
    }

    pub fn reject_keywords(&self, func: &str) -> ScriptResult<()> {
        match self.keywords.first() {
            Some((k, _)) => Err(ScriptError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                func, k
            ))),
            None => Ok(()),
        }
    }
}

pub fn call(builtin: Builtin, args: CallArgs) -> ScriptResult<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Len => {
            args.expect_range(name, 1, 1)?;
            let n = match &args.positional[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) | Value::Tuple(items) | Value::Set(items) => items.len(),
                Value::Dict(d) => d.len(),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(n as i64))
        }
        Builtin::Str => Ok(Value::Str(
            args.get(0).map(Value::to_display).unwrap_or_default(),
        )),
        Builtin::Repr => {
            args.expect_range(name, 1, 1)?;
            Ok(Value::Str(args.positional[0].repr()))
        }
        Builtin::Int => to_int(&args),
        Builtin::Float => to_float(args.get(0)),
        Builtin::Bool => Ok(Value::Bool(args.get(0).map(Value::truthy).unwrap_or(false))),
        Builtin::List => Ok(Value::List(iterate_opt(args.get(0))?)),
        Builtin::Tuple => Ok(Value::Tuple(iterate_opt(args.get(0))?)),
        Builtin::Set => Ok(Value::Set(dedupe(iterate_opt(args.get(0))?)?)),
        Builtin::Dict => to_dict(args),
        Builtin::Enumerate => {
            args.expect_range(name, 1, 2)?;
            let start = match args.arg(1, "start") {
                Some(v) => int_arg(v, name)?,
                None => 0,
            };
            let items = args.positional[0].iterate()?;
            Ok(Value::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::Tuple(vec![Value::Int(start + i as i64), v]))
                    .collect(),
            ))
        }
        Builtin::Range => range(&args),
        Builtin::Zip => {
            let columns = args
                .positional
                .iter()
                .map(Value::iterate)
                .collect::<ScriptResult<Vec<_>>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::List(
                (0..len)
                    .map(|i| Value::Tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            ))
        }
        Builtin::Type => {
            args.expect_range(name, 1, 1)?;
            let value = &args.positional[0];
            Ok(match (value, Builtin::of_value(value)) {
                (Value::Exception(err), _) => Value::ExceptionType(err.kind),
                (_, Some(b)) => Value::Builtin(b),
                (other, None) => Value::Str(other.type_name()),
            })
        }
        Builtin::Isinstance => {
            args.expect_range(name, 2, 2)?;
            Ok(Value::Bool(isinstance(&args.positional[0], &args.positional[1])?))
        }
        Builtin::Min | Builtin::Max => {
            let items = extremum_candidates(&args, name)?;
            let keys = items.clone();
            pick_extremum(builtin, items, keys, args.keyword("default").cloned())
        }
        Builtin::Sum => {
            args.expect_range(name, 1, 2)?;
            let mut total = args.arg(1, "start").cloned().unwrap_or(Value::Int(0));
            for item in args.positional[0].iterate()? {
                total = ops::binary(super::ast::BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Sorted => {
            args.expect_range(name, 1, 1)?;
            let reverse = args.keyword("reverse").map(Value::truthy).unwrap_or(false);
            let items = args.positional[0].iterate()?;
            let keys = items.clone();
            Ok(Value::List(sort_by_keys(items, keys, reverse)?))
        }
        Builtin::Reversed => {
            args.expect_range(name, 1, 1)?;
            let mut items = args.positional[0].iterate()?;
            items.reverse();
            Ok(Value::List(items))
        }
        Builtin::Abs => {
            args.expect_range(name, 1, 1)?;
            match args.positional[0].as_number() {
                Some(Num::Int(i)) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ScriptError::new(ErrorKind::ValueError, "integer overflow")),
                Some(Num::Float(f)) => Ok(Value::Float(f.abs())),
                None => Err(ScriptError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    args.positional[0].type_name()
                ))),
            }
        }
        Builtin::Round => round(&args),
        Builtin::Any => {
            args.expect_range(name, 1, 1)?;
            Ok(Value::Bool(args.positional[0].iterate()?.iter().any(Value::truthy)))
        }
        Builtin::All => {
            args.expect_range(name, 1, 1)?;
            Ok(Value::Bool(args.positional[0].iterate()?.iter().all(Value::truthy)))
        }
        Builtin::Print => Err(ScriptError::new(
            ErrorKind::RuntimeError,
            "print() is only available inside a running variant",
        )),
        Builtin::Open
        | Builtin::Path
        | Builtin::JsonDumps
        | Builtin::JsonLoads
        | Builtin::JsonDump
        | Builtin::JsonLoad
        | Builtin::OsListdir
        | Builtin::OsMakedirs
        | Builtin::OsGetcwd
        | Builtin::OsPathJoin
        | Builtin::OsPathExists
        | Builtin::OsPathBasename
        | Builtin::OsPathDirname
        | Builtin::OsPathIsfile
        | Builtin::OsPathIsdir => stdlib::call(builtin, args),
    }
}

fn iterate_opt(value: Option<&Value>) -> ScriptResult<Vec<Value>> {
    match value {
        Some(v) => v.iterate(),
        None => Ok(Vec::new()),
    }
}

pub fn dedupe(items: Vec<Value>) -> ScriptResult<Vec<Value>> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        item.ensure_hashable()?;
        if !out.iter().any(|x| x.py_eq(&item)) {
            out.push(item);
        }
    }
    Ok(out)
}

pub fn int_arg(value: &Value, func: &str) -> ScriptResult<i64> {
    value.as_int().ok_or_else(|| {
        ScriptError::type_error(format!(
            "{}() expected an integer, got '{}'",
            func,
            value.type_name()
        ))
    })
}

fn to_int(args: &CallArgs) -> ScriptResult<Value> {
    args.expect_range("int", 0, 2)?;
    let Some(value) = args.get(0) else {
        return Ok(Value::Int(0));
    };
    if let Some(base) = args.arg(1, "base") {
        let base = int_arg(base, "int")? as u32;
        let text = value
            .as_str()
            .ok_or_else(|| ScriptError::type_error("int() can't convert non-string with explicit base"))?;
        let digits = text.trim();
        let digits = match base {
            16 => digits.trim_start_matches("0x").trim_start_matches("0X"),
            8 => digits.trim_start_matches("0o").trim_start_matches("0O"),
            2 => digits.trim_start_matches("0b").trim_start_matches("0B"),
            _ => digits,
        };
        return i64::from_str_radix(digits, base).map(Value::Int).map_err(|_| {
            ScriptError::value_error(format!(
                "invalid literal for int() with base {}: {}",
                base,
                value.repr()
            ))
        });
    }
    match value {
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Float(_) => Err(ScriptError::value_error(
            "cannot convert float infinity or NaN to integer",
        )),
        Value::Str(s) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
            ScriptError::value_error(format!(
                "invalid literal for int() with base 10: {}",
                value.repr()
            ))
        }),
        other => Err(ScriptError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: Option<&Value>) -> ScriptResult<Value> {
    let Some(value) = value else {
        return Ok(Value::Float(0.0));
    };
    if let Some(n) = value.as_number() {
        return Ok(Value::Float(n.as_f64()));
    }
    match value {
        Value::Str(s) => {
            let text = s.trim().to_ascii_lowercase();
            let parsed = match text.as_str() {
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                "nan" => Some(f64::NAN),
                _ => text.parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                ScriptError::value_error(format!(
                    "could not convert string to float: {}",
                    value.repr()
                ))
            })
        }
        other => Err(ScriptError::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_dict(args: CallArgs) -> ScriptResult<Value> {
    args.expect_range("dict", 0, 1)?;
    let mut dict = match args.get(0) {
        None => Dict::new(),
        Some(Value::Dict(d)) => d.clone(),
        Some(other) => {
            let mut dict = Dict::new();
            for pair in other.iterate()? {
                let items = pair.iterate()?;
                if items.len() != 2 {
                    return Err(ScriptError::value_error(format!(
                        "dictionary update sequence element has length {}; 2 is required",
                        items.len()
                    )));
                }
                let mut items = items.into_iter();
                if let (Some(k), Some(v)) = (items.next(), items.next()) {
                    dict.insert(k, v)?;
                }
            }
            dict
        }
    };
    for (k, v) in args.keywords {
        dict.insert(Value::Str(k), v)?;
    }
    Ok(Value::Dict(dict))
}

fn range(args: &CallArgs) -> ScriptResult<Value> {
    args.reject_keywords("range")?;
    args.expect_range("range", 1, 3)?;
    let ints = args
        .positional
        .iter()
        .map(|v| int_arg(v, "range"))
        .collect::<ScriptResult<Vec<_>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => unreachable!("arity checked above"),
    };
    if step == 0 {
        return Err(ScriptError::value_error("range() arg 3 must not be zero"));
    }
    let len = if step > 0 {
        (stop - start + step - 1).max(0) / step
    } else {
        (start - stop - step - 1).max(0) / -step
    };
    if len > MAX_RANGE_LEN {
        return Err(ScriptError::new(
            ErrorKind::RuntimeError,
            format!("range of {} elements exceeds the engine limit", len),
        ));
    }
    Ok(Value::List(
        (0..len).map(|i| Value::Int(start + i * step)).collect(),
    ))
}

fn round(args: &CallArgs) -> ScriptResult<Value> {
    args.expect_range("round", 1, 2)?;
    let value = &args.positional[0];
    let ndigits = match args.arg(1, "ndigits") {
        None | Some(Value::None) => None,
        Some(v) => Some(int_arg(v, "round")?),
    };
    match (value.as_number(), ndigits) {
        (Some(Num::Int(i)), _) => Ok(Value::Int(i)),
        (Some(Num::Float(f)), None) => {
            if !f.is_finite() {
                return Err(ScriptError::value_error("cannot round infinity or NaN"));
            }
            Ok(Value::Int(f.round_ties_even() as i64))
        }
        (Some(Num::Float(f)), Some(n)) => {
            let scale = 10f64.powi(n as i32);
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (None, _) => Err(ScriptError::type_error(format!(
            "type {} doesn't define __round__ method",
            value.type_name()
        ))),
    }
}

fn isinstance(value: &Value, class: &Value) -> ScriptResult<bool> {
    match class {
        Value::Tuple(options) => {
            for option in options {
                if isinstance(value, option)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Builtin(b) => Ok(match (b, value) {
            (Builtin::Int, Value::Bool(_)) => true,
            _ => Builtin::of_value(value) == Some(*b),
        }),
        Value::ExceptionType(kind) => Ok(match value {
            Value::Exception(err) => err.kind.is_a(*kind),
            _ => false,
        }),
        other => Err(ScriptError::type_error(format!(
            "isinstance() arg 2 must be a type or tuple of types, not {}",
            other.type_name()
        ))),
    }
}

/// Candidate values for `min`/`max`: one iterable or several positionals.
pub fn extremum_candidates(args: &CallArgs, func: &str) -> ScriptResult<Vec<Value>> {
    match args.positional.as_slice() {
        [] => Err(ScriptError::type_error(format!(
            "{} expected at least 1 argument, got 0",
            func
        ))),
        [single] => single.iterate(),
        many => Ok(many.to_vec()),
    }
}

/// Pick the smallest (`Min`) or largest (`Max`) item by its key.
pub fn pick_extremum(
    builtin: Builtin,
    items: Vec<Value>,
    keys: Vec<Value>,
    default: Option<Value>,
) -> ScriptResult<Value> {
    let mut best: Option<usize> = None;
    for i in 0..items.len() {
        let better = match best {
            None => true,
            Some(b) => {
                let ord = ops::compare(&keys[i], &keys[b])?;
                if builtin == Builtin::Max {
                    ord == Ordering::Greater
                } else {
                    ord == Ordering::Less
                }
            }
        };
        if better {
            best = Some(i);
        }
    }
    match best {
        Some(i) => Ok(items[i].clone()),
        None => default.ok_or_else(|| {
            ScriptError::value_error(format!("{}() arg is an empty sequence", builtin.name()))
        }),
    }
}

/// Stable sort of `items` ordered by the parallel `keys`.
pub fn sort_by_keys(items: Vec<Value>, keys: Vec<Value>, reverse: bool) -> ScriptResult<Vec<Value>> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    let mut failure = None;
    order.sort_by(|&a, &b| {
        let (x, y) = if reverse { (&keys[b], &keys[a]) } else { (&keys[a], &keys[b]) };
        match ops::compare(x, y) {
            Ok(ord) => ord,
            Err(err) => {
                failure.get_or_insert(err);
                Ordering::Equal
            }
        }
    });
    if let Some(err) = failure {
        return Err(err);
    }
    let mut slots: Vec<Option<Value>> = items.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_with(builtin: Builtin, values: Vec<Value>) -> ScriptResult<Value> {
        call(builtin, CallArgs::positional(values))
    }

    #[test]
    fn test_range_forms() {
        let out = call_with(Builtin::Range, vec![Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap();
        assert_eq!(out.repr(), "[5, 3, 1]");
        assert_eq!(call_with(Builtin::Range, vec![Value::Int(3)]).unwrap().repr(), "[0, 1, 2]");
        assert_eq!(call_with(Builtin::Range, vec![Value::Int(-1)]).unwrap().repr(), "[]");
    }

    #[test]
    fn test_round_is_bankers() {
        assert_eq!(call_with(Builtin::Round, vec![Value::Float(2.5)]).unwrap().repr(), "2");
        assert_eq!(call_with(Builtin::Round, vec![Value::Float(3.5)]).unwrap().repr(), "4");
        assert_eq!(
            call_with(Builtin::Round, vec![Value::Float(3.14159), Value::Int(2)]).unwrap().repr(),
            "3.14"
        );
    }

    #[test]
    fn test_int_parsing_errors_are_value_errors() {
        let err = call_with(Builtin::Int, vec![Value::str("abc")]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: invalid literal for int() with base 10: 'abc'");
        assert_eq!(call_with(Builtin::Int, vec![Value::str(" 42 ")]).unwrap().repr(), "42");
    }

    #[test]
    fn test_isinstance_treats_bool_as_int() {
        let out = call_with(
            Builtin::Isinstance,
            vec![Value::Bool(true), Value::Builtin(Builtin::Int)],
        )
        .unwrap();
        assert!(out.truthy());
        let out = call_with(
            Builtin::Isinstance,
            vec![
                Value::str("x"),
                Value::Tuple(vec![Value::Builtin(Builtin::Int), Value::Builtin(Builtin::Float)]),
            ],
        )
        .unwrap();
        assert!(!out.truthy());
    }

    #[test]
    fn test_sorted_is_stable_and_reports_mixed_types() {
        let mut args = CallArgs::positional(vec![Value::List(vec![
            Value::Int(3),
            Value::Float(1.5),
            Value::Int(2),
        ])]);
        args.keywords.push(("reverse".into(), Value::Bool(true)));
        assert_eq!(call(Builtin::Sorted, args).unwrap().repr(), "[3, 2, 1.5]");

        let err = call_with(
            Builtin::Sorted,
            vec![Value::List(vec![Value::Int(1), Value::str("a")])],
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn test_min_max_and_empty_default() {
        let items = vec![Value::List(vec![Value::Int(4), Value::Int(9), Value::Int(1)])];
        assert_eq!(call_with(Builtin::Max, items.clone()).unwrap().repr(), "9");
        assert_eq!(call_with(Builtin::Min, items).unwrap().repr(), "1");
        let err = call_with(Builtin::Max, vec![Value::List(vec![])]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
    }

    #[test]
    fn test_dict_from_pairs_and_keywords() {
        let mut args = CallArgs::positional(vec![Value::List(vec![Value::Tuple(vec![
            Value::str("a"),
            Value::Int(1),
        ])])]);
        args.keywords.push(("b".into(), Value::Int(2)));
        assert_eq!(call(Builtin::Dict, args).unwrap().repr(), "{'a': 1, 'b': 2}");
    }
}
