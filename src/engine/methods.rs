//! Attribute access and methods on built-in types.
//!
//! Methods return the call result plus, for mutating methods, the updated
//! receiver. The interpreter stores that back into the location the receiver
//! was read from.

use super::builtins::{dedupe, int_arg, sort_by_keys, CallArgs};
use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::format::format_template;
use super::stdlib::{self, no_attribute};
use super::value::{Dict, Value};

/// Call result and the receiver after mutation, if it changed.
pub type MethodOutcome = (Value, Option<Value>);

pub fn get_attribute(value: &Value, attr: &str) -> ScriptResult<Value> {
    match (value, attr) {
        (Value::Module(m), _) => stdlib::module_attr(*m, attr),
        (Value::Path(p), _) => stdlib::path_attr(p, attr),
        (Value::Exception(err), "args") => Ok(Value::Tuple(vec![Value::Str(err.message.clone())])),
        (Value::Builtin(b), "__name__") => Ok(Value::str(b.name())),
        (Value::ExceptionType(kind), "__name__") => Ok(Value::str(kind.as_str())),
        (Value::Function(f), "__name__") => Ok(Value::Str(f.def.name.clone())),
        (Value::File(f), "name") => Ok(Value::Str(f.path.display().to_string())),
        _ => Err(no_attribute(&value.type_name(), attr)),
    }
}

pub fn call_method(receiver: &Value, name: &str, args: CallArgs) -> ScriptResult<MethodOutcome> {
    match receiver {
        Value::Str(s) => str_method(s, name, args).map(|v| (v, None)),
        Value::List(items) => list_method(items, name, args),
        Value::Dict(d) => dict_method(d, name, args),
        Value::Set(items) => set_method(items, name, args),
        Value::Tuple(items) => sequence_query(items, "tuple", name, &args).map(|v| (v, None)),
        Value::Path(p) => stdlib::path_method(p, name, &args).map(|v| (v, None)),
        Value::File(f) => stdlib::file_method(f, name, &args).map(|v| (v, None)),
        other => Err(no_attribute(&other.type_name(), name)),
    }
}

fn str_arg<'a>(args: &'a CallArgs, index: usize, name: &str, func: &str) -> ScriptResult<&'a str> {
    match args.required(index, name, func)? {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::type_error(format!(
            "{}() argument must be str, not {}",
            func,
            other.type_name()
        ))),
    }
}

/// Optional `chars` argument of the strip family.
fn strip_set(args: &CallArgs) -> ScriptResult<Option<Vec<char>>> {
    match args.get(0) {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.chars().collect())),
        Some(other) => Err(ScriptError::type_error(format!(
            "strip arg must be None or str, not {}",
            other.type_name()
        ))),
    }
}

fn affix_matches(s: &str, arg: &Value, prefix: bool) -> ScriptResult<bool> {
    match arg {
        Value::Str(p) => Ok(if prefix { s.starts_with(p.as_str()) } else { s.ends_with(p.as_str()) }),
        Value::Tuple(options) => {
            for option in options {
                if affix_matches(s, option, prefix)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(ScriptError::type_error(format!(
            "expected str or a tuple of str, not {}",
            other.type_name()
        ))),
    }
}

fn str_method(s: &str, name: &str, args: CallArgs) -> ScriptResult<Value> {
    let text = |v: String| -> ScriptResult<Value> { Ok(Value::Str(v)) };
    match name {
        "upper" => text(s.to_uppercase()),
        "lower" => text(s.to_lowercase()),
        "strip" | "lstrip" | "rstrip" => {
            let set = strip_set(&args)?;
            let is_strip = |c: char| match &set {
                Some(chars) => chars.contains(&c),
                None => c.is_whitespace(),
            };
            text(match name {
                "lstrip" => s.trim_start_matches(is_strip).to_string(),
                "rstrip" => s.trim_end_matches(is_strip).to_string(),
                _ => s.trim_matches(is_strip).to_string(),
            })
        }
        "split" | "rsplit" => {
            let sep = match args.arg(0, "sep") {
                None | Some(Value::None) => None,
                Some(Value::Str(sep)) if sep.is_empty() => {
                    return Err(ScriptError::value_error("empty separator"))
                }
                Some(Value::Str(sep)) => Some(sep.clone()),
                Some(other) => {
                    return Err(ScriptError::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )))
                }
            };
            let max = match args.arg(1, "maxsplit") {
                Some(v) => int_arg(v, name)?,
                None => -1,
            };
            Ok(Value::List(
                split(s, sep.as_deref(), max, name == "rsplit")
                    .into_iter()
                    .map(Value::Str)
                    .collect(),
            ))
        }
        "splitlines" => Ok(Value::List(s.lines().map(Value::str).collect())),
        "join" => {
            args.expect_range("join", 1, 1)?;
            let mut parts = Vec::new();
            for item in args.positional[0].iterate()? {
                match item {
                    Value::Str(part) => parts.push(part),
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            parts.len(),
                            other.type_name()
                        )))
                    }
                }
            }
            text(parts.join(s))
        }
        "replace" => {
            let old = str_arg(&args, 0, "old", name)?;
            let new = str_arg(&args, 1, "new", name)?;
            match args.arg(2, "count") {
                Some(count) => {
                    let count = int_arg(count, name)?;
                    if count < 0 {
                        text(s.replace(old, new))
                    } else {
                        text(s.replacen(old, new, count as usize))
                    }
                }
                None => text(s.replace(old, new)),
            }
        }
        "startswith" => Ok(Value::Bool(affix_matches(s, args.required(0, "prefix", name)?, true)?)),
        "endswith" => Ok(Value::Bool(affix_matches(s, args.required(0, "suffix", name)?, false)?)),
        "find" | "rfind" | "index" | "rindex" => {
            let needle = str_arg(&args, 0, "sub", name)?;
            let found = if name.starts_with('r') { s.rfind(needle) } else { s.find(needle) };
            match found {
                Some(byte) => Ok(Value::Int(s[..byte].chars().count() as i64)),
                None if name.ends_with("find") => Ok(Value::Int(-1)),
                None => Err(ScriptError::value_error("substring not found")),
            }
        }
        "count" => {
            let needle = str_arg(&args, 0, "sub", name)?;
            if needle.is_empty() {
                return Ok(Value::Int(s.chars().count() as i64 + 1));
            }
            Ok(Value::Int(s.matches(needle).count() as i64))
        }
        "format" => text(format_template(s, &args.positional, &args.keywords)?),
        "title" => text(title_case(s)),
        "capitalize" => {
            let mut chars = s.chars();
            text(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            })
        }
        "isdigit" | "isnumeric" | "isdecimal" => {
            Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())))
        }
        "isalpha" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        "isalnum" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric))),
        "isspace" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace))),
        "isupper" => Ok(Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase),
        )),
        "islower" => Ok(Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_uppercase),
        )),
        "zfill" => {
            let width = int_arg(args.required(0, "width", name)?, name)?.max(0) as usize;
            let len = s.chars().count();
            if len >= width {
                return text(s.to_string());
            }
            let (sign, digits) = match s.strip_prefix(['-', '+']) {
                Some(rest) => (&s[..1], rest),
                None => ("", s),
            };
            text(format!("{}{}{}", sign, "0".repeat(width - len), digits))
        }
        "center" | "ljust" | "rjust" => {
            let width = int_arg(args.required(0, "width", name)?, name)?.max(0) as usize;
            let fill = match args.get(1) {
                Some(Value::Str(f)) if f.chars().count() == 1 => f.chars().next().unwrap_or(' '),
                Some(_) => {
                    return Err(ScriptError::type_error(
                        "The fill character must be exactly one character long",
                    ))
                }
                None => ' ',
            };
            let pad = width.saturating_sub(s.chars().count());
            let fill_str = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
            text(match name {
                "ljust" => format!("{}{}", s, fill_str(pad)),
                "rjust" => format!("{}{}", fill_str(pad), s),
                _ => format!("{}{}{}", fill_str(pad / 2), s, fill_str(pad - pad / 2)),
            })
        }
        "partition" => {
            let sep = str_arg(&args, 0, "sep", name)?;
            Ok(Value::Tuple(match s.split_once(sep) {
                Some((a, b)) => vec![Value::str(a), Value::str(sep), Value::str(b)],
                None => vec![Value::str(s), Value::str(""), Value::str("")],
            }))
        }
        "encode" => text(s.to_string()),
        _ => Err(no_attribute("str", name)),
    }
}

fn split(s: &str, sep: Option<&str>, max: i64, from_right: bool) -> Vec<String> {
    let limit = if max < 0 { usize::MAX } else { max as usize + 1 };
    match (sep, from_right) {
        (Some(sep), false) => s.splitn(limit, sep).map(str::to_string).collect(),
        (Some(sep), true) => {
            let mut parts: Vec<String> = s.rsplitn(limit, sep).map(str::to_string).collect();
            parts.reverse();
            parts
        }
        (None, _) => {
            let words: Vec<&str> = s.split_whitespace().collect();
            if max < 0 || words.len() <= limit {
                return words.into_iter().map(str::to_string).collect();
            }
            // whitespace split with a limit keeps the remainder verbatim
            let mut out = Vec::new();
            let mut rest = s.trim_start();
            for _ in 0..max {
                match rest.find(char::is_whitespace) {
                    Some(end) => {
                        out.push(rest[..end].to_string());
                        rest = rest[end..].trim_start();
                    }
                    None => break,
                }
            }
            if !rest.is_empty() {
                out.push(rest.to_string());
            }
            out
        }
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// `index` and `count`, shared by lists and tuples.
fn sequence_query(items: &[Value], type_name: &str, name: &str, args: &CallArgs) -> ScriptResult<Value> {
    match name {
        "index" => {
            let needle = args.required(0, "value", name)?;
            items
                .iter()
                .position(|x| x.py_eq(needle))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| {
                    ScriptError::value_error(format!("{} is not in {}", needle.repr(), type_name))
                })
        }
        "count" => {
            let needle = args.required(0, "value", name)?;
            Ok(Value::Int(items.iter().filter(|x| x.py_eq(needle)).count() as i64))
        }
        _ => Err(no_attribute(type_name, name)),
    }
}

fn list_method(items: &[Value], name: &str, args: CallArgs) -> ScriptResult<MethodOutcome> {
    let mut list = items.to_vec();
    let result = match name {
        "append" => {
            args.expect_range(name, 1, 1)?;
            list.push(args.positional[0].clone());
            Value::None
        }
        "extend" => {
            args.expect_range(name, 1, 1)?;
            list.extend(args.positional[0].iterate()?);
            Value::None
        }
        "insert" => {
            args.expect_range(name, 2, 2)?;
            let len = list.len() as i64;
            let mut at = int_arg(&args.positional[0], name)?;
            if at < 0 {
                at += len;
            }
            list.insert(at.clamp(0, len) as usize, args.positional[1].clone());
            Value::None
        }
        "pop" => {
            if list.is_empty() {
                return Err(ScriptError::new(ErrorKind::IndexError, "pop from empty list"));
            }
            let index = match args.get(0) {
                Some(v) => int_arg(v, name)?,
                None => -1,
            };
            let len = list.len() as i64;
            let at = if index < 0 { index + len } else { index };
            if at < 0 || at >= len {
                return Err(ScriptError::new(ErrorKind::IndexError, "pop index out of range"));
            }
            list.remove(at as usize)
        }
        "remove" => {
            let needle = args.required(0, "value", name)?;
            let at = list.iter().position(|x| x.py_eq(needle)).ok_or_else(|| {
                ScriptError::value_error("list.remove(x): x not in list")
            })?;
            list.remove(at);
            Value::None
        }
        "clear" => {
            list.clear();
            Value::None
        }
        "reverse" => {
            list.reverse();
            Value::None
        }
        "sort" => {
            let reverse = args.keyword("reverse").map(Value::truthy).unwrap_or(false);
            let keys = list.clone();
            list = sort_by_keys(list, keys, reverse)?;
            Value::None
        }
        "copy" => return Ok((Value::List(list), None)),
        _ => return sequence_query(items, "list", name, &args).map(|v| (v, None)),
    };
    Ok((result, Some(Value::List(list))))
}

fn dict_method(d: &Dict, name: &str, args: CallArgs) -> ScriptResult<MethodOutcome> {
    match name {
        "get" => {
            let key = args.required(0, "key", name)?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok((d.get(key).cloned().unwrap_or(default), None))
        }
        "keys" => Ok((Value::List(d.keys().cloned().collect()), None)),
        "values" => Ok((Value::List(d.values().cloned().collect()), None)),
        "items" => Ok((
            Value::List(
                d.iter()
                    .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            ),
            None,
        )),
        "copy" => Ok((Value::Dict(d.clone()), None)),
        "pop" => {
            let key = args.required(0, "key", name)?;
            let mut updated = d.clone();
            match (updated.remove(key), args.get(1)) {
                (Some(v), _) => Ok((v, Some(Value::Dict(updated)))),
                (None, Some(default)) => Ok((default.clone(), None)),
                (None, None) => Err(ScriptError::new(ErrorKind::KeyError, key.repr())),
            }
        }
        "setdefault" => {
            let key = args.required(0, "key", name)?;
            if let Some(existing) = d.get(key) {
                return Ok((existing.clone(), None));
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            let mut updated = d.clone();
            updated.insert(key.clone(), default.clone())?;
            Ok((default, Some(Value::Dict(updated))))
        }
        "update" => {
            let mut updated = d.clone();
            match args.get(0) {
                None => {}
                Some(Value::Dict(other)) => {
                    for (k, v) in other.iter() {
                        updated.insert(k.clone(), v.clone())?;
                    }
                }
                Some(pairs) => {
                    for pair in pairs.iterate()? {
                        let kv = pair.iterate()?;
                        if kv.len() != 2 {
                            return Err(ScriptError::value_error(
                                "dictionary update sequence element has wrong length",
                            ));
                        }
                        updated.insert(kv[0].clone(), kv[1].clone())?;
                    }
                }
            }
            for (k, v) in args.keywords {
                updated.insert(Value::Str(k), v)?;
            }
            Ok((Value::None, Some(Value::Dict(updated))))
        }
        "clear" => Ok((Value::None, Some(Value::Dict(Dict::new())))),
        _ => Err(no_attribute("dict", name)),
    }
}

fn set_method(items: &[Value], name: &str, args: CallArgs) -> ScriptResult<MethodOutcome> {
    let mut set = items.to_vec();
    let others = || -> ScriptResult<Vec<Value>> {
        let mut out = Vec::new();
        for arg in &args.positional {
            out.extend(arg.iterate()?);
        }
        Ok(out)
    };
    match name {
        "add" => {
            args.expect_range(name, 1, 1)?;
            set.push(args.positional[0].clone());
            Ok((Value::None, Some(Value::Set(dedupe(set)?))))
        }
        "update" => {
            set.extend(others()?);
            Ok((Value::None, Some(Value::Set(dedupe(set)?))))
        }
        "remove" | "discard" => {
            let needle = args.required(0, "elem", name)?;
            match set.iter().position(|x| x.py_eq(needle)) {
                Some(at) => {
                    set.remove(at);
                    Ok((Value::None, Some(Value::Set(set))))
                }
                None if name == "discard" => Ok((Value::None, None)),
                None => Err(ScriptError::new(ErrorKind::KeyError, needle.repr())),
            }
        }
        "union" => {
            set.extend(others()?);
            Ok((Value::Set(dedupe(set)?), None))
        }
        "intersection" | "difference" => {
            let other = others()?;
            let keep = name == "intersection";
            let out = set
                .into_iter()
                .filter(|x| other.iter().any(|y| y.py_eq(x)) == keep)
                .collect();
            Ok((Value::Set(out), None))
        }
        "issubset" => {
            let other = others()?;
            Ok((Value::Bool(set.iter().all(|x| other.iter().any(|y| y.py_eq(x)))), None))
        }
        "copy" => Ok((Value::Set(set), None)),
        "clear" => Ok((Value::None, Some(Value::Set(Vec::new())))),
        _ => Err(no_attribute("set", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: Value, name: &str, args: Vec<Value>) -> MethodOutcome {
        call_method(&receiver, name, CallArgs::positional(args)).unwrap()
    }

    #[test]
    fn test_append_returns_updated_receiver() {
        let (result, updated) = call(Value::List(vec![Value::Int(1)]), "append", vec![Value::Int(2)]);
        assert!(matches!(result, Value::None));
        assert_eq!(updated.unwrap().repr(), "[1, 2]");
    }

    #[test]
    fn test_split_variants() {
        let (out, _) = call(Value::str("  a  b c "), "split", vec![]);
        assert_eq!(out.repr(), "['a', 'b', 'c']");
        let (out, _) = call(Value::str("a,b,,c"), "split", vec![Value::str(",")]);
        assert_eq!(out.repr(), "['a', 'b', '', 'c']");
        let (out, _) = call(Value::str("a b c"), "split", vec![Value::None, Value::Int(1)]);
        assert_eq!(out.repr(), "['a', 'b c']");
        let (out, _) = call(Value::str("k=v=w"), "rsplit", vec![Value::str("="), Value::Int(1)]);
        assert_eq!(out.repr(), "['k=v', 'w']");
    }

    #[test]
    fn test_dict_get_and_pop() {
        let mut d = Dict::new();
        d.insert(Value::str("a"), Value::Int(1)).unwrap();
        let receiver = Value::Dict(d);
        let (out, _) = call(receiver.clone(), "get", vec![Value::str("z"), Value::Int(0)]);
        assert_eq!(out.repr(), "0");
        let (out, updated) = call(receiver.clone(), "pop", vec![Value::str("a")]);
        assert_eq!(out.repr(), "1");
        assert_eq!(updated.unwrap().repr(), "{}");
        let err = call_method(&receiver, "pop", CallArgs::positional(vec![Value::str("z")])).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'z'");
    }

    #[test]
    fn test_str_helpers() {
        let (out, _) = call(Value::str("-"), "join", vec![Value::List(vec![Value::str("a"), Value::str("b")])]);
        assert_eq!(out.to_display(), "a-b");
        let (out, _) = call(Value::str("hello world"), "title", vec![]);
        assert_eq!(out.to_display(), "Hello World");
        let (out, _) = call(Value::str("42"), "zfill", vec![Value::Int(5)]);
        assert_eq!(out.to_display(), "00042");
        let (out, _) = call(
            Value::str("report.md"),
            "endswith",
            vec![Value::Tuple(vec![Value::str(".txt"), Value::str(".md")])],
        );
        assert!(out.truthy());
    }

    #[test]
    fn test_unknown_method_is_attribute_error() {
        let err = call_method(&Value::Int(3), "append", CallArgs::default()).unwrap_err();
        assert_eq!(err.to_string(), "AttributeError: 'int' object has no attribute 'append'");
    }
}
