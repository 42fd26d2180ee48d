//! Operators: arithmetic, comparison, membership and subscripting.

use super::ast::{BinOp, CmpOp, UnaryOp};
use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::value::{Num, Value};
use std::cmp::Ordering;

pub fn binary(op: BinOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return numeric(op, a, b);
    }
    let result = match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Value::Str(format!("{}{}", a, b)),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            Value::List(a.iter().chain(b).cloned().collect())
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Value::Tuple(a.iter().chain(b).cloned().collect())
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            Value::Str(s.repeat((*n).max(0) as usize))
        }
        (BinOp::Mul, Value::List(items), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::List(items)) => Value::List(repeat(items, *n)),
        (BinOp::Mul, Value::Tuple(items), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::Tuple(items)) => Value::Tuple(repeat(items, *n)),
        (BinOp::Mod, Value::Str(template), args) => Value::Str(percent_format(template, args)?),
        (BinOp::Div, Value::Path(base), Value::Str(part)) => Value::Path(base.join(part)),
        (BinOp::Div, Value::Path(base), Value::Path(part)) => Value::Path(base.join(part)),
        (BinOp::BitOr, Value::Set(a), Value::Set(b)) => {
            let mut out = a.clone();
            for item in b {
                if !out.iter().any(|x| x.py_eq(item)) {
                    out.push(item.clone());
                }
            }
            Value::Set(out)
        }
        (BinOp::BitAnd, Value::Set(a), Value::Set(b)) => Value::Set(
            a.iter()
                .filter(|x| b.iter().any(|y| y.py_eq(x)))
                .cloned()
                .collect(),
        ),
        (BinOp::Sub, Value::Set(a), Value::Set(b)) => Value::Set(
            a.iter()
                .filter(|x| !b.iter().any(|y| y.py_eq(x)))
                .cloned()
                .collect(),
        ),
        (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
            let mut out = a.clone();
            for (k, v) in b.iter() {
                out.insert(k.clone(), v.clone())?;
            }
            Value::Dict(out)
        }
        _ => {
            return Err(ScriptError::type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(result)
}

fn repeat(items: &[Value], n: i64) -> Vec<Value> {
    let mut out = Vec::new();
    for _ in 0..n.max(0) {
        out.extend(items.iter().cloned());
    }
    out
}

fn numeric(op: BinOp, a: Num, b: Num) -> ScriptResult<Value> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        return int_op(op, x, y);
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if y == 0.0 => {
            return Err(ScriptError::new(
                ErrorKind::ZeroDivisionError,
                "float division by zero",
            ))
        }
        BinOp::Div => x / y,
        BinOp::FloorDiv => (x / y).floor(),
        BinOp::Mod => x - y * (x / y).floor(),
        BinOp::Pow => x.powf(y),
        _ => {
            return Err(ScriptError::type_error(format!(
                "unsupported operand type(s) for {}: 'float'",
                op.symbol()
            )))
        }
    };
    Ok(Value::Float(value))
}

fn int_op(op: BinOp, x: i64, y: i64) -> ScriptResult<Value> {
    let overflow = || ScriptError::new(ErrorKind::RuntimeError, "integer overflow");
    let zero = |what: &str| ScriptError::new(ErrorKind::ZeroDivisionError, what.to_string());
    let value = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinOp::Div => {
            if y == 0 {
                return Err(zero("division by zero"));
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(zero("integer division or modulo by zero"));
            }
            let q = x.checked_div_euclid(y).ok_or_else(overflow)?;
            if y < 0 && x.rem_euclid(y) != 0 {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(zero("integer division or modulo by zero"));
            }
            // Only `i64::MIN % -1` overflows, and its remainder is 0
            let r = x.checked_rem_euclid(y).unwrap_or(0);
            if y < 0 && r != 0 {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if y < 0 {
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            x.checked_pow(exp).ok_or_else(overflow)?
        }
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
        BinOp::LShift => {
            let shift = u32::try_from(y).map_err(|_| ScriptError::value_error("negative shift count"))?;
            x.checked_shl(shift).ok_or_else(overflow)?
        }
        BinOp::RShift => {
            let shift = u32::try_from(y).map_err(|_| ScriptError::value_error("negative shift count"))?;
            x >> shift.min(63)
        }
    };
    Ok(Value::Int(value))
}

pub fn unary(op: UnaryOp, operand: &Value) -> ScriptResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, v) => match v.as_number() {
            Some(Num::Int(i)) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ScriptError::new(ErrorKind::RuntimeError, "integer overflow")),
            Some(Num::Float(f)) => Ok(Value::Float(-f)),
            None => Err(bad_unary("-", v)),
        },
        (UnaryOp::Pos, v) => match v.as_number() {
            Some(Num::Int(i)) => Ok(Value::Int(i)),
            Some(Num::Float(f)) => Ok(Value::Float(f)),
            None => Err(bad_unary("+", v)),
        },
        (UnaryOp::Invert, v) => match v.as_int() {
            Some(i) => Ok(Value::Int(!i)),
            None => Err(bad_unary("~", v)),
        },
    }
}

fn bad_unary(symbol: &str, v: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "bad operand type for unary {}: '{}'",
        symbol,
        v.type_name()
    ))
}

/// Ordering used by `<`, `sorted`, `min` and `max`.
pub fn compare(left: &Value, right: &Value) -> ScriptResult<Ordering> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return match (a, b) {
            (Num::Int(x), Num::Int(y)) => Ok(x.cmp(&y)),
            _ => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| ScriptError::value_error("cannot order NaN")),
        };
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                let ord = compare(x, y)?;
                if ord != Ordering::Equal {
                    return Ok(ord);
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => Err(ScriptError::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

pub fn contains(container: &Value, item: &Value) -> ScriptResult<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            other => Err(ScriptError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            Ok(items.iter().any(|x| x.py_eq(item)))
        }
        Value::Dict(d) => Ok(d.contains_key(item)),
        other => Err(ScriptError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn compare_op(op: CmpOp, left: &Value, right: &Value) -> ScriptResult<bool> {
    Ok(match op {
        CmpOp::Eq => left.py_eq(right),
        CmpOp::NotEq => !left.py_eq(right),
        CmpOp::Lt => compare(left, right)? == Ordering::Less,
        CmpOp::LtE => compare(left, right)? != Ordering::Greater,
        CmpOp::Gt => compare(left, right)? == Ordering::Greater,
        CmpOp::GtE => compare(left, right)? != Ordering::Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => left.py_is(right),
        CmpOp::IsNot => !left.py_is(right),
    })
}

// ─────────────────────────────────────────────────────────────────────────
//  SUBSCRIPTS
// ─────────────────────────────────────────────────────────────────────────

fn normalize_index(index: i64, len: usize, what: &str) -> ScriptResult<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    if idx < 0 || idx >= len {
        return Err(ScriptError::new(
            ErrorKind::IndexError,
            format!("{} index out of range", what),
        ));
    }
    Ok(idx as usize)
}

pub fn get_item(container: &Value, index: &Value) -> ScriptResult<Value> {
    match container {
        Value::Dict(d) => d.get(index).cloned().ok_or_else(|| {
            ScriptError::new(ErrorKind::KeyError, index.repr())
        }),
        Value::List(items) | Value::Tuple(items) => {
            let what = if matches!(container, Value::List(_)) { "list" } else { "tuple" };
            let i = index_int(index, what)?;
            Ok(items[normalize_index(i, items.len(), what)?].clone())
        }
        Value::Str(s) => {
            let i = index_int(index, "string")?;
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[normalize_index(i, chars.len(), "string")?].to_string()))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn index_int(index: &Value, what: &str) -> ScriptResult<i64> {
    index.as_int().ok_or_else(|| {
        ScriptError::type_error(format!(
            "{} indices must be integers, not {}",
            what,
            index.type_name()
        ))
    })
}

/// Assign into a container, returning the updated container.
pub fn set_item(container: Value, index: Value, value: Value) -> ScriptResult<Value> {
    match container {
        Value::Dict(mut d) => {
            d.insert(index, value)?;
            Ok(Value::Dict(d))
        }
        Value::List(mut items) => {
            let i = index_int(&index, "list")?;
            let pos = normalize_index(i, items.len(), "list assignment")?;
            items[pos] = value;
            Ok(Value::List(items))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

pub fn del_item(container: Value, index: &Value) -> ScriptResult<Value> {
    match container {
        Value::Dict(mut d) => match d.remove(index) {
            Some(_) => Ok(Value::Dict(d)),
            None => Err(ScriptError::new(ErrorKind::KeyError, index.repr())),
        },
        Value::List(mut items) => {
            let i = index_int(index, "list")?;
            let pos = normalize_index(i, items.len(), "list assignment")?;
            items.remove(pos);
            Ok(Value::List(items))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

pub fn get_slice(
    container: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> ScriptResult<Value> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ScriptError::value_error("slice step cannot be zero"));
    }
    let pick = |len: usize| -> Vec<usize> {
        let len = len as i64;
        let clamp = |v: i64, lo: i64, hi: i64| v.max(lo).min(hi);
        let resolve = |v: i64| if v < 0 { v + len } else { v };
        let mut out = Vec::new();
        if step > 0 {
            let start = clamp(lower.map(resolve).unwrap_or(0), 0, len);
            let stop = clamp(upper.map(resolve).unwrap_or(len), 0, len);
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        } else {
            let start = clamp(lower.map(resolve).unwrap_or(len - 1), -1, len - 1);
            let stop = clamp(upper.map(resolve).unwrap_or(-1), -1, len - 1);
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        }
        out
    };
    match container {
        Value::List(items) => Ok(Value::List(
            pick(items.len()).into_iter().map(|i| items[i].clone()).collect(),
        )),
        Value::Tuple(items) => Ok(Value::Tuple(
            pick(items.len()).into_iter().map(|i| items[i].clone()).collect(),
        )),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(pick(chars.len()).into_iter().map(|i| chars[i]).collect()))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `template % args` with `%s`, `%r`, `%d`, `%i`, `%f` and `%%`.
fn percent_format(template: &str, args: &Value) -> ScriptResult<String> {
    let args: Vec<Value> = match args {
        Value::Tuple(items) => items.clone(),
        other => vec![other.clone()],
    };
    let mut args = args.into_iter();
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() || next == '.' || next == '-' {
                spec.push(next);
                chars.next();
            } else {
                break;
            }
        }
        let Some(conv) = chars.next() else {
            return Err(ScriptError::value_error("incomplete format"));
        };
        if conv == '%' {
            out.push('%');
            continue;
        }
        let arg = args
            .next()
            .ok_or_else(|| ScriptError::type_error("not enough arguments for format string"))?;
        let rendered = match conv {
            's' => arg.to_display(),
            'r' => arg.repr(),
            'd' | 'i' => match arg.as_number() {
                Some(n) => (n.as_f64().trunc() as i64).to_string(),
                None => {
                    return Err(ScriptError::type_error(format!(
                        "%d format: a real number is required, not {}",
                        arg.type_name()
                    )))
                }
            },
            'f' => {
                let precision = spec
                    .split_once('.')
                    .and_then(|(_, p)| p.parse::<usize>().ok())
                    .unwrap_or(6);
                match arg.as_number() {
                    Some(n) => format!("{:.*}", precision, n.as_f64()),
                    None => {
                        return Err(ScriptError::type_error(format!(
                            "must be real number, not {}",
                            arg.type_name()
                        )))
                    }
                }
            }
            other => {
                return Err(ScriptError::value_error(format!(
                    "unsupported format character '{}'",
                    other
                )))
            }
        };
        out.push_str(&rendered);
    }
    if args.next().is_some() {
        return Err(ScriptError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::Dict;

    #[test]
    fn test_floor_division_and_modulo_follow_sign_of_divisor() {
        assert!(binary(BinOp::FloorDiv, &Value::Int(-7), &Value::Int(2))
            .unwrap()
            .py_eq(&Value::Int(-4)));
        assert!(binary(BinOp::Mod, &Value::Int(-7), &Value::Int(2))
            .unwrap()
            .py_eq(&Value::Int(1)));
        assert!(binary(BinOp::Mod, &Value::Int(7), &Value::Int(-2))
            .unwrap()
            .py_eq(&Value::Int(-1)));
    }

    #[test]
    fn test_min_int_divided_by_minus_one() {
        let err = binary(BinOp::FloorDiv, &Value::Int(i64::MIN), &Value::Int(-1)).unwrap_err();
        assert_eq!(err.to_string(), "RuntimeError: integer overflow");
        assert!(binary(BinOp::Mod, &Value::Int(i64::MIN), &Value::Int(-1))
            .unwrap()
            .py_eq(&Value::Int(0)));
        assert!(binary(BinOp::FloorDiv, &Value::Int(7), &Value::Int(-2))
            .unwrap()
            .py_eq(&Value::Int(-4)));
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary(BinOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
    }

    #[test]
    fn test_slices() {
        let list = Value::List((0..5).map(Value::Int).collect());
        let sliced = get_slice(&list, Some(1), Some(-1), None).unwrap();
        assert_eq!(sliced.repr(), "[1, 2, 3]");
        let reversed = get_slice(&list, None, None, Some(-1)).unwrap();
        assert_eq!(reversed.repr(), "[4, 3, 2, 1, 0]");
        let text = get_slice(&Value::str("hello"), Some(-3), None, None).unwrap();
        assert_eq!(text.repr(), "'llo'");
    }

    #[test]
    fn test_slice_with_huge_step() {
        let list = Value::List((1..=3).map(Value::Int).collect());
        let forward = get_slice(&list, Some(1), None, Some(i64::MAX)).unwrap();
        assert_eq!(forward.repr(), "[2]");
        let backward = get_slice(&list, None, None, Some(i64::MIN)).unwrap();
        assert_eq!(backward.repr(), "[3]");
    }

    #[test]
    fn test_missing_key_is_key_error() {
        let err = get_item(&Value::Dict(Dict::new()), &Value::str("k")).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'k'");
    }

    #[test]
    fn test_percent_format() {
        let out = binary(
            BinOp::Mod,
            &Value::str("%s has %d items (%.1f%%)"),
            &Value::Tuple(vec![Value::str("cart"), Value::Int(3), Value::Float(42.26)]),
        )
        .unwrap();
        assert_eq!(out.to_display(), "cart has 3 items (42.3%)");
    }
}
