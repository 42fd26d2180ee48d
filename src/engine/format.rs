//! Format-spec rendering shared by f-strings, `str.format` and `format()`.

use super::error::{ScriptError, ScriptResult};
use super::value::{format_float, Num, Value};

#[derive(Debug, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> ScriptResult<Spec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;

    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if i < chars.len() && matches!(chars[i], '+' | '-' | ' ') {
        out.sign = Some(chars[i]);
        i += 1;
    }
    if i < chars.len() && chars[i] == '#' {
        i += 1;
    }
    if i < chars.len() && chars[i] == '0' {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i > start {
        out.width = chars[start..i].iter().collect::<String>().parse().unwrap_or(0);
    }
    if i < chars.len() && matches!(chars[i], ',' | '_') {
        out.grouping = Some(chars[i]);
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        out.precision = Some(chars[start..i].iter().collect::<String>().parse().unwrap_or(0));
    }
    if i < chars.len() {
        out.kind = Some(chars[i]);
        i += 1;
    }
    if i != chars.len() {
        return Err(ScriptError::value_error(format!(
            "Invalid format specifier '{}'",
            spec
        )));
    }
    Ok(out)
}

/// Render `value` according to a format spec such as `>10`, `,.2f` or `.1%`.
pub fn format_value(value: &Value, spec: &str) -> ScriptResult<String> {
    if spec.is_empty() {
        return Ok(value.to_display());
    }
    let spec = parse_spec(spec)?;
    let numeric = value.as_number();

    let (body, is_number) = match (spec.kind, numeric) {
        (Some('d'), Some(Num::Int(i))) => (group(&i.abs().to_string(), spec.grouping), true),
        (Some('x'), Some(Num::Int(i))) => (format!("{:x}", i.abs()), true),
        (Some('X'), Some(Num::Int(i))) => (format!("{:X}", i.abs()), true),
        (Some('o'), Some(Num::Int(i))) => (format!("{:o}", i.abs()), true),
        (Some('b'), Some(Num::Int(i))) => (format!("{:b}", i.abs()), true),
        (Some('f') | Some('F'), Some(n)) => {
            let text = format!("{:.*}", spec.precision.unwrap_or(6), n.as_f64().abs());
            (group_decimal(&text, spec.grouping), true)
        }
        (Some('%'), Some(n)) => {
            let text = format!("{:.*}", spec.precision.unwrap_or(6), n.as_f64().abs() * 100.0);
            (format!("{}%", group_decimal(&text, spec.grouping)), true)
        }
        (Some('e') | Some('E'), Some(n)) => {
            let text = exponent(n.as_f64().abs(), spec.precision.unwrap_or(6));
            let text = if spec.kind == Some('E') { text.to_uppercase() } else { text };
            (text, true)
        }
        (Some('g') | Some('G'), Some(n)) => (general(n.as_f64().abs(), spec.precision), true),
        (None, Some(Num::Int(i))) if !matches!(value, Value::Bool(_)) => {
            (group(&i.abs().to_string(), spec.grouping), true)
        }
        (None, Some(Num::Float(f))) => match spec.precision {
            Some(_) => (general(f.abs(), spec.precision), true),
            None => (group_decimal(&format_float(f.abs()), spec.grouping), true),
        },
        (None, _) | (Some('s'), _) => {
            let text = value.to_display();
            let text = match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            };
            (text, false)
        }
        (Some(kind), _) => {
            return Err(ScriptError::value_error(format!(
                "Unknown format code '{}' for object of type '{}'",
                kind,
                value.type_name()
            )))
        }
    };

    let negative = is_number
        && numeric
            .map(|n| n.as_f64() < 0.0 || n.as_f64().is_sign_negative() && n.as_f64() != 0.0)
            .unwrap_or(false);
    let sign = if !is_number {
        ""
    } else if negative {
        "-"
    } else {
        match spec.sign {
            Some('+') => "+",
            Some(' ') => " ",
            _ => "",
        }
    };

    let (fill, align) = if spec.zero && spec.align.is_none() {
        ('0', '=')
    } else {
        (
            spec.fill.unwrap_or(' '),
            spec.align.unwrap_or(if is_number { '>' } else { '<' }),
        )
    };
    let len = sign.chars().count() + body.chars().count();
    let pad = spec.width.saturating_sub(len);
    let padding = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
    Ok(match align {
        '<' => format!("{}{}{}", sign, body, padding(pad)),
        '^' => format!("{}{}{}{}", padding(pad / 2), sign, body, padding(pad - pad / 2)),
        '=' => format!("{}{}{}", sign, padding(pad), body),
        _ => format!("{}{}{}", padding(pad), sign, body),
    })
}

fn group(digits: &str, sep: Option<char>) -> String {
    let Some(sep) = sep else {
        return digits.to_string();
    };
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(*c);
    }
    out
}

fn group_decimal(text: &str, sep: Option<char>) -> String {
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{}", group(int, sep), frac),
        None => group(text, sep),
    }
}

fn exponent(value: f64, precision: usize) -> String {
    let text = format!("{:.*e}", precision, value);
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => text,
    }
}

fn general(value: f64, precision: Option<usize>) -> String {
    let p = precision.unwrap_or(6).max(1);
    if value == 0.0 {
        return "0".to_string();
    }
    let exp = value.log10().floor() as i32;
    if exp < -4 || exp >= p as i32 {
        let text = exponent(value, p - 1);
        match text.split_once('e') {
            Some((mantissa, rest)) => format!("{}e{}", trim_zeros(mantissa), rest),
            None => text,
        }
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, value))
    }
}

fn trim_zeros(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

/// `template.format(*args, **kwargs)`
pub fn format_template(
    template: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> ScriptResult<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    field.push(next);
                }
                if !closed {
                    return Err(ScriptError::value_error(
                        "expected '}' before end of string",
                    ));
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name.to_string(), spec.to_string()),
                    None => (field.clone(), String::new()),
                };
                let (name, conversion) = match name.split_once('!') {
                    Some((name, conv)) => (name.to_string(), conv.chars().next()),
                    None => (name, None),
                };
                let value = if name.is_empty() {
                    let value = args.get(auto_index).ok_or_else(|| {
                        ScriptError::new(
                            super::error::ErrorKind::IndexError,
                            format!("Replacement index {} out of range", auto_index),
                        )
                    })?;
                    auto_index += 1;
                    value
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).ok_or_else(|| {
                        ScriptError::new(
                            super::error::ErrorKind::IndexError,
                            format!("Replacement index {} out of range", index),
                        )
                    })?
                } else {
                    kwargs
                        .iter()
                        .find(|(k, _)| *k == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| {
                            ScriptError::new(super::error::ErrorKind::KeyError, format!("'{}'", name))
                        })?
                };
                out.push_str(&render_field(value, conversion, &spec)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// One replacement field: optional `!r`/`!s` conversion, then the spec.
pub fn render_field(value: &Value, conversion: Option<char>, spec: &str) -> ScriptResult<String> {
    match conversion {
        Some('r') | Some('a') => format_value(&Value::Str(value.repr()), spec),
        Some('s') => format_value(&Value::Str(value.to_display()), spec),
        _ => format_value(value, spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_and_grouping() {
        assert_eq!(format_value(&Value::Float(1234.5), ",.2f").unwrap(), "1,234.50");
        assert_eq!(format_value(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::Float(-3.14159), ".3f").unwrap(), "-3.142");
    }

    #[test]
    fn test_alignment_and_fill() {
        assert_eq!(format_value(&Value::str("ab"), ">5").unwrap(), "   ab");
        assert_eq!(format_value(&Value::str("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_value(&Value::Int(42), "05d").unwrap(), "00042");
    }

    #[test]
    fn test_percent() {
        assert_eq!(format_value(&Value::Float(0.256), ".1%").unwrap(), "25.6%");
    }

    #[test]
    fn test_template_fields() {
        let out = format_template(
            "{} scored {score:.1f} ({0!r})",
            &[Value::str("ana")],
            &[("score".to_string(), Value::Float(9.25))],
        )
        .unwrap();
        assert_eq!(out, "ana scored 9.2 ('ana')");
    }
}
