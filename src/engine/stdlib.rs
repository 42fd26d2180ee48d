//! `open`, `json`, `os`, `os.path` and `pathlib.Path`.
//!
//! These reach the real filesystem with the permissions of the host process.
//! Relative paths resolve against the process working directory.

use super::builtins::{Builtin, CallArgs};
use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::value::{FileHandle, FileMode, Module, Value};
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn call(builtin: Builtin, args: CallArgs) -> ScriptResult<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Open => open(&args),
        Builtin::Path => {
            let mut path = PathBuf::new();
            for part in &args.positional {
                path.push(path_arg(part, "Path")?);
            }
            if path.as_os_str().is_empty() {
                path.push(".");
            }
            Ok(Value::Path(path))
        }
        Builtin::JsonDumps => {
            args.expect_range(name, 1, 1)?;
            Ok(Value::Str(dumps(&args.positional[0], &args)?))
        }
        Builtin::JsonLoads => {
            args.expect_range(name, 1, 1)?;
            let text = match &args.positional[0] {
                Value::Str(s) => s.clone(),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "the JSON object must be str, not {}",
                        other.type_name()
                    )))
                }
            };
            loads(&text)
        }
        Builtin::JsonDump => {
            args.expect_range(name, 2, 2)?;
            let text = dumps(&args.positional[0], &args)?;
            match &args.positional[1] {
                Value::File(handle) => write_file(handle, &text).map(|_| Value::None),
                other => Err(ScriptError::type_error(format!(
                    "dump() expected a writable file, got '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::JsonLoad => {
            args.expect_range(name, 1, 1)?;
            match &args.positional[0] {
                Value::File(handle) => loads(&read_file(handle)?),
                other => Err(ScriptError::type_error(format!(
                    "load() expected a readable file, got '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::OsListdir => {
            args.expect_range(name, 0, 1)?;
            let dir = match args.get(0) {
                Some(v) => path_arg(v, name)?,
                None => PathBuf::from("."),
            };
            let mut names = Vec::new();
            let entries = fs::read_dir(&dir).map_err(|e| os_err(&e, &dir))?;
            for entry in entries {
                let entry = entry.map_err(|e| os_err(&e, &dir))?;
                names.push(entry.file_name().to_string_lossy().to_string());
            }
            names.sort();
            Ok(Value::List(names.into_iter().map(Value::Str).collect()))
        }
        Builtin::OsMakedirs => {
            args.expect_range(name, 1, 2)?;
            let dir = path_arg(&args.positional[0], name)?;
            let exist_ok = args.arg(1, "exist_ok").map(Value::truthy).unwrap_or(false);
            make_dirs(&dir, exist_ok)?;
            Ok(Value::None)
        }
        Builtin::OsGetcwd => {
            args.expect_range(name, 0, 0)?;
            let cwd = std::env::current_dir().map_err(|e| os_err(&e, Path::new(".")))?;
            Ok(Value::Str(cwd.display().to_string()))
        }
        Builtin::OsPathJoin => {
            args.expect_range(name, 1, usize::MAX)?;
            let parts = args
                .positional
                .iter()
                .map(|v| text_arg(v, name))
                .collect::<ScriptResult<Vec<_>>>()?;
            Ok(Value::Str(join(&parts)))
        }
        Builtin::OsPathExists | Builtin::OsPathIsfile | Builtin::OsPathIsdir => {
            args.expect_range(name, 1, 1)?;
            let path = path_arg(&args.positional[0], name)?;
            Ok(Value::Bool(match builtin {
                Builtin::OsPathIsfile => path.is_file(),
                Builtin::OsPathIsdir => path.is_dir(),
                _ => path.exists(),
            }))
        }
        Builtin::OsPathBasename => {
            args.expect_range(name, 1, 1)?;
            let text = text_arg(&args.positional[0], name)?;
            Ok(Value::Str(split(&text).1.to_string()))
        }
        Builtin::OsPathDirname => {
            args.expect_range(name, 1, 1)?;
            let text = text_arg(&args.positional[0], name)?;
            Ok(Value::Str(split(&text).0.to_string()))
        }
        other => Err(ScriptError::new(
            ErrorKind::RuntimeError,
            format!("{}() is not a library function", other.name()),
        )),
    }
}

fn os_err(err: &std::io::Error, path: &Path) -> ScriptError {
    ScriptError::os_error(err, &path.display().to_string())
}

fn text_arg(value: &Value, func: &str) -> ScriptResult<String> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Path(p) => Ok(p.display().to_string()),
        other => Err(ScriptError::type_error(format!(
            "{}() expected str or Path, not {}",
            func,
            other.type_name()
        ))),
    }
}

fn path_arg(value: &Value, func: &str) -> ScriptResult<PathBuf> {
    text_arg(value, func).map(PathBuf::from)
}

/// `os.path.join` on `/`-separated text: an absolute part restarts the path.
fn join(parts: &[String]) -> String {
    let mut out = String::new();
    for part in parts {
        if part.starts_with('/') {
            out = part.clone();
        } else if out.is_empty() || out.ends_with('/') {
            out.push_str(part);
        } else {
            out.push('/');
            out.push_str(part);
        }
    }
    out
}

/// `(dirname, basename)` split at the last separator.
fn split(text: &str) -> (&str, &str) {
    match text.rfind('/') {
        Some(0) => ("/", &text[1..]),
        Some(i) => (text[..i].trim_end_matches('/'), &text[i + 1..]),
        None => ("", text),
    }
}

fn make_dirs(dir: &Path, exist_ok: bool) -> ScriptResult<()> {
    if dir.exists() && !exist_ok {
        return Err(ScriptError::new(
            ErrorKind::OSError,
            format!("[Errno 17] File exists: '{}'", dir.display()),
        ));
    }
    fs::create_dir_all(dir).map_err(|e| os_err(&e, dir))
}

// ─────────────────────────────────────────────────────────────────────────
//  FILES
// ─────────────────────────────────────────────────────────────────────────

fn open(args: &CallArgs) -> ScriptResult<Value> {
    let path = path_arg(args.required(0, "file", "open")?, "open")?;
    let mode = match args.arg(1, "mode") {
        Some(Value::Str(m)) => m.clone(),
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "open() argument 'mode' must be str, not {}",
                other.type_name()
            )))
        }
        None => "r".to_string(),
    };
    open_path(path, &mode)
}

pub fn open_path(path: PathBuf, mode: &str) -> ScriptResult<Value> {
    let mode = match mode.replace(['b', 't', '+'], "").as_str() {
        "r" => FileMode::Read,
        "w" | "x" => FileMode::Write,
        "a" => FileMode::Append,
        _ => return Err(ScriptError::value_error(format!("invalid mode: '{}'", mode))),
    };
    match mode {
        FileMode::Read => {
            if !path.is_file() {
                let err = std::io::Error::from(std::io::ErrorKind::NotFound);
                return Err(os_err(&err, &path));
            }
        }
        FileMode::Write => {
            fs::write(&path, b"").map_err(|e| os_err(&e, &path))?;
        }
        FileMode::Append => {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| os_err(&e, &path))?;
        }
    }
    Ok(Value::File(FileHandle { path, mode }))
}

pub fn read_file(handle: &FileHandle) -> ScriptResult<String> {
    if handle.mode != FileMode::Read {
        return Err(ScriptError::new(ErrorKind::OSError, "not readable"));
    }
    fs::read_to_string(&handle.path).map_err(|e| os_err(&e, &handle.path))
}

pub fn write_file(handle: &FileHandle, text: &str) -> ScriptResult<()> {
    if handle.mode == FileMode::Read {
        return Err(ScriptError::new(ErrorKind::OSError, "not writable"));
    }
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(&handle.path)
        .map_err(|e| os_err(&e, &handle.path))?;
    file.write_all(text.as_bytes())
        .map_err(|e| os_err(&e, &handle.path))
}

/// Lines of a readable file, each keeping its trailing newline.
pub fn read_lines(handle: &FileHandle) -> ScriptResult<Vec<Value>> {
    let text = read_file(handle)?;
    Ok(text
        .split_inclusive('\n')
        .map(|line| Value::Str(line.to_string()))
        .collect())
}

pub fn file_method(handle: &FileHandle, method: &str, args: &CallArgs) -> ScriptResult<Value> {
    match method {
        "read" => read_file(handle).map(Value::Str),
        "readlines" => read_lines(handle).map(Value::List),
        "write" => {
            args.expect_range("write", 1, 1)?;
            let text = match &args.positional[0] {
                Value::Str(s) => s.clone(),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "write() argument must be str, not {}",
                        other.type_name()
                    )))
                }
            };
            write_file(handle, &text)?;
            Ok(Value::Int(text.chars().count() as i64))
        }
        "writelines" => {
            args.expect_range("writelines", 1, 1)?;
            for line in args.positional[0].iterate()? {
                write_file(handle, &line.to_display())?;
            }
            Ok(Value::None)
        }
        "close" | "flush" => Ok(Value::None),
        _ => Err(no_attribute("TextIOWrapper", method)),
    }
}

pub fn no_attribute(type_name: &str, attr: &str) -> ScriptError {
    ScriptError::new(
        ErrorKind::AttributeError,
        format!("'{}' object has no attribute '{}'", type_name, attr),
    )
}

// ─────────────────────────────────────────────────────────────────────────
//  MODULES AND PATHS
// ─────────────────────────────────────────────────────────────────────────

pub fn module_attr(module: Module, attr: &str) -> ScriptResult<Value> {
    let found = match (module, attr) {
        (Module::Json, "dumps") => Some(Value::Builtin(Builtin::JsonDumps)),
        (Module::Json, "loads") => Some(Value::Builtin(Builtin::JsonLoads)),
        (Module::Json, "dump") => Some(Value::Builtin(Builtin::JsonDump)),
        (Module::Json, "load") => Some(Value::Builtin(Builtin::JsonLoad)),
        (Module::Json, "JSONDecodeError") => Some(Value::ExceptionType(ErrorKind::ValueError)),
        (Module::Os, "listdir") => Some(Value::Builtin(Builtin::OsListdir)),
        (Module::Os, "makedirs") => Some(Value::Builtin(Builtin::OsMakedirs)),
        (Module::Os, "getcwd") => Some(Value::Builtin(Builtin::OsGetcwd)),
        (Module::Os, "path") => Some(Value::Module(Module::OsPath)),
        (Module::Os, "sep") => Some(Value::str("/")),
        (Module::OsPath, "join") => Some(Value::Builtin(Builtin::OsPathJoin)),
        (Module::OsPath, "exists") => Some(Value::Builtin(Builtin::OsPathExists)),
        (Module::OsPath, "basename") => Some(Value::Builtin(Builtin::OsPathBasename)),
        (Module::OsPath, "dirname") => Some(Value::Builtin(Builtin::OsPathDirname)),
        (Module::OsPath, "isfile") => Some(Value::Builtin(Builtin::OsPathIsfile)),
        (Module::OsPath, "isdir") => Some(Value::Builtin(Builtin::OsPathIsdir)),
        (Module::Pathlib, "Path") => Some(Value::Builtin(Builtin::Path)),
        _ => None,
    };
    found.ok_or_else(|| {
        ScriptError::new(
            ErrorKind::AttributeError,
            format!("module '{}' has no attribute '{}'", module.name(), attr),
        )
    })
}

pub fn path_attr(path: &Path, attr: &str) -> ScriptResult<Value> {
    let text = |s: Option<&std::ffi::OsStr>| {
        Value::Str(s.map(|s| s.to_string_lossy().to_string()).unwrap_or_default())
    };
    Ok(match attr {
        "name" => text(path.file_name()),
        "stem" => text(path.file_stem()),
        "suffix" => Value::Str(
            path.extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
        ),
        "parent" => match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => Value::Path(p.to_path_buf()),
            Some(_) => Value::Path(PathBuf::from(".")),
            None => Value::Path(path.to_path_buf()),
        },
        "parts" => Value::Tuple(
            path.components()
                .map(|c| Value::Str(c.as_os_str().to_string_lossy().to_string()))
                .collect(),
        ),
        _ => return Err(no_attribute("Path", attr)),
    })
}

pub fn path_method(path: &Path, method: &str, args: &CallArgs) -> ScriptResult<Value> {
    match method {
        "exists" => Ok(Value::Bool(path.exists())),
        "is_file" => Ok(Value::Bool(path.is_file())),
        "is_dir" => Ok(Value::Bool(path.is_dir())),
        "read_text" => fs::read_to_string(path)
            .map(Value::Str)
            .map_err(|e| os_err(&e, path)),
        "write_text" => {
            let data = match args.required(0, "data", "write_text")? {
                Value::Str(s) => s.clone(),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "data must be str, not {}",
                        other.type_name()
                    )))
                }
            };
            fs::write(path, data.as_bytes()).map_err(|e| os_err(&e, path))?;
            Ok(Value::Int(data.chars().count() as i64))
        }
        "mkdir" => {
            let parents = args.keyword("parents").map(Value::truthy).unwrap_or(false);
            let exist_ok = args.keyword("exist_ok").map(Value::truthy).unwrap_or(false);
            if path.exists() {
                if exist_ok {
                    return Ok(Value::None);
                }
                return Err(ScriptError::new(
                    ErrorKind::OSError,
                    format!("[Errno 17] File exists: '{}'", path.display()),
                ));
            }
            let result = if parents {
                fs::create_dir_all(path)
            } else {
                fs::create_dir(path)
            };
            result.map_err(|e| os_err(&e, path))?;
            Ok(Value::None)
        }
        "joinpath" => {
            let mut out = path.to_path_buf();
            for part in &args.positional {
                out.push(path_arg(part, "joinpath")?);
            }
            Ok(Value::Path(out))
        }
        "with_suffix" => {
            let suffix = text_arg(args.required(0, "suffix", "with_suffix")?, "with_suffix")?;
            Ok(Value::Path(path.with_extension(suffix.trim_start_matches('.'))))
        }
        "iterdir" => {
            let mut entries = Vec::new();
            for entry in fs::read_dir(path).map_err(|e| os_err(&e, path))? {
                entries.push(entry.map_err(|e| os_err(&e, path))?.path());
            }
            entries.sort();
            Ok(Value::List(entries.into_iter().map(Value::Path).collect()))
        }
        "unlink" => {
            fs::remove_file(path).map_err(|e| os_err(&e, path))?;
            Ok(Value::None)
        }
        "resolve" | "absolute" => {
            let cwd = std::env::current_dir().map_err(|e| os_err(&e, path))?;
            Ok(Value::Path(cwd.join(path)))
        }
        "as_posix" => Ok(Value::Str(path.display().to_string())),
        "open" => {
            let mode = match args.arg(0, "mode") {
                Some(v) => text_arg(v, "open")?,
                None => "r".to_string(),
            };
            open_path(path.to_path_buf(), &mode)
        }
        _ => Err(no_attribute("Path", method)),
    }
}

// ─────────────────────────────────────────────────────────────────────────
//  JSON
// ─────────────────────────────────────────────────────────────────────────

/// Serializes a value in insertion order, refusing non-JSON types.
struct JsonView<'a> {
    value: &'a Value,
    sort_keys: bool,
}

impl Serialize for JsonView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) | Value::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&JsonView {
                        value: item,
                        sort_keys: self.sort_keys,
                    })?;
                }
                seq.end()
            }
            Value::Dict(d) => {
                let mut entries = Vec::with_capacity(d.len());
                for (k, v) in d.iter() {
                    let key = match k {
                        Value::Str(s) => s.clone(),
                        Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::None => {
                            k.to_json().to_string()
                        }
                        other => {
                            return Err(S::Error::custom(format!(
                                "keys must be str, int, float, bool or None, not {}",
                                other.type_name()
                            )))
                        }
                    };
                    entries.push((key, v));
                }
                if self.sort_keys {
                    entries.sort_by(|a, b| a.0.cmp(&b.0));
                }
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(
                        &k,
                        &JsonView {
                            value: v,
                            sort_keys: self.sort_keys,
                        },
                    )?;
                }
                map.end()
            }
            other => Err(S::Error::custom(format!(
                "Object of type {} is not JSON serializable",
                other.type_name()
            ))),
        }
    }
}

/// Compact output with the `", "` / `": "` separators scripts expect.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> std::io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> std::io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
    ) -> std::io::Result<()> {
        writer.write_all(b": ")
    }
}

pub fn dumps(value: &Value, args: &CallArgs) -> ScriptResult<String> {
    let view = JsonView {
        value,
        sort_keys: args.keyword("sort_keys").map(Value::truthy).unwrap_or(false),
    };
    let indent = match args.keyword("indent") {
        None | Some(Value::None) => None,
        Some(Value::Int(n)) => Some(" ".repeat((*n).max(0) as usize)),
        Some(Value::Str(s)) => Some(s.clone()),
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "indent must be int or str, not {}",
                other.type_name()
            )))
        }
    };
    let mut buf = Vec::new();
    let result = match &indent {
        Some(indent) => {
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            view.serialize(&mut ser)
        }
        None => {
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
            view.serialize(&mut ser)
        }
    };
    result.map_err(|e| ScriptError::type_error(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| ScriptError::value_error(e.to_string()))
}

pub fn loads(text: &str) -> ScriptResult<Value> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|json| Value::from_json(&json))
        .map_err(|e| ScriptError::value_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::Dict;

    #[test]
    fn test_dumps_keeps_insertion_order_and_spacing() {
        let mut d = Dict::new();
        d.insert(Value::str("z"), Value::Int(1)).unwrap();
        d.insert(Value::str("a"), Value::List(vec![Value::Bool(true), Value::None]))
            .unwrap();
        let out = dumps(&Value::Dict(d), &CallArgs::default()).unwrap();
        assert_eq!(out, r#"{"z": 1, "a": [true, null]}"#);
    }

    #[test]
    fn test_dumps_indent_and_rejects_paths() {
        let mut args = CallArgs::default();
        args.keywords.push(("indent".into(), Value::Int(2)));
        let out = dumps(&Value::List(vec![Value::Int(1)]), &args).unwrap();
        assert_eq!(out, "[\n  1\n]");

        let err = dumps(&Value::Path(PathBuf::from("x")), &CallArgs::default()).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Object of type Path is not JSON serializable");
    }

    #[test]
    fn test_os_path_text_helpers() {
        assert_eq!(join(&["a".into(), "b".into(), "c.txt".into()]), "a/b/c.txt");
        assert_eq!(join(&["a".into(), "/abs".into()]), "/abs");
        assert_eq!(split("media/out/report.md"), ("media/out", "report.md"));
        assert_eq!(split("report.md"), ("", "report.md"));
    }

    #[test]
    fn test_file_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let Value::File(handle) = open_path(path.clone(), "w").unwrap() else {
            panic!("expected file handle");
        };
        file_method(&handle, "write", &CallArgs::positional(vec![Value::str("a\n")])).unwrap();
        file_method(&handle, "write", &CallArgs::positional(vec![Value::str("b\n")])).unwrap();
        let Value::File(reader) = open_path(path, "r").unwrap() else {
            panic!("expected file handle");
        };
        assert_eq!(read_lines(&reader).unwrap().len(), 2);
        assert_eq!(read_file(&reader).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_open_missing_file_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_path(dir.path().join("missing.txt"), "r").unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileNotFoundError);
    }

    #[test]
    fn test_path_attributes() {
        let path = Path::new("out/report.final.md");
        assert_eq!(path_attr(path, "name").unwrap().to_display(), "report.final.md");
        assert_eq!(path_attr(path, "stem").unwrap().to_display(), "report.final");
        assert_eq!(path_attr(path, "suffix").unwrap().to_display(), ".md");
        assert_eq!(path_attr(path, "parent").unwrap().to_display(), "out");
    }
}
