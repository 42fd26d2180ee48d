use super::*;
use crate::tools::{ProxyTable, ToolSet};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    proxies: ProxyTable,
    prior: JsonMap,
    inputs: JsonMap,
    globals: JsonMap,
}

impl Fixture {
    fn new(tools: ToolSet) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            proxies: ProxyTable::from_provider(Arc::new(tools)),
            prior: JsonMap::new(),
            inputs: JsonMap::new(),
            globals: JsonMap::new(),
        }
    }

    fn plain() -> Self {
        Self::new(ToolSet::new())
    }

    fn env(&self) -> RunEnv<'_> {
        RunEnv {
            proxies: &self.proxies,
            session_id: "test_session",
            output_dir: self.dir.path(),
            prior_bindings: &self.prior,
            inputs: &self.inputs,
            variant_globals: &self.globals,
            echo_prints: false,
        }
    }

    async fn run(&self, variants: &[(&str, &str)]) -> CodePhaseResult {
        let variants: BTreeMap<String, String> = variants
            .iter()
            .map(|(name, source)| (name.to_string(), source.to_string()))
            .collect();
        run_variants(&variants, &self.env()).await
    }

    async fn run_one(&self, source: &str) -> VariantOutcome {
        run_variant("CODE_1A", source, &self.env()).await
    }
}

fn object(value: serde_json::Value) -> JsonMap {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

#[tokio::test]
async fn test_variants_run_in_name_order() {
    let fixture = Fixture::plain();
    let result = fixture
        .run(&[("CODE_1B", "x = 1"), ("CODE_1A", "x = 2")])
        .await;

    assert!(result.is_success());
    assert_eq!(result.successful_variant.as_deref(), Some("CODE_1A"));
    assert_eq!(result.tried_variants, vec!["CODE_1A".to_string()]);
    assert_eq!(result.total_variants_tried, 1);
    assert_eq!(result.outcome.result, json!({"x": 2}));
}

#[tokio::test]
async fn test_failure_then_success_records_one_error() {
    let fixture = Fixture::plain();
    let result = fixture
        .run(&[("A", "raise ValueError('boom')"), ("B", "value = 3")])
        .await;

    assert_eq!(result.successful_variant.as_deref(), Some("B"));
    assert_eq!(result.total_variants_tried, 2);
    assert_eq!(result.all_errors, vec!["A: ValueError: boom".to_string()]);
    assert_eq!(result.outcome.result, json!({"value": 3}));
}

#[tokio::test]
async fn test_all_variants_failing_aggregates_errors() {
    let fixture = Fixture::plain();
    let result = fixture
        .run(&[
            (
                "A",
                "open(output_dir + '/partial.txt', 'w').write('x')\n1 / 0\n",
            ),
            ("B", "undefined_name"),
        ])
        .await;

    assert_eq!(result.outcome.status, OutcomeStatus::Failed);
    assert_eq!(result.total_variants_tried, 2);
    assert!(result.outcome.created_files.is_empty());
    assert_eq!(result.outcome.result, json!({}));

    let message = result.outcome.error.unwrap();
    assert!(message.starts_with("All code variants failed. Errors: "));
    assert!(message.contains("A: ZeroDivisionError"));
    assert!(message.contains("B: NameError: name 'undefined_name' is not defined"));
    assert_eq!(result.all_errors.len(), 2);
}

#[tokio::test]
async fn test_empty_variant_mapping_tries_nothing() {
    let fixture = Fixture::plain();
    let result = fixture.run(&[]).await;

    assert_eq!(result.total_variants_tried, 0);
    assert!(result.all_errors.is_empty());
    assert!(result.successful_variant.is_none());
    assert!(!result.is_success());
}

#[tokio::test]
async fn test_proxy_result_binds_to_call_expression() {
    let tools = ToolSet::new().with_tool("search", |args| Ok(json!({"hits": [args[0].clone()]})));
    let fixture = Fixture::new(tools);
    let outcome = fixture
        .run_one("result = search(\"x\")\nfirst = result['hits'][0]\n")
        .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.suspensions, 1);
    assert_eq!(
        outcome.result,
        json!({"result": {"hits": ["x"]}, "first": "x"})
    );
}

#[tokio::test]
async fn test_suspensions_complete_in_source_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let tools = ToolSet::new().with_tool("fetch", move |args| {
        log.lock().unwrap().push(args[0].clone());
        Ok(json!(null))
    });
    let fixture = Fixture::new(tools);
    let outcome = fixture
        .run_one("for q in ['a', 'b']:\n    fetch(q)\nfetch('c')\n")
        .await;

    assert_eq!(outcome.suspensions, 3);
    assert_eq!(*seen.lock().unwrap(), vec![json!("a"), json!("b"), json!("c")]);
}

#[tokio::test]
async fn test_keyword_arguments_travel_as_trailing_mapping() {
    let tools = ToolSet::new().with_tool("search", |args| Ok(json!(args)));
    let fixture = Fixture::new(tools);
    let outcome = fixture.run_one("return search('q', limit=5)").await;

    assert_eq!(outcome.result, json!(["q", {"limit": 5}]));
}

#[tokio::test]
async fn test_unmarked_invocation_completes_on_await() {
    let tools = ToolSet::new().with_tool("search", |_| Ok(json!("done")));
    let fixture = Fixture::new(tools);
    let outcome = fixture
        .run_one("call = search\npending = call('x')\nanswer = await pending\n")
        .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.suspensions, 1);
    assert_eq!(outcome.result["answer"], json!("done"));
}

#[tokio::test]
async fn test_tool_errors_are_catchable() {
    let tools =
        ToolSet::new().with_tool("search", |_| Err(anyhow::anyhow!("quota exceeded")));
    let fixture = Fixture::new(tools);
    let caught = fixture
        .run_one("try:\n    search('x')\nexcept Exception as exc:\n    message = str(exc)\n")
        .await;
    assert_eq!(caught.result, json!({"message": "quota exceeded"}));

    let uncaught = fixture.run_one("search('x')").await;
    assert_eq!(uncaught.error.as_deref(), Some("ToolError: quota exceeded"));
}

#[tokio::test]
async fn test_explicit_return_replaces_bindings() {
    let fixture = Fixture::plain();
    let outcome = fixture
        .run_one("scratch = 1\nreturn {'answer': 42}\n")
        .await;
    assert_eq!(outcome.result, json!({"answer": 42}));
}

#[tokio::test]
async fn test_ambient_bindings_and_layers_are_visible() {
    let mut fixture = Fixture::plain();
    fixture.prior = object(json!({"offset": 3}));
    fixture.inputs = object(json!({"n": 2}));
    fixture.globals = object(json!({"scale": 10}));
    let outcome = fixture
        .run_one(
            "total = (inputs['n'] + offset) * scale\nsame = globals_schema['offset'] == offset\nsid = session_id\n",
        )
        .await;

    assert_eq!(
        outcome.result,
        json!({"total": 50, "same": true, "sid": "test_session"})
    );
}

#[tokio::test]
async fn test_files_written_to_output_dir_are_listed() {
    let fixture = Fixture::plain();
    let outcome = fixture
        .run_one(
            "from pathlib import Path\nPath(output_dir, 'b.txt').write_text('two')\nwith open(output_dir + '/a.txt', 'w') as fh:\n    fh.write('one')\nreturn 'ok'\n",
        )
        .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    let names: Vec<String> = outcome
        .created_files
        .iter()
        .map(|p| {
            std::path::Path::new(p)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string()
        })
        .collect();
    assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
    assert_eq!(
        std::fs::read_to_string(fixture.dir.path().join("a.txt")).unwrap(),
        "one"
    );
}

#[tokio::test]
async fn test_print_output_is_captured() {
    let fixture = Fixture::plain();
    let outcome = fixture
        .run_one("print('a', 1, sep='-')\nprint(f'{2.5:.2f}', end='')\n")
        .await;
    assert_eq!(outcome.stdout, "a-1\n2.50");
}

#[tokio::test]
async fn test_exception_handling_and_finally() {
    let fixture = Fixture::plain();
    let source = "\
log = []
try:
    value = {}['missing']
except (TypeError, KeyError) as exc:
    log.append('caught ' + str(exc))
else:
    log.append('no error')
finally:
    log.append('cleanup')
";
    let outcome = fixture.run_one(source).await;
    assert_eq!(outcome.result["log"], json!(["caught 'missing'", "cleanup"]));
}

#[tokio::test]
async fn test_nested_containers_update_in_place() {
    let fixture = Fixture::plain();
    let source = "\
data = {'a': {'count': 1}, 'items': []}
data['a']['count'] += 5
data['items'].append('x')
alias = data['items']
alias.append('y')
";
    let outcome = fixture.run_one(source).await;
    assert_eq!(outcome.result["data"], json!({"a": {"count": 6}, "items": ["x"]}));
    assert_eq!(outcome.result["alias"], json!(["x", "y"]));
}

#[tokio::test]
async fn test_functions_closures_and_comprehensions() {
    let fixture = Fixture::plain();
    let source = "\
def scale(factor):
    def apply(x):
        return x * factor
    return apply

triple = scale(3)
values = [triple(v) for v in range(4) if v % 2 == 0]
ranked = sorted(['bb', 'a', 'ccc'], key=lambda s: -len(s))
";
    let outcome = fixture.run_one(source).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.result["values"], json!([0, 6]));
    assert_eq!(outcome.result["ranked"], json!(["ccc", "bb", "a"]));
    assert!(outcome.result.get("v").is_none());
}

#[tokio::test]
async fn test_syntax_errors_fail_the_variant() {
    let fixture = Fixture::plain();
    let outcome = fixture.run_one("def broken(:\n    pass\n").await;
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.error.unwrap().starts_with("SyntaxError"));
}

#[tokio::test]
async fn test_imports_outside_allow_list_fail() {
    let fixture = Fixture::plain();
    let outcome = fixture.run_one("import subprocess").await;
    assert_eq!(
        outcome.error.as_deref(),
        Some("ImportError: No module named 'subprocess'")
    );

    let allowed = fixture.run_one("import json\nreturn json.dumps({'a': 1})").await;
    assert_eq!(allowed.result, json!("{\"a\": 1}"));
}

#[tokio::test]
async fn test_runaway_recursion_is_an_error() {
    let proxies = ProxyTable::empty();
    let context = ExecutionContext::builder(&proxies).build();
    let unit = rewrite_source("def f(n):\n    return f(n + 1)\nf(0)\n", &Default::default()).unwrap();
    let err = interp::Interpreter::new(&context, &proxies)
        .max_call_depth(16)
        .run_unit(&unit)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "RuntimeError: maximum recursion depth exceeded");
}

#[tokio::test]
async fn test_unit_containers_mutated_inside_functions() {
    let fixture = Fixture::plain();
    let outcome = fixture
        .run_one(
            "rows = []\n\
             totals = {}\n\
             def add(r):\n    rows.append(r)\n    totals[r % 2] = totals.get(r % 2, 0) + r\n\
             def scratch():\n    rows = []\n    rows.append(99)\n    return rows\n\
             add(1)\nadd(2)\nadd(3)\n\
             local = scratch()\n\
             count = len(rows)\n",
        )
        .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.result["rows"], json!([1, 2, 3]));
    assert_eq!(outcome.result["count"], json!(3));
    assert_eq!(outcome.result["totals"], json!({"1": 4, "0": 2}));
    assert_eq!(outcome.result["local"], json!([99]));
}

#[tokio::test]
async fn test_integer_edge_cases_never_panic() {
    let fixture = Fixture::plain();

    let floor = fixture.run_one("x = (-9223372036854775807 - 1) // -1").await;
    assert_eq!(floor.error.as_deref(), Some("RuntimeError: integer overflow"));

    let modulo = fixture.run_one("x = (-9223372036854775807 - 1) % -1").await;
    assert_eq!(modulo.result, json!({"x": 0}));

    let sliced = fixture.run_one("x = [1, 2, 3][1::9223372036854775807]").await;
    assert_eq!(sliced.result, json!({"x": [2]}));
}

#[tokio::test]
async fn test_deeply_nested_expression_fails_the_variant() {
    let fixture = Fixture::plain();
    let source = format!("x = {}1", "1 + ".repeat(150));
    let outcome = fixture.run_one(&source).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(
        outcome.error.as_deref(),
        Some("SyntaxError: too many nested expressions (line 1)")
    );
    assert_eq!(outcome.result, json!({}));
}

#[tokio::test]
async fn test_evaluation_depth_is_bounded() {
    let mut expr = ast::Expr::Int(1);
    for _ in 0..(interp::MAX_EVAL_DEPTH + 20) {
        expr = ast::Expr::Unary {
            op: ast::UnaryOp::Neg,
            operand: Box::new(expr),
        };
    }
    let unit = rewrite::rewrite(vec![ast::Stmt::Expr(expr)], &Default::default());
    let proxies = ProxyTable::empty();
    let context = ExecutionContext::builder(&proxies).build();
    let err = interp::Interpreter::new(&context, &proxies)
        .run_unit(&unit)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "RuntimeError: maximum recursion depth exceeded");
}

#[tokio::test]
async fn test_panicking_provider_fails_only_its_variant() {
    let tools = ToolSet::new().with_tool("explode", |_| -> anyhow::Result<serde_json::Value> {
        panic!("provider bug")
    });
    let fixture = Fixture::new(tools);
    let result = fixture
        .run(&[("CODE_1A", "explode()"), ("CODE_1B", "x = 1")])
        .await;

    assert!(result.is_success());
    assert_eq!(result.successful_variant.as_deref(), Some("CODE_1B"));
    assert_eq!(
        result.all_errors,
        vec!["CODE_1A: RuntimeError: internal error: provider bug".to_string()]
    );
}
