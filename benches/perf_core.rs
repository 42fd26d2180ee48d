use cosmos_executor::engine::interp::Interpreter;
use cosmos_executor::engine::parser::parse_source;
use cosmos_executor::engine::{rewrite_source, run_variants, ExecutionContext, JsonMap, RunEnv};
use cosmos_executor::tools::{ProxyTable, ToolSet};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const SYNTHETIC_VARIANT: &str = r#"
rows = []
for i in range(200):
    hit = search(f"query {i}")
    rows.append({"id": i, "score": hit["score"] * 2, "tag": str(i % 7)})
ranked = sorted(rows, key=lambda r: -r["score"])
summary = {tag: len([r for r in rows if r["tag"] == tag]) for tag in ["0", "1", "2"]}
"#;

fn proxies() -> ProxyTable {
    let tools = ToolSet::new().with_tool("search", |_| Ok(json!({"score": 1.5})));
    ProxyTable::from_provider(Arc::new(tools))
}

fn bench_parse_and_rewrite(c: &mut Criterion) {
    let names: BTreeSet<String> = ["search".to_string()].into_iter().collect();

    c.bench_function("parse_variant", |b| {
        b.iter(|| {
            let body = parse_source(black_box(SYNTHETIC_VARIANT)).expect("parse");
            black_box(body.len());
        });
    });

    c.bench_function("rewrite_variant", |b| {
        b.iter(|| {
            let unit = rewrite_source(black_box(SYNTHETIC_VARIANT), &names).expect("rewrite");
            black_box(unit.suspension_points);
        });
    });
}

fn bench_interpret(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let table = proxies();
    let context = ExecutionContext::builder(&table).build();
    let unit = rewrite_source(SYNTHETIC_VARIANT, &context.visible_proxy_names()).expect("rewrite");

    c.bench_function("interpret_variant", |b| {
        b.iter(|| {
            let output = runtime
                .block_on(Interpreter::new(&context, &table).run_unit(&unit))
                .expect("run");
            black_box(output.suspensions);
        });
    });
}

fn bench_trial_sequence(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let temp = tempfile::tempdir().expect("tempdir");
    let table = proxies();
    let empty = JsonMap::new();
    let env = RunEnv {
        proxies: &table,
        session_id: "bench",
        output_dir: temp.path(),
        prior_bindings: &empty,
        inputs: &empty,
        variant_globals: &empty,
        echo_prints: false,
    };
    let variants: BTreeMap<String, String> = [
        ("CODE_1A".to_string(), "raise ValueError('first attempt')".to_string()),
        ("CODE_1B".to_string(), "undefined_name".to_string()),
        ("CODE_1C".to_string(), SYNTHETIC_VARIANT.to_string()),
    ]
    .into_iter()
    .collect();

    c.bench_function("trial_sequence_three_variants", |b| {
        b.iter(|| {
            let result = runtime.block_on(run_variants(&variants, &env));
            black_box(result.total_variants_tried);
        });
    });
}

criterion_group!(
    perf_core,
    bench_parse_and_rewrite,
    bench_interpret,
    bench_trial_sequence
);
criterion_main!(perf_core);
