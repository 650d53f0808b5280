use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hexicript::console::ConsoleHost;
use hexicript::script::{ExecutionContext, Namespace, Parser, Script};
use hexicript::{EngineConfig, ScriptEngine};

fn make_script(handlers: usize) -> String {
    let chunk = "\
on player join:
    set {joins::%player%} to 1
    if {joins::%player%} is greater than 5 and player has permission \"vip\":
        broadcast \"welcome back %player%\"
    else:
        loop 3 times:
            add 1 to {_visits}
";
    chunk.repeat(handlers)
}

fn bench_parse(c: &mut Criterion) {
    let parser = Parser::new().unwrap();
    let small = make_script(10);
    let large = make_script(1000);

    let mut g = c.benchmark_group("parse");
    g.bench_function("small", |b| b.iter(|| Script::parse("bench", black_box(&small), &parser)));
    g.bench_function("large", |b| b.iter(|| Script::parse("bench", black_box(&large), &parser)));
    g.bench_function("classify_namespace", |b| {
        b.iter(|| Namespace::classify(black_box("{joins::%player%}")))
    });
    g.finish();
}

fn bench_execute(c: &mut Criterion) {
    let host = Arc::new(ConsoleHost::with_writer(Box::new(std::io::sink())));
    let engine = ScriptEngine::new(EngineConfig::default(), host).unwrap();
    let counting = engine
        .load("count", "set {_n} to 0\nloop 500 times:\n    add loop-number to {_n}")
        .unwrap();
    let branching = engine
        .load("branch", "loop 200 times:\n    if loop-number is 100:\n        set {hit} to true\n    else:\n        set {miss} to loop-number")
        .unwrap();

    let mut g = c.benchmark_group("execute");
    g.bench_function("loop_add", |b| {
        b.iter(|| engine.execute(&counting, &mut ExecutionContext::console()))
    });
    g.bench_function("loop_branch", |b| {
        b.iter(|| engine.execute(&branching, &mut ExecutionContext::console()))
    });
    g.finish();
    engine.shutdown();
}

criterion_group!(benches, bench_parse, bench_execute);
criterion_main!(benches);
