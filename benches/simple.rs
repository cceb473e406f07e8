use criterion::{black_box, criterion_group, criterion_main, Criterion};
use coppice::{Engine, ParserLike, RuleSetBuilder};

fn arithmetic_engine() -> Engine {
    let mut builder = RuleSetBuilder::new();
    builder
        .skip_pattern("WS", r"\s+")
        .choice("expr", &["add", "term"])
        .concatenation("add", &["expr", "plus", "term"])
        .choice("term", &["mul", "atom"])
        .concatenation("mul", &["term", "star", "atom"])
        .choice("atom", &["number", "group"])
        .concatenation("group", &["lparen", "expr", "rparen"])
        .concatenation("number", &["digits"])
        .literal("plus", "+")
        .literal("star", "*")
        .literal("lparen", "(")
        .literal("rparen", ")")
        .pattern("digits", "[0-9]+");
    Engine::new(&builder.source()).unwrap()
}

fn run_benchmark(c: &mut Criterion) {
    let engine = arithmetic_engine();
    let input = "1 + 2 * (3 + 4) * 5 + 6";
    c.bench_function("arithmetic_expression", |b| {
        b.iter(|| engine.parse("expr", black_box(input)).unwrap())
    });
    let mut long_input = String::from("1");
    for i in 0..64 {
        long_input.push_str(if i % 2 == 0 { " + " } else { " * " });
        long_input.push_str(&i.to_string());
    }
    c.bench_function("arithmetic_expression_long", |b| {
        b.iter(|| engine.parse("expr", black_box(&long_input)).unwrap())
    });
}

criterion_group!(benches, run_benchmark);
criterion_main!(benches);
