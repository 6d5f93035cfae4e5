//! Benchmarks PDG construction cost (spec §4.5 "Bounds and termination":
//! construction is bounded by input size) across function count and body
//! size, so regressions against that bound show up before they reach the
//! dispatcher's wall-clock budgets (spec §5).
//!
//! Run with: cargo bench --bench pdg_construction

use codegraph_ir::dispatcher::parse_and_resolve;
use codegraph_ir::features::pdg::build_pdg;
use codegraph_ir::pipeline::preprocessors::sanitizer::SanitizerPolicy;
use codegraph_ir::shared::models::symbol::Language;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn generate_python_module(function_count: usize, statements_per_function: usize) -> String {
    (0..function_count)
        .map(|i| {
            let body: String = (0..statements_per_function)
                .map(|j| format!("    x{j} = x{j} + {i}\n"))
                .collect();
            format!("def f_{i}(x0):\n{body}    return x0\n\n")
        })
        .collect()
}

fn bench_pdg_per_function_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("pdg_construction/function_count");
    for &count in &[1usize, 10, 50, 200] {
        let source = generate_python_module(count, 5);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &source, |b, source| {
            b.iter(|| {
                let (program, _table, _report) = parse_and_resolve(
                    black_box(source),
                    Language::Python,
                    &SanitizerPolicy::default(),
                    true,
                    "bench_module",
                )
                .expect("module must parse");

                for function in program.function_nodes() {
                    black_box(build_pdg(&program, function));
                }
            })
        });
    }
    group.finish();
}

fn bench_pdg_per_function_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("pdg_construction/statements_per_function");
    for &stmts in &[5usize, 25, 100, 400] {
        let source = generate_python_module(1, stmts);
        group.throughput(Throughput::Elements(stmts as u64));
        group.bench_with_input(BenchmarkId::from_parameter(stmts), &source, |b, source| {
            b.iter(|| {
                let (program, _table, _report) = parse_and_resolve(
                    black_box(source),
                    Language::Python,
                    &SanitizerPolicy::default(),
                    true,
                    "bench_module",
                )
                .expect("module must parse");

                let function = program.function_nodes()[0];
                black_box(build_pdg(&program, function));
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pdg_per_function_count, bench_pdg_per_function_size);
criterion_main!(benches);
