//! Benchmarks for per-notification listener overhead
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowhook::debug::{find_trigger, Breakpoint, Condition, Subtree, Unrestricted};
use flowhook::element::{NamedElement, Token};
use flowhook::listener::{dispatch, ExecutionCounter, ExecutionTimer, NullListener};
use flowhook::scripting::ExpressionEngine;
use flowhook::{Listener, MultiListener, Stage, StageSet};
use std::sync::Arc;

fn bench_multi_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_dispatch");
    let element = NamedElement::new("/Flow/Branch/Display");
    let token = Token::Int(42);

    for children in [1usize, 4, 16].iter() {
        group.throughput(Throughput::Elements(Stage::ALL.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(children),
            children,
            |b, &children| {
                let mut multi = MultiListener::new();
                for i in 0..children {
                    let child: Box<dyn Listener> = if i % 2 == 0 {
                        Box::new(ExecutionCounter::with_refresh_interval(u64::MAX))
                    } else {
                        Box::new(ExecutionTimer::new().with_refresh_interval(u64::MAX))
                    };
                    multi.add(child);
                }
                multi.start();

                b.iter(|| {
                    for stage in Stage::ALL {
                        let token = stage.carries_token().then_some(&token);
                        dispatch(&mut multi, stage, &element, black_box(token)).unwrap();
                    }
                });
            },
        );
    }

    group.bench_function("null", |b| {
        let mut null = NullListener;
        b.iter(|| {
            for stage in Stage::ALL {
                dispatch(&mut null, stage, &element, None).unwrap();
            }
        });
    });

    group.finish();
}

fn bench_find_trigger(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_trigger");
    let engine = Arc::new(ExpressionEngine::new());
    let element = NamedElement::new("/Flow/Branch/Display");
    let token = Token::Int(7);

    for count in [1usize, 10, 100].iter() {
        // every breakpoint misses, so the whole list is searched
        let by_path: Vec<Breakpoint> = (0..*count)
            .map(|i| Breakpoint::at_path(format!("/Flow/e{}", i), StageSet::ALL))
            .collect();
        group.bench_with_input(BenchmarkId::new("path", count), &by_path, |b, bps| {
            b.iter(|| {
                find_trigger(bps, &Unrestricted, &element, Stage::PreInput, Some(&token)).unwrap()
            });
        });

        let conditional: Vec<Breakpoint> = (0..*count)
            .map(|i| {
                let condition =
                    Condition::compile(&engine, &format!("token > {}", 1000 + i)).unwrap();
                Breakpoint::anywhere(StageSet::ALL, condition)
            })
            .collect();
        group.bench_with_input(
            BenchmarkId::new("expression", count),
            &conditional,
            |b, bps| {
                b.iter(|| {
                    find_trigger(bps, &Unrestricted, &element, Stage::PreInput, Some(&token))
                        .unwrap()
                });
            },
        );
    }

    let out_of_scope = vec![Breakpoint::anywhere(StageSet::ALL, Condition::Always)];
    let scope = Subtree::new("/Other");
    group.bench_function("scope_refusal", |b| {
        b.iter(|| {
            find_trigger(&out_of_scope, &scope, &element, Stage::PreExecute, None).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_multi_dispatch, bench_find_trigger);
criterion_main!(benches);
