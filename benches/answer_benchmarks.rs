//! 应答通道性能基准测试
//!
//! 测试计算侧一次同步请求的往返开销，以及主机侧单次分发的开销

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use host_bridge::bindings::{dispatch, Command};
use host_bridge::config::{AnswerConfig, BridgeConfig, WaitStrategy};
use host_bridge::core::{Backends, BridgeBuilder, BridgeContext};
use host_bridge::network::MemoryFetcher;

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("answer_round_trip");

    let strategies = [
        ("blocking", WaitStrategy::Blocking),
        ("polling", WaitStrategy::Polling { interval_ms: 1 }),
    ];
    for (name, wait) in strategies {
        let config = BridgeConfig {
            answer: AnswerConfig {
                wait,
                ..Default::default()
            },
            ..Default::default()
        };
        let bridge = BridgeBuilder::new(config)
            .fetcher(MemoryFetcher::new())
            .build()
            .unwrap();
        let mut compute = bridge.compute;
        let host = bridge.host.spawn().unwrap();
        let element = compute.create_element("span", "label").unwrap();
        compute.set_text(element, "benchmark").unwrap();

        group.bench_function(BenchmarkId::new("text_len", name), |b| {
            b.iter(|| black_box(compute.text_len(black_box(element)).unwrap()))
        });

        compute.stop_execution().unwrap();
        host.join().unwrap();
    }

    group.finish();
}

fn bench_bytes_answer(c: &mut Criterion) {
    let mut group = c.benchmark_group("bytes_answer");

    for len in [16usize, 1024, 16 * 1024].iter() {
        let bridge = BridgeBuilder::new(BridgeConfig::default())
            .fetcher(MemoryFetcher::new())
            .build()
            .unwrap();
        let mut compute = bridge.compute;
        let host = bridge.host.spawn().unwrap();
        let element = compute.create_element("span", "label").unwrap();
        compute.set_text(element, &"x".repeat(*len)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, _| {
            b.iter(|| black_box(compute.get_text(element).unwrap()))
        });

        compute.stop_execution().unwrap();
        host.join().unwrap();
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut ctx = BridgeContext::new(
        &BridgeConfig::default(),
        Backends::with_fetcher(Box::new(MemoryFetcher::new())),
    );
    dispatch(
        &mut ctx,
        Command::ElementCreate {
            tag: "button".into(),
            kind: "push-button".into(),
        },
    )
    .unwrap();

    c.bench_function("dispatch_get_width", |b| {
        b.iter(|| black_box(dispatch(&mut ctx, Command::ElementGetWidth { element: 0 }).unwrap()))
    });
}

criterion_group!(benches, bench_round_trip, bench_bytes_answer, bench_dispatch);
criterion_main!(benches);
