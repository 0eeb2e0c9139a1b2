//! 디텍터 벤치마크
//!
//! 리터럴/정규식 커스텀 디텍터, 커널 디텍터, JSON 디텍터의 라인당 비용을 측정합니다.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use logwarden_engine::{DetectorFormat, build_detector};

const PLAIN_LINE: &[u8] =
    b"2024-01-15T12:00:00Z worker[7]: job 8812 finished in 245ms, queue depth 3";
const KERNEL_LINE: &[u8] = b"[ 1234.567890] EXT4-fs error (device sda1): ext4_find_entry:1455";
const JSON_LINE: &[u8] = br#"{"ts":"2024-01-15T12:00:00Z","level":"error","msg":"upstream timeout","http":{"status":504}}"#;

fn bench_custom(c: &mut Criterion) {
    let literal = build_detector(DetectorFormat::Custom, "timeout").unwrap();
    let regex = build_detector(DetectorFormat::Custom, r"(?i)time(d)?\s*out|refused").unwrap();

    let mut group = c.benchmark_group("custom_detector");
    group.throughput(Throughput::Bytes(PLAIN_LINE.len() as u64));
    group.bench_function("literal_miss", |b| {
        b.iter(|| literal.detect(black_box(PLAIN_LINE)))
    });
    group.bench_function("regex_miss", |b| b.iter(|| regex.detect(black_box(PLAIN_LINE))));
    group.finish();
}

fn bench_kernel(c: &mut Criterion) {
    let detector = build_detector(DetectorFormat::Kernel, "").unwrap();
    c.bench_function("kernel_detector", |b| {
        b.iter(|| detector.detect(black_box(KERNEL_LINE)))
    });
}

fn bench_json(c: &mut Criterion) {
    let detector = build_detector(DetectorFormat::Json, "level:^error$").unwrap();

    let mut group = c.benchmark_group("json_detector");
    group.bench_function("detect", |b| b.iter(|| detector.detect(black_box(JSON_LINE))));
    group.bench_function("detect_then_context", |b| {
        b.iter(|| {
            let matched = detector.detect(black_box(JSON_LINE));
            let context = detector
                .as_context_extractor()
                .and_then(|extractor| extractor.context(JSON_LINE));
            (matched, context)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_custom, bench_kernel, bench_json);
criterion_main!(benches);
