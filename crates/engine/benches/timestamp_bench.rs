//! 타임스탬프 추출 벤치마크
//!
//! 형식별 추출과 타임스탬프가 없는 라인(전체 탐색 실패)의 비용을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use logwarden_engine::timestamp::{extract_syslog_priority, extract_timestamp};

const SAMPLES: &[(&str, &[u8])] = &[
    ("kernel", b"[ 1234.567890] usb 1-1: device descriptor read/64, error -71"),
    ("iso8601", b"2024-01-15T12:00:00.123456Z app[42]: request failed with status 503"),
    ("nginx_error", b"2024/01/15 12:00:00 [error] 1234#0: *5 connect() failed (111: Connection refused)"),
    (
        "nginx_access",
        b"203.0.113.45 - - [15/Jan/2024:12:00:00 +0000] \"GET /api HTTP/1.1\" 502 157 \"-\" \"curl/8.0\"",
    ),
    ("syslog", b"<34>Jan 15 12:00:00 myhost sshd[1234]: Failed password for root"),
    ("none", b"    at com.example.service.Handler.process(Handler.java:118)"),
];

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_timestamp");
    group.throughput(Throughput::Elements(1));

    for (name, line) in SAMPLES {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter(|| extract_timestamp(black_box(line)))
        });
    }

    group.finish();
}

fn bench_priority(c: &mut Criterion) {
    let line: &[u8] = b"<165>1 2024-01-15T12:00:00Z host app - - - message";
    c.bench_function("extract_syslog_priority", |b| {
        b.iter(|| extract_syslog_priority(black_box(line)))
    });
}

criterion_group!(benches, bench_extract, bench_priority);
criterion_main!(benches);
