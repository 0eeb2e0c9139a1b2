#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use logwarden_engine::{DetectorFormat, build_detector, build_exclusion};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    format: FuzzFormat,
    pattern: String,
    /// 디텍터에 넣을 라인 (최대 16개)
    lines: Vec<Vec<u8>>,
}

#[derive(Arbitrary, Debug)]
enum FuzzFormat {
    Custom,
    Dmesg,
    Nginx,
    NginxError,
    Json,
    Syslog,
}

impl FuzzFormat {
    fn as_str(&self) -> &str {
        match self {
            FuzzFormat::Custom => "custom",
            FuzzFormat::Dmesg => "dmesg",
            FuzzFormat::Nginx => "nginx",
            FuzzFormat::NginxError => "nginx-error",
            FuzzFormat::Json => "json",
            FuzzFormat::Syslog => "syslog",
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let Ok(format) = input.format.as_str().parse::<DetectorFormat>() else {
        return;
    };
    // 잘못된 패턴은 Err로 거부되어야 하며 패닉하면 안 된다
    let Ok(detector) = build_detector(format, &input.pattern) else {
        return;
    };
    let exclusion = build_exclusion(&input.pattern).ok().flatten();

    for line in input.lines.iter().take(16) {
        if !detector.detect(line) {
            continue;
        }
        if let Some(extractor) = detector.as_context_extractor() {
            let _ = extractor.context(line);
        }
        if let Some(transformer) = detector.as_message_transformer() {
            let _ = transformer.transform(line);
        }
        if let Some(extractor) = detector.as_timestamp_extractor() {
            let _ = extractor.extract_timestamp(line);
        }
        if let Some(exclusion) = &exclusion {
            let _ = exclusion.detect(line);
        }
    }
});
