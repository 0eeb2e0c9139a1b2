#![no_main]

use libfuzzer_sys::fuzz_target;
use logwarden_engine::{extract_syslog_priority, extract_timestamp};

fuzz_target!(|data: &[u8]| {
    // 어떤 바이트열이든 패닉 없이 Some 또는 None이어야 한다
    let _ = extract_timestamp(data);
    if let Some(priority) = extract_syslog_priority(data) {
        assert!(priority.severity <= 7);
    }
});
