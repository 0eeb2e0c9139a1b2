//! 커널 로그(dmesg) 상관 디텍터
//!
//! 에러 키워드에 매칭된 라인의 타임스탬프와 헤더(괄호 뒤 `:` 앞의 서브시스템 이름)를
//! 기억해 두었다가, 키워드가 없는 후속 라인이라도 같은 사건의 일부로 보이면 포함시킵니다.
//!
//! ```text
//! [  12.000100] ata1.00: exception Emask 0x0 SAct 0x0 SErr 0x0 action 0x6 frozen   ← 매칭, 상태 갱신
//! [  12.000200] ata1.00: cmd ca/00:08:00:00:00/00:00:00:00:00/e0 tag 0             ← 헤더 관련, 포함
//! [  12.000300] ata1: hard resetting link                                            ← 접두어 관계, 포함
//! [  12.000400] ata2: SATA link up 6.0 Gbps                                          ← 무관, 제외
//! ```
//!
//! 관련성 판단은 양방향 접두어 비교라서 `eth1`과 `eth10`도 관련된 것으로 봅니다.

use std::borrow::Cow;
use std::sync::Mutex;

use regex::bytes::Regex;
use tokio::time::{Duration, Instant};

use super::{Detector, MessageTransformer};
use crate::error::EngineError;
use crate::timestamp::kernel_prefix;

/// 커널 에러 키워드
pub const KERNEL_KEYWORDS: &str = r"(?i)(error|fail|panic|oops|exception)";

/// 후속 라인을 같은 사건으로 볼 최대 간격 (초)
pub const CORRELATION_WINDOW_SECS: f64 = 5.0;

/// 마지막으로 확인된 에러
#[derive(Debug, Clone)]
struct Tracked {
    timestamp: f64,
    header: String,
    matched_at: Instant,
}

/// 상태를 가진 커널 로그 디텍터
///
/// 모니터 하나가 독점해야 합니다. 여러 모니터가 공유하면 서로의 상태를 덮어씁니다.
pub struct KernelDetector {
    keywords: Regex,
    last: Mutex<Option<Tracked>>,
}

impl KernelDetector {
    /// 새 디텍터를 생성합니다.
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            keywords: Regex::new(KERNEL_KEYWORDS)?,
            last: Mutex::new(None),
        })
    }

    fn correlates(&self, line: &[u8]) -> bool {
        let guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tracked) = guard.as_ref() else {
            return false;
        };

        match kernel_prefix(line) {
            None => tracked.matched_at.elapsed() <= Duration::from_secs_f64(CORRELATION_WINDOW_SECS),
            Some((timestamp, _, after)) => {
                let delta = timestamp - tracked.timestamp;
                if !(0.0..=CORRELATION_WINDOW_SECS).contains(&delta) {
                    return false;
                }
                header_of(&line[after..]).is_some_and(|header| related(header, &tracked.header))
            }
        }
    }

    fn remember(&self, line: &[u8]) {
        let Some((timestamp, _, after)) = kernel_prefix(line) else {
            return;
        };
        let Some(header) = header_of(&line[after..]) else {
            return;
        };
        let mut guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Tracked {
            timestamp,
            header: header.to_owned(),
            matched_at: Instant::now(),
        });
    }
}

impl Detector for KernelDetector {
    fn kind(&self) -> &'static str {
        "dmesg"
    }

    fn detect(&self, line: &[u8]) -> bool {
        if self.keywords.is_match(line) {
            self.remember(line);
            return true;
        }
        self.correlates(line)
    }

    fn as_message_transformer(&self) -> Option<&dyn MessageTransformer> {
        Some(self)
    }
}

impl MessageTransformer for KernelDetector {
    fn transform<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
        match kernel_prefix(line) {
            Some((_, _, after)) => {
                let rest = &line[after..];
                let start = rest.iter().position(|&b| b != b' ').unwrap_or(rest.len());
                Cow::Borrowed(&rest[start..])
            }
            None => Cow::Borrowed(line),
        }
    }
}

impl std::fmt::Debug for KernelDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("KernelDetector")
            .field("last", &*guard)
            .finish()
    }
}

/// 괄호 뒤 본문에서 `:` 앞의 헤더를 꺼냅니다.
fn header_of(body: &[u8]) -> Option<&str> {
    let colon = body.iter().position(|&b| b == b':')?;
    let header = std::str::from_utf8(&body[..colon]).ok()?.trim();
    (!header.is_empty()).then_some(header)
}

/// 같거나 한쪽이 다른 쪽의 접두어이면 관련된 헤더입니다.
fn related(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> KernelDetector {
        KernelDetector::new().unwrap()
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let d = detector();
        for line in [
            &b"[    1.000000] ACPI Error: AE_NOT_FOUND"[..],
            b"[    1.000000] usb 1-1: device descriptor read/64, FAILED",
            b"Kernel panic - not syncing: Fatal exception",
            b"[    1.000000] Oops: 0000 [#1] SMP",
        ] {
            assert!(d.detect(line), "{}", String::from_utf8_lossy(line));
        }
        assert!(!detector().detect(b"[    1.000000] usb 1-1: new high-speed USB device"));
    }

    #[test]
    fn related_header_within_window_is_included() {
        let d = detector();
        assert!(d.detect(b"[   12.000100] ata1.00: exception Emask 0x0 frozen"));
        assert!(d.detect(b"[   12.000200] ata1.00: cmd ca/00:08 tag 0"));
        assert!(d.detect(b"[   12.000300] ata1: hard resetting link"));
        assert!(!d.detect(b"[   12.000400] ata2: SATA link up 6.0 Gbps"));
    }

    #[test]
    fn header_prefix_is_bidirectional() {
        assert!(related("ata1.00", "ata1"));
        assert!(related("ata1", "ata1.00"));
        assert!(related("ata1", "ata1"));
        assert!(!related("ata1", "ata2"));
        // 접두어 비교라서 숫자가 이어지는 장치명도 관련으로 봄
        assert!(related("eth1", "eth10"));
    }

    #[test]
    fn bracketed_line_outside_window_is_excluded() {
        let d = detector();
        assert!(d.detect(b"[  100.000000] sd 0:0:0:0: error on device"));
        assert!(d.detect(b"[  104.999000] sd 0:0:0:0: sense key medium"));
        assert!(!d.detect(b"[  105.500000] sd 0:0:0:0: sense key medium"));
    }

    #[test]
    fn earlier_kernel_timestamp_is_excluded() {
        let d = detector();
        assert!(d.detect(b"[  100.000000] sd 0:0:0:0: error on device"));
        assert!(!d.detect(b"[   99.000000] sd 0:0:0:0: sense key medium"));
    }

    #[test]
    fn continuation_lines_do_not_extend_window() {
        let d = detector();
        assert!(d.detect(b"[   10.000000] eth0: link error"));
        assert!(d.detect(b"[   14.000000] eth0: tx queue stalled"));
        // 14초 라인은 키워드가 없으므로 기준은 여전히 10초
        assert!(!d.detect(b"[   16.000000] eth0: tx queue stalled"));
    }

    #[test]
    fn keyword_match_without_header_keeps_previous_state() {
        let d = detector();
        assert!(d.detect(b"[   10.000000] eth0: link error"));
        assert!(d.detect(b"[   11.000000] generic failure with no header"));
        assert!(d.detect(b"[   11.500000] eth0: carrier lost"));
    }

    #[test]
    fn nothing_tracked_means_no_correlation() {
        let d = detector();
        assert!(!d.detect(b"    at some_function+0x10/0x20"));
        assert!(!d.detect(b"[   1.000000] eth0: carrier lost"));
    }

    #[tokio::test(start_paused = true)]
    async fn unbracketed_continuation_uses_wall_clock() {
        let d = detector();
        assert!(d.detect(b"[   50.000000] BUG: unable to handle page fault error"));
        assert!(d.detect(b"Call Trace:"));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(d.detect(b" ? do_syscall_64+0x5b/0x1a0"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!d.detect(b" entry_SYSCALL_64_after_hwframe+0x44/0xa9"));
    }

    #[test]
    fn transformer_strips_bracket() {
        let d = detector();
        let t = d.as_message_transformer().unwrap();
        assert_eq!(&*t.transform(b"[ 123.456] Simple message"), b"Simple message");
        assert_eq!(&*t.transform(b"[invalid] timestamp"), b"[invalid] timestamp");
        assert_eq!(&*t.transform(b"no bracket"), b"no bracket");
    }

    #[test]
    fn capabilities() {
        let d = detector();
        assert!(d.as_context_extractor().is_none());
        assert!(d.as_timestamp_extractor().is_none());
        assert_eq!(d.kind(), "dmesg");
    }
}
