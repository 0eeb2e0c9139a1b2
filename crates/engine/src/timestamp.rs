//! 타임스탬프 추출 -- 형식을 모르는 로그 라인에서 시각을 찾아냅니다.
//!
//! 다섯 가지 인코딩을 선두 바이트로 빠르게 분기한 뒤, 각 파서가 고정 위치의
//! 문자 클래스를 먼저 검증하고 나서 숫자로 변환합니다. 검증에 실패하면 에러 대신
//! 다음 파서로 넘어갑니다.
//!
//! | 선두 바이트 | 형식 | 예시 |
//! |---|---|---|
//! | `[` | 커널 | `[ 123.456789] ...` |
//! | 숫자 | ISO-8601, nginx error | `2023-10-27T10:00:00Z`, `2023/10/27 10:00:00` |
//! | `<`, 대문자 | syslog (BSD) | `<34>Oct 11 22:14:15 ...` |
//! | 그 외 | nginx access (라인 전체 탐색) | `... [10/Oct/2023:13:55:36 -0700] ...` |
//!
//! # 사용 예시
//! ```
//! use logwarden_engine::timestamp::extract_timestamp;
//!
//! let ts = extract_timestamp(b"[   2.456789] ACPI Error: AE_NOT_FOUND").unwrap();
//! assert_eq!(ts.text, "2.456789");
//! assert!((ts.epoch - 2.456789).abs() < 1e-9);
//! ```

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};

/// 커널 타임스탬프의 닫는 괄호를 찾는 최대 범위 (바이트)
const KERNEL_BRACKET_LIMIT: usize = 32;

/// syslog 타임스탬프 `Mon dd hh:mm:ss`의 길이
const SYSLOG_STAMP_LEN: usize = 15;

/// nginx access 타임스탬프 `DD/Mon/YYYY:hh:mm:ss +zzzz`의 길이 (괄호 제외)
const ACCESS_STAMP_LEN: usize = 26;

/// syslog 연도 추론 시 허용하는 미래 오차 (일)
const SYSLOG_FUTURE_TOLERANCE_DAYS: i64 = 30;

/// RFC 5424에서 유효한 최대 PRI 값
/// facility 최댓값 23 * 8 + severity 최댓값 7 = 191
const MAX_SYSLOG_PRI: u16 = 191;

/// 라인에서 추출한 타임스탬프
#[derive(Debug, Clone, PartialEq)]
pub struct LineTimestamp {
    /// Unix epoch 초 (커널 형식은 부팅 이후 초)
    pub epoch: f64,
    /// 라인에 적힌 원문
    pub text: String,
}

impl LineTimestamp {
    fn new(epoch: f64, text: impl Into<String>) -> Self {
        Self {
            epoch,
            text: text.into(),
        }
    }
}

/// 선두 `<PRI>`에서 디코딩한 syslog 우선순위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyslogPriority {
    /// PRI 값 (0–191)
    pub priority: u8,
    /// facility = PRI / 8
    pub facility: u8,
    /// severity = PRI % 8
    pub severity: u8,
}

/// 라인에서 타임스탬프를 찾습니다.
///
/// syslog 연도 추론에는 현재 시각을 사용합니다.
pub fn extract_timestamp(line: &[u8]) -> Option<LineTimestamp> {
    extract_timestamp_at(line, Utc::now())
}

/// 기준 시각을 지정해 타임스탬프를 찾습니다.
pub fn extract_timestamp_at(line: &[u8], now: DateTime<Utc>) -> Option<LineTimestamp> {
    let first = *line.first()?;
    let anchored = match first {
        b'[' => parse_kernel(line),
        b'0'..=b'9' => parse_iso8601(line).or_else(|| parse_nginx_error(line)),
        b'<' | b'A'..=b'Z' => parse_syslog_at(line, now),
        _ => None,
    };
    anchored.or_else(|| parse_nginx_access(line))
}

/// 선두 `<NNN>` syslog 우선순위를 추출합니다.
///
/// 1–3자리 숫자, 191 이하만 허용합니다.
pub fn extract_syslog_priority(line: &[u8]) -> Option<SyslogPriority> {
    let (priority, _) = split_pri(line)?;
    let priority = u8::try_from(priority).ok()?;
    Some(SyslogPriority {
        priority,
        facility: priority / 8,
        severity: priority % 8,
    })
}

// ─── 커널 ────────────────────────────────────────────────────────────

/// `[seconds.fraction]` 형식 커널 타임스탬프
pub fn parse_kernel(line: &[u8]) -> Option<LineTimestamp> {
    let (epoch, text, _) = kernel_prefix(line)?;
    Some(LineTimestamp::new(epoch, text))
}

/// 커널 타임스탬프 값, 원문, 닫는 괄호 다음 위치를 반환합니다.
pub(crate) fn kernel_prefix(line: &[u8]) -> Option<(f64, &str, usize)> {
    if line.first() != Some(&b'[') {
        return None;
    }
    let window = &line[..line.len().min(KERNEL_BRACKET_LIMIT)];
    let close = window.iter().position(|&b| b == b']')?;

    let inner = &line[1..close];
    let start = inner.iter().position(|&b| b != b' ')?;
    let inner = &inner[start..];
    if !inner.iter().all(|b| b.is_ascii_digit() || *b == b'.')
        || !inner.iter().any(u8::is_ascii_digit)
    {
        return None;
    }

    let text = std::str::from_utf8(inner).ok()?;
    let epoch: f64 = text.parse().ok()?;
    Some((epoch, text, close + 1))
}

// ─── ISO-8601 ────────────────────────────────────────────────────────

/// `YYYY-MM-DD[T ]hh:mm:ss[.frac][Z|±hh:mm|±hhmm]`
///
/// 시간대가 없으면 UTC로 간주합니다.
pub fn parse_iso8601(line: &[u8]) -> Option<LineTimestamp> {
    if line.len() < 19
        || line[4] != b'-'
        || line[7] != b'-'
        || !(line[10] == b'T' || line[10] == b' ')
        || line[13] != b':'
        || line[16] != b':'
    {
        return None;
    }
    let year = digits(line, 0, 4)?;
    let month = digits(line, 5, 2)?;
    let day = digits(line, 8, 2)?;
    let hour = digits(line, 11, 2)?;
    let minute = digits(line, 14, 2)?;
    let second = digits(line, 17, 2)?;

    let mut end = 19;
    let mut nanos = 0u32;
    if line.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < line.len() && line[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end == frac_start {
            return None;
        }
        nanos = fraction_nanos(&line[frac_start..frac_end]);
        end = frac_end;
    }

    let mut offset_secs = 0i64;
    match line.get(end) {
        Some(b'Z') => end += 1,
        Some(&sign @ (b'+' | b'-')) => {
            if let Some((offset, len)) = parse_zone_offset(&line[end + 1..]) {
                offset_secs = if sign == b'-' { -offset } else { offset };
                end += 1 + len;
            }
        }
        _ => {}
    }

    let naive = build_datetime(year as i32, month, day, hour, minute, second, nanos)?;
    let epoch = naive_epoch(&naive) - offset_secs as f64;
    let text = std::str::from_utf8(&line[..end]).ok()?;
    Some(LineTimestamp::new(epoch, text))
}

/// `hh:mm`, `hhmm`, `hh` 형식 시간대 오프셋 (초, 소비한 바이트 수)
fn parse_zone_offset(rest: &[u8]) -> Option<(i64, usize)> {
    let hours = digits(rest, 0, 2)?;
    let (minutes, len) = if rest.get(2) == Some(&b':') {
        (digits(rest, 3, 2)?, 5)
    } else if let Some(m) = digits(rest, 2, 2) {
        (m, 4)
    } else {
        (0, 2)
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some((i64::from(hours) * 3600 + i64::from(minutes) * 60, len))
}

// ─── nginx ───────────────────────────────────────────────────────────

/// nginx error log `YYYY/MM/DD hh:mm:ss` (시간대 없음, UTC로 간주)
pub fn parse_nginx_error(line: &[u8]) -> Option<LineTimestamp> {
    if line.len() < 19
        || line[4] != b'/'
        || line[7] != b'/'
        || line[10] != b' '
        || line[13] != b':'
        || line[16] != b':'
    {
        return None;
    }
    let year = digits(line, 0, 4)?;
    let month = digits(line, 5, 2)?;
    let day = digits(line, 8, 2)?;
    let hour = digits(line, 11, 2)?;
    let minute = digits(line, 14, 2)?;
    let second = digits(line, 17, 2)?;

    let naive = build_datetime(year as i32, month, day, hour, minute, second, 0)?;
    let text = std::str::from_utf8(&line[..19]).ok()?;
    Some(LineTimestamp::new(naive_epoch(&naive), text))
}

/// nginx access log `[DD/Mon/YYYY:hh:mm:ss ±zzzz]` (라인 어디에 있어도 됨)
///
/// 원문에는 괄호가 포함되지 않습니다.
pub fn parse_nginx_access(line: &[u8]) -> Option<LineTimestamp> {
    let mut from = 0;
    while let Some(rel) = line[from..].iter().position(|&b| b == b'[') {
        let open = from + rel;
        if let Some(ts) = parse_access_at(line, open) {
            return Some(ts);
        }
        from = open + 1;
    }
    None
}

fn parse_access_at(line: &[u8], open: usize) -> Option<LineTimestamp> {
    let close = open + 1 + ACCESS_STAMP_LEN;
    if line.get(close) != Some(&b']') {
        return None;
    }
    let s = &line[open + 1..close];
    if s[2] != b'/' || s[6] != b'/' || s[11] != b':' || s[14] != b':' || s[17] != b':' {
        return None;
    }
    if s[20] != b' ' || !(s[21] == b'+' || s[21] == b'-') {
        return None;
    }
    let day = digits(s, 0, 2)?;
    let month = month_number(&s[3..6])?;
    let year = digits(s, 7, 4)?;
    let hour = digits(s, 12, 2)?;
    let minute = digits(s, 15, 2)?;
    let second = digits(s, 18, 2)?;
    let zone_hours = digits(s, 22, 2)?;
    let zone_minutes = digits(s, 24, 2)?;

    let naive = build_datetime(year as i32, month, day, hour, minute, second, 0)?;
    let offset = i64::from(zone_hours) * 3600 + i64::from(zone_minutes) * 60;
    let offset = if s[21] == b'-' { -offset } else { offset };
    let text = std::str::from_utf8(s).ok()?;
    Some(LineTimestamp::new(naive_epoch(&naive) - offset as f64, text))
}

// ─── syslog ──────────────────────────────────────────────────────────

/// BSD syslog `[<PRI>]Mon dd hh:mm:ss`
///
/// 연도는 현재 연도로 추론하며, 결과가 30일 넘게 미래이면 전년도로 돌립니다.
pub fn parse_syslog(line: &[u8]) -> Option<LineTimestamp> {
    parse_syslog_at(line, Utc::now())
}

/// 기준 시각을 지정한 [`parse_syslog`]
pub fn parse_syslog_at(line: &[u8], now: DateTime<Utc>) -> Option<LineTimestamp> {
    let body = if line.first() == Some(&b'<') {
        let (_, consumed) = split_pri(line)?;
        &line[consumed..]
    } else {
        line
    };

    // RFC 5424: <PRI>1 2023-10-27T10:00:00Z ...
    if let [b'1', b' ', rest @ ..] = body {
        return parse_iso8601(rest);
    }

    if body.len() < SYSLOG_STAMP_LEN
        || body[3] != b' '
        || body[6] != b' '
        || body[9] != b':'
        || body[12] != b':'
    {
        return None;
    }
    let month = month_number(&body[0..3])?;
    let day = if body[4] == b' ' {
        digits(body, 5, 1)?
    } else {
        digits(body, 4, 2)?
    };
    let hour = digits(body, 7, 2)?;
    let minute = digits(body, 10, 2)?;
    let second = digits(body, 13, 2)?;

    let mut naive = build_datetime(now.year(), month, day, hour, minute, second, 0)?;
    if naive.and_utc() > now + ChronoDuration::days(SYSLOG_FUTURE_TOLERANCE_DAYS) {
        naive = build_datetime(now.year() - 1, month, day, hour, minute, second, 0)?;
    }

    let text = std::str::from_utf8(&body[..SYSLOG_STAMP_LEN]).ok()?;
    Some(LineTimestamp::new(naive_epoch(&naive), text))
}

/// `<NNN>`의 값과 소비한 바이트 수 (1–3자리, 191 이하)
fn split_pri(line: &[u8]) -> Option<(u16, usize)> {
    if line.first() != Some(&b'<') {
        return None;
    }
    let close = line.iter().take(5).position(|&b| b == b'>')?;
    let len = close - 1;
    if !(1..=3).contains(&len) {
        return None;
    }
    let value = digits(line, 1, len)?;
    let value = u16::try_from(value).ok()?;
    if value > MAX_SYSLOG_PRI {
        return None;
    }
    Some((value, close + 1))
}

// ─── 공통 헬퍼 ───────────────────────────────────────────────────────

/// `line[start..start+len]`이 모두 숫자이면 값을 반환합니다.
fn digits(line: &[u8], start: usize, len: usize) -> Option<u32> {
    let slice = line.get(start..start + len)?;
    slice.iter().try_fold(0u32, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + u32::from(b - b'0'))
    })
}

fn month_number(name: &[u8]) -> Option<u32> {
    let month = match name {
        b"Jan" => 1,
        b"Feb" => 2,
        b"Mar" => 3,
        b"Apr" => 4,
        b"May" => 5,
        b"Jun" => 6,
        b"Jul" => 7,
        b"Aug" => 8,
        b"Sep" => 9,
        b"Oct" => 10,
        b"Nov" => 11,
        b"Dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// 소수부 숫자열을 나노초로 변환합니다 (9자리 초과분은 버림).
fn fraction_nanos(frac: &[u8]) -> u32 {
    let mut nanos = 0u32;
    for i in 0..9 {
        let digit = frac.get(i).map_or(0, |b| u32::from(b - b'0'));
        nanos = nanos * 10 + digit;
    }
    nanos
}

/// 범위를 검증하고 날짜/시각을 조립합니다. 윤초(60)는 다음 초로 넘깁니다.
fn build_datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    nanos: u32,
) -> Option<NaiveDateTime> {
    if !(1..=31).contains(&day) || hour > 23 || minute > 59 || second > 60 {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let base = date.and_hms_nano_opt(hour, minute, second.min(59), nanos)?;
    if second == 60 {
        return base.checked_add_signed(ChronoDuration::seconds(1));
    }
    Some(base)
}

fn naive_epoch(naive: &NaiveDateTime) -> f64 {
    let utc = naive.and_utc();
    utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) / 1e9
}
