//! 배치 상태 머신 -- 매칭된 라인을 사건 단위로 묶습니다.
//!
//! [`Batcher`]는 순수 상태 머신입니다. I/O나 타이머를 갖지 않고, 호출자가 넘겨준
//! 시각으로만 판단합니다. 모니터는 이 값을 하나의 `std::sync::Mutex` 뒤에 두고
//! 읽기 루프와 플러시 타이머가 함께 사용합니다.
//!
//! # 배치 경계
//! - 열린 배치의 첫 타임스탬프(앵커)와 5초 넘게 차이 나는 라인은 새 배치를 엽니다.
//! - 타임스탬프가 없는 라인은 시간 때문에 배치를 닫지 않습니다 (스택 트레이스 이어붙이기).
//! - 1000줄 또는 256 KiB(개행 포함)를 넘게 되는 라인은 현재 배치를 닫고 새 배치의
//!   첫 줄이 됩니다.

use tokio::time::{Duration, Instant};

use crate::detector::Context;
use crate::timestamp::{LineTimestamp, SyslogPriority};

/// 배치 최대 라인 수
pub const MAX_BATCH_LINES: usize = 1000;

/// 배치 본문 최대 바이트 (개행 포함)
pub const MAX_BATCH_BYTES: usize = 256 * 1024;

/// 같은 배치로 묶는 타임스탬프 범위 (초)
pub const GROUPING_WINDOW_SECS: f64 = 5.0;

/// 마지막 매칭 이후 이 시간이 지나면 타이머가 배치를 플러시합니다.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// 타이머 플러시의 최신성 검사 여유
pub const STALENESS_MARGIN: Duration = Duration::from_millis(100);

/// 배치 첫 줄에서 한 번만 추출하는 메타데이터
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchMetadata {
    /// 선두 `<PRI>`
    pub priority: Option<SyslogPriority>,
    /// 디텍터가 추출한 컨텍스트
    pub context: Option<Context>,
    /// 변환 전 첫 줄
    pub raw_line: String,
}

/// 하나의 사건으로 묶인 라인들
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    body: Vec<u8>,
    line_count: usize,
    anchor: Option<LineTimestamp>,
    metadata: BatchMetadata,
}

impl Batch {
    fn open(line: &[u8], timestamp: Option<LineTimestamp>, metadata: BatchMetadata) -> Self {
        Self {
            body: line.to_vec(),
            line_count: 1,
            anchor: timestamp,
            metadata,
        }
    }

    /// 개행으로 이어붙인 본문
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// 본문을 UTF-8 문자열로 (잘못된 바이트는 대체 문자)
    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 라인 수
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// 본문 바이트 수 (개행 포함)
    pub fn byte_count(&self) -> usize {
        self.body.len()
    }

    /// 배치 기준 타임스탬프 (첫 번째로 타임스탬프를 가진 라인)
    pub fn anchor(&self) -> Option<&LineTimestamp> {
        self.anchor.as_ref()
    }

    /// 첫 줄 메타데이터
    pub fn metadata(&self) -> &BatchMetadata {
        &self.metadata
    }

    /// 이 라인이 현재 배치에 들어갈 수 있는지 여부
    fn admits(&self, len: usize, epoch: Option<f64>) -> bool {
        if self.line_count + 1 > MAX_BATCH_LINES || self.body.len() + 1 + len > MAX_BATCH_BYTES {
            return false;
        }
        match (epoch, &self.anchor) {
            (Some(epoch), Some(anchor)) => (epoch - anchor.epoch).abs() <= GROUPING_WINDOW_SECS,
            _ => true,
        }
    }

    fn append(&mut self, line: &[u8], timestamp: Option<LineTimestamp>) {
        self.body.push(b'\n');
        self.body.extend_from_slice(line);
        self.line_count += 1;
        if self.anchor.is_none() {
            self.anchor = timestamp;
        }
    }
}

/// 배치 상태 머신 (Idle ↔ Open)
#[derive(Debug)]
pub struct Batcher {
    open: Option<Batch>,
    last_activity: Instant,
}

impl Batcher {
    /// 빈 상태로 생성합니다.
    pub fn new(now: Instant) -> Self {
        Self {
            open: None,
            last_activity: now,
        }
    }

    /// 열린 배치가 있는지 여부
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// 열린 배치의 라인 수 (없으면 0)
    pub fn line_count(&self) -> usize {
        self.open.as_ref().map_or(0, Batch::line_count)
    }

    /// 마지막으로 라인을 받은 시각
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// 라인을 추가합니다.
    ///
    /// 라인이 현재 배치에 들어가지 못하면 현재 배치를 닫아 반환하고, 라인으로 새 배치를
    /// 엽니다. `metadata`는 새 배치를 열 때만 호출됩니다.
    pub fn push(
        &mut self,
        line: &[u8],
        timestamp: Option<LineTimestamp>,
        metadata: impl FnOnce() -> BatchMetadata,
        now: Instant,
    ) -> Option<Batch> {
        self.last_activity = now;

        let epoch = timestamp.as_ref().map(|t| t.epoch);
        if let Some(batch) = self.open.as_mut()
            && batch.admits(line.len(), epoch)
        {
            batch.append(line, timestamp);
            return None;
        }

        let closed = self.open.take();
        self.open = Some(Batch::open(line, timestamp, metadata()));
        closed
    }

    /// 열린 배치를 무조건 닫습니다 (EOF, 종료).
    pub fn take(&mut self) -> Option<Batch> {
        self.open.take()
    }

    /// 마지막 활동 이후 플러시 간격이 지났을 때만 배치를 닫습니다.
    ///
    /// 타이머가 늦게 깨어나 새 활동과 겹친 경우에는 아무것도 하지 않습니다.
    pub fn take_if_stale(&mut self, now: Instant) -> Option<Batch> {
        if now.saturating_duration_since(self.last_activity) < FLUSH_INTERVAL - STALENESS_MARGIN {
            return None;
        }
        self.open.take()
    }

    /// 타이머가 깨어나야 할 시각 (열린 배치가 없으면 `None`)
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.open.as_ref().map(|_| self.last_activity + FLUSH_INTERVAL)
    }
}
