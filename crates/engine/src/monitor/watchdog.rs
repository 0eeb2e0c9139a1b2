//! 비활성 감시 -- 소스가 조용해지면 한 번, 다시 살아나면 한 번 알립니다.
//!
//! 읽기 루프는 라인마다 [`InactivityWatchdog::touch`]를 호출하고, 감시 태스크는
//! 주기적으로 [`InactivityWatchdog::check_at`]을 호출합니다. 상태는 원자 변수만
//! 사용하므로 배치 잠금과 무관합니다.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::time::{Duration, Instant};

/// 감시 주기 하한
const MIN_PERIOD: Duration = Duration::from_millis(100);

/// 감시 주기 상한
const MAX_PERIOD: Duration = Duration::from_secs(10);

/// 감시 상태 전이
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// 임계값을 넘겨 조용해짐
    Silent {
        /// 마지막 읽기 이후 경과 시간
        idle: Duration,
    },
    /// 경보 이후 다시 라인이 들어옴
    Resumed,
}

/// 소스별 비활성 감시기
#[derive(Debug)]
pub struct InactivityWatchdog {
    threshold: Duration,
    base: Instant,
    last_read_ms: AtomicU64,
    alerted: AtomicBool,
}

impl InactivityWatchdog {
    /// 임계값으로 생성합니다. 생성 시각을 마지막 읽기로 간주합니다.
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            base: Instant::now(),
            last_read_ms: AtomicU64::new(0),
            alerted: AtomicBool::new(false),
        }
    }

    /// 비활성 임계값
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// 감시 주기: `max(100ms, min(10s, threshold / 2))`
    pub fn period(&self) -> Duration {
        (self.threshold / 2).clamp(MIN_PERIOD, MAX_PERIOD)
    }

    /// 경보 상태인지 여부
    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    /// 라인을 읽었음을 기록합니다.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// 지정 시각에 라인을 읽었음을 기록합니다.
    pub fn touch_at(&self, now: Instant) {
        let offset = now.saturating_duration_since(self.base).as_millis();
        self.last_read_ms
            .store(u64::try_from(offset).unwrap_or(u64::MAX), Ordering::Release);
    }

    /// 마지막 읽기 이후 경과 시간
    pub fn idle_at(&self, now: Instant) -> Duration {
        let last = self.base + Duration::from_millis(self.last_read_ms.load(Ordering::Acquire));
        now.saturating_duration_since(last)
    }

    /// 현재 시각 기준 상태 전이를 확인합니다.
    pub fn check(&self) -> Option<WatchdogEvent> {
        self.check_at(Instant::now())
    }

    /// 지정 시각 기준 상태 전이를 확인합니다.
    ///
    /// 전이가 일어난 호출에서만 `Some`을 반환합니다.
    pub fn check_at(&self, now: Instant) -> Option<WatchdogEvent> {
        let idle = self.idle_at(now);
        if idle >= self.threshold {
            self.alerted
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .ok()
                .map(|_| WatchdogEvent::Silent { idle })
        } else {
            self.alerted
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .ok()
                .map(|_| WatchdogEvent::Resumed)
        }
    }
}
