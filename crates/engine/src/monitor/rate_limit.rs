//! 플러시 단위 속도 제한
//!
//! 윈도우 안에서 `limit`개까지 허용하고, 윈도우 첫 시도로부터 `window`가 지나면
//! 카운터를 초기화합니다. 라인 단위가 아니라 리포트 단위로 적용되므로 그룹핑에는
//! 영향을 주지 않습니다.

use tokio::time::{Duration, Instant};

/// 고정 윈도우 속도 제한기
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    count: u32,
    window_start: Option<Instant>,
}

impl RateLimiter {
    /// 새 제한기를 생성합니다. `limit`이 0이면 항상 허용합니다.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            count: 0,
            window_start: None,
        }
    }

    /// 현재 시각 기준으로 허용 여부를 판단합니다.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// 지정 시각 기준으로 허용 여부를 판단합니다.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }

        let expired = self
            .window_start
            .is_none_or(|start| now.saturating_duration_since(start) > self.window);
        if expired {
            self.window_start = Some(now);
            self.count = 0;
        }

        if self.count < self.limit {
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// 윈도우당 허용 수
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// 윈도우 길이
    pub fn window(&self) -> Duration {
        self.window
    }
}
