//! 连接重试的指数退避。

use std::time::Duration;

/// 第 n 次连续失败后的等待为 `base * 2^(n-1)`，上限 `max`；永不放弃。
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// 记录一次失败并返回下一次尝试前的等待时间。
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let exponent = (self.failures - 1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
