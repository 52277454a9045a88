use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prediction_core::Clock;

/// 周期触发器
///
/// 从未启动过，或距离上次启动的时间严格大于触发间隔时视为已触发。
#[derive(Debug)]
pub struct Timer {
    trigger_interval: Duration,
    last_start_time: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl Timer {
    pub fn new(trigger_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            trigger_interval,
            last_start_time: None,
            clock,
        }
    }

    pub fn is_triggered(&self) -> bool {
        match self.last_start_time {
            None => true,
            // 时钟回拨时差值为负，不触发
            Some(last) => (self.clock.now() - last)
                .to_std()
                .map(|elapsed| elapsed > self.trigger_interval)
                .unwrap_or(false),
        }
    }

    /// 记录本次启动时间
    pub fn start(&mut self) {
        self.last_start_time = Some(self.clock.now());
    }

    pub fn last_start_time(&self) -> Option<DateTime<Utc>> {
        self.last_start_time
    }

    pub fn trigger_interval(&self) -> Duration {
        self.trigger_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use prediction_testing_utils::ManualClock;

    fn timer(clock: &ManualClock) -> Timer {
        Timer::new(Duration::from_secs(60), Arc::new(clock.clone()))
    }

    #[test]
    fn test_never_started_timer_is_triggered() {
        let clock = ManualClock::at_epoch();
        let timer = timer(&clock);
        assert!(timer.is_triggered());
        assert_eq!(timer.last_start_time(), None);
    }

    #[test]
    fn test_trigger_requires_strictly_more_than_interval() {
        let clock = ManualClock::at_epoch();
        let mut timer = timer(&clock);
        timer.start();
        assert!(!timer.is_triggered());

        clock.advance(ChronoDuration::seconds(60));
        assert!(!timer.is_triggered());

        clock.advance(ChronoDuration::milliseconds(1));
        assert!(timer.is_triggered());
    }

    #[test]
    fn test_restart_resets_the_interval() {
        let clock = ManualClock::at_epoch();
        let mut timer = timer(&clock);
        timer.start();
        clock.advance(ChronoDuration::seconds(61));
        assert!(timer.is_triggered());

        timer.start();
        assert!(!timer.is_triggered());
        assert_eq!(timer.last_start_time(), Some(clock.now()));
    }

    #[test]
    fn test_clock_moving_backwards_does_not_trigger() {
        let clock = ManualClock::at_epoch();
        let mut timer = timer(&clock);
        timer.start();
        clock.advance(ChronoDuration::hours(-1));
        assert!(!timer.is_triggered());
    }
}
