use chrono::{DateTime, Utc};

/// 时间来源
///
/// 调度器的定时器和任务时间窗口都从这里取当前时间，测试中替换为手动时钟。
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
