use embedded_hal::delay::DelayNs;
use embedded_timers::clock::Clock;

/// 自己实现一个标准时钟
pub struct StdClock {}

impl StdClock {
    pub fn new() -> Self {
        Self {}
    }
}

impl Clock for StdClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn elapsed(&self, instant: Self::Instant) -> std::time::Duration {
        instant.elapsed()
    }
}

// 必须 Send + Sync 才能跨线程
unsafe impl Send for StdClock {}
unsafe impl Sync for StdClock {}

/// 基于std的阻塞延时
///
/// 传感器驱动只要求"睡眠N毫秒"的能力，毫秒粒度即可，
/// 线程睡眠的调度误差对测量等待来说无关紧要
pub struct StdDelay {}

impl StdDelay {
    pub fn new() -> Self {
        Self {}
    }
}

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
