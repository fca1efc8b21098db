//! 引擎当前 OI 模式（原子版本）
//!
//! 模式只在引擎的串口锁内写入；守卫检查通过这里无锁读取，不需要争用串口锁。

use roomba_protocol::Mode;
use std::sync::atomic::{AtomicU8, Ordering};

/// OI 模式（原子版本，用于线程间共享）
///
/// # 示例
///
/// ```rust
/// use roomba_driver::mode::AtomicMode;
/// use roomba_protocol::Mode;
/// use std::sync::atomic::Ordering;
///
/// let mode = AtomicMode::new(Mode::Off);
/// mode.set(Mode::Passive, Ordering::Release);
/// assert_eq!(mode.get(Ordering::Acquire), Mode::Passive);
/// ```
#[derive(Debug)]
pub struct AtomicMode {
    inner: AtomicU8,
}

impl AtomicMode {
    pub fn new(mode: Mode) -> Self {
        Self {
            inner: AtomicU8::new(mode.into()),
        }
    }

    /// 获取当前模式
    ///
    /// 存储的值只可能来自 `set`；无效值按 Off 处理。
    pub fn get(&self, ordering: Ordering) -> Mode {
        Mode::try_from(self.inner.load(ordering)).unwrap_or(Mode::Off)
    }

    pub fn set(&self, mode: Mode, ordering: Ordering) {
        self.inner.store(mode.into(), ordering);
    }

    /// 比较并交换
    ///
    /// 当前值等于 `current` 时设置为 `new` 并返回 true，否则返回 false。
    pub fn compare_exchange(
        &self,
        current: Mode,
        new: Mode,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        self.inner
            .compare_exchange(current.into(), new.into(), success, failure)
            .is_ok()
    }
}

impl Default for AtomicMode {
    fn default() -> Self {
        Self::new(Mode::Off)
    }
}
