//! "最新值"单元
//!
//! 单写者覆盖、多读者拷贝的共享槽。写者阻塞等待锁（或有上限地等待），
//! 读者总是有上限地等待，拿不到锁时由调用方决定如何降级。
//! 帧交换和电机执行通道都建立在它之上。

use parking_lot::Mutex;
use std::time::Duration;

/// 最新值单元
#[derive(Debug, Default)]
pub struct LatestCell<T> {
    inner: Mutex<T>,
}

impl<T> LatestCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// 在锁内修改（无限等待）
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// 在锁内修改，等待超过 `timeout` 时返回 `None`
    pub fn write_timeout<R>(&self, timeout: Duration, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.inner.try_lock_for(timeout)?;
        Some(f(&mut guard))
    }

    /// 在锁内读取，等待超过 `timeout` 时返回 `None`
    pub fn read_timeout<R>(&self, timeout: Duration, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.inner.try_lock_for(timeout)?;
        Some(f(&guard))
    }
}

impl<T: Copy> LatestCell<T> {
    /// 拷贝当前值（无限等待）
    pub fn snapshot(&self) -> T {
        *self.inner.lock()
    }

    /// 拷贝当前值，等待超过 `timeout` 时返回 `None`
    pub fn snapshot_timeout(&self, timeout: Duration) -> Option<T> {
        self.read_timeout(timeout, |value| *value)
    }
}
