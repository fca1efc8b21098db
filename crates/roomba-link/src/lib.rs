//! # Roomba Link Layer
//!
//! 串口传输抽象层：引擎只依赖 `Link` trait，不关心底层是 USB 串口还是测试桩。
//!
//! ## 后端
//!
//! - `serial`（默认）：基于 `serialport` 的 USB 串口，唤醒线接在 DTR 上
//! - `mock`：内存中的脚本化链路，用于无硬件测试

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialLink};

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockHandle, MockLink};

/// 链路层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] LinkDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Link disconnected")]
    Disconnected,
    #[error("Link not open")]
    NotOpen,
}

/// 设备错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    InvalidConfig,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct LinkDeviceError {
    pub kind: LinkDeviceErrorKind,
    pub message: String,
}

impl LinkDeviceError {
    pub fn new(kind: LinkDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 设备已不可用（重试无意义）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            LinkDeviceErrorKind::NoDevice
                | LinkDeviceErrorKind::NotFound
                | LinkDeviceErrorKind::AccessDenied
        )
    }
}

impl From<&str> for LinkDeviceError {
    fn from(message: &str) -> Self {
        Self::new(LinkDeviceErrorKind::Unknown, message)
    }
}

/// 双向字节流链路
///
/// 所有方法都是阻塞的，且阻塞时间有上界（由超时参数决定）。
/// 引擎通过互斥锁独占访问，实现无需内部同步。
pub trait Link: Send {
    /// 写入全部字节（进入发送缓冲区即可返回）
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// 等待发送缓冲区排空
    ///
    /// 默认实现直接返回，适用于同步写入的后端。
    fn wait_tx_done(&mut self, _timeout: Duration) -> Result<(), LinkError> {
        Ok(())
    }

    /// 接收缓冲区中已有的字节数
    fn bytes_available(&mut self) -> Result<usize, LinkError>;

    /// 在超时内读满 `buf`
    ///
    /// # 错误
    /// - `LinkError::Timeout`: 超时前未读满（已读字节被丢弃）
    fn read_exact_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), LinkError>;

    /// 在超时内读取单个字节
    fn read_byte_timeout(&mut self, timeout: Duration) -> Result<u8, LinkError> {
        let mut byte = [0u8; 1];
        self.read_exact_timeout(&mut byte, timeout)?;
        Ok(byte[0])
    }

    /// 丢弃接收缓冲区中的所有字节
    fn discard_input(&mut self) -> Result<(), LinkError>;

    /// 是否接有唤醒线（BRC）
    fn has_wake_line(&self) -> bool {
        false
    }

    /// 设置唤醒线电平，无唤醒线时为空操作
    fn set_wake_line(&mut self, _high: bool) -> Result<(), LinkError> {
        Ok(())
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        (**self).write_all(bytes)
    }

    fn wait_tx_done(&mut self, timeout: Duration) -> Result<(), LinkError> {
        (**self).wait_tx_done(timeout)
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        (**self).bytes_available()
    }

    fn read_exact_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        (**self).read_exact_timeout(buf, timeout)
    }

    fn read_byte_timeout(&mut self, timeout: Duration) -> Result<u8, LinkError> {
        (**self).read_byte_timeout(timeout)
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        (**self).discard_input()
    }

    fn has_wake_line(&self) -> bool {
        (**self).has_wake_line()
    }

    fn set_wake_line(&mut self, high: bool) -> Result<(), LinkError> {
        (**self).set_wake_line(high)
    }
}
