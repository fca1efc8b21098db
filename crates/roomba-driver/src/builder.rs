//! Builder 模式实现
//!
//! 提供链式构造 `Roomba` 实例的便捷方式。

use crate::config::RoombaConfig;
use crate::error::RoombaError;
use crate::roomba::Roomba;
use roomba_link::Link;
#[cfg(feature = "serial")]
use roomba_link::{SerialConfig, SerialLink};
use tracing::info;

/// Roomba Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use roomba_driver::{RoombaBuilder, RoombaConfig};
///
/// let roomba = RoombaBuilder::new()
///     .config(RoombaConfig {
///         post_reset_ms: 2000,
///         ..Default::default()
///     })
///     .open_serial("/dev/ttyUSB0")
///     .unwrap();
/// roomba.set_safe_mode().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct RoombaBuilder {
    config: RoombaConfig,
    /// 连接后先发送唤醒脉冲
    wake_on_connect: bool,
    /// 连接后立即进入 Passive
    start_on_connect: bool,
    #[cfg(feature = "serial")]
    baud_rate: Option<u32>,
    #[cfg(feature = "serial")]
    invert_wake_line: bool,
}

impl Default for RoombaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RoombaBuilder {
    pub fn new() -> Self {
        Self {
            config: RoombaConfig::default(),
            wake_on_connect: true,
            start_on_connect: true,
            #[cfg(feature = "serial")]
            baud_rate: None,
            #[cfg(feature = "serial")]
            invert_wake_line: false,
        }
    }

    /// 设置引擎配置（可选）
    pub fn config(mut self, config: RoombaConfig) -> Self {
        self.config = config;
        self
    }

    /// 连接后是否发送唤醒脉冲（默认 true）
    pub fn wake_on_connect(mut self, wake: bool) -> Self {
        self.wake_on_connect = wake;
        self
    }

    /// 连接后是否立即 `start()`（默认 true）
    pub fn start_on_connect(mut self, start: bool) -> Self {
        self.start_on_connect = start;
        self
    }

    /// 设置串口波特率（可选，默认 115200）
    #[cfg(feature = "serial")]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// 唤醒线（DTR）是否反相
    #[cfg(feature = "serial")]
    pub fn invert_wake_line(mut self, invert: bool) -> Self {
        self.invert_wake_line = invert;
        self
    }

    /// 在已打开的链路上构建引擎
    ///
    /// 按配置依次执行唤醒和 `start()`。任一步失败时引擎被丢弃
    /// （`Drop` 会尝试停止底盘）。
    ///
    /// # Errors
    /// - `RoombaError::Command`: 唤醒或启动命令写入失败
    pub fn connect<L: Link>(self, link: L) -> Result<Roomba<L>, RoombaError> {
        let roomba = Roomba::new(link, self.config);
        if self.wake_on_connect {
            roomba.wake()?;
        }
        if self.start_on_connect {
            roomba.start()?;
        }
        info!("Roomba connected (mode {:?})", roomba.mode());
        Ok(roomba)
    }

    /// 打开串口并构建引擎
    ///
    /// # Errors
    /// - `RoombaError::Command`: 串口无法打开，或唤醒/启动失败
    #[cfg(feature = "serial")]
    pub fn open_serial(self, port: impl Into<String>) -> Result<Roomba<SerialLink>, RoombaError> {
        let mut serial = SerialConfig::new(port);
        if let Some(baud_rate) = self.baud_rate {
            serial.baud_rate = baud_rate;
        }
        serial.use_wake_line = self.config.use_wake_line;
        serial.invert_wake_line = self.invert_wake_line;

        let link = SerialLink::open(serial)?;
        self.connect(link)
    }
}
