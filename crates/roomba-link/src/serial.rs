//! USB 串口链路
//!
//! 基于 `serialport`，8N1、无流控。唤醒线（BRC）接在 DTR 上。
//!
//! ## 限制
//!
//! - **权限要求**：Linux 下通常需要 `dialout` 组权限
//! - **DTR 极性**：部分 USB 转串口芯片的 DTR 为反相输出，需要通过 `invert_wake_line` 调整

use crate::{Link, LinkDeviceError, LinkDeviceErrorKind, LinkError};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Create 2 / 600 系列的默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// 串口配置
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// 设备路径（如 "/dev/ttyUSB0"、"COM3"）
    pub port: String,
    pub baud_rate: u32,
    /// 是否使用唤醒线
    pub use_wake_line: bool,
    /// DTR 是否反相
    pub invert_wake_line: bool,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            use_wake_line: true,
            invert_wake_line: false,
        }
    }
}

/// USB 串口链路
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    config: SerialConfig,
    read_timeout: Duration,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("port", &self.config.port)
            .field("baud_rate", &self.config.baud_rate)
            .finish()
    }
}

impl SerialLink {
    /// 打开串口
    ///
    /// # 错误
    /// - `LinkError::Device`: 设备不存在、无权限或参数不被支持
    /// - `LinkError::Io`: 其他 IO 错误
    pub fn open(config: SerialConfig) -> Result<Self, LinkError> {
        let read_timeout = Duration::from_millis(100);
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(LinkError::from)?;

        debug!(
            "Opened serial link {} @ {} baud (wake line: {})",
            config.port, config.baud_rate, config.use_wake_line
        );

        let mut link = Self {
            port,
            config,
            read_timeout,
        };
        // 唤醒线空闲为低
        if link.config.use_wake_line {
            link.set_wake_line(false)?;
        }
        Ok(link)
    }

    /// 列出系统中的串口
    pub fn available_ports() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn ensure_timeout(&mut self, timeout: Duration) -> Result<(), LinkError> {
        if self.read_timeout != timeout {
            self.port.set_timeout(timeout).map_err(LinkError::from)?;
            self.read_timeout = timeout;
        }
        Ok(())
    }
}

impl Link for SerialLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        trace!("TX {:02X?}", bytes);
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn wait_tx_done(&mut self, timeout: Duration) -> Result<(), LinkError> {
        self.port.flush()?;
        let deadline = Instant::now() + timeout;
        loop {
            if self.port.bytes_to_write().map_err(LinkError::from)? == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("Serial TX not drained within {:?}", timeout);
                return Err(LinkError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        Ok(self.port.bytes_to_read().map_err(LinkError::from)? as usize)
    }

    fn read_exact_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout);
            }
            self.ensure_timeout(remaining)?;

            match self.port.read(&mut buf[filled..]) {
                Ok(0) => continue,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(LinkError::Timeout),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(LinkError::Io(e)),
            }
        }

        trace!("RX {:02X?}", buf);
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        self.port.clear(ClearBuffer::Input).map_err(LinkError::from)
    }

    fn has_wake_line(&self) -> bool {
        self.config.use_wake_line
    }

    fn set_wake_line(&mut self, high: bool) -> Result<(), LinkError> {
        if !self.config.use_wake_line {
            return Ok(());
        }
        let level = high != self.config.invert_wake_line;
        self.port
            .write_data_terminal_ready(level)
            .map_err(LinkError::from)
    }
}

impl From<serialport::Error> for LinkError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::Io(kind) => {
                if kind == io::ErrorKind::NotFound {
                    LinkError::Device(LinkDeviceError::new(
                        LinkDeviceErrorKind::NotFound,
                        err.description,
                    ))
                } else if kind == io::ErrorKind::PermissionDenied {
                    LinkError::Device(LinkDeviceError::new(
                        LinkDeviceErrorKind::AccessDenied,
                        err.description,
                    ))
                } else {
                    LinkError::Io(io::Error::new(kind, err.description))
                }
            },
            serialport::ErrorKind::NoDevice => LinkError::Device(LinkDeviceError::new(
                LinkDeviceErrorKind::NoDevice,
                err.description,
            )),
            serialport::ErrorKind::InvalidInput => LinkError::Device(LinkDeviceError::new(
                LinkDeviceErrorKind::InvalidConfig,
                err.description,
            )),
            serialport::ErrorKind::Unknown => LinkError::Device(LinkDeviceError::new(
                LinkDeviceErrorKind::Unknown,
                err.description,
            )),
        }
    }
}
