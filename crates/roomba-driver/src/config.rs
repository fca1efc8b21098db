//! 配置
//!
//! 全部为 POD 结构体，时间字段以毫秒（或微秒）整数表示，便于 TOML 序列化。
//! 构造后不再改变。

use roomba_protocol::SensorPacket;
use std::time::Duration;

/// 协议引擎配置
///
/// # Example
///
/// ```
/// # use roomba_driver::RoombaConfig;
/// let config = RoombaConfig {
///     use_wake_line: false,
///     ..Default::default()
/// };
/// assert_eq!(config.sensor_read_attempts, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RoombaConfig {
    /// 是否在 `wake()` 时拉动唤醒线
    pub use_wake_line: bool,
    /// 等待发送缓冲区排空的上限
    pub wait_tx_ms: u64,
    /// 唤醒脉冲高电平时长
    pub wake_high_ms: u64,
    /// 唤醒脉冲之后的低电平时长
    pub wake_low_ms: u64,
    /// 模式切换后的稳定时间
    pub mode_settle_ms: u64,
    /// 复位后等待底盘重启的时间
    pub post_reset_ms: u64,
    /// 传感器查询操作码与包 ID 之间的间隔
    pub sensor_cmd_gap_ms: u64,
    /// 发送查询后等待响应的时间（也用作重试间隔）
    pub sensor_response_wait_ms: u64,
    /// 传感器读取尝试次数
    pub sensor_read_attempts: u32,
    /// 流帧逐字节读取超时
    pub stream_read_timeout_ms: u64,
}

impl Default for RoombaConfig {
    fn default() -> Self {
        Self {
            use_wake_line: true,
            wait_tx_ms: 100,
            wake_high_ms: 100,
            wake_low_ms: 500,
            mode_settle_ms: 100,
            post_reset_ms: 1000,
            sensor_cmd_gap_ms: 20,
            sensor_response_wait_ms: 50,
            sensor_read_attempts: 3,
            stream_read_timeout_ms: 100,
        }
    }
}

impl RoombaConfig {
    /// 所有等待时间为 0 的配置（用于 mock 测试）
    #[cfg(any(test, feature = "mock"))]
    pub fn no_delays() -> Self {
        Self {
            use_wake_line: true,
            wait_tx_ms: 0,
            wake_high_ms: 0,
            wake_low_ms: 0,
            mode_settle_ms: 0,
            post_reset_ms: 0,
            sensor_cmd_gap_ms: 0,
            sensor_response_wait_ms: 0,
            sensor_read_attempts: 3,
            stream_read_timeout_ms: 0,
        }
    }

    pub fn wait_tx(&self) -> Duration {
        Duration::from_millis(self.wait_tx_ms)
    }

    pub fn stream_read_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_read_timeout_ms)
    }
}

/// 遥测流读取线程配置
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TelemetryConfig {
    /// 启动时请求的传感器包（为空时假定流已由调用方启动）
    pub packets: Vec<SensorPacket>,
    /// 读取周期
    pub poll_period_ms: u64,
    /// 校验失败或超时后的退避时间
    pub error_backoff_ms: u64,
    /// 停止时等待线程退出的宽限期，超时后强制分离
    pub stop_grace_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            packets: Vec::new(),
            poll_period_ms: 15,
            error_backoff_ms: 100,
            stop_grace_ms: 1000,
        }
    }
}

/// 电机执行通道配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ActuationConfig {
    /// 看门狗窗口：超过该时间没有新命令则停止全部电机（微秒）
    pub watchdog_us: u64,
    /// 控制循环周期（微秒）
    pub poll_period_us: u64,
    /// 控制循环读取命令槽的锁等待上限（微秒）
    pub snapshot_timeout_us: u64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            watchdog_us: 400_000,
            poll_period_us: 1_000,
            snapshot_timeout_us: 500,
        }
    }
}

/// 帧交换配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FrameExchangeConfig {
    /// 单帧最大字节数（缓冲区一次性分配）
    pub capacity: usize,
    /// 读者拷贝时的锁等待上限
    pub copy_lock_timeout_ms: u64,
    /// 生产者发布时的锁等待上限
    pub publish_lock_timeout_ms: u64,
}

impl Default for FrameExchangeConfig {
    fn default() -> Self {
        Self {
            capacity: 128 * 1024,
            copy_lock_timeout_ms: 3000,
            publish_lock_timeout_ms: 5000,
        }
    }
}

/// 视频推流循环配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FramePumpConfig {
    /// 期望的发送周期（发送耗时不足时补足睡眠）
    pub period_ms: u64,
    /// 没有可用帧或发送失败后的退避时间
    pub retry_backoff_ms: u64,
    /// 帧未更新时的等待时间
    pub duplicate_wait_ms: u64,
    /// 停止时的宽限期
    pub stop_grace_ms: u64,
}

impl Default for FramePumpConfig {
    fn default() -> Self {
        Self {
            period_ms: 40,
            retry_backoff_ms: 1000,
            duplicate_wait_ms: 1,
            stop_grace_ms: 2000,
        }
    }
}
