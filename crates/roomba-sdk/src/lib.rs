//! Roomba SDK - iRobot Roomba / Create 2 Rust SDK
//!
//! 通过串口 Open Interface（OI）控制底盘，并在多个线程之间交换遥测、视频帧和电机命令。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 操作码、模式状态机、传感器包表、流帧校验
//! - **链路层** (`link`): 字节流链路抽象，USB 串口和 Mock 实现
//! - **驱动层** (`driver`): 协议引擎、遥测读取线程、帧交换、电机执行通道
//!
//! # 快速开始
//!
//! ```no_run
//! use roomba_sdk::prelude::*;
//!
//! roomba_sdk::init_logger();
//! let roomba = RoombaBuilder::new().open_serial("/dev/ttyUSB0")?;
//! roomba.set_safe_mode()?;
//! roomba.drive(200, RADIUS_STRAIGHT)?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! roomba.drive_stop()?;
//! println!("battery: {} mV", roomba.read_sensor_value(SensorPacket::Voltage)?);
//! # Ok::<(), RoombaError>(())
//! ```

pub use roomba_driver as driver;
pub use roomba_link as link;
pub use roomba_protocol as protocol;

pub mod prelude;

// --- 用户以此为界 ---

pub use driver::{
    ActuationChannel, FrameExchange, FramePump, MotorController, Roomba, RoombaBuilder,
    RoombaConfig, RoombaError, TelemetryPacket, TelemetryReader,
};
pub use link::{Link, LinkError};
pub use protocol::{Mode, ProtocolError, SensorPacket};

use tracing_log::AsLog;
use tracing_subscriber::EnvFilter;

/// 默认日志过滤（匹配所有 `roomba_*` crate）
pub const DEFAULT_LOG_FILTER: &str = "roomba=info";

/// 初始化日志
///
/// 安装 `tracing-subscriber` 的 fmt 输出，过滤规则取自 `RUST_LOG`，
/// 未设置时使用 [`DEFAULT_LOG_FILTER`]。同时把 `log` 记录桥接到 `tracing`。
/// 重复调用无副作用。
pub fn init_logger() {
    let _ = try_init_logger(DEFAULT_LOG_FILTER);
}

/// 以指定的默认过滤规则初始化日志
///
/// # 错误
/// 全局 subscriber 或 `log` logger 已被设置时返回错误。
pub fn try_init_logger(
    default_filter: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let max_level = filter
        .max_level_hint()
        .map(|level| level.as_log())
        .unwrap_or(log::LevelFilter::Trace);

    tracing_log::LogTracer::builder()
        .with_max_level(max_level)
        .init()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
