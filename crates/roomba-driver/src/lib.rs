//! 驱动层模块
//!
//! 本模块提供 Roomba 底盘的设备驱动功能，包括：
//! - 协议引擎：所有串口操作经同一把锁串行化，模式状态机在锁内推进
//! - 遥测流读取：独立线程按固定周期读取、校验并分发流帧
//! - 帧交换：单生产者/多读者的"最新一帧"缓冲区
//! - 执行通道：带序号和看门狗的电机命令槽
//!
//! # 使用场景
//!
//! 大多数用户应该通过 `roomba-sdk` 的 prelude 使用这些类型。

mod builder;
pub mod actuation;
pub mod cell;
pub mod clock;
pub mod config;
mod error;
pub mod frame_exchange;
pub mod frame_pump;
pub mod mode;
mod roomba;
pub mod sink;
pub mod telemetry;
pub mod worker;

pub use actuation::{
    ActuationChannel, ActuationError, Direction, FatalHandler, MotorCommand, MotorController,
    MotorDriver, MotorFault, PollOutcome, abort_on_fatal,
};
pub use builder::RoombaBuilder;
pub use cell::LatestCell;
pub use clock::{Clock, MonotonicClock};
pub use config::{
    ActuationConfig, FrameExchangeConfig, FramePumpConfig, RoombaConfig, TelemetryConfig,
};
pub use error::RoombaError;
pub use frame_exchange::{Frame, FrameExchange, FrameReader, FrameRejected};
pub use frame_pump::{FramePump, FramePumpStats, FrameSink, FrameSinkError};
pub use mode::AtomicMode;
pub use roomba::Roomba;
pub use sink::{ChannelSink, TelemetrySink};
pub use telemetry::{ReaderStats, TelemetryPacket, TelemetryReader};
pub use worker::{ShutdownOutcome, StopToken, Ticker, Worker};

#[cfg(any(test, feature = "mock"))]
pub use clock::ManualClock;
