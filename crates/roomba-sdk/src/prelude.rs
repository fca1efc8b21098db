//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use roomba_sdk::prelude::*;
//! ```

// 协议引擎
pub use crate::driver::{Roomba, RoombaBuilder, RoombaConfig};

// 遥测
pub use crate::driver::sink::{ChannelSink, TelemetrySink};
pub use crate::driver::{TelemetryConfig, TelemetryPacket, TelemetryReader};

// 帧交换与电机执行
pub use crate::driver::{
    ActuationChannel, ActuationConfig, Direction, FrameExchange, FrameExchangeConfig, FramePump,
    FramePumpConfig, FrameSink, MotorController, MotorDriver,
};

// 协议类型
pub use crate::protocol::{
    LedState, Melody, Mode, MotorMask, RADIUS_STRAIGHT, RADIUS_TURN_IN_PLACE, SensorPacket,
    SensorSnapshot,
};

// 链路
pub use crate::link::Link;
#[cfg(feature = "serial")]
pub use crate::link::{SerialConfig, SerialLink};

// 错误类型
pub use crate::driver::{ActuationError, RoombaError};
pub use crate::link::LinkError;
pub use crate::protocol::ProtocolError;
