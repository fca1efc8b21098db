//! # Roomba Protocol
//!
//! Roomba Open Interface (OI) 串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `opcodes`: 操作码与协议常量
//! - `mode`: OI 模式状态机
//! - `control`: 控制命令构建（带参数钳位）
//! - `sensors`: 传感器包 ID 表与全量传感器解析
//! - `stream`: 自同步、带校验和的遥测流帧
//! - `songs`: 内置旋律
//!
//! ## 字节序
//!
//! 协议中所有 16 位字段均为大端字节序（高位在前）。

pub mod control;
pub mod mode;
pub mod opcodes;
pub mod sensors;
pub mod songs;
pub mod stream;

pub use control::*;
pub use mode::*;
pub use opcodes::*;
pub use sensors::*;
pub use songs::{Melody, SongPart};
pub use stream::*;

use thiserror::Error;

/// 协议层错误类型
///
/// 全部为参数/数据校验错误，不涉及任何 IO。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Operation `{operation}` requires Safe or Full mode (current: {mode:?})")]
    ModeNotPermitted {
        operation: &'static str,
        mode: Mode,
    },

    #[error("Mode transition {command:?} not allowed from {from:?}")]
    InvalidTransition { from: Mode, command: ModeCommand },

    #[error("Song slot {0} out of range (0..=4)")]
    InvalidSongSlot(u8),

    #[error("Song note/duration count mismatch: {notes} notes, {durations} durations")]
    NoteCountMismatch { notes: usize, durations: usize },

    #[error("Too many song notes: {0} (max 16)")]
    TooManyNotes(usize),

    #[error("Unknown sensor packet id: {0}")]
    UnknownPacket(u8),

    #[error("Too many stream packets requested: {0} (max 255)")]
    TooManyStreamPackets(usize),

    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Stream checksum mismatch (frame sum = 0x{sum:02X})")]
    ChecksumMismatch { sum: u8 },
}

/// 大端字节序转 i16
pub fn bytes_to_i16_be(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// i16 转大端字节序
pub fn i16_to_bytes_be(value: i16) -> [u8; 2] {
    value.to_be_bytes()
}
