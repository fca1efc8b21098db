//! 控制命令构建
//!
//! 每个命令 = 1 字节操作码 + 固定/可变长度负载。所有参数钳位规则在此集中实现，
//! 引擎只负责模式检查和串口写入。

use crate::opcodes::*;
use crate::sensors::SensorPacket;
use crate::{ProtocolError, i16_to_bytes_be};
use smallvec::SmallVec;

/// 命令负载缓冲区
///
/// 栈上预留 36 字节，足以覆盖最长的定长命令（写入 16 个音符的歌曲：2 + 32 字节）。
/// 只有传感器流命令在请求大量包 ID 时才会溢出到堆。
pub type CommandBytes = SmallVec<[u8; 36]>;

/// 一条线协议命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: u8,
    payload: CommandBytes,
}

impl Command {
    /// 无负载命令
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            payload: CommandBytes::new(),
        }
    }

    /// 带负载命令
    pub fn with_payload(opcode: u8, payload: &[u8]) -> Self {
        Self {
            opcode,
            payload: CommandBytes::from_slice(payload),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 完整的线上字节（操作码 + 负载）
    pub fn to_bytes(&self) -> CommandBytes {
        let mut bytes = CommandBytes::with_capacity(1 + self.payload.len());
        bytes.push(self.opcode);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// 驱动：速度（mm/s）+ 转弯半径（mm）
    ///
    /// 速度钳位到 ±500，半径钳位到 ±2000；特殊半径 32767（直行）和 -1（原地旋转）不钳位。
    pub fn drive(velocity: i16, radius: i16) -> Self {
        let velocity = clamp_drive_velocity(velocity);
        let radius = clamp_drive_radius(radius);
        let mut payload = [0u8; 4];
        payload[..2].copy_from_slice(&i16_to_bytes_be(velocity));
        payload[2..].copy_from_slice(&i16_to_bytes_be(radius));
        Self::with_payload(OP_DRIVE, &payload)
    }

    /// 左右轮直接速度（mm/s），线上顺序为右轮在前
    pub fn drive_direct(right: i16, left: i16) -> Self {
        Self::two_wheel(OP_DRIVE_DIRECT, right, left, MAX_DRIVE_SPEED)
    }

    /// 左右轮直接 PWM（-255..=255），线上顺序为右轮在前
    pub fn drive_pwm(right: i16, left: i16) -> Self {
        Self::two_wheel(OP_DRIVE_PWM, right, left, MAX_DRIVE_PWM)
    }

    fn two_wheel(opcode: u8, right: i16, left: i16, limit: i16) -> Self {
        let mut payload = [0u8; 4];
        payload[..2].copy_from_slice(&i16_to_bytes_be(right.clamp(-limit, limit)));
        payload[2..].copy_from_slice(&i16_to_bytes_be(left.clamp(-limit, limit)));
        Self::with_payload(opcode, &payload)
    }

    /// 清扫电机
    pub fn motors(mask: MotorMask) -> Self {
        Self::with_payload(OP_MOTORS, &[mask.bits()])
    }

    /// LED
    pub fn leds(state: LedState) -> Self {
        Self::with_payload(
            OP_LEDS,
            &[state.leds, state.power_color, state.power_intensity],
        )
    }

    /// 写入歌曲
    ///
    /// # 错误
    /// - `InvalidSongSlot`: 槽位 > 4
    /// - `NoteCountMismatch`: 音符与时值数量不一致
    /// - `TooManyNotes`: 超过 16 个音符
    pub fn song(slot: u8, notes: &[u8], durations: &[u8]) -> Result<Self, ProtocolError> {
        if slot > MAX_SONG_SLOT {
            return Err(ProtocolError::InvalidSongSlot(slot));
        }
        if notes.len() != durations.len() {
            return Err(ProtocolError::NoteCountMismatch {
                notes: notes.len(),
                durations: durations.len(),
            });
        }
        if notes.len() > MAX_SONG_NOTES {
            return Err(ProtocolError::TooManyNotes(notes.len()));
        }

        let mut payload = CommandBytes::with_capacity(2 + notes.len() * 2);
        payload.push(slot);
        payload.push(notes.len() as u8);
        for (note, duration) in notes.iter().zip(durations) {
            payload.push(*note);
            payload.push(*duration);
        }
        Ok(Self {
            opcode: OP_SONG,
            payload,
        })
    }

    /// 播放歌曲
    ///
    /// # 错误
    /// - `InvalidSongSlot`: 槽位 > 4
    pub fn play(slot: u8) -> Result<Self, ProtocolError> {
        if slot > MAX_SONG_SLOT {
            return Err(ProtocolError::InvalidSongSlot(slot));
        }
        Ok(Self::with_payload(OP_PLAY, &[slot]))
    }

    /// 4 位 ASCII 数码管
    pub fn display(text: &str) -> Self {
        Self::with_payload(OP_DIGITS_ASCII, &display_bytes(text))
    }

    /// 启动传感器流：数量字节 + 各包 ID
    ///
    /// # 错误
    /// - `TooManyStreamPackets`: 数量无法用 1 字节表示
    pub fn stream(packets: &[SensorPacket]) -> Result<Self, ProtocolError> {
        if packets.len() > u8::MAX as usize {
            return Err(ProtocolError::TooManyStreamPackets(packets.len()));
        }
        let mut payload = CommandBytes::with_capacity(1 + packets.len());
        payload.push(packets.len() as u8);
        payload.extend(packets.iter().map(|p| u8::from(*p)));
        Ok(Self {
            opcode: OP_STREAM,
            payload,
        })
    }

    /// 暂停传感器流（数量为 0 的暂停帧）
    pub fn pause_stream() -> Self {
        Self::with_payload(OP_PAUSE_RESUME_STREAM, &[0])
    }

    /// 恢复之前配置的传感器流
    pub fn resume_stream() -> Self {
        Self::with_payload(OP_PAUSE_RESUME_STREAM, &[1])
    }
}

/// 钳位 `drive` 速度
pub fn clamp_drive_velocity(velocity: i16) -> i16 {
    velocity.clamp(-MAX_DRIVE_SPEED, MAX_DRIVE_SPEED)
}

/// 钳位 `drive` 半径（特殊值透传）
pub fn clamp_drive_radius(radius: i16) -> i16 {
    if radius == RADIUS_STRAIGHT || radius == RADIUS_TURN_IN_PLACE {
        radius
    } else {
        radius.clamp(-MAX_DRIVE_RADIUS, MAX_DRIVE_RADIUS)
    }
}

/// 数码管字节
///
/// 按字节处理：超过 4 个时保留最后 4 个，不足时补空格，[32, 126] 以外的字节替换为空格。
pub fn display_bytes(text: &str) -> [u8; DISPLAY_DIGITS] {
    let bytes = text.as_bytes();
    let start = bytes.len().saturating_sub(DISPLAY_DIGITS);
    let mut out = [b' '; DISPLAY_DIGITS];
    for (slot, &ch) in out.iter_mut().zip(&bytes[start..]) {
        *slot = if (32..=126).contains(&ch) { ch } else { b' ' };
    }
    out
}

/// 清扫电机掩码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorMask(u8);

impl MotorMask {
    pub const NONE: MotorMask = MotorMask(0);
    pub const SIDE_BRUSH: MotorMask = MotorMask(motor_bits::SIDE_BRUSH);
    pub const VACUUM: MotorMask = MotorMask(motor_bits::VACUUM);
    pub const MAIN_BRUSH: MotorMask = MotorMask(motor_bits::MAIN_BRUSH);

    /// 从原始位构建（仅保留低 3 位）
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x07)
    }

    /// 按开关构建
    pub fn from_flags(main_brush: bool, side_brush: bool, vacuum: bool) -> Self {
        let mut mask = Self::NONE;
        if main_brush {
            mask = mask | Self::MAIN_BRUSH;
        }
        if side_brush {
            mask = mask | Self::SIDE_BRUSH;
        }
        if vacuum {
            mask = mask | Self::VACUUM;
        }
        mask
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: MotorMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MotorMask {
    type Output = MotorMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        MotorMask(self.0 | rhs.0)
    }
}

/// LED 状态
///
/// `power_color`: 0 = 绿，255 = 红；`power_intensity`: 0 = 灭，255 = 全亮。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LedState {
    pub leds: u8,
    pub power_color: u8,
    pub power_intensity: u8,
}
