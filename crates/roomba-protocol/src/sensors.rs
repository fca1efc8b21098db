//! 传感器包 ID 表与全量传感器解析
//!
//! 单个包 ID 7..=58 各自有固定宽度（1 或 2 字节）和符号性；
//! 分组 ID（0..=6、100、101、106、107）是连续单包的拼接。

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::ops::RangeInclusive;
use tracing::warn;

/// 单个传感器包 ID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SensorPacket {
    BumpsWheelDrops = 7,
    Wall = 8,
    CliffLeft = 9,
    CliffFrontLeft = 10,
    CliffFrontRight = 11,
    CliffRight = 12,
    VirtualWall = 13,
    WheelOvercurrents = 14,
    DirtDetect = 15,
    Unused16 = 16,
    InfraredCharacterOmni = 17,
    Buttons = 18,
    Distance = 19,
    Angle = 20,
    ChargingState = 21,
    Voltage = 22,
    Current = 23,
    Temperature = 24,
    BatteryCharge = 25,
    BatteryCapacity = 26,
    WallSignal = 27,
    CliffLeftSignal = 28,
    CliffFrontLeftSignal = 29,
    CliffFrontRightSignal = 30,
    CliffRightSignal = 31,
    Unused32 = 32,
    Unused33 = 33,
    ChargingSourcesAvailable = 34,
    OiMode = 35,
    SongNumber = 36,
    SongPlaying = 37,
    StreamPackets = 38,
    RequestedVelocity = 39,
    RequestedRadius = 40,
    RequestedRightVelocity = 41,
    RequestedLeftVelocity = 42,
    LeftEncoderCounts = 43,
    RightEncoderCounts = 44,
    LightBumper = 45,
    LightBumpLeft = 46,
    LightBumpFrontLeft = 47,
    LightBumpCenterLeft = 48,
    LightBumpCenterRight = 49,
    LightBumpFrontRight = 50,
    LightBumpRight = 51,
    InfraredCharacterLeft = 52,
    InfraredCharacterRight = 53,
    LeftMotorCurrent = 54,
    RightMotorCurrent = 55,
    MainBrushMotorCurrent = 56,
    SideBrushMotorCurrent = 57,
    Stasis = 58,
}

/// 第一个单包 ID
pub const FIRST_SINGLE_PACKET: u8 = 7;
/// 最后一个单包 ID
pub const LAST_SINGLE_PACKET: u8 = 58;
/// 单包数量
pub const SINGLE_PACKET_COUNT: usize = (LAST_SINGLE_PACKET - FIRST_SINGLE_PACKET + 1) as usize;

/// 全量传感器分组 ID
pub const ALL_SENSORS_GROUP: u8 = 100;
/// 全量传感器分组字节数
pub const ALL_SENSORS_LEN: usize = 80;

impl SensorPacket {
    /// 数据宽度（字节）
    pub fn width(self) -> usize {
        use SensorPacket::*;
        match self {
            Distance | Angle | Voltage | Current | BatteryCharge | BatteryCapacity
            | WallSignal | CliffLeftSignal | CliffFrontLeftSignal | CliffFrontRightSignal
            | CliffRightSignal | Unused33 | RequestedVelocity | RequestedRadius
            | RequestedRightVelocity | RequestedLeftVelocity | LeftEncoderCounts
            | RightEncoderCounts | LightBumpLeft | LightBumpFrontLeft | LightBumpCenterLeft
            | LightBumpCenterRight | LightBumpFrontRight | LightBumpRight | LeftMotorCurrent
            | RightMotorCurrent | MainBrushMotorCurrent | SideBrushMotorCurrent => 2,
            _ => 1,
        }
    }

    /// 是否为有符号数
    pub fn signed(self) -> bool {
        use SensorPacket::*;
        matches!(
            self,
            Distance
                | Angle
                | Current
                | Temperature
                | RequestedVelocity
                | RequestedRadius
                | RequestedRightVelocity
                | RequestedLeftVelocity
                | LeftMotorCurrent
                | RightMotorCurrent
                | MainBrushMotorCurrent
                | SideBrushMotorCurrent
        )
    }

    /// 按表中宽度和符号性解码（大端）
    ///
    /// 字节数不等于宽度时返回 `InvalidLength`。
    pub fn decode(self, bytes: &[u8]) -> Result<i32, ProtocolError> {
        let width = self.width();
        if bytes.len() != width {
            return Err(ProtocolError::InvalidLength {
                expected: width,
                actual: bytes.len(),
            });
        }
        let value = match (width, self.signed()) {
            (1, false) => bytes[0] as i32,
            (1, true) => bytes[0] as i8 as i32,
            (_, false) => u16::from_be_bytes([bytes[0], bytes[1]]) as i32,
            (_, true) => i16::from_be_bytes([bytes[0], bytes[1]]) as i32,
        };
        Ok(value)
    }

    /// 全部单包，按 ID 升序
    pub fn all() -> impl Iterator<Item = SensorPacket> {
        (FIRST_SINGLE_PACKET..=LAST_SINGLE_PACKET).filter_map(|id| SensorPacket::try_from(id).ok())
    }
}

/// 分组 ID 包含的单包范围
pub fn group_members(group: u8) -> Option<RangeInclusive<u8>> {
    let range = match group {
        0 => 7..=26,
        1 => 7..=16,
        2 => 17..=20,
        3 => 21..=26,
        4 => 27..=34,
        5 => 35..=42,
        6 => 7..=42,
        100 => 7..=58,
        101 => 43..=58,
        106 => 46..=51,
        107 => 54..=58,
        _ => return None,
    };
    Some(range)
}

/// 查询响应字节数（单包或分组）
///
/// 未知 ID 返回 `None`。
pub fn packet_width(id: u8) -> Option<usize> {
    if let Ok(packet) = SensorPacket::try_from(id) {
        return Some(packet.width());
    }
    group_members(id).map(|range| {
        range
            .filter_map(|member| SensorPacket::try_from(member).ok())
            .map(SensorPacket::width)
            .sum()
    })
}

/// 全量传感器快照（分组 100）
///
/// 按单包 ID 存储已解码的值；无法解码的尾部字段保持为 0。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSnapshot {
    values: [i32; SINGLE_PACKET_COUNT],
    /// 实际消费的字节数（正常为 80）
    pub bytes_parsed: usize,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            values: [0; SINGLE_PACKET_COUNT],
            bytes_parsed: 0,
        }
    }
}

impl SensorSnapshot {
    /// 按 ID 顺序依次解析
    ///
    /// 宽松解析：长度不等于 80 时只记录警告，不返回错误。
    pub fn parse(data: &[u8]) -> Self {
        let mut snapshot = Self::default();
        let mut offset = 0usize;

        for packet in SensorPacket::all() {
            let width = packet.width();
            let Some(bytes) = data.get(offset..offset + width) else {
                break;
            };
            if let Ok(value) = packet.decode(bytes) {
                snapshot.values[(u8::from(packet) - FIRST_SINGLE_PACKET) as usize] = value;
            }
            offset += width;
        }

        snapshot.bytes_parsed = offset;
        if offset != ALL_SENSORS_LEN || data.len() != ALL_SENSORS_LEN {
            warn!(
                "Sensor dump size mismatch: parsed {} bytes of {} (expected {})",
                offset,
                data.len(),
                ALL_SENSORS_LEN
            );
        }
        snapshot
    }

    /// 单个传感器的值
    pub fn get(&self, packet: SensorPacket) -> i32 {
        self.values[(u8::from(packet) - FIRST_SINGLE_PACKET) as usize]
    }

    /// 所有 (包, 值)，按 ID 升序
    pub fn iter(&self) -> impl Iterator<Item = (SensorPacket, i32)> + '_ {
        SensorPacket::all().map(|packet| (packet, self.get(packet)))
    }

    /// 电池电压（mV）
    pub fn voltage_mv(&self) -> u16 {
        self.get(SensorPacket::Voltage) as u16
    }

    /// 电池电流（mA，负值为放电）
    pub fn current_ma(&self) -> i16 {
        self.get(SensorPacket::Current) as i16
    }

    /// 电池温度（℃）
    pub fn temperature_c(&self) -> i8 {
        self.get(SensorPacket::Temperature) as i8
    }

    /// 电量（mAh）
    pub fn battery_charge(&self) -> u16 {
        self.get(SensorPacket::BatteryCharge) as u16
    }

    /// 电池容量（mAh）
    pub fn battery_capacity(&self) -> u16 {
        self.get(SensorPacket::BatteryCapacity) as u16
    }

    /// 底盘报告的 OI 模式
    pub fn oi_mode(&self) -> Option<crate::Mode> {
        crate::Mode::try_from(self.get(SensorPacket::OiMode) as u8).ok()
    }

    pub fn bumps_wheel_drops(&self) -> u8 {
        self.get(SensorPacket::BumpsWheelDrops) as u8
    }

    pub fn left_encoder(&self) -> u16 {
        self.get(SensorPacket::LeftEncoderCounts) as u16
    }

    pub fn right_encoder(&self) -> u16 {
        self.get(SensorPacket::RightEncoderCounts) as u16
    }
}
