//! 遥测流帧
//!
//! 帧格式：`[19][N][N 字节负载][校验和]`，
//! 合法条件为 `(19 + N + Σ负载 + 校验和) mod 256 == 0`。
//!
//! 负载本身是 `[包 ID][值]...` 的拼接，值的宽度由传感器包表决定。

use crate::opcodes::STREAM_HEADER;
use crate::sensors::{SensorPacket, group_members};
use crate::ProtocolError;

/// 已校验的遥测流帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    payload: Vec<u8>,
    checksum: u8,
}

impl StreamFrame {
    /// 从负载和校验和构建，校验失败返回 `ChecksumMismatch`
    pub fn from_parts(payload: Vec<u8>, checksum: u8) -> Result<Self, ProtocolError> {
        if payload.len() > u8::MAX as usize {
            return Err(ProtocolError::InvalidLength {
                expected: u8::MAX as usize,
                actual: payload.len(),
            });
        }
        let sum = frame_sum(&payload).wrapping_add(checksum);
        if sum != 0 {
            return Err(ProtocolError::ChecksumMismatch { sum });
        }
        Ok(Self { payload, checksum })
    }

    /// 为负载计算校验和并编码为完整的线上帧
    ///
    /// # 错误
    /// - `InvalidLength`: 负载超过 255 字节
    pub fn encode_payload(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.len() > u8::MAX as usize {
            return Err(ProtocolError::InvalidLength {
                expected: u8::MAX as usize,
                actual: payload.len(),
            });
        }
        let mut bytes = Vec::with_capacity(payload.len() + 3);
        bytes.push(STREAM_HEADER);
        bytes.push(payload.len() as u8);
        bytes.extend_from_slice(payload);
        bytes.push(checksum_for(payload));
        Ok(bytes)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// 解码负载中的传感器字段
    pub fn fields(&self) -> Vec<StreamField> {
        decode_fields(&self.payload)
    }
}

/// 负载对应的校验和
pub fn checksum_for(payload: &[u8]) -> u8 {
    0u8.wrapping_sub(frame_sum(payload))
}

fn frame_sum(payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(STREAM_HEADER.wrapping_add(payload.len() as u8), |acc, b| {
            acc.wrapping_add(*b)
        })
}

/// 流负载中的一个传感器值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamField {
    pub packet: SensorPacket,
    pub value: i32,
}

/// 解码 `[包 ID][值]...` 负载
///
/// 分组 ID 展开为其成员单包。遇到未知 ID 或截断的值时停止解码，返回已解码部分。
pub fn decode_fields(payload: &[u8]) -> Vec<StreamField> {
    let mut fields = Vec::new();
    let mut offset = 0usize;

    while let Some(&id) = payload.get(offset) {
        offset += 1;
        let members: Vec<SensorPacket> = match SensorPacket::try_from(id) {
            Ok(packet) => vec![packet],
            Err(_) => match group_members(id) {
                Some(range) => range
                    .filter_map(|member| SensorPacket::try_from(member).ok())
                    .collect(),
                None => break,
            },
        };

        for packet in members {
            let width = packet.width();
            let Some(bytes) = payload.get(offset..offset + width) else {
                return fields;
            };
            if let Ok(value) = packet.decode(bytes) {
                fields.push(StreamField { packet, value });
            }
            offset += width;
        }
    }

    fields
}

enum State {
    WaitHeader,
    WaitLength,
    Payload { remaining: u8 },
    WaitChecksum,
}

/// 字节级流帧解析器
///
/// 在任意字节流中寻找帧头并自同步。校验失败时丢弃整帧并回到帧头搜索。
pub struct StreamParser {
    state: State,
    payload: Vec<u8>,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            state: State::WaitHeader,
            payload: Vec::with_capacity(u8::MAX as usize),
        }
    }

    /// 输入单个字节
    ///
    /// 返回 `Some(Ok(frame))` 表示收到完整的合法帧，
    /// `Some(Err(ChecksumMismatch))` 表示收到完整但校验失败的帧。
    pub fn push(&mut self, byte: u8) -> Option<Result<StreamFrame, ProtocolError>> {
        match self.state {
            State::WaitHeader => {
                if byte == STREAM_HEADER {
                    self.payload.clear();
                    self.state = State::WaitLength;
                }
            },
            State::WaitLength => {
                self.state = if byte == 0 {
                    State::WaitChecksum
                } else {
                    State::Payload { remaining: byte }
                };
            },
            State::Payload { remaining } => {
                self.payload.push(byte);
                self.state = if remaining == 1 {
                    State::WaitChecksum
                } else {
                    State::Payload {
                        remaining: remaining - 1,
                    }
                };
            },
            State::WaitChecksum => {
                self.state = State::WaitHeader;
                let payload = std::mem::take(&mut self.payload);
                return Some(StreamFrame::from_parts(payload, byte));
            },
        }
        None
    }

    /// 是否处于帧中间
    pub fn in_frame(&self) -> bool {
        !matches!(self.state, State::WaitHeader)
    }

    /// 丢弃已接收的部分帧
    pub fn reset(&mut self) {
        self.state = State::WaitHeader;
        self.payload.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(parser: &mut StreamParser, bytes: &[u8]) -> Vec<Result<StreamFrame, ProtocolError>> {
        bytes.iter().filter_map(|b| parser.push(*b)).collect()
    }

    #[test]
    fn test_checksum_for() {
        // 19 + 3 + 10 + 20 + 30 = 82
        assert_eq!(checksum_for(&[10, 20, 30]), 174);
        assert_eq!(
            StreamFrame::encode_payload(&[10, 20, 30]).unwrap(),
            vec![19, 3, 10, 20, 30, 174]
        );
    }

    #[test]
    fn test_valid_frame_accepted() {
        let mut parser = StreamParser::new();
        let frames = feed(&mut parser, &[19, 3, 10, 20, 30, 174]);
        assert_eq!(frames.len(), 1);
        let frame = frames[0].as_ref().unwrap();
        assert_eq!(frame.payload(), &[10, 20, 30]);
        assert_eq!(frame.checksum(), 174);
    }

    #[test]
    fn test_flipped_bit_rejected_then_resync() {
        let mut parser = StreamParser::new();
        let mut bytes = vec![19, 3, 10, 20 ^ 0x01, 30, 174];
        bytes.extend_from_slice(&[0xAA, 0x55]);
        bytes.extend_from_slice(&StreamFrame::encode_payload(&[7, 1]).unwrap());

        let frames = feed(&mut parser, &bytes);
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Err(ProtocolError::ChecksumMismatch { .. })));
        assert_eq!(frames[1].as_ref().unwrap().payload(), &[7, 1]);
    }

    #[test]
    fn test_garbage_before_header_is_skipped() {
        let mut parser = StreamParser::new();
        let mut bytes = vec![0x00, 0xFF, 0x42];
        bytes.extend_from_slice(&StreamFrame::encode_payload(&[22, 0x3A, 0x98]).unwrap());
        let frames = feed(&mut parser, &bytes);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_ok());
        assert!(!parser.in_frame());
    }

    #[test]
    fn test_empty_payload_frame() {
        let mut parser = StreamParser::new();
        let frames = feed(&mut parser, &StreamFrame::encode_payload(&[]).unwrap());
        assert_eq!(frames.len(), 1);
        assert!(frames[0].as_ref().unwrap().payload().is_empty());
    }

    #[test]
    fn test_decode_fields() {
        // Voltage=15000, Current=-500, 未知 ID 99 终止解码
        let payload = [22, 0x3A, 0x98, 23, 0xFE, 0x0C, 99, 1, 2];
        let fields = decode_fields(&payload);
        assert_eq!(
            fields,
            vec![
                StreamField {
                    packet: SensorPacket::Voltage,
                    value: 15_000
                },
                StreamField {
                    packet: SensorPacket::Current,
                    value: -500
                },
            ]
        );
    }

    #[test]
    fn test_decode_fields_group_and_truncation() {
        // 分组 107 = 54..=58 (4 x i16 + 1 字节)
        let mut payload = vec![107];
        payload.extend_from_slice(&100i16.to_be_bytes());
        payload.extend_from_slice(&(-100i16).to_be_bytes());
        payload.extend_from_slice(&0i16.to_be_bytes());
        payload.extend_from_slice(&5i16.to_be_bytes());
        payload.push(1);
        let fields = decode_fields(&payload);
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[1].value, -100);
        assert_eq!(fields[4].packet, SensorPacket::Stasis);

        // 截断的 2 字节值
        let fields = decode_fields(&[7, 3, 22, 0x3A]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].packet, SensorPacket::BumpsWheelDrops);
    }

    proptest! {
        /// 任意负载编码后都能通过校验，任意单比特翻转都会被拒绝
        #[test]
        fn prop_checksum_detects_single_bit_flip(
            payload in proptest::collection::vec(any::<u8>(), 1..64),
            flip_index in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let encoded = StreamFrame::encode_payload(&payload).unwrap();
            let mut parser = StreamParser::new();
            let frames = feed(&mut parser, &encoded);
            prop_assert_eq!(frames.len(), 1);
            prop_assert!(frames[0].is_ok());

            // 只翻转负载或校验和（不动帧头和长度）
            let idx = 2 + flip_index.index(payload.len() + 1);
            let mut corrupted = encoded.clone();
            corrupted[idx] ^= 1 << bit;
            let mut parser = StreamParser::new();
            let frames = feed(&mut parser, &corrupted);
            prop_assert!(!frames.is_empty());
            prop_assert!(frames[0].is_err());
        }
    }
}
