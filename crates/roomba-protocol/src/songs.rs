//! 内置旋律
//!
//! 音符为 MIDI 编号（31..=127，0 为休止），时值单位为 1/64 秒。

use crate::opcodes::MAX_SONG_SLOT;

/// 旋律的一段（对应一个歌曲槽位）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SongPart {
    pub notes: &'static [u8],
    pub durations: &'static [u8],
}

impl SongPart {
    /// 总时长（1/64 秒）
    pub fn duration_units(&self) -> u32 {
        self.durations.iter().map(|d| *d as u32).sum()
    }
}

/// 预置旋律
///
/// 依次写入槽位 0、1、...，播放时从槽位 0 开始。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Melody {
    pub name: &'static str,
    pub parts: &'static [SongPart],
}

const CROWD_PLEASER_DURATIONS: [u8; 16] = [16, 16, 16, 16, 16, 16, 16, 16, 32, 16, 16, 16, 16, 16, 144, 128];
const SIXTEENTHS: [u8; 16] = [16; 16];

impl Melody {
    pub const CROWD_PLEASER: Melody = Melody {
        name: "crowd-pleaser",
        parts: &[SongPart {
            notes: &[81, 0, 83, 0, 85, 0, 88, 0, 90, 92, 90, 0, 88, 0, 85, 83],
            durations: &CROWD_PLEASER_DURATIONS,
        }],
    };

    /// 同一段落降低一个八度演奏
    pub const CROWD_PLEASER_LOW: Melody = Melody {
        name: "crowd-pleaser-low",
        parts: &[SongPart {
            notes: &[69, 0, 71, 0, 73, 0, 76, 0, 78, 80, 78, 0, 76, 0, 73, 71],
            durations: &CROWD_PLEASER_DURATIONS,
        }],
    };

    pub const IN_THE_END: Melody = Melody {
        name: "in-the-end",
        parts: &[SongPart {
            notes: &[63, 70, 70, 66, 65, 65, 65, 65, 66],
            durations: &[64, 64, 64, 64, 64, 64, 64, 32, 32],
        }],
    };

    pub const DAFT_PUNK: Melody = Melody {
        name: "daft-punk",
        parts: &[
            SongPart {
                notes: &[54, 57, 66, 69, 85, 69, 66, 69, 52, 64, 69, 64, 71, 69, 68, 69],
                durations: &SIXTEENTHS,
            },
            SongPart {
                notes: &[38, 38, 66, 50, 71, 69, 66, 50, 38, 38, 54, 57, 42, 42, 42, 42],
                durations: &SIXTEENTHS,
            },
        ],
    };

    /// 全部预置旋律
    pub const ALL: [Melody; 4] = [
        Melody::CROWD_PLEASER,
        Melody::CROWD_PLEASER_LOW,
        Melody::IN_THE_END,
        Melody::DAFT_PUNK,
    ];

    /// 按名称查找
    pub fn by_name(name: &str) -> Option<Melody> {
        Self::ALL.into_iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// 各段对应的槽位
    pub fn slots(&self) -> impl Iterator<Item = (u8, &'static SongPart)> {
        self.parts
            .iter()
            .enumerate()
            .take(MAX_SONG_SLOT as usize + 1)
            .map(|(slot, part)| (slot as u8, part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;

    #[test]
    fn test_presets_encode() {
        for melody in Melody::ALL {
            for (slot, part) in melody.slots() {
                assert!(
                    Command::song(slot, part.notes, part.durations).is_ok(),
                    "{} slot {}",
                    melody.name,
                    slot
                );
            }
        }
    }

    #[test]
    fn test_by_name() {
        assert_eq!(Melody::by_name("daft-punk"), Some(Melody::DAFT_PUNK));
        assert_eq!(Melody::by_name("IN-THE-END"), Some(Melody::IN_THE_END));
        assert_eq!(Melody::by_name("nope"), None);
    }

    #[test]
    fn test_duration_units() {
        assert_eq!(Melody::IN_THE_END.parts[0].duration_units(), 64 * 7 + 32 + 32);
        assert_eq!(Melody::DAFT_PUNK.slots().count(), 2);
    }
}
