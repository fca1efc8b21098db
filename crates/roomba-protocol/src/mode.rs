//! OI 模式状态机
//!
//! 底盘的控制权限级别。状态转移集合是固定的：
//!
//! - `Start`、`Power`：任意状态 → Passive
//! - `Stop`、`Reset`：任意状态 → Off（引擎随后会在 Reset 后自动 Start）
//! - `Safe`、`Full`：非 Off 状态 → Safe / Full；Off 状态下拒绝

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// OI 模式
///
/// 数值与传感器包 35（OI Mode）的取值一致，用 `Mode::try_from(u8)` / `u8::from(mode)` 转换。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Mode {
    /// 上电默认，仅接受 Start
    #[default]
    Off = 0,
    /// 只读传感器，不接受运动命令
    Passive = 1,
    /// 可控制，底盘保留安全保护（悬崖/抬起）
    Safe = 2,
    /// 完全控制
    Full = 3,
}

/// 改变模式的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModeCommand {
    Start,
    Reset,
    Stop,
    Power,
    Safe,
    Full,
}

impl Mode {
    /// 是否允许运动/执行类命令（drive、LED、数码管等）
    pub fn permits_actuation(self) -> bool {
        matches!(self, Self::Safe | Self::Full)
    }

    /// 计算模式转移
    ///
    /// 纯函数：不涉及 IO，引擎在独占区内调用。
    ///
    /// # 关于 Power
    ///
    /// 在真实硬件上 Power 通常意味着关机/回充，而不是停留在可控的 Passive。
    /// 此处保留部署中观察到的行为（→ Passive），不做"修正"。
    ///
    /// # 错误
    /// - `ProtocolError::InvalidTransition`: 在 Off 状态下请求 Safe/Full
    pub fn apply(self, command: ModeCommand) -> Result<Mode, ProtocolError> {
        match command {
            ModeCommand::Start | ModeCommand::Power => Ok(Mode::Passive),
            ModeCommand::Stop | ModeCommand::Reset => Ok(Mode::Off),
            ModeCommand::Safe | ModeCommand::Full if self == Mode::Off => {
                Err(ProtocolError::InvalidTransition {
                    from: self,
                    command,
                })
            },
            ModeCommand::Safe => Ok(Mode::Safe),
            ModeCommand::Full => Ok(Mode::Full),
        }
    }

    /// 检查当前模式是否允许执行类命令
    ///
    /// # 错误
    /// - `ProtocolError::ModeNotPermitted`: 当前模式为 Off 或 Passive
    pub fn require_actuation(self, operation: &'static str) -> Result<(), ProtocolError> {
        if self.permits_actuation() {
            Ok(())
        } else {
            Err(ProtocolError::ModeNotPermitted {
                operation,
                mode: self,
            })
        }
    }
}

impl ModeCommand {
    /// 命令对应的操作码
    pub fn opcode(self) -> u8 {
        use crate::opcodes::*;
        match self {
            ModeCommand::Start => OP_START,
            ModeCommand::Reset => OP_RESET,
            ModeCommand::Stop => OP_STOP,
            ModeCommand::Power => OP_POWER,
            ModeCommand::Safe => OP_SAFE,
            ModeCommand::Full => OP_FULL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_MODES: [Mode; 4] = [Mode::Off, Mode::Passive, Mode::Safe, Mode::Full];
    const ALL_COMMANDS: [ModeCommand; 6] = [
        ModeCommand::Start,
        ModeCommand::Reset,
        ModeCommand::Stop,
        ModeCommand::Power,
        ModeCommand::Safe,
        ModeCommand::Full,
    ];

    #[test]
    fn test_primitive_conversion() {
        assert_eq!(Mode::try_from(0u8), Ok(Mode::Off));
        assert_eq!(Mode::try_from(3u8), Ok(Mode::Full));
        assert!(Mode::try_from(4u8).is_err());
        for mode in ALL_MODES {
            assert_eq!(Mode::try_from(u8::from(mode)), Ok(mode));
        }
    }

    #[test]
    fn test_start_and_power_land_in_passive() {
        for mode in ALL_MODES {
            assert_eq!(mode.apply(ModeCommand::Start), Ok(Mode::Passive));
            assert_eq!(mode.apply(ModeCommand::Power), Ok(Mode::Passive));
        }
    }

    #[test]
    fn test_stop_and_reset_land_in_off() {
        for mode in ALL_MODES {
            assert_eq!(mode.apply(ModeCommand::Stop), Ok(Mode::Off));
            assert_eq!(mode.apply(ModeCommand::Reset), Ok(Mode::Off));
        }
    }

    #[test]
    fn test_safe_full_rejected_from_off() {
        assert!(matches!(
            Mode::Off.apply(ModeCommand::Safe),
            Err(ProtocolError::InvalidTransition {
                from: Mode::Off,
                command: ModeCommand::Safe
            })
        ));
        assert!(Mode::Off.apply(ModeCommand::Full).is_err());
    }

    #[test]
    fn test_safe_full_from_controllable_modes() {
        for mode in [Mode::Passive, Mode::Safe, Mode::Full] {
            assert_eq!(mode.apply(ModeCommand::Safe), Ok(Mode::Safe));
            assert_eq!(mode.apply(ModeCommand::Full), Ok(Mode::Full));
        }
    }

    #[test]
    fn test_permits_actuation() {
        assert!(!Mode::Off.permits_actuation());
        assert!(!Mode::Passive.permits_actuation());
        assert!(Mode::Safe.permits_actuation());
        assert!(Mode::Full.permits_actuation());
        assert!(Mode::Passive.require_actuation("drive").is_err());
        assert!(Mode::Full.require_actuation("drive").is_ok());
    }

    #[test]
    fn test_opcodes() {
        assert_eq!(ModeCommand::Start.opcode(), 128);
        assert_eq!(ModeCommand::Reset.opcode(), 7);
        assert_eq!(ModeCommand::Stop.opcode(), 173);
        assert_eq!(ModeCommand::Power.opcode(), 133);
        assert_eq!(ModeCommand::Safe.opcode(), 131);
        assert_eq!(ModeCommand::Full.opcode(), 132);
    }

    proptest! {
        /// 任意命令序列下，模式只沿文档中的边变化；被拒绝的命令不改变模式
        #[test]
        fn prop_mode_changes_only_via_documented_edges(
            commands in proptest::collection::vec(0usize..6, 0..64)
        ) {
            let mut mode = Mode::Off;
            for idx in commands {
                let command = ALL_COMMANDS[idx];
                let before = mode;
                match mode.apply(command) {
                    Ok(next) => {
                        let expected = match command {
                            ModeCommand::Start | ModeCommand::Power => Mode::Passive,
                            ModeCommand::Stop | ModeCommand::Reset => Mode::Off,
                            ModeCommand::Safe => Mode::Safe,
                            ModeCommand::Full => Mode::Full,
                        };
                        prop_assert_eq!(next, expected);
                        prop_assert!(
                            before != Mode::Off
                                || !matches!(command, ModeCommand::Safe | ModeCommand::Full)
                        );
                        mode = next;
                    },
                    Err(_) => {
                        prop_assert_eq!(before, Mode::Off);
                        prop_assert!(matches!(command, ModeCommand::Safe | ModeCommand::Full));
                    },
                }
            }
        }
    }
}
