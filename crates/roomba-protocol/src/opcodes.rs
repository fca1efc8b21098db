//! 操作码与协议常量
//!
//! 数值来自 iRobot Open Interface 规范，必须逐位精确。

/// 进入 Passive 模式（任意状态均可发送）
pub const OP_START: u8 = 128;
/// 修改波特率
pub const OP_BAUD: u8 = 129;
/// 进入 Safe 模式
pub const OP_SAFE: u8 = 131;
/// 进入 Full 模式
pub const OP_FULL: u8 = 132;
/// 电源（见 `Mode::apply` 中关于 Power 的说明）
pub const OP_POWER: u8 = 133;
/// 定点清扫
pub const OP_SPOT: u8 = 134;
/// 默认清扫
pub const OP_CLEAN: u8 = 135;
/// 驱动（速度 + 半径）
pub const OP_DRIVE: u8 = 137;
/// 清扫电机（主刷/边刷/吸尘）
pub const OP_MOTORS: u8 = 138;
/// LED
pub const OP_LEDS: u8 = 139;
/// 写入歌曲
pub const OP_SONG: u8 = 140;
/// 播放歌曲
pub const OP_PLAY: u8 = 141;
/// 查询单个传感器包
pub const OP_SENSORS: u8 = 142;
/// 回充
pub const OP_DOCK: u8 = 143;
/// 左右轮直接速度
pub const OP_DRIVE_DIRECT: u8 = 145;
/// 左右轮直接 PWM
pub const OP_DRIVE_PWM: u8 = 146;
/// 启动传感器流
pub const OP_STREAM: u8 = 148;
/// 暂停/恢复传感器流
pub const OP_PAUSE_RESUME_STREAM: u8 = 150;
/// 4 位 ASCII 数码管
pub const OP_DIGITS_ASCII: u8 = 164;
/// 停止 OI
pub const OP_STOP: u8 = 173;
/// 软复位
pub const OP_RESET: u8 = 7;

/// 遥测流帧头
pub const STREAM_HEADER: u8 = 19;

/// `drive` 速度上限（mm/s）
pub const MAX_DRIVE_SPEED: i16 = 500;
/// `drive` 半径上限（mm）
pub const MAX_DRIVE_RADIUS: i16 = 2000;
/// `drive_pwm` 上限
pub const MAX_DRIVE_PWM: i16 = 255;

/// 特殊半径：直行（不钳位）
pub const RADIUS_STRAIGHT: i16 = 32767;
/// 特殊半径：原地顺时针旋转（不钳位）
pub const RADIUS_TURN_IN_PLACE: i16 = -1;

/// 歌曲槽位上限（0..=4）
pub const MAX_SONG_SLOT: u8 = 4;
/// 单首歌曲最多音符数
pub const MAX_SONG_NOTES: usize = 16;

/// 数码管字符数
pub const DISPLAY_DIGITS: usize = 4;

/// 清扫电机位掩码
pub mod motor_bits {
    pub const SIDE_BRUSH: u8 = 0x01;
    pub const VACUUM: u8 = 0x02;
    pub const MAIN_BRUSH: u8 = 0x04;
}

/// LED 位掩码
pub mod led_bits {
    pub const DEBRIS: u8 = 0x01;
    pub const SPOT: u8 = 0x02;
    pub const DOCK: u8 = 0x04;
    pub const CHECK_ROBOT: u8 = 0x08;
}
