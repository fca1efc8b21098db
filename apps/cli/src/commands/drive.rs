//! 运动命令
//!
//! 运动命令需要 Safe 或 Full 模式：执行前切换模式，持续 `duration` 后停车。

use anyhow::Result;
use clap::Args;
use roomba_sdk::prelude::*;
use std::thread;
use std::time::Duration;

/// 切换到可执行运动的模式
pub fn enter_actuation_mode<L: Link>(roomba: &Roomba<L>, full: bool) -> Result<()> {
    if full {
        roomba.set_full_mode()?;
    } else if roomba.mode() != Mode::Safe {
        roomba.set_safe_mode()?;
    }
    Ok(())
}

/// 按速度/转弯半径行驶
#[derive(Args, Debug)]
pub struct DriveCommand {
    /// 速度（mm/s，-500..=500）
    #[arg(allow_hyphen_values = true)]
    pub velocity: i16,

    /// 转弯半径（mm，-2000..=2000；32767 直行，-1 原地顺时针，1 原地逆时针）
    #[arg(short, long, default_value_t = RADIUS_STRAIGHT, allow_hyphen_values = true)]
    pub radius: i16,

    /// 持续时间（毫秒），结束后停车
    #[arg(short, long, default_value_t = 1000)]
    pub duration: u64,

    /// 使用 Full 模式（关闭安全保护）
    #[arg(long)]
    pub full: bool,
}

impl DriveCommand {
    pub fn execute<L: Link>(&self, roomba: &Roomba<L>) -> Result<()> {
        enter_actuation_mode(roomba, self.full)?;
        println!("⏳ 行驶: {} mm/s, 半径 {} mm, {} ms", self.velocity, self.radius, self.duration);
        roomba.drive(self.velocity, self.radius)?;
        thread::sleep(Duration::from_millis(self.duration));
        roomba.drive_stop()?;
        println!("✅ 已停车");
        Ok(())
    }
}

/// 分别控制左右轮
#[derive(Args, Debug)]
pub struct DirectCommand {
    /// 右轮（mm/s，-500..=500；--pwm 时为 -255..=255）
    #[arg(allow_hyphen_values = true)]
    pub right: i16,

    /// 左轮
    #[arg(allow_hyphen_values = true)]
    pub left: i16,

    /// 持续时间（毫秒），结束后停车
    #[arg(short, long, default_value_t = 1000)]
    pub duration: u64,

    /// 以 PWM 占空比驱动
    #[arg(long)]
    pub pwm: bool,

    /// 使用 Full 模式
    #[arg(long)]
    pub full: bool,
}

impl DirectCommand {
    pub fn execute<L: Link>(&self, roomba: &Roomba<L>) -> Result<()> {
        enter_actuation_mode(roomba, self.full)?;
        if self.pwm {
            roomba.drive_pwm(self.right, self.left)?;
        } else {
            roomba.drive_direct(self.right, self.left)?;
        }
        thread::sleep(Duration::from_millis(self.duration));
        roomba.drive_stop()?;
        println!("✅ 已停车");
        Ok(())
    }
}
