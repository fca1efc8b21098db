//! 模式、清扫与显示命令

use anyhow::Result;
use clap::{Args, ValueEnum};
use roomba_sdk::prelude::*;

use super::drive::enter_actuation_mode;

/// 可请求的 OI 模式
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Passive,
    Safe,
    Full,
}

/// 切换 OI 模式
#[derive(Args, Debug)]
pub struct ModeCommand {
    #[arg(value_enum)]
    pub mode: ModeArg,
}

impl ModeCommand {
    pub fn execute<L: Link>(&self, roomba: &Roomba<L>) -> Result<()> {
        match self.mode {
            ModeArg::Passive => roomba.start()?,
            ModeArg::Safe => roomba.set_safe_mode()?,
            ModeArg::Full => roomba.set_full_mode()?,
        }
        println!("✅ 当前模式: {:?}", roomba.mode());
        Ok(())
    }
}

/// 清扫动作
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanKind {
    /// 默认清扫
    Clean,
    /// 定点清扫
    Spot,
    /// 寻找充电座
    Dock,
}

#[derive(Args, Debug)]
pub struct CleanCommand {
    #[arg(value_enum, default_value_t = CleanKind::Clean)]
    pub kind: CleanKind,
}

impl CleanCommand {
    pub fn execute<L: Link>(&self, roomba: &Roomba<L>) -> Result<()> {
        match self.kind {
            CleanKind::Clean => roomba.clean()?,
            CleanKind::Spot => roomba.spot()?,
            CleanKind::Dock => roomba.dock()?,
        }
        println!("✅ 已发送 {:?}", self.kind);
        Ok(())
    }
}

/// 清扫电机开关
#[derive(Args, Debug)]
pub struct MotorsCommand {
    #[arg(long)]
    pub main_brush: bool,

    #[arg(long)]
    pub side_brush: bool,

    #[arg(long)]
    pub vacuum: bool,
}

impl MotorsCommand {
    pub fn execute<L: Link>(&self, roomba: &Roomba<L>) -> Result<()> {
        enter_actuation_mode(roomba, false)?;
        let mask = MotorMask::from_flags(self.main_brush, self.side_brush, self.vacuum);
        roomba.set_motors(mask)?;
        println!("✅ 电机掩码: {:#05b}", mask.bits());
        Ok(())
    }
}

/// 在四位数码管上显示文本
#[derive(Args, Debug)]
pub struct DisplayCommand {
    /// 文本（取末 4 个字符，不足补空格）
    pub text: String,
}

impl DisplayCommand {
    pub fn execute<L: Link>(&self, roomba: &Roomba<L>) -> Result<()> {
        enter_actuation_mode(roomba, false)?;
        roomba.write_to_display(&self.text)?;
        println!("✅ 已显示 {:?}", self.text);
        Ok(())
    }
}
