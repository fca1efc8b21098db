//! One-shot 模式
//!
//! 每个命令独立执行：
//! 1. 读取配置
//! 2. 连接机器人（唤醒并进入 Passive）
//! 3. 执行操作
//! 4. 停车并关闭连接

use anyhow::{Context, Result};
use roomba_sdk::prelude::*;
use std::sync::Arc;
use tracing::warn;

use crate::commands::CliConfig;

/// One-shot 模式
pub struct OneShotMode {
    config: CliConfig,
}

impl OneShotMode {
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    /// 打开串口并完成唤醒/启动
    pub fn connect(&self) -> Result<Roomba<SerialLink>> {
        let port = self
            .config
            .serial
            .port
            .as_deref()
            .context("未配置串口（使用 --port 或在 [serial] 中设置 port）")?;

        println!("⏳ 连接到 {}...", port);
        let mut builder = RoombaBuilder::new()
            .config(self.config.engine.clone())
            .invert_wake_line(self.config.serial.invert_wake_line);
        if let Some(baud_rate) = self.config.serial.baud_rate {
            builder = builder.baud_rate(baud_rate);
        }

        let roomba = builder.open_serial(port).with_context(|| format!("连接 {} 失败", port))?;
        println!("✅ 已连接（模式 {:?}）", roomba.mode());
        Ok(roomba)
    }

    /// 连接、执行、关闭
    ///
    /// 操作失败时仍然尝试关闭连接（停车并发送 Stop）。
    pub fn run<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&Arc<Roomba<SerialLink>>) -> Result<()>,
    {
        let roomba = Arc::new(self.connect()?);
        let result = op(&roomba);
        finish(&roomba, result)
    }
}

/// 关闭连接；关闭失败只记录日志，不覆盖操作结果
pub fn finish<L: Link>(roomba: &Roomba<L>, result: Result<()>) -> Result<()> {
    if let Err(e) = roomba.close() {
        warn!("Failed to close connection: {}", e);
    }
    result
}
