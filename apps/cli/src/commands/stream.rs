//! 遥测流命令
//!
//! 启动读取线程并打印收到的每一帧，直到 Ctrl-C、达到帧数或超时。

use anyhow::{Result, bail};
use clap::Args;
use roomba_sdk::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::config::TelemetrySection;

/// 接收等待粒度（用于响应停止信号）
const RECV_SLICE: Duration = Duration::from_millis(100);

/// 订阅传感器流
#[derive(Args, Debug)]
pub struct StreamCommand {
    /// 包 ID 列表（省略时使用配置文件 [telemetry] packets）
    pub packets: Vec<u8>,

    /// 收到指定帧数后退出
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// 运行时长（秒）
    #[arg(short, long)]
    pub duration: Option<u64>,
}

impl StreamCommand {
    /// 运行直到 `running` 被清除或达到退出条件，返回打印的帧数
    pub fn run<L: Link + 'static>(
        &self,
        roomba: &Arc<Roomba<L>>,
        section: &TelemetrySection,
        running: &AtomicBool,
    ) -> Result<u64> {
        let config = section.to_config(&self.packets)?;
        if config.packets.is_empty() {
            bail!("未指定传感器包（命令行或 [telemetry] packets）");
        }

        let (sink, rx) = ChannelSink::new(256);
        let mut reader = TelemetryReader::spawn(Arc::clone(roomba), sink, config)?;
        let deadline = self.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
        let mut printed = 0u64;

        while running.load(Ordering::Acquire) {
            if self.count.is_some_and(|count| printed >= count) {
                break;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
            let Ok(packet) = rx.recv_timeout(RECV_SLICE) else {
                continue;
            };
            println!("{}", format_packet(&packet));
            printed += 1;
        }

        reader.stop();
        let stats = reader.stats();
        println!(
            "✅ 共 {} 帧（接受 {}，校验失败 {}，超时 {}）",
            printed, stats.accepted, stats.rejected, stats.timeouts
        );
        Ok(printed)
    }
}

fn format_packet(packet: &TelemetryPacket) -> String {
    let fields: Vec<String> = packet
        .fields()
        .iter()
        .map(|field| format!("{:?}={}", field.packet, field.value))
        .collect();
    format!("[{:>8} ms] {}", packet.timestamp_ms, fields.join(" "))
}
