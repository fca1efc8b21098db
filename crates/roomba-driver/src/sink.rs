//! 遥测数据接收端
//!
//! 读取线程在自己的线程里同步调用接收端，所以接收端必须快速返回：
//! 需要跨线程转发时使用 `ChannelSink`（`try_send`，队列满时丢弃并计数）。
//!
//! # 示例
//!
//! ```
//! use roomba_driver::sink::{ChannelSink, TelemetrySink};
//! use roomba_driver::TelemetryPacket;
//!
//! let (mut sink, rx) = ChannelSink::new(16);
//! sink.on_packet(&TelemetryPacket::new(vec![22, 0x3A, 0x98], 42));
//! assert_eq!(rx.try_recv().unwrap().timestamp_ms, 42);
//! ```

use crate::telemetry::TelemetryPacket;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// 遥测数据接收端
///
/// 所有 `FnMut(&TelemetryPacket) + Send + 'static` 闭包都自动实现该 trait。
pub trait TelemetrySink: Send + 'static {
    /// 处理一个已校验的遥测包
    ///
    /// 在读取线程中调用，不应阻塞。
    fn on_packet(&mut self, packet: &TelemetryPacket);
}

impl<F> TelemetrySink for F
where
    F: FnMut(&TelemetryPacket) + Send + 'static,
{
    fn on_packet(&mut self, packet: &TelemetryPacket) {
        self(packet)
    }
}

/// 基于有界 channel 的接收端
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<TelemetryPacket>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// 创建接收端及对应的消费端
    pub fn new(capacity: usize) -> (Self, Receiver<TelemetryPacket>) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// 因队列满或消费端关闭而丢弃的包数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for ChannelSink {
    fn on_packet(&mut self, packet: &TelemetryPacket) {
        match self.sender.try_send(packet.clone()) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!("Telemetry packet dropped (total {})", dropped);
            },
        }
    }
}
