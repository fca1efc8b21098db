//! 视频推流循环
//!
//! 从 `FrameExchange` 拷贝最新帧并交给网络层的 `FrameSink`：
//! - 没有可用帧：退避 `retry_backoff`
//! - 帧未更新（时间戳相同）：等待 `duplicate_wait` 后重试
//! - 发送失败：记录并退避 `retry_backoff`
//! - 发送成功：补足到 `period` 再进入下一轮（至少让出 1 ms）

use crate::config::FramePumpConfig;
use crate::error::RoombaError;
use crate::frame_exchange::{FrameExchange, FrameReader};
use crate::worker::{ShutdownOutcome, StopToken, Worker};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// 最短让出时间
const MIN_YIELD: Duration = Duration::from_millis(1);

/// 发送失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Frame sink error: {0}")]
pub struct FrameSinkError(pub String);

/// 帧发送端（网络层）
///
/// `bytes` 借用推流线程的私有缓冲区，只在调用期间有效。
pub trait FrameSink: Send + 'static {
    fn send_frame(&mut self, bytes: &[u8], timestamp_us: u64) -> Result<(), FrameSinkError>;
}

impl<F> FrameSink for F
where
    F: FnMut(&[u8], u64) -> Result<(), FrameSinkError> + Send + 'static,
{
    fn send_frame(&mut self, bytes: &[u8], timestamp_us: u64) -> Result<(), FrameSinkError> {
        self(bytes, timestamp_us)
    }
}

/// 推流统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramePumpStats {
    pub sent: u64,
    pub duplicates: u64,
    /// 没有可用帧（尚未发布或锁超时）的次数
    pub empty: u64,
    pub send_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    duplicates: AtomicU64,
    empty: AtomicU64,
    send_errors: AtomicU64,
}

/// 推流线程
pub struct FramePump {
    worker: Option<Worker>,
    streaming: Arc<AtomicBool>,
    counters: Arc<Counters>,
    config: FramePumpConfig,
}

impl FramePump {
    /// 启动推流线程（初始为推流状态）
    ///
    /// # 错误
    /// - `Initialization`: 无法创建线程
    pub fn spawn<S: FrameSink>(
        exchange: &Arc<FrameExchange>,
        sink: S,
        config: FramePumpConfig,
    ) -> Result<Self, RoombaError> {
        let streaming = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(Counters::default());

        let worker = {
            let reader = exchange.reader();
            let streaming = streaming.clone();
            let counters = counters.clone();
            let mut sink = sink;
            Worker::spawn("roomba-frame-pump", move |token| {
                pump_loop(reader, &mut sink, &streaming, &counters, &config, &token);
            })
        }
        .map_err(|e| RoombaError::Initialization(format!("failed to spawn frame pump: {}", e)))?;

        info!("Frame pump started (period {} ms)", config.period_ms);
        Ok(Self {
            worker: Some(worker),
            streaming,
            counters,
            config,
        })
    }

    /// 暂停/恢复推流（线程保持运行）
    pub fn set_streaming(&self, enabled: bool) {
        self.streaming.store(enabled, Ordering::Release);
        debug!("Frame streaming {}", if enabled { "enabled" } else { "paused" });
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FramePumpStats {
        FramePumpStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            empty: self.counters.empty.load(Ordering::Relaxed),
            send_errors: self.counters.send_errors.load(Ordering::Relaxed),
        }
    }

    pub fn stop(&mut self) -> ShutdownOutcome {
        let Some(mut worker) = self.worker.take() else {
            return ShutdownOutcome::AlreadyStopped;
        };
        self.streaming.store(false, Ordering::Release);
        let outcome = worker.shutdown(Duration::from_millis(self.config.stop_grace_ms));
        info!("Frame pump stopped ({:?}), {} frames sent", outcome, self.stats().sent);
        outcome
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

fn pump_loop<S: FrameSink>(
    mut reader: FrameReader,
    sink: &mut S,
    streaming: &AtomicBool,
    counters: &Counters,
    config: &FramePumpConfig,
    token: &StopToken,
) {
    let period = Duration::from_millis(config.period_ms);
    let backoff = Duration::from_millis(config.retry_backoff_ms);
    let duplicate_wait = Duration::from_millis(config.duplicate_wait_ms);
    let mut last_timestamp = None;

    while token.should_run() {
        if !streaming.load(Ordering::Acquire) {
            token.sleep(period);
            continue;
        }

        let started = Instant::now();
        let Some(frame) = reader.copy_latest() else {
            counters.empty.fetch_add(1, Ordering::Relaxed);
            token.sleep(backoff);
            continue;
        };

        if last_timestamp == Some(frame.timestamp_us) {
            counters.duplicates.fetch_add(1, Ordering::Relaxed);
            token.sleep(duplicate_wait);
            continue;
        }
        last_timestamp = Some(frame.timestamp_us);

        if token.is_aborted() {
            break;
        }
        if let Err(e) = sink.send_frame(frame.bytes, frame.timestamp_us) {
            counters.send_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to send frame: {}", e);
            token.sleep(backoff);
            continue;
        }
        counters.sent.fetch_add(1, Ordering::Relaxed);
        trace!("Sent frame: {} bytes", frame.bytes.len());

        let rest = period.saturating_sub(started.elapsed());
        token.sleep(rest.max(MIN_YIELD));
    }
}
