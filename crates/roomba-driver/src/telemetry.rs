//! 遥测流读取线程
//!
//! 一个专用线程按固定周期调用 `Roomba::read_stream()`，
//! 把校验通过的帧打上毫秒时间戳后同步交给接收端。
//!
//! - 读取按绝对时间锚点计时，接收端耗时不会让读取落后于底盘的推送
//! - 校验失败、超时：丢弃并退避，然后补跑错过的周期
//! - 停止：协作式停止，宽限期内未退出则强制分离；无论哪种情况都会发送暂停流命令
//! - 强制分离后线程不会再调用接收端，也不会再发布 `latest()`
//!
//! 同一引擎同一时间只允许一个读取者。登记由读取线程持有，线程真正退出时才释放。

use crate::clock::monotonic_millis;
use crate::config::TelemetryConfig;
use crate::error::RoombaError;
use crate::roomba::Roomba;
use crate::sink::TelemetrySink;
use crate::worker::{ShutdownOutcome, StopToken, Ticker, Worker};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use roomba_link::Link;
use roomba_protocol::{StreamField, decode_fields};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 一个已校验的遥测包
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryPacket {
    /// 流帧负载（`[包 ID][值]...`）
    pub payload: Vec<u8>,
    /// 接收时间（毫秒，单调时钟）
    pub timestamp_ms: u64,
}

impl TelemetryPacket {
    pub fn new(payload: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            payload,
            timestamp_ms,
        }
    }

    /// 按包表解码负载
    pub fn fields(&self) -> Vec<StreamField> {
        decode_fields(&self.payload)
    }
}

/// 读取统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// 校验通过并交给接收端的帧数
    pub accepted: u64,
    /// 校验失败的帧数
    pub rejected: u64,
    /// 读取超时次数
    pub timeouts: u64,
    /// 其他链路错误次数
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ReaderStats {
        ReaderStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

type SharedSink = Arc<Mutex<Box<dyn TelemetrySink>>>;

/// 读取者对引擎流的登记，drop 时释放（包括线程 panic）
struct StreamClaim<L: Link> {
    roomba: Arc<Roomba<L>>,
}

impl<L: Link> StreamClaim<L> {
    fn acquire(roomba: &Arc<Roomba<L>>) -> Option<Self> {
        roomba.claim_stream().then(|| Self {
            roomba: roomba.clone(),
        })
    }
}

impl<L: Link> Drop for StreamClaim<L> {
    fn drop(&mut self) {
        self.roomba.release_stream();
    }
}

/// 遥测流读取者
///
/// # Example
///
/// ```no_run
/// use roomba_driver::{RoombaBuilder, TelemetryConfig, TelemetryReader, sink::ChannelSink};
/// use roomba_protocol::SensorPacket;
/// use std::sync::Arc;
///
/// let roomba = Arc::new(RoombaBuilder::new().open_serial("/dev/ttyUSB0").unwrap());
/// let (sink, rx) = ChannelSink::new(64);
/// let config = TelemetryConfig {
///     packets: vec![SensorPacket::Voltage, SensorPacket::Current],
///     ..Default::default()
/// };
/// let mut reader = TelemetryReader::spawn(roomba, sink, config).unwrap();
/// for packet in rx.iter().take(10) {
///     println!("{:?}", packet.fields());
/// }
/// reader.stop();
/// ```
pub struct TelemetryReader<L: Link + 'static> {
    roomba: Arc<Roomba<L>>,
    worker: Option<Worker>,
    sink: SharedSink,
    latest: Arc<ArcSwapOption<TelemetryPacket>>,
    counters: Arc<Counters>,
    config: TelemetryConfig,
}

impl<L: Link + 'static> TelemetryReader<L> {
    /// 启动读取线程
    ///
    /// `config.packets` 非空时先请求底盘推送这些包；为空时假定流已由调用方启动。
    ///
    /// # 错误
    /// - `InvalidParameter`: 该引擎已有读取者
    /// - `Initialization`: 引擎已关闭，或无法创建线程
    /// - `Command`: 启动流命令写入失败
    pub fn spawn<S: TelemetrySink>(
        roomba: Arc<Roomba<L>>,
        sink: S,
        config: TelemetryConfig,
    ) -> Result<Self, RoombaError> {
        let Some(claim) = StreamClaim::acquire(&roomba) else {
            return Err(RoombaError::InvalidParameter(
                "a telemetry reader is already running on this engine".to_string(),
            ));
        };

        if !config.packets.is_empty() {
            roomba.start_streaming(&config.packets)?;
        }

        let sink: Box<dyn TelemetrySink> = Box::new(sink);
        let sink: SharedSink = Arc::new(Mutex::new(sink));
        let latest = Arc::new(ArcSwapOption::empty());
        let counters = Arc::new(Counters::default());

        let worker = {
            let roomba = roomba.clone();
            let sink = sink.clone();
            let latest = latest.clone();
            let counters = counters.clone();
            let config = config.clone();
            Worker::spawn("roomba-telemetry", move |token| {
                let _claim = claim;
                read_loop(&roomba, &sink, &latest, &counters, &config, &token);
            })
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                rollback_start(&roomba, &config);
                return Err(RoombaError::Initialization(format!(
                    "failed to spawn telemetry thread: {}",
                    e
                )));
            },
        };

        info!(
            "Telemetry reader started (period {} ms)",
            config.poll_period_ms
        );
        Ok(Self {
            roomba,
            worker: Some(worker),
            sink,
            latest,
            counters,
            config,
        })
    }

    /// 最近一个校验通过的包（无锁）
    pub fn latest(&self) -> Option<Arc<TelemetryPacket>> {
        self.latest.load_full()
    }

    pub fn stats(&self) -> ReaderStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// 停止读取线程并暂停底盘的传感器流
    pub fn stop(&mut self) -> ShutdownOutcome {
        let Some(mut worker) = self.worker.take() else {
            return ShutdownOutcome::AlreadyStopped;
        };

        // 暂停命令必须在线程退出、释放登记之前发出
        worker.token().request_stop();
        pause_stream(&self.roomba);

        let grace = Duration::from_millis(self.config.stop_grace_ms);
        let outcome = worker.shutdown(grace);
        if outcome == ShutdownOutcome::Forced {
            // 等待正在进行的接收端调用结束；之后线程会看到 abort 标志
            if self.sink.try_lock_for(grace).is_none() {
                warn!("Telemetry sink still busy after forced stop");
            }
        }

        let stats = self.stats();
        info!(
            "Telemetry reader stopped ({:?}): {} accepted, {} rejected, {} timeouts",
            outcome, stats.accepted, stats.rejected, stats.timeouts
        );
        outcome
    }
}

impl<L: Link + 'static> Drop for TelemetryReader<L> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

fn pause_stream<L: Link>(roomba: &Roomba<L>) {
    match roomba.stop_streaming() {
        Ok(()) => {},
        Err(RoombaError::Initialization(_)) => debug!("Engine closed, stream pause skipped"),
        Err(e) => warn!("Failed to pause sensor stream: {}", e),
    }
}

/// 读取线程未能启动时撤销已经请求的流
fn rollback_start<L: Link>(roomba: &Roomba<L>, config: &TelemetryConfig) {
    if !config.packets.is_empty() {
        pause_stream(roomba);
    }
}

fn read_loop<L: Link>(
    roomba: &Roomba<L>,
    sink: &Mutex<Box<dyn TelemetrySink>>,
    latest: &ArcSwapOption<TelemetryPacket>,
    counters: &Counters,
    config: &TelemetryConfig,
    token: &StopToken,
) {
    let mut ticker = Ticker::new(Duration::from_millis(config.poll_period_ms));
    let backoff = Duration::from_millis(config.error_backoff_ms);

    while token.should_run() {
        match roomba.read_stream() {
            Ok(frame) => {
                let packet = TelemetryPacket::new(frame.into_payload(), monotonic_millis());
                trace!("Telemetry frame: {:02X?}", packet.payload);

                let mut sink = sink.lock();
                if token.is_aborted() {
                    break;
                }
                counters.accepted.fetch_add(1, Ordering::Relaxed);
                latest.store(Some(Arc::new(packet.clone())));
                sink.on_packet(&packet);
            },
            Err(RoombaError::Timeout) => {
                counters.timeouts.fetch_add(1, Ordering::Relaxed);
                trace!("Telemetry read timed out");
                token.sleep(backoff);
            },
            Err(RoombaError::Sensor(reason)) => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                debug!("Telemetry frame rejected: {}", reason);
                token.sleep(backoff);
            },
            Err(RoombaError::Initialization(_)) => {
                info!("Engine closed, telemetry reader exiting");
                break;
            },
            Err(e) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Telemetry read failed: {}", e);
                token.sleep(backoff);
            },
        }

        // 退避期间错过的周期立即补跑，积压的帧在几个周期内读完
        ticker.wait(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoombaConfig;
    use crate::sink::ChannelSink;
    use roomba_link::{MockHandle, MockLink};
    use roomba_protocol::{SensorPacket, StreamFrame};
    use serial_test::serial;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn fast_config() -> TelemetryConfig {
        TelemetryConfig {
            packets: Vec::new(),
            poll_period_ms: 1,
            error_backoff_ms: 1,
            stop_grace_ms: 500,
        }
    }

    fn engine() -> (Arc<Roomba<MockLink>>, MockHandle) {
        let link = MockLink::new();
        let handle = link.handle();
        let roomba = Roomba::new(link, RoombaConfig::no_delays());
        roomba.start().unwrap();
        handle.take_tx();
        (Arc::new(roomba), handle)
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        StreamFrame::encode_payload(payload).unwrap()
    }

    #[test]
    fn test_reader_delivers_valid_frames_only() {
        let (roomba, handle) = engine();
        handle.push_rx(&frame(&[22, 0x3A, 0x98]));
        // 校验和被破坏的帧
        handle.push_rx(&[19, 3, 22, 0x3A, 0x99, 0x00]);
        handle.push_rx(&frame(&[35, 2]));

        let (sink, rx) = ChannelSink::new(16);
        let mut reader = TelemetryReader::spawn(roomba.clone(), sink, fast_config()).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.payload, vec![22, 0x3A, 0x98]);
        assert_eq!(
            first.fields(),
            vec![StreamField {
                packet: SensorPacket::Voltage,
                value: 15_000
            }]
        );
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(second.payload, vec![35, 2]);
        assert!(second.timestamp_ms >= first.timestamp_ms);

        assert_eq!(reader.latest().unwrap().payload, vec![35, 2]);
        assert_eq!(reader.stop(), ShutdownOutcome::Graceful);
        let stats = reader.stats();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.rejected, 1);
        assert!(handle.tx().ends_with(&[150, 0]));
    }

    #[test]
    fn test_spawn_requests_stream() {
        let (roomba, handle) = engine();
        let config = TelemetryConfig {
            packets: vec![SensorPacket::Voltage],
            ..fast_config()
        };
        let mut reader = TelemetryReader::spawn(roomba, |_: &TelemetryPacket| {}, config).unwrap();
        reader.stop();
        assert_eq!(handle.writes(), vec![vec![148, 1, 22], vec![150, 0]]);
    }

    #[test]
    fn test_single_reader_per_engine() {
        let (roomba, _handle) = engine();
        let mut first =
            TelemetryReader::spawn(roomba.clone(), |_: &TelemetryPacket| {}, fast_config()).unwrap();
        let second = TelemetryReader::spawn(roomba.clone(), |_: &TelemetryPacket| {}, fast_config());
        assert!(matches!(second, Err(RoombaError::InvalidParameter(_))));

        first.stop();
        let mut third =
            TelemetryReader::spawn(roomba, |_: &TelemetryPacket| {}, fast_config()).unwrap();
        third.stop();
    }

    #[test]
    fn test_forced_stop_never_calls_sink_again() {
        let (roomba, handle) = engine();
        handle.push_rx(&frame(&[7, 0]));
        handle.push_rx(&frame(&[7, 1]));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sink = move |_: &TelemetryPacket| {
            counter.fetch_add(1, Ordering::SeqCst);
            // 模拟卡住的接收端
            std::thread::sleep(Duration::from_millis(300));
        };
        let config = TelemetryConfig {
            stop_grace_ms: 50,
            ..fast_config()
        };
        let mut reader = TelemetryReader::spawn(roomba, sink, config).unwrap();

        while calls.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(reader.stop(), ShutdownOutcome::Forced);
        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.tx().ends_with(&[150, 0]));
    }

    #[test]
    #[serial]
    fn test_reader_keeps_pace_with_stream() {
        const FRAMES: usize = 150;
        let (roomba, handle) = engine();
        let bytes = frame(&[22, 0x3A, 0x98]);
        let config = TelemetryConfig {
            packets: Vec::new(),
            poll_period_ms: 15,
            error_backoff_ms: 30,
            stop_grace_ms: 500,
        };
        // 每包耗时 2 ms 的接收端
        let sink = |_: &TelemetryPacket| std::thread::sleep(Duration::from_millis(2));
        let mut reader = TelemetryReader::spawn(roomba, sink, config).unwrap();

        // 底盘每 15 ms 推送一帧
        let token = StopToken::new();
        let mut ticker = Ticker::new(Duration::from_millis(15));
        for _ in 0..FRAMES {
            handle.push_rx(&bytes);
            ticker.wait(&token);
        }
        std::thread::sleep(Duration::from_millis(60));
        let backlog = handle.rx_pending() / bytes.len();
        reader.stop();

        assert!(backlog <= 2, "reader fell behind by {} frames", backlog);
        assert!(reader.stats().accepted as usize >= FRAMES - 2);
    }

    #[test]
    fn test_claim_held_until_detached_thread_exits() {
        let (roomba, handle) = engine();
        handle.push_rx(&frame(&[7, 0]));

        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let sink = move |_: &TelemetryPacket| {
            let _ = entered_tx.try_send(());
            // 卡住直到测试放行
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        };
        let config = TelemetryConfig {
            stop_grace_ms: 50,
            ..fast_config()
        };
        let mut reader = TelemetryReader::spawn(roomba.clone(), sink, config).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        assert_eq!(reader.stop(), ShutdownOutcome::Forced);
        // 分离的线程仍在运行，不允许第二个读取者
        let second = TelemetryReader::spawn(roomba.clone(), |_: &TelemetryPacket| {}, fast_config());
        assert!(matches!(second, Err(RoombaError::InvalidParameter(_))));

        release_tx.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut third = loop {
            match TelemetryReader::spawn(roomba.clone(), |_: &TelemetryPacket| {}, fast_config()) {
                Ok(reader) => break reader,
                Err(RoombaError::InvalidParameter(_)) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                },
                Err(e) => panic!("spawn after thread exit failed: {}", e),
            }
        };
        assert_eq!(third.stop(), ShutdownOutcome::Graceful);
        assert_eq!(reader.latest().unwrap().payload, vec![7, 0]);
    }

    #[test]
    fn test_failed_stream_request_releases_claim() {
        let (roomba, handle) = engine();
        let config = TelemetryConfig {
            packets: vec![SensorPacket::Voltage],
            ..fast_config()
        };

        handle.fail_writes(true);
        assert!(TelemetryReader::spawn(roomba.clone(), |_: &TelemetryPacket| {}, config.clone()).is_err());

        handle.fail_writes(false);
        let mut reader = TelemetryReader::spawn(roomba, |_: &TelemetryPacket| {}, config).unwrap();
        reader.stop();
    }

    #[test]
    fn test_rollback_start_pauses_requested_stream() {
        let (roomba, handle) = engine();
        let config = TelemetryConfig {
            packets: vec![SensorPacket::Voltage],
            ..fast_config()
        };
        roomba.start_streaming(&config.packets).unwrap();
        rollback_start(&roomba, &config);
        assert_eq!(handle.writes(), vec![vec![148, 1, 22], vec![150, 0]]);

        // 未请求流时不发送暂停
        handle.take_tx();
        rollback_start(&roomba, &fast_config());
        assert!(handle.writes().is_empty());
    }
}
