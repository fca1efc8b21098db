//! 电机执行通道与看门狗
//!
//! 写者（命令分发）把 4 字节有符号速度写入命令槽，同时在槽锁内推进序号并打时间戳。
//! 控制循环（默认 1 ms 周期）读取快照：
//!
//! 1. 命令超过看门狗窗口没有更新（或槽被清零）：停止所有电机，优先级最高
//! 2. 序号大于上次执行的序号：换算方向和占空比后执行
//! 3. 否则什么都不做
//!
//! 读取快照时拿不到锁则沿用上一次的快照，保证看门狗照常触发。
//! 执行失败只记录日志；停止失败是致命错误，交给 `FatalHandler`。

use crate::cell::LatestCell;
use crate::clock::{Clock, MonotonicClock};
use crate::config::ActuationConfig;
use crate::worker::{StopToken, Ticker, Worker};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// 命令槽中的速度通道数
pub const MOTOR_CHANNELS: usize = 4;
/// 速度下限（百分比）
pub const MIN_SPEED: i8 = -100;
/// 速度上限（百分比）
pub const MAX_SPEED: i8 = 100;
/// 10 位 PWM 满占空比
pub const MAX_DUTY: i16 = 1023;

/// 电机转向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// 电机命令（命令槽内容）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotorCommand {
    /// 各通道速度，-100..=100（超出范围的值在换算时钳位）
    pub speeds: [i8; MOTOR_CHANNELS],
    /// 写入序号，从 1 开始；0 表示槽已清零
    pub sequence: u64,
    /// 写入时间（微秒，单调时钟）；0 表示从未写入
    pub timestamp_us: u64,
}

impl MotorCommand {
    /// 零和正速度为正转
    pub fn direction(&self, channel: usize) -> Direction {
        if self.speeds[channel] >= 0 {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    /// 钳位到 ±100 后换算到 ±1023
    pub fn scaled_speed(&self, channel: usize) -> i16 {
        let clamped = self.speeds[channel].clamp(MIN_SPEED, MAX_SPEED) as i32;
        (clamped * MAX_DUTY as i32 / MAX_SPEED as i32) as i16
    }

    /// 占空比（`scaled_speed` 的绝对值）
    pub fn duty(&self, channel: usize) -> u16 {
        self.scaled_speed(channel).unsigned_abs()
    }

    /// 命令是否已过期
    pub fn is_stale(&self, now_us: u64, window_us: u64) -> bool {
        self.timestamp_us == 0 || now_us.saturating_sub(self.timestamp_us) > window_us
    }
}

/// 电机驱动器报告的故障
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MotorFault(pub String);

/// 执行通道错误
#[derive(Error, Debug)]
pub enum ActuationError {
    #[error("Invalid motor command length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Motor {channel} drive failed: {source}")]
    Driver { channel: usize, source: MotorFault },

    /// 致命：电机可能仍在转动
    #[error("Motor {channel} stop failed: {source}")]
    StopFailed { channel: usize, source: MotorFault },
}

/// 电机驱动器（H 桥 + PWM）
pub trait MotorDriver: Send {
    /// 实际接线的电机数
    fn channel_count(&self) -> usize {
        3
    }

    fn init(&mut self, _channel: usize) -> Result<(), MotorFault> {
        Ok(())
    }

    /// 以 `duty`（0..=1023）驱动电机
    fn drive(&mut self, channel: usize, direction: Direction, duty: u16) -> Result<(), MotorFault>;

    fn stop(&mut self, channel: usize) -> Result<(), MotorFault>;
}

/// 致命错误处理
pub type FatalHandler = Box<dyn Fn(&ActuationError) + Send + Sync>;

/// 默认致命错误处理：记录日志后终止进程（由外部监督者重启）
pub fn abort_on_fatal() -> FatalHandler {
    Box::new(|err| {
        error!("Fatal actuation error: {}, aborting", err);
        std::process::abort();
    })
}

/// 电机命令槽
pub struct ActuationChannel {
    slot: LatestCell<MotorCommand>,
    sequence: AtomicU64,
    clock: Arc<dyn Clock>,
    config: ActuationConfig,
}

impl std::fmt::Debug for ActuationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuationChannel")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .field("config", &self.config)
            .finish()
    }
}

impl ActuationChannel {
    pub fn new(config: ActuationConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    pub fn with_clock(config: ActuationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: LatestCell::new(MotorCommand::default()),
            sequence: AtomicU64::new(0),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ActuationConfig {
        &self.config
    }

    /// 写入一条命令（每字节为一个通道的有符号速度）
    ///
    /// 返回分配的序号。
    ///
    /// # 错误
    /// - `InvalidLength`: 长度不是 4 字节
    pub fn write(&self, data: &[u8]) -> Result<u64, ActuationError> {
        if data.len() != MOTOR_CHANNELS {
            return Err(ActuationError::InvalidLength {
                expected: MOTOR_CHANNELS,
                actual: data.len(),
            });
        }

        let sequence = self.slot.write(|command| {
            for (speed, byte) in command.speeds.iter_mut().zip(data) {
                *speed = *byte as i8;
            }
            let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
            command.sequence = sequence;
            command.timestamp_us = self.clock.now_micros();
            sequence
        });
        trace!("Motor command #{}: {:?}", sequence, data);
        Ok(sequence)
    }

    /// 清空命令槽，下一次轮询即停止所有电机
    pub fn write_zero(&self) {
        self.slot.write(|command| *command = MotorCommand::default());
        debug!("Motor command slot cleared");
    }

    /// 当前命令（无限等待）
    pub fn snapshot(&self) -> MotorCommand {
        self.slot.snapshot()
    }

    fn snapshot_timeout(&self) -> Option<MotorCommand> {
        self.slot
            .snapshot_timeout(Duration::from_micros(self.config.snapshot_timeout_us))
    }
}

/// 单次轮询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// 命令过期，已停止所有电机
    Stopped,
    /// 执行了新命令
    Applied(u64),
    /// 没有新命令
    Idle,
}

/// 电机控制循环
pub struct MotorController<D: MotorDriver> {
    channel: Arc<ActuationChannel>,
    driver: D,
    previous: MotorCommand,
    last_applied: u64,
    halted: bool,
}

impl<D: MotorDriver> MotorController<D> {
    pub fn new(channel: Arc<ActuationChannel>, driver: D) -> Self {
        Self {
            channel,
            driver,
            previous: MotorCommand::default(),
            last_applied: 0,
            halted: false,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    /// 初始化所有电机并停止
    ///
    /// 初始化失败只记录日志；停止失败返回 `StopFailed`。
    pub fn start(&mut self) -> Result<(), ActuationError> {
        for channel in 0..self.channel_count() {
            if let Err(e) = self.driver.init(channel) {
                error!("Motor {} init failed: {}", channel, e);
            }
        }
        self.stop_all()
    }

    /// 轮询一次命令槽
    pub fn poll(&mut self) -> Result<PollOutcome, ActuationError> {
        let current = match self.channel.snapshot_timeout() {
            Some(command) => {
                self.previous = command;
                command
            },
            None => {
                debug!("Motor command slot busy, reusing previous snapshot");
                self.previous
            },
        };

        let now = self.channel.clock.now_micros();
        if current.is_stale(now, self.channel.config.watchdog_us) {
            self.stop_all()?;
            if !self.halted {
                info!(
                    "No motor command for {} us, motors stopped",
                    self.channel.config.watchdog_us
                );
                self.halted = true;
            }
            return Ok(PollOutcome::Stopped);
        }

        if current.sequence <= self.last_applied {
            return Ok(PollOutcome::Idle);
        }

        for channel in 0..self.channel_count() {
            let direction = current.direction(channel);
            let duty = current.duty(channel);
            if let Err(source) = self.driver.drive(channel, direction, duty) {
                let err = ActuationError::Driver { channel, source };
                error!("{}", err);
            }
        }
        debug!(
            "Motors #{}: {:?} {:?}",
            current.sequence,
            current.speeds,
            (0..self.channel_count())
                .map(|c| current.direction(c))
                .collect::<Vec<_>>()
        );

        self.last_applied = current.sequence;
        self.halted = false;
        Ok(PollOutcome::Applied(current.sequence))
    }

    /// 停止所有电机
    pub fn stop_all(&mut self) -> Result<(), ActuationError> {
        for channel in 0..self.channel_count() {
            self.driver
                .stop(channel)
                .map_err(|source| ActuationError::StopFailed { channel, source })?;
        }
        Ok(())
    }

    /// 在当前线程运行控制循环，直到停止请求或致命错误
    ///
    /// 正常退出前停止所有电机。
    pub fn run(&mut self, token: &StopToken, fatal: &FatalHandler) {
        if let Err(e) = self.start() {
            fatal(&e);
            return;
        }

        let mut ticker = Ticker::new(Duration::from_micros(self.channel.config.poll_period_us));
        while token.should_run() {
            if let Err(e) = self.poll() {
                fatal(&e);
                return;
            }
            ticker.wait(token);
        }

        if let Err(e) = self.stop_all() {
            fatal(&e);
        }
    }

    fn channel_count(&self) -> usize {
        self.driver.channel_count().min(MOTOR_CHANNELS)
    }
}

impl<D: MotorDriver + 'static> MotorController<D> {
    /// 在专用线程中运行控制循环
    pub fn spawn(mut self, fatal: FatalHandler) -> std::io::Result<Worker> {
        Worker::spawn("roomba-motors", move |token| {
            self.run(&token, &fatal);
            if token.is_aborted() {
                warn!("Motor control loop exited after forced stop");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use serial_test::serial;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Init(usize),
        Drive(usize, Direction, u16),
        Stop(usize),
    }

    #[derive(Clone, Default)]
    struct RecordingDriver {
        events: Arc<Mutex<Vec<Event>>>,
        fail_stop: bool,
        fail_drive: bool,
        drive_delay: Duration,
    }

    impl RecordingDriver {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl MotorDriver for RecordingDriver {
        fn init(&mut self, channel: usize) -> Result<(), MotorFault> {
            self.events.lock().push(Event::Init(channel));
            Ok(())
        }

        fn drive(&mut self, channel: usize, direction: Direction, duty: u16) -> Result<(), MotorFault> {
            if self.fail_drive {
                return Err(MotorFault("ledc error".into()));
            }
            if channel == 0 && !self.drive_delay.is_zero() {
                std::thread::sleep(self.drive_delay);
            }
            self.events.lock().push(Event::Drive(channel, direction, duty));
            Ok(())
        }

        fn stop(&mut self, channel: usize) -> Result<(), MotorFault> {
            if self.fail_stop {
                return Err(MotorFault("gpio error".into()));
            }
            self.events.lock().push(Event::Stop(channel));
            Ok(())
        }
    }

    const T0: u64 = 10_000_000;

    fn setup() -> (Arc<ActuationChannel>, ManualClock, RecordingDriver) {
        let clock = ManualClock::new(T0);
        let channel = Arc::new(ActuationChannel::with_clock(
            ActuationConfig::default(),
            Arc::new(clock.clone()),
        ));
        (channel, clock, RecordingDriver::default())
    }

    fn all_stopped() -> Vec<Event> {
        vec![Event::Stop(0), Event::Stop(1), Event::Stop(2)]
    }

    #[test]
    fn test_scaled_speed() {
        let command = MotorCommand {
            speeds: [100, -100, 50, -128],
            ..Default::default()
        };
        assert_eq!(command.scaled_speed(0), 1023);
        assert_eq!(command.scaled_speed(1), -1023);
        assert_eq!(command.scaled_speed(2), 511);
        assert_eq!(command.scaled_speed(3), -1023);
        assert_eq!(command.duty(1), 1023);
        assert_eq!(command.direction(1), Direction::Backward);
        assert_eq!(MotorCommand::default().direction(0), Direction::Forward);
    }

    #[test]
    fn test_write_rejects_wrong_length() {
        let (channel, _, _) = setup();
        assert!(matches!(
            channel.write(&[1, 2, 3]),
            Err(ActuationError::InvalidLength { expected: 4, actual: 3 })
        ));
        assert_eq!(channel.snapshot(), MotorCommand::default());
    }

    #[test]
    fn test_watchdog_scenario() {
        let (channel, clock, driver) = setup();
        let mut controller = MotorController::new(channel.clone(), driver.clone());
        controller.start().unwrap();
        assert_eq!(
            driver.take(),
            vec![
                Event::Init(0),
                Event::Init(1),
                Event::Init(2),
                Event::Stop(0),
                Event::Stop(1),
                Event::Stop(2)
            ]
        );

        for _ in 0..4 {
            channel.write(&[0, 0, 0, 0]).unwrap();
        }
        let seq = channel.write(&[50, (-50i8) as u8, 100, 0]).unwrap();
        assert_eq!(seq, 5);

        assert_eq!(controller.poll().unwrap(), PollOutcome::Applied(5));
        assert_eq!(
            driver.take(),
            vec![
                Event::Drive(0, Direction::Forward, 511),
                Event::Drive(1, Direction::Backward, 511),
                Event::Drive(2, Direction::Forward, 1023),
            ]
        );

        // 同一序号不重复执行
        assert_eq!(controller.poll().unwrap(), PollOutcome::Idle);

        // 恰好等于窗口时仍然有效
        clock.set_micros(T0 + 400_000);
        assert_eq!(controller.poll().unwrap(), PollOutcome::Idle);
        assert!(driver.take().is_empty());

        clock.set_micros(T0 + 400_001);
        assert_eq!(controller.poll().unwrap(), PollOutcome::Stopped);
        assert_eq!(driver.take(), all_stopped());
    }

    #[test]
    fn test_stale_dominates_new_sequence() {
        let (channel, clock, driver) = setup();
        let mut controller = MotorController::new(channel.clone(), driver.clone());
        channel.write(&[10, 10, 10, 10]).unwrap();
        clock.advance(Duration::from_millis(500));

        assert_eq!(controller.poll().unwrap(), PollOutcome::Stopped);
        assert_eq!(controller.last_applied(), 0);
        assert_eq!(driver.take(), all_stopped());
    }

    #[test]
    fn test_write_zero_stops_motors() {
        let (channel, _clock, driver) = setup();
        let mut controller = MotorController::new(channel.clone(), driver.clone());
        channel.write(&[10, 10, 10, 10]).unwrap();
        assert_eq!(controller.poll().unwrap(), PollOutcome::Applied(1));

        channel.write_zero();
        driver.take();
        assert_eq!(controller.poll().unwrap(), PollOutcome::Stopped);
        assert_eq!(driver.take(), all_stopped());

        // 清零后新的写入继续递增序号，可以再次执行
        assert_eq!(channel.write(&[1, 1, 1, 1]).unwrap(), 2);
        assert_eq!(controller.poll().unwrap(), PollOutcome::Applied(2));
    }

    #[test]
    fn test_drive_failure_is_not_fatal() {
        let (channel, _clock, mut driver) = setup();
        driver.fail_drive = true;
        let mut controller = MotorController::new(channel.clone(), driver);
        channel.write(&[10, 10, 10, 10]).unwrap();
        assert_eq!(controller.poll().unwrap(), PollOutcome::Applied(1));
    }

    #[test]
    fn test_stop_failure_reaches_fatal_handler() {
        let (channel, _clock, mut driver) = setup();
        driver.fail_stop = true;
        let mut controller = MotorController::new(channel, driver);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let fatal: FatalHandler = Box::new(move |err| sink.lock().push(err.to_string()));

        controller.run(&StopToken::new(), &fatal);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("Motor 0 stop failed"));
    }

    #[test]
    #[serial]
    fn test_spawned_loop_enforces_watchdog() {
        let channel = Arc::new(ActuationChannel::new(ActuationConfig {
            watchdog_us: 20_000,
            ..Default::default()
        }));
        let driver = RecordingDriver::default();
        let mut worker = MotorController::new(channel.clone(), driver.clone())
            .spawn(abort_on_fatal())
            .unwrap();

        std::thread::sleep(Duration::from_millis(10));
        driver.take();
        channel.write(&[20, 20, 20, 20]).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let events = driver.take();
        let first_drive = events
            .iter()
            .position(|e| matches!(e, Event::Drive(..)))
            .unwrap();
        assert!(events[first_drive..].contains(&Event::Stop(0)));

        assert_eq!(
            worker.shutdown(Duration::from_secs(1)),
            crate::worker::ShutdownOutcome::Graceful
        );
    }

    #[test]
    #[serial]
    fn test_poll_cadence_excludes_driver_time() {
        let channel = Arc::new(ActuationChannel::new(ActuationConfig {
            poll_period_us: 10_000,
            ..Default::default()
        }));
        let driver = RecordingDriver {
            drive_delay: Duration::from_millis(4),
            ..Default::default()
        };
        let mut worker = MotorController::new(channel.clone(), driver.clone())
            .spawn(abort_on_fatal())
            .unwrap();

        // 每轮都有新序号，每次轮询都会驱动电机
        let start = std::time::Instant::now();
        let mut speed = 1;
        while start.elapsed() < Duration::from_millis(300) {
            channel.write(&[speed, 0, 0, 0]).unwrap();
            speed = speed % 50 + 1;
            std::thread::sleep(Duration::from_millis(1));
        }
        worker.shutdown(Duration::from_secs(1));

        let applied = driver
            .take()
            .iter()
            .filter(|e| matches!(e, Event::Drive(0, ..)))
            .count();
        // 10 ms 周期在 300 ms 内约 30 次；按"耗时 + 周期"计时只有约 21 次
        assert!(applied >= 26, "only {} polls applied", applied);
    }

    #[test]
    fn test_concurrent_writers_get_unique_sequences() {
        let (channel, _, _) = setup();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let channel = channel.clone();
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| channel.write(&[1, 2, 3, 4]).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (1..=1000).collect::<Vec<_>>());
        assert_eq!(channel.snapshot().sequence, 1000);
    }

    proptest! {
        #[test]
        fn prop_sequence_strictly_increases(writes in prop::collection::vec(any::<[u8; 4]>(), 1..50)) {
            let (channel, _, _) = setup();
            let mut last = 0;
            for data in writes {
                let seq = channel.write(&data).unwrap();
                prop_assert!(seq > last);
                prop_assert_eq!(channel.snapshot().speeds, data.map(|b| b as i8));
                last = seq;
            }
        }
    }
}
