//! 后台线程管理
//!
//! 每个循环线程持有一个 `StopToken`：
//! - `stop`：协作式停止请求，循环每轮检查一次
//! - `abort`：强制终止标志。宽限期内未退出的线程被分离（detach），
//!   之后它不得再调用任何回调，并在下一个 IO 边界退出
//!
//! Rust 无法安全地杀死线程，所以"强制删除"在这里的含义是分离 + 禁止副作用。

use crossbeam_channel::{RecvTimeoutError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// 可中断睡眠的检查粒度
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// 循环线程的停止令牌
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stop: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求协作式停止
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// 标记为强制终止（同时请求停止）
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// 循环是否应继续
    pub fn should_run(&self) -> bool {
        !self.is_stop_requested()
    }

    /// 睡眠，期间收到停止请求时提前返回
    ///
    /// 返回 `true` 表示睡满了整个时长。
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stop_requested() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            spin_sleep::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

/// 错过的节拍超过该数量时重新锚定到当前时间，不再逐个补跑
pub const MAX_CATCH_UP_TICKS: u32 = 10;

/// 固定频率节拍器（绝对时间锚点）
///
/// 每个周期的截止时间由上一个截止时间推出，循环体的耗时不会累积成漂移。
/// 已经错过的节拍立即返回，循环以全速补跑；
/// 落后超过 [`MAX_CATCH_UP_TICKS`] 个周期时放弃补跑，从当前时间重新计时。
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    next_tick: Instant,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_tick: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 睡眠到下一个锚点
    ///
    /// 返回 `false` 表示睡眠被停止请求打断。
    pub fn wait(&mut self, token: &StopToken) -> bool {
        self.next_tick += self.period;
        let now = Instant::now();
        if self.next_tick > now {
            return token.sleep(self.next_tick.saturating_duration_since(now));
        }

        let lag = now.duration_since(self.next_tick);
        if lag > self.period * MAX_CATCH_UP_TICKS {
            debug!("Loop fell {:?} behind, re-anchoring", lag);
            self.next_tick = now;
        }
        token.should_run()
    }

    /// 把锚点移到当前时间
    pub fn reset(&mut self) {
        self.next_tick = Instant::now();
    }
}

/// 停止结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// 线程在宽限期内正常退出
    Graceful,
    /// 线程未在宽限期内退出，已分离并标记为强制终止
    Forced,
    /// 线程 panic
    Panicked,
    /// 线程此前已被回收
    AlreadyStopped,
}

/// 带宽限期停止的后台线程
#[derive(Debug)]
pub struct Worker {
    name: String,
    token: StopToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// 启动命名线程
    ///
    /// # 错误
    /// 操作系统无法创建线程时返回 IO 错误。
    pub fn spawn<F>(name: impl Into<String>, f: F) -> std::io::Result<Self>
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let name = name.into();
        let token = StopToken::new();
        let thread_token = token.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || f(thread_token))?;

        debug!("Worker '{}' started", name);
        Ok(Self {
            name,
            token,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &StopToken {
        &self.token
    }

    /// 线程是否已结束
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// 请求停止并在宽限期内等待退出
    ///
    /// 超时后设置强制终止标志并分离线程。
    pub fn shutdown(&mut self, grace: Duration) -> ShutdownOutcome {
        let Some(handle) = self.handle.take() else {
            return ShutdownOutcome::AlreadyStopped;
        };
        self.token.request_stop();

        let outcome = join_timeout(handle, grace);
        match outcome {
            ShutdownOutcome::Graceful => debug!("Worker '{}' stopped", self.name),
            ShutdownOutcome::Forced => {
                self.token.abort();
                warn!(
                    "Worker '{}' did not stop within {:?}, detached",
                    self.name, grace
                );
            },
            ShutdownOutcome::Panicked => error!("Worker '{}' panicked", self.name),
            ShutdownOutcome::AlreadyStopped => {},
        }
        outcome
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let outcome = self.shutdown(Duration::from_secs(2));
            if outcome != ShutdownOutcome::Graceful {
                error!("Worker '{}' failed to shut down cleanly: {:?}", self.name, outcome);
            }
        }
    }
}

/// 带超时的 join
///
/// 由一个看守线程执行真正的 join，调用方在 channel 上有限等待。
/// 超时后看守线程继续等待目标线程，进程退出时由系统回收。
fn join_timeout(handle: JoinHandle<()>, timeout: Duration) -> ShutdownOutcome {
    if handle.is_finished() {
        return match handle.join() {
            Ok(()) => ShutdownOutcome::Graceful,
            Err(_) => ShutdownOutcome::Panicked,
        };
    }

    let (tx, rx) = bounded(1);
    let spawned = thread::Builder::new()
        .name("roomba-join".into())
        .spawn(move || {
            let _ = tx.send(handle.join().is_ok());
        });
    if let Err(e) = spawned {
        error!("Failed to spawn join watchdog: {}", e);
        return ShutdownOutcome::Forced;
    }

    match rx.recv_timeout(timeout) {
        Ok(true) => ShutdownOutcome::Graceful,
        Ok(false) => ShutdownOutcome::Panicked,
        Err(RecvTimeoutError::Timeout) => ShutdownOutcome::Forced,
        Err(RecvTimeoutError::Disconnected) => ShutdownOutcome::Panicked,
    }
}
