//! 视频帧交换
//!
//! 单生产者（采集循环）发布最新一帧，多个读者各自把它拷贝到私有缓冲区。
//!
//! - 生产者：校验后在锁内拷贝到主缓冲区（有上限地等待锁）
//! - 读者：有上限地等待锁，拷贝到预分配的私有缓冲区；拿不到锁时返回 `None`
//! - 缓冲区只在构造时分配一次
//!
//! 读者通过比较时间戳自行判断是否为重复帧。

use crate::cell::LatestCell;
use crate::config::FrameExchangeConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{trace, warn};

/// JPEG 起始标记（SOI）
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// 帧被拒绝的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameRejected {
    #[error("Empty frame")]
    Empty,

    #[error("Frame too short ({0} bytes)")]
    TooShort(usize),

    #[error("Frame does not start with a JPEG SOI marker")]
    BadMarker,

    #[error("Frame too large: {len} bytes (capacity {capacity})")]
    TooLarge { len: usize, capacity: usize },

    #[error("Frame buffer busy")]
    Busy,
}

/// 检查帧是否为完整的 JPEG 采集结果
pub fn validate_frame(bytes: &[u8], capacity: usize) -> Result<(), FrameRejected> {
    match bytes.len() {
        0 => return Err(FrameRejected::Empty),
        n if n < JPEG_SOI.len() => return Err(FrameRejected::TooShort(n)),
        n if n > capacity => {
            return Err(FrameRejected::TooLarge { len: n, capacity });
        },
        _ => {},
    }
    if bytes[..2] != JPEG_SOI {
        return Err(FrameRejected::BadMarker);
    }
    Ok(())
}

struct FrameSlot {
    data: Box<[u8]>,
    len: usize,
    timestamp_us: u64,
}

/// 最新帧交换区
pub struct FrameExchange {
    slot: LatestCell<FrameSlot>,
    config: FrameExchangeConfig,
    published: AtomicU64,
}

impl std::fmt::Debug for FrameExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameExchange")
            .field("capacity", &self.config.capacity)
            .field("published", &self.published_count())
            .finish()
    }
}

impl FrameExchange {
    pub fn new(config: FrameExchangeConfig) -> Self {
        Self {
            slot: LatestCell::new(FrameSlot {
                data: vec![0u8; config.capacity].into_boxed_slice(),
                len: 0,
                timestamp_us: 0,
            }),
            config,
            published: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// 已成功发布的帧数
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// 发布一帧
    ///
    /// 不合法的帧被丢弃，当前帧保持不变。
    ///
    /// # 错误
    /// - `Empty` / `TooShort` / `BadMarker` / `TooLarge`: 帧校验失败
    /// - `Busy`: 超时内未拿到锁（读者占用时间过长）
    pub fn publish(&self, bytes: &[u8], timestamp_us: u64) -> Result<(), FrameRejected> {
        if let Err(reason) = validate_frame(bytes, self.config.capacity) {
            warn!("Frame rejected: {}", reason);
            return Err(reason);
        }

        let timeout = Duration::from_millis(self.config.publish_lock_timeout_ms);
        self.slot
            .write_timeout(timeout, |slot| {
                slot.data[..bytes.len()].copy_from_slice(bytes);
                slot.len = bytes.len();
                slot.timestamp_us = timestamp_us;
            })
            .ok_or(FrameRejected::Busy)?;

        self.published.fetch_add(1, Ordering::AcqRel);
        trace!("Published frame: {} bytes @ {} us", bytes.len(), timestamp_us);
        Ok(())
    }

    /// 创建读者（私有缓冲区在此一次性分配）
    pub fn reader(self: &Arc<Self>) -> FrameReader {
        FrameReader {
            exchange: Arc::clone(self),
            scratch: vec![0u8; self.config.capacity].into_boxed_slice(),
            len: 0,
            timestamp_us: 0,
        }
    }
}

/// 读者拿到的帧（借用读者的私有缓冲区）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub bytes: &'a [u8],
    pub timestamp_us: u64,
}

/// 帧读者
pub struct FrameReader {
    exchange: Arc<FrameExchange>,
    scratch: Box<[u8]>,
    len: usize,
    timestamp_us: u64,
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("len", &self.len)
            .field("timestamp_us", &self.timestamp_us)
            .finish()
    }
}

impl FrameReader {
    /// 拷贝当前帧
    ///
    /// 超时内拿不到锁、或还没有任何帧发布时返回 `None`。
    pub fn copy_latest(&mut self) -> Option<Frame<'_>> {
        let timeout = Duration::from_millis(self.exchange.config.copy_lock_timeout_ms);
        let scratch = &mut self.scratch;
        let copied = self.exchange.slot.read_timeout(timeout, |slot| {
            if slot.len == 0 {
                return None;
            }
            scratch[..slot.len].copy_from_slice(&slot.data[..slot.len]);
            Some((slot.len, slot.timestamp_us))
        });

        let (len, timestamp_us) = match copied {
            Some(Some(frame)) => frame,
            Some(None) => return None,
            None => {
                warn!("Frame buffer lock timed out");
                return None;
            },
        };
        self.len = len;
        self.timestamp_us = timestamp_us;
        Some(Frame {
            bytes: &self.scratch[..len],
            timestamp_us,
        })
    }
}
