//! 内存脚本化链路（测试用）
//!
//! `MockLink` 交给引擎，`MockHandle` 留在测试侧，两者共享同一份状态：
//! 测试可以预置接收字节、注册"写入触发响应"的规则、注入写入故障，并检查发送记录。
//! 读取从不真正睡眠，超时立即返回。

use crate::{Link, LinkError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    writes: Vec<Vec<u8>>,
    responders: VecDeque<(Vec<u8>, Vec<u8>)>,
    wake_line: Vec<bool>,
    has_wake_line: bool,
    fail_writes: bool,
    discards: usize,
}

/// 测试用链路
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

/// 测试侧句柄
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带唤醒线的链路
    pub fn with_wake_line() -> Self {
        let link = Self::default();
        link.state.lock().has_wake_line = true;
        link
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }
}

impl MockHandle {
    /// 追加接收字节
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// 当发送记录以 `trigger` 结尾时，把 `response` 追加到接收缓冲区
    ///
    /// 规则按注册顺序匹配，每条只触发一次。
    pub fn respond_to(&self, trigger: &[u8], response: &[u8]) {
        self.state
            .lock()
            .responders
            .push_back((trigger.to_vec(), response.to_vec()));
    }

    /// 之后的写入全部失败
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// 全部已发送字节
    pub fn tx(&self) -> Vec<u8> {
        self.state.lock().tx.clone()
    }

    /// 按 `write_all` 调用划分的发送记录
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// 取出并清空发送记录
    pub fn take_tx(&self) -> Vec<u8> {
        let mut state = self.state.lock();
        state.writes.clear();
        std::mem::take(&mut state.tx)
    }

    /// 尚未被读取的接收字节数
    pub fn rx_pending(&self) -> usize {
        self.state.lock().rx.len()
    }

    /// 唤醒线电平变化记录
    pub fn wake_line_events(&self) -> Vec<bool> {
        self.state.lock().wake_line.clone()
    }

    /// `discard_input` 被调用的次数
    pub fn discards(&self) -> usize {
        self.state.lock().discards
    }
}

impl Link for MockLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(LinkError::Disconnected);
        }
        state.tx.extend_from_slice(bytes);
        state.writes.push(bytes.to_vec());

        let fired = match state.responders.front() {
            Some((trigger, _)) => state.tx.ends_with(trigger),
            None => false,
        };
        if fired {
            if let Some((_, response)) = state.responders.pop_front() {
                state.rx.extend(response);
            }
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        Ok(self.state.lock().rx.len())
    }

    fn read_exact_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if state.rx.len() < buf.len() {
            state.rx.clear();
            return Err(LinkError::Timeout);
        }
        for slot in buf.iter_mut() {
            if let Some(byte) = state.rx.pop_front() {
                *slot = byte;
            }
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.rx.clear();
        state.discards += 1;
        Ok(())
    }

    fn has_wake_line(&self) -> bool {
        self.state.lock().has_wake_line
    }

    fn set_wake_line(&mut self, high: bool) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if state.has_wake_line {
            state.wake_line.push(high);
        }
        Ok(())
    }
}
