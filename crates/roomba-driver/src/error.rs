//! 驱动层错误类型定义

use roomba_link::LinkError;
use roomba_protocol::ProtocolError;
use thiserror::Error;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum RoombaError {
    /// 引擎未初始化或已关闭
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// 写入/发送失败
    #[error("Command error: {0}")]
    Command(#[from] LinkError),

    /// 传感器数据读取或校验失败
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// 在超时内没有收到数据
    #[error("Operation timeout")]
    Timeout,

    /// 参数不合法或当前模式不允许该操作
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<ProtocolError> for RoombaError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ChecksumMismatch { .. } => RoombaError::Sensor(err.to_string()),
            other => RoombaError::InvalidParameter(other.to_string()),
        }
    }
}

impl RoombaError {
    /// 读取路径上的链路错误：超时单独归类，其余视为命令错误
    pub(crate) fn from_read(err: LinkError) -> Self {
        match err {
            LinkError::Timeout => RoombaError::Timeout,
            other => RoombaError::Command(other),
        }
    }
}
