//! 运行模式
//!
//! One-shot 模式：每次命令独立连接（打开串口 → 唤醒/启动 → 执行 → 关闭）

pub mod oneshot;
