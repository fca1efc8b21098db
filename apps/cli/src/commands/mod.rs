//! 命令定义和实现

pub mod config;
pub mod control;
pub mod drive;
pub mod sensors;
pub mod song;
pub mod stream;

pub use config::{CliConfig, ConfigCommand, Overrides};
pub use control::{CleanCommand, DisplayCommand, ModeCommand, MotorsCommand};
pub use drive::{DirectCommand, DriveCommand};
pub use sensors::SensorsCommand;
pub use song::SongCommand;
pub use stream::StreamCommand;
