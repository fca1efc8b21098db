//! 配置文件与配置管理命令
//!
//! 配置文件为 TOML，默认读取当前目录下的 `roomba.toml`：
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! invert_wake_line = false
//!
//! [engine]
//! post_reset_ms = 2000
//!
//! [telemetry]
//! packets = [22, 23, 35]
//! poll_period_ms = 15
//! ```
//!
//! 命令行参数优先于配置文件。

use anyhow::{Context, Result, anyhow, bail};
use clap::Subcommand;
use roomba_sdk::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件名（当前目录）
pub const DEFAULT_CONFIG_FILE: &str = "roomba.toml";

/// `[serial]` 段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    /// 设备路径（如 /dev/ttyUSB0、COM3）
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub invert_wake_line: bool,
}

/// `[telemetry]` 段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// 传感器包 ID（7..=58）
    pub packets: Vec<u8>,
    pub poll_period_ms: u64,
    pub error_backoff_ms: u64,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        let defaults = TelemetryConfig::default();
        Self {
            packets: Vec::new(),
            poll_period_ms: defaults.poll_period_ms,
            error_backoff_ms: defaults.error_backoff_ms,
        }
    }
}

impl TelemetrySection {
    /// 转换为读取线程配置
    ///
    /// `packets` 非空时覆盖配置文件中的包列表。
    pub fn to_config(&self, packets: &[u8]) -> Result<TelemetryConfig> {
        let ids = if packets.is_empty() { &self.packets[..] } else { packets };
        let packets = ids
            .iter()
            .map(|&id| {
                SensorPacket::try_from(id).map_err(|_| anyhow!("unknown sensor packet id {}", id))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TelemetryConfig {
            packets,
            poll_period_ms: self.poll_period_ms,
            error_backoff_ms: self.error_backoff_ms,
            ..Default::default()
        })
    }
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub serial: SerialSection,
    pub engine: RoombaConfig,
    pub telemetry: TelemetrySection,
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub invert_wake_line: bool,
    pub no_wake: bool,
}

impl CliConfig {
    /// 加载指定的配置文件
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 查找配置文件
    ///
    /// 显式路径必须存在；否则尝试当前目录的 `roomba.toml`，都没有时使用默认配置。
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if path.exists() {
            let config = Self::load(&path)?;
            return Ok((config, Some(path)));
        }
        Ok((Self::default(), None))
    }

    /// 保存配置
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content).with_context(|| format!("写入配置文件失败: {}", path.display()))
    }

    /// 应用命令行覆盖项
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(port) = &overrides.port {
            self.serial.port = Some(port.clone());
        }
        if let Some(baud_rate) = overrides.baud_rate {
            self.serial.baud_rate = Some(baud_rate);
        }
        if overrides.invert_wake_line {
            self.serial.invert_wake_line = true;
        }
        if overrides.no_wake {
            self.engine.use_wake_line = false;
        }
    }

    /// 检查配置是否可用于连接
    pub fn check(&self) -> Result<()> {
        if self.serial.port.is_none() {
            bail!("未配置串口（使用 --port 或在 [serial] 中设置 port）");
        }
        if self.serial.baud_rate == Some(0) {
            bail!("波特率不能为 0");
        }
        if self.engine.sensor_read_attempts == 0 {
            bail!("engine.sensor_read_attempts 至少为 1");
        }
        self.telemetry.to_config(&[])?;
        Ok(())
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示生效的配置（含命令行覆盖）
    Show,

    /// 写出默认配置文件
    Init {
        /// 目标路径
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// 覆盖已有文件
        #[arg(short, long)]
        force: bool,
    },

    /// 检查配置
    Check,

    /// 列出可用串口
    Ports,
}

impl ConfigCommand {
    pub fn execute(self, config: &CliConfig, source: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                match source {
                    Some(path) => println!("# 来源: {}", path.display()),
                    None => println!("# 来源: 默认配置"),
                }
                print!("{}", toml::to_string_pretty(config).context("序列化配置失败")?);
                Ok(())
            },

            ConfigCommand::Init { path, force } => {
                if path.exists() && !force {
                    bail!("{} 已存在（使用 --force 覆盖）", path.display());
                }
                CliConfig::default().save(&path)?;
                println!("✅ 已写入 {}", path.display());
                Ok(())
            },

            ConfigCommand::Check => {
                config.check()?;
                println!("✅ 配置有效");
                Ok(())
            },

            ConfigCommand::Ports => {
                list_ports();
                Ok(())
            },
        }
    }
}

fn list_ports() {
    let ports = SerialLink::available_ports();
    if ports.is_empty() {
        println!("未发现串口");
    }
    for port in ports {
        println!("{}", port);
    }
}
