//! # Roomba CLI
//!
//! Command-line interface for Roomba / Create 2 control over the Open Interface.
//!
//! 每个命令独立执行（打开串口 → 唤醒/启动 → 执行 → 停车并关闭）：
//!
//! ```bash
//! # 写出默认配置，然后编辑 [serial] port
//! roomba-cli config init
//!
//! # 以 200 mm/s 直行 2 秒
//! roomba-cli --port /dev/ttyUSB0 drive 200 --duration 2000
//!
//! # 读取全部传感器
//! roomba-cli sensors
//!
//! # 订阅电压和电流，Ctrl-C 退出
//! roomba-cli stream 22 23
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod modes;

use commands::{
    CleanCommand, CliConfig, ConfigCommand, DirectCommand, DisplayCommand, DriveCommand,
    ModeCommand, MotorsCommand, Overrides, SensorsCommand, SongCommand, StreamCommand,
};
use modes::oneshot::OneShotMode;

/// Roomba CLI - 底盘命令行工具
#[derive(Parser, Debug)]
#[command(name = "roomba-cli")]
#[command(about = "Command-line interface for Roomba / Create 2 control", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件（默认 ./roomba.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 串口设备（覆盖配置文件）
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// 波特率（覆盖配置文件）
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// 唤醒线（DTR）反相
    #[arg(long, global = true)]
    invert_wake_line: bool,

    /// 不发送唤醒脉冲
    #[arg(long, global = true)]
    no_wake: bool,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 按速度/转弯半径行驶
    Drive {
        #[command(flatten)]
        args: DriveCommand,
    },

    /// 分别控制左右轮
    Direct {
        #[command(flatten)]
        args: DirectCommand,
    },

    /// 切换 OI 模式
    Mode {
        #[command(flatten)]
        args: ModeCommand,
    },

    /// 清扫 / 定点清扫 / 回充
    Clean {
        #[command(flatten)]
        args: CleanCommand,
    },

    /// 清扫电机开关
    Motors {
        #[command(flatten)]
        args: MotorsCommand,
    },

    /// 数码管显示
    Display {
        #[command(flatten)]
        args: DisplayCommand,
    },

    /// 查询传感器
    Sensors {
        #[command(flatten)]
        args: SensorsCommand,
    },

    /// 订阅传感器流（Ctrl-C 退出）
    Stream {
        #[command(flatten)]
        args: StreamCommand,
    },

    /// 播放旋律
    Song {
        #[command(flatten)]
        args: SongCommand,
    },

    /// 软复位（结束后处于 Passive）
    Reset,

    /// 电源命令
    Power,

    /// 停车并停止 OI
    Stop,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let filter = if cli.verbose { "roomba=debug" } else { "roomba=info" };
    if let Err(e) = roomba_sdk::try_init_logger(filter) {
        eprintln!("日志初始化失败: {}", e);
    }

    let (mut config, source) = CliConfig::discover(cli.config.as_deref())?;
    config.apply(&Overrides {
        port: cli.port,
        baud_rate: cli.baud,
        invert_wake_line: cli.invert_wake_line,
        no_wake: cli.no_wake,
    });

    let mode = OneShotMode::new(config);
    match cli.command {
        Commands::Config(cmd) => cmd.execute(mode.config(), source.as_deref()),

        Commands::Drive { args } => mode.run(|roomba| args.execute(roomba)),
        Commands::Direct { args } => mode.run(|roomba| args.execute(roomba)),
        Commands::Mode { args } => mode.run(|roomba| args.execute(roomba)),
        Commands::Clean { args } => mode.run(|roomba| args.execute(roomba)),
        Commands::Motors { args } => mode.run(|roomba| args.execute(roomba)),
        Commands::Display { args } => mode.run(|roomba| args.execute(roomba)),
        Commands::Sensors { args } => mode.run(|roomba| args.execute(roomba)),

        Commands::Song { args } if args.is_offline() => {
            SongCommand::list();
            Ok(())
        },
        Commands::Song { args } => mode.run(|roomba| args.execute(roomba)),

        Commands::Stream { args } => {
            let running = Arc::new(AtomicBool::new(true));
            {
                let running = running.clone();
                ctrlc::set_handler(move || {
                    running.store(false, Ordering::Release);
                })
                .context("设置 Ctrl-C 处理失败")?;
            }
            let section = mode.config().telemetry.clone();
            mode.run(|roomba| args.run(roomba, &section, &running).map(|_| ()))
        },

        Commands::Reset => mode.run(|roomba| {
            roomba.reset()?;
            println!("✅ 已复位（模式 {:?}）", roomba.mode());
            Ok(())
        }),

        Commands::Power => mode.run(|roomba| {
            roomba.power()?;
            println!("✅ 已发送电源命令");
            Ok(())
        }),

        // 关闭连接本身即停车并发送 Stop
        Commands::Stop => mode.run(|_| {
            println!("⏳ 停止...");
            Ok(())
        }),
    }
}
