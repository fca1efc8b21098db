//! 歌曲命令

use anyhow::{Result, bail};
use clap::Args;
use roomba_sdk::prelude::*;

/// 播放预置旋律或已写入的歌曲槽位
#[derive(Args, Debug)]
pub struct SongCommand {
    /// 旋律名称（不区分大小写）
    #[arg(conflicts_with = "slot")]
    pub melody: Option<String>,

    /// 直接播放已写入的槽位（0..=4）
    #[arg(long)]
    pub slot: Option<u8>,

    /// 列出预置旋律
    #[arg(long)]
    pub list: bool,
}

impl SongCommand {
    /// 不需要连接即可完成的部分（`--list`）
    pub fn is_offline(&self) -> bool {
        self.list
    }

    pub fn list() {
        for melody in Melody::ALL {
            let units: u32 = melody.parts.iter().map(|part| part.duration_units()).sum();
            let seconds = units as f64 / 64.0;
            println!("{:<20} {} 段, {:.2} s", melody.name, melody.parts.len(), seconds);
        }
    }

    pub fn execute<L: Link>(&self, roomba: &Roomba<L>) -> Result<()> {
        match (&self.melody, self.slot) {
            (Some(name), _) => {
                let Some(melody) = Melody::by_name(name) else {
                    bail!("未知旋律: {}（使用 --list 查看）", name);
                };
                roomba.play_melody(&melody)?;
                println!("✅ 播放 {}", melody.name);
            },
            (None, Some(slot)) => {
                roomba.play_song(slot)?;
                println!("✅ 播放槽位 {}", slot);
            },
            (None, None) => bail!("需要旋律名称或 --slot"),
        }
        Ok(())
    }
}
