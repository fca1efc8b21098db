//! 传感器查询命令

use anyhow::Result;
use clap::Args;
use roomba_sdk::prelude::*;

/// 查询传感器
#[derive(Args, Debug)]
pub struct SensorsCommand {
    /// 包 ID（单包 7..=58 或分组 0..=6、100、101、106、107）；省略时读取全部传感器
    pub packet: Option<u8>,

    /// 输出原始字节
    #[arg(long)]
    pub raw: bool,
}

impl SensorsCommand {
    pub fn execute<L: Link>(&self, roomba: &Roomba<L>) -> Result<()> {
        for line in self.query(roomba)? {
            println!("{}", line);
        }
        Ok(())
    }

    /// 查询并格式化为输出行
    pub fn query<L: Link>(&self, roomba: &Roomba<L>) -> Result<Vec<String>> {
        match self.packet {
            None => {
                let snapshot = roomba.read_all_sensors()?;
                Ok(snapshot
                    .iter()
                    .map(|(packet, value)| {
                        let name = format!("{:?}", packet);
                        format!("{:>3} {:<28} {}", u8::from(packet), name, value)
                    })
                    .collect())
            },
            Some(id) => match SensorPacket::try_from(id) {
                Ok(packet) if !self.raw => {
                    let value = roomba.read_sensor_value(packet)?;
                    Ok(vec![format!("{:?} = {}", packet, value)])
                },
                _ => {
                    let bytes = roomba.read_sensor(id)?;
                    Ok(vec![format!("{} = {:02X?}", id, bytes)])
                },
            },
        }
    }
}
