//! 协议引擎
//!
//! `Roomba<L>` 独占一条链路，所有串口操作经同一把 `parking_lot::Mutex` 串行化：
//! 一次操作的全部字节（以及其中的间隔和等待）不会与其他线程的字节交错。
//!
//! 当前模式保存在 `AtomicMode` 中，只在锁内写入；
//! 守卫检查无锁读取，失败时不触碰链路。

use crate::RoombaError;
use crate::config::RoombaConfig;
use crate::mode::AtomicMode;
use parking_lot::Mutex;
use roomba_link::Link;
use roomba_protocol::{
    ALL_SENSORS_GROUP, Command, LedState, Melody, Mode, ModeCommand, MotorMask, OP_CLEAN,
    OP_DOCK, OP_SENSORS, OP_SPOT, ProtocolError, SensorPacket, SensorSnapshot, StreamFrame,
    StreamParser, packet_width,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 寻找流帧时最多扫描的字节数（两个最长帧）
const MAX_STREAM_SCAN_BYTES: usize = 2 * (u8::MAX as usize + 3);

/// Roomba 协议引擎
///
/// # 线程安全
///
/// `Roomba<L>` 是 `Sync` 的，可以放进 `Arc` 在多个线程间共享
/// （例如命令分发线程和遥测读取线程）。
pub struct Roomba<L: Link> {
    link: Mutex<L>,
    mode: AtomicMode,
    initialized: AtomicBool,
    streaming: AtomicBool,
    config: RoombaConfig,
}

impl<L: Link> std::fmt::Debug for Roomba<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Roomba")
            .field("mode", &self.mode())
            .field("initialized", &self.is_initialized())
            .field("streaming", &self.streaming.load(Ordering::Relaxed))
            .finish()
    }
}

impl<L: Link> Roomba<L> {
    /// 在已打开的链路上创建引擎
    ///
    /// 初始模式为 Off。不会发送任何字节；通常随后调用 `wake()` 和 `start()`
    /// （或使用 `RoombaBuilder`）。
    pub fn new(link: L, config: RoombaConfig) -> Self {
        info!("Roomba engine initialized");
        Self {
            link: Mutex::new(link),
            mode: AtomicMode::new(Mode::Off),
            initialized: AtomicBool::new(true),
            streaming: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &RoombaConfig {
        &self.config
    }

    /// 当前模式（无锁读取）
    pub fn mode(&self) -> Mode {
        self.mode.get(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // 生命周期
    // ------------------------------------------------------------------

    /// 唤醒底盘
    ///
    /// 唤醒线拉高 `wake_high`，再拉低并保持 `wake_low`。
    /// 未启用唤醒线或链路没有唤醒线时为空操作。
    pub fn wake(&self) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        let mut link = self.link.lock();
        if !self.config.use_wake_line || !link.has_wake_line() {
            trace!("wake: no wake line, skipping");
            return Ok(());
        }
        link.set_wake_line(true)?;
        delay_ms(self.config.wake_high_ms);
        link.set_wake_line(false)?;
        delay_ms(self.config.wake_low_ms);
        debug!("Wake pulse sent");
        Ok(())
    }

    /// 进入 Passive 模式（任意模式均可）
    pub fn start(&self) -> Result<(), RoombaError> {
        self.transition(ModeCommand::Start)?;
        delay_ms(self.config.mode_settle_ms);
        Ok(())
    }

    /// 软复位：→ Off，等待底盘重启，然后重新 `start()`，最终处于 Passive
    pub fn reset(&self) -> Result<(), RoombaError> {
        self.transition(ModeCommand::Reset)?;
        delay_ms(self.config.post_reset_ms);
        self.start()
    }

    /// 停止 OI：先尝试发送零速驱动（仅在可驱动模式下，失败只记录），然后 → Off
    pub fn stop(&self) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        let mut link = self.link.lock();

        if self.mode().permits_actuation() {
            let halt = Command::drive(0, 0);
            if let Err(e) = self.transmit(&mut link, &halt.to_bytes()) {
                warn!("Failed to halt wheels before stop: {}", e);
            }
        }

        let next = self.mode().apply(ModeCommand::Stop)?;
        self.transmit(&mut link, &[ModeCommand::Stop.opcode()])?;
        self.mode.set(next, Ordering::Release);
        info!("OI stopped");
        Ok(())
    }

    /// 电源命令
    ///
    /// 模式记录为 Passive（与现场观察一致；真实底盘可能已关机）。
    pub fn power(&self) -> Result<(), RoombaError> {
        self.transition(ModeCommand::Power)
    }

    /// 进入 Safe 模式，Off 状态下拒绝
    pub fn set_safe_mode(&self) -> Result<(), RoombaError> {
        self.transition(ModeCommand::Safe)?;
        delay_ms(self.config.mode_settle_ms);
        Ok(())
    }

    /// 进入 Full 模式，Off 状态下拒绝
    pub fn set_full_mode(&self) -> Result<(), RoombaError> {
        self.transition(ModeCommand::Full)?;
        delay_ms(self.config.mode_settle_ms);
        Ok(())
    }

    /// 关闭引擎
    ///
    /// 停止底盘并释放引擎；之后的所有操作返回 `Initialization` 错误。
    pub fn close(&self) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        let result = self.stop();
        self.initialized.store(false, Ordering::Release);
        info!("Roomba engine closed");
        result
    }

    // ------------------------------------------------------------------
    // 运动
    // ------------------------------------------------------------------

    /// 速度 + 半径驱动（参数钳位见 `Command::drive`）
    pub fn drive(&self, velocity: i16, radius: i16) -> Result<(), RoombaError> {
        self.send_actuation("drive", &Command::drive(velocity, radius))
    }

    /// 停止轮子（`drive(0, 0)`）
    pub fn drive_stop(&self) -> Result<(), RoombaError> {
        self.drive(0, 0)
    }

    /// 左右轮速度（mm/s，±500）
    pub fn drive_direct(&self, right: i16, left: i16) -> Result<(), RoombaError> {
        self.send_actuation("drive_direct", &Command::drive_direct(right, left))
    }

    /// 左右轮 PWM（±255）
    pub fn drive_pwm(&self, right: i16, left: i16) -> Result<(), RoombaError> {
        self.send_actuation("drive_pwm", &Command::drive_pwm(right, left))
    }

    // ------------------------------------------------------------------
    // 清扫
    // ------------------------------------------------------------------

    /// 默认清扫（底盘自行切换到 Passive，引擎不记录模式变化）
    pub fn clean(&self) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        self.send_command(&Command::new(OP_CLEAN))
    }

    /// 定点清扫
    pub fn spot(&self) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        self.send_command(&Command::new(OP_SPOT))
    }

    /// 回充
    pub fn dock(&self) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        self.send_command(&Command::new(OP_DOCK))
    }

    /// 清扫电机
    pub fn set_motors(&self, mask: MotorMask) -> Result<(), RoombaError> {
        self.send_actuation("set_motors", &Command::motors(mask))
    }

    // ------------------------------------------------------------------
    // LED / 数码管 / 声音
    // ------------------------------------------------------------------

    pub fn set_leds(&self, state: LedState) -> Result<(), RoombaError> {
        self.send_actuation("set_leds", &Command::leds(state))
    }

    /// 在 4 位数码管上显示文本
    ///
    /// 保留最后 4 个字节，不足补空格，不可打印字节替换为空格。
    pub fn write_to_display(&self, text: &str) -> Result<(), RoombaError> {
        self.send_actuation("write_to_display", &Command::display(text))
    }

    /// 写入歌曲到槽位
    pub fn song(&self, slot: u8, notes: &[u8], durations: &[u8]) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        let command = Command::song(slot, notes, durations)?;
        self.send_command(&command)
    }

    /// 播放槽位中的歌曲
    pub fn play_song(&self, slot: u8) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        let command = Command::play(slot)?;
        self.send_command(&command)
    }

    /// 写入并播放预置旋律（从槽位 0 开始）
    pub fn play_melody(&self, melody: &Melody) -> Result<(), RoombaError> {
        for (slot, part) in melody.slots() {
            self.song(slot, part.notes, part.durations)?;
        }
        debug!("Playing melody '{}'", melody.name);
        self.play_song(0)
    }

    // ------------------------------------------------------------------
    // 传感器
    // ------------------------------------------------------------------

    /// 查询单个传感器包或分组，返回原始字节
    ///
    /// 流程：操作码 → 间隔 → 包 ID → 等待响应 → 最多 `sensor_read_attempts` 次轮询。
    /// 每次轮询若缓冲区已有足够字节则读取并返回，否则清空输入并退避。
    ///
    /// # 错误
    /// - `InvalidParameter`: 未知包 ID（不会触碰链路）
    /// - `Command`: 写入失败
    /// - `Sensor`: 所有尝试均未收到完整响应
    pub fn read_sensor(&self, id: u8) -> Result<Vec<u8>, RoombaError> {
        self.ensure_initialized()?;
        let width = packet_width(id).ok_or(ProtocolError::UnknownPacket(id))?;

        let mut link = self.link.lock();
        self.transmit(&mut link, &[OP_SENSORS])?;
        delay_ms(self.config.sensor_cmd_gap_ms);
        self.transmit(&mut link, &[id])?;
        delay_ms(self.config.sensor_response_wait_ms);

        let mut response = vec![0u8; width];
        for attempt in 1..=self.config.sensor_read_attempts {
            let available = match link.bytes_available() {
                Ok(n) => n,
                Err(e) => {
                    debug!("Sensor {} attempt {}: buffer query failed: {}", id, attempt, e);
                    continue;
                },
            };

            if available >= width {
                match link.read_exact_timeout(&mut response, self.config.wait_tx()) {
                    Ok(()) => {
                        trace!("Sensor {} -> {:02X?}", id, response);
                        return Ok(response);
                    },
                    Err(e) => debug!("Sensor {} attempt {}: read failed: {}", id, attempt, e),
                }
            }

            if let Err(e) = link.discard_input() {
                debug!("Sensor {}: discard input failed: {}", id, e);
            }
            delay_ms(self.config.sensor_response_wait_ms);
        }

        warn!(
            "Sensor {} read failed after {} attempts",
            id, self.config.sensor_read_attempts
        );
        Err(RoombaError::Sensor(format!(
            "no complete response for packet {} after {} attempts",
            id, self.config.sensor_read_attempts
        )))
    }

    /// 查询单个传感器包并按包表解码
    pub fn read_sensor_value(&self, packet: SensorPacket) -> Result<i32, RoombaError> {
        let raw = self.read_sensor(packet.into())?;
        Ok(packet.decode(&raw)?)
    }

    /// 读取全部传感器（分组 100，80 字节）
    pub fn read_all_sensors(&self) -> Result<SensorSnapshot, RoombaError> {
        let raw = self.read_sensor(ALL_SENSORS_GROUP)?;
        let snapshot = SensorSnapshot::parse(&raw);
        debug!(
            "Sensor dump: {} mV, {} mA, {} mAh / {} mAh, mode {:?}",
            snapshot.voltage_mv(),
            snapshot.current_ma(),
            snapshot.battery_charge(),
            snapshot.battery_capacity(),
            snapshot.oi_mode()
        );
        Ok(snapshot)
    }

    // ------------------------------------------------------------------
    // 遥测流
    // ------------------------------------------------------------------

    /// 请求底盘周期性推送指定的传感器包
    pub fn start_streaming(&self, packets: &[SensorPacket]) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        let command = Command::stream(packets)?;
        self.send_command(&command)?;
        info!("Sensor stream started ({} packets)", packets.len());
        Ok(())
    }

    /// 暂停传感器流
    pub fn stop_streaming(&self) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        self.send_command(&Command::pause_stream())?;
        info!("Sensor stream paused");
        Ok(())
    }

    /// 读取一个完整的流帧
    ///
    /// 逐字节寻找帧头（每字节有读取超时），然后读取长度、负载和校验和。
    ///
    /// # 错误
    /// - `Timeout`: 超时内没有收到字节
    /// - `Sensor`: 校验失败，或扫描过多字节仍未找到帧
    pub fn read_stream(&self) -> Result<StreamFrame, RoombaError> {
        self.ensure_initialized()?;
        let mut link = self.link.lock();
        let timeout = self.config.stream_read_timeout();
        let mut parser = StreamParser::new();

        for _ in 0..MAX_STREAM_SCAN_BYTES {
            let byte = link.read_byte_timeout(timeout).map_err(RoombaError::from_read)?;
            if let Some(result) = parser.push(byte) {
                return result.map_err(RoombaError::from);
            }
        }

        Err(RoombaError::Sensor(format!(
            "no stream frame within {} bytes",
            MAX_STREAM_SCAN_BYTES
        )))
    }

    // ------------------------------------------------------------------
    // 内部
    // ------------------------------------------------------------------

    /// 登记唯一的遥测读取者
    pub(crate) fn claim_stream(&self) -> bool {
        self.streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_stream(&self) {
        self.streaming.store(false, Ordering::Release);
    }

    fn ensure_initialized(&self) -> Result<(), RoombaError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(RoombaError::Initialization(
                "engine is closed".to_string(),
            ))
        }
    }

    /// 发送只在 Safe/Full 下允许的命令
    ///
    /// 模式检查和写入在同一把锁内，与并发的 `stop()` 之间没有窗口。
    fn send_actuation(&self, operation: &'static str, command: &Command) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        let mut link = self.link.lock();
        self.mode().require_actuation(operation)?;
        self.transmit(&mut link, &command.to_bytes())
    }

    /// 在锁内推进模式状态机
    ///
    /// 非法转移不触碰链路，模式保持不变；写入失败时模式也保持不变。
    fn transition(&self, command: ModeCommand) -> Result<(), RoombaError> {
        self.ensure_initialized()?;
        let mut link = self.link.lock();
        let current = self.mode();
        let next = current.apply(command)?;
        self.transmit(&mut link, &[command.opcode()])?;
        self.mode.set(next, Ordering::Release);
        debug!("Mode {:?} --{:?}--> {:?}", current, command, next);
        Ok(())
    }

    fn send_command(&self, command: &Command) -> Result<(), RoombaError> {
        let mut link = self.link.lock();
        self.transmit(&mut link, &command.to_bytes())
    }

    fn transmit(&self, link: &mut L, bytes: &[u8]) -> Result<(), RoombaError> {
        link.write_all(bytes)?;
        link.wait_tx_done(self.config.wait_tx())?;
        Ok(())
    }
}

impl<L: Link> Drop for Roomba<L> {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.stop() {
                error!("Failed to stop chassis on drop: {}", e);
            }
            self.initialized.store(false, Ordering::Release);
        }
    }
}

fn delay_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomba_link::{MockHandle, MockLink};
    use roomba_protocol::{
        OP_DIGITS_ASCII, OP_DRIVE, OP_PAUSE_RESUME_STREAM, OP_STOP, OP_STREAM, RADIUS_STRAIGHT,
    };

    fn engine() -> (Roomba<MockLink>, MockHandle) {
        let link = MockLink::new();
        let handle = link.handle();
        (Roomba::new(link, RoombaConfig::no_delays()), handle)
    }

    fn engine_in(mode: Mode) -> (Roomba<MockLink>, MockHandle) {
        let (roomba, handle) = engine();
        roomba.start().unwrap();
        match mode {
            Mode::Safe => roomba.set_safe_mode().unwrap(),
            Mode::Full => roomba.set_full_mode().unwrap(),
            _ => {},
        }
        handle.take_tx();
        (roomba, handle)
    }

    #[test]
    fn test_start_from_off() {
        let (roomba, handle) = engine();
        assert_eq!(roomba.mode(), Mode::Off);
        roomba.start().unwrap();
        assert_eq!(roomba.mode(), Mode::Passive);
        assert_eq!(handle.tx(), vec![128]);
    }

    #[test]
    fn test_safe_rejected_from_off_without_touching_link() {
        let (roomba, handle) = engine();
        assert!(matches!(
            roomba.set_safe_mode(),
            Err(RoombaError::InvalidParameter(_))
        ));
        assert!(matches!(
            roomba.set_full_mode(),
            Err(RoombaError::InvalidParameter(_))
        ));
        assert_eq!(roomba.mode(), Mode::Off);
        assert!(handle.tx().is_empty());
    }

    #[test]
    fn test_reset_lands_in_passive() {
        let (roomba, handle) = engine_in(Mode::Full);
        roomba.reset().unwrap();
        assert_eq!(roomba.mode(), Mode::Passive);
        assert_eq!(handle.tx(), vec![7, 128]);
    }

    #[test]
    fn test_stop_halts_wheels_first_when_driving() {
        let (roomba, handle) = engine_in(Mode::Safe);
        roomba.stop().unwrap();
        assert_eq!(roomba.mode(), Mode::Off);
        assert_eq!(
            handle.writes(),
            vec![vec![OP_DRIVE, 0, 0, 0, 0], vec![OP_STOP]]
        );
    }

    #[test]
    fn test_stop_from_passive_skips_halt() {
        let (roomba, handle) = engine_in(Mode::Passive);
        roomba.stop().unwrap();
        assert_eq!(handle.tx(), vec![OP_STOP]);
    }

    #[test]
    fn test_power_lands_in_passive() {
        let (roomba, handle) = engine_in(Mode::Full);
        roomba.power().unwrap();
        assert_eq!(roomba.mode(), Mode::Passive);
        assert_eq!(handle.tx(), vec![133]);
    }

    #[test]
    fn test_write_failure_keeps_mode() {
        let (roomba, handle) = engine_in(Mode::Passive);
        handle.fail_writes(true);
        assert!(matches!(
            roomba.set_full_mode(),
            Err(RoombaError::Command(_))
        ));
        assert_eq!(roomba.mode(), Mode::Passive);
    }

    #[test]
    fn test_drive_clamps_velocity_in_full() {
        let (roomba, handle) = engine_in(Mode::Full);
        roomba.drive(600, 0).unwrap();
        assert_eq!(handle.tx(), vec![OP_DRIVE, 0x01, 0xF4, 0x00, 0x00]);
    }

    #[test]
    fn test_drive_straight_sentinel_in_safe() {
        let (roomba, handle) = engine_in(Mode::Safe);
        roomba.drive(100, 32767).unwrap();
        assert_eq!(handle.tx(), vec![OP_DRIVE, 0x00, 0x64, 0x7F, 0xFF]);
    }

    #[test]
    fn test_actuation_rejected_in_passive() {
        let (roomba, handle) = engine_in(Mode::Passive);
        assert!(matches!(roomba.drive(100, 0), Err(RoombaError::InvalidParameter(_))));
        assert!(roomba.drive_direct(100, 100).is_err());
        assert!(roomba.drive_pwm(100, 100).is_err());
        assert!(roomba.set_motors(MotorMask::VACUUM).is_err());
        assert!(roomba.set_leds(LedState::default()).is_err());
        assert!(roomba.write_to_display("HI").is_err());
        assert!(handle.tx().is_empty());
    }

    #[test]
    fn test_display_keeps_last_four() {
        let (roomba, handle) = engine_in(Mode::Safe);
        roomba.write_to_display("HELLO").unwrap();
        assert_eq!(handle.tx(), vec![OP_DIGITS_ASCII, b'E', b'L', b'L', b'O']);
    }

    #[test]
    fn test_song_validation_does_not_touch_link() {
        let (roomba, handle) = engine_in(Mode::Passive);
        assert!(matches!(
            roomba.song(5, &[60], &[16]),
            Err(RoombaError::InvalidParameter(_))
        ));
        assert!(roomba.song(0, &[60; 17], &[16; 17]).is_err());
        assert!(roomba.play_song(9).is_err());
        assert!(handle.tx().is_empty());
    }

    #[test]
    fn test_play_melody_writes_all_parts() {
        let (roomba, handle) = engine_in(Mode::Passive);
        roomba.play_melody(&Melody::DAFT_PUNK).unwrap();
        let writes = handle.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(&writes[0][..3], &[140, 0, 16]);
        assert_eq!(&writes[1][..3], &[140, 1, 16]);
        assert_eq!(writes[2], vec![141, 0]);
    }

    #[test]
    fn test_read_sensor_value() {
        let (roomba, handle) = engine_in(Mode::Passive);
        handle.respond_to(&[OP_SENSORS, 22], &[0x3A, 0x98]);
        assert_eq!(roomba.read_sensor_value(SensorPacket::Voltage).unwrap(), 15_000);
        assert_eq!(handle.writes(), vec![vec![OP_SENSORS], vec![22]]);
    }

    #[test]
    fn test_read_sensor_unknown_id() {
        let (roomba, handle) = engine_in(Mode::Passive);
        assert!(matches!(
            roomba.read_sensor(99),
            Err(RoombaError::InvalidParameter(_))
        ));
        assert!(handle.tx().is_empty());
    }

    #[test]
    fn test_read_sensor_exhausts_attempts() {
        let (roomba, handle) = engine_in(Mode::Passive);
        // 只有 1 个字节，不足 2 字节宽度
        handle.respond_to(&[OP_SENSORS, 22], &[0x3A]);
        assert!(matches!(
            roomba.read_sensor(22),
            Err(RoombaError::Sensor(_))
        ));
        assert_eq!(handle.discards(), 3);
    }

    #[test]
    fn test_streaming_commands() {
        let (roomba, handle) = engine_in(Mode::Passive);
        roomba
            .start_streaming(&[SensorPacket::Voltage, SensorPacket::Current])
            .unwrap();
        roomba.stop_streaming().unwrap();
        assert_eq!(
            handle.writes(),
            vec![vec![OP_STREAM, 2, 22, 23], vec![OP_PAUSE_RESUME_STREAM, 0]]
        );
    }

    #[test]
    fn test_read_stream() {
        let (roomba, handle) = engine_in(Mode::Passive);
        handle.push_rx(&[0xAA, 19, 3, 10, 20, 30, 174]);
        let frame = roomba.read_stream().unwrap();
        assert_eq!(frame.payload(), &[10, 20, 30]);

        handle.push_rx(&[19, 3, 10, 21, 30, 174]);
        assert!(matches!(roomba.read_stream(), Err(RoombaError::Sensor(_))));

        assert!(matches!(roomba.read_stream(), Err(RoombaError::Timeout)));
    }

    #[test]
    fn test_close_rejects_later_calls() {
        let (roomba, handle) = engine_in(Mode::Full);
        roomba.close().unwrap();
        assert!(!roomba.is_initialized());
        assert_eq!(
            handle.writes(),
            vec![vec![OP_DRIVE, 0, 0, 0, 0], vec![OP_STOP]]
        );
        assert!(matches!(roomba.start(), Err(RoombaError::Initialization(_))));
        assert!(matches!(roomba.read_sensor(7), Err(RoombaError::Initialization(_))));
    }

    #[test]
    fn test_drop_stops_chassis() {
        let (roomba, handle) = engine_in(Mode::Safe);
        drop(roomba);
        assert_eq!(handle.tx(), vec![OP_DRIVE, 0, 0, 0, 0, OP_STOP]);
    }

    #[test]
    fn test_wake_pulses_line() {
        let link = MockLink::with_wake_line();
        let handle = link.handle();
        let roomba = Roomba::new(link, RoombaConfig::no_delays());
        roomba.wake().unwrap();
        assert_eq!(handle.wake_line_events(), vec![true, false]);

        let roomba = Roomba::new(
            MockLink::new(),
            RoombaConfig {
                use_wake_line: false,
                ..RoombaConfig::no_delays()
            },
        );
        roomba.wake().unwrap();
    }

    #[test]
    fn test_concurrent_commands_do_not_interleave() {
        use std::sync::Arc;
        let (roomba, handle) = engine_in(Mode::Full);
        let roomba = Arc::new(roomba);
        let threads: Vec<_> = (0..4)
            .map(|i| {
                let roomba = roomba.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        roomba.drive_direct(i * 10, -i * 10).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let writes = handle.writes();
        assert_eq!(writes.len(), 200);
        for w in writes {
            assert_eq!(w.len(), 5);
            assert_eq!(w[0], 145);
        }
    }

    #[test]
    fn test_drive_never_follows_concurrent_stop() {
        use std::sync::Arc;
        let (roomba, handle) = engine_in(Mode::Full);
        let roomba = Arc::new(roomba);
        let drivers: Vec<_> = (0..4)
            .map(|_| {
                let roomba = roomba.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        match roomba.drive(100, RADIUS_STRAIGHT) {
                            Ok(()) => {},
                            Err(RoombaError::InvalidParameter(_)) => break,
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                })
            })
            .collect();

        std::thread::sleep(Duration::from_millis(1));
        roomba.stop().unwrap();
        for t in drivers {
            t.join().unwrap();
        }

        let writes = handle.writes();
        let stop_at = writes.iter().position(|w| w == &vec![OP_STOP]).unwrap();
        assert!(writes[stop_at + 1..].is_empty());
        assert!(matches!(
            roomba.drive(100, 0),
            Err(RoombaError::InvalidParameter(_))
        ));
        assert_eq!(handle.writes().len(), stop_at + 1);
    }
}
