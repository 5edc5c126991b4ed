// src/engine.rs
use crate::serial::{scan_ports, PortInfo, SerialLink};
use crate::telemetry::{
    wall_clock_secs, LineSource, MonitorConfig, MonitorError, SerialSettings, SimulatedDevice,
};
use crate::types::*;
use log::{debug, info, warn};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SIM_LINE_INTERVAL: Duration = Duration::from_millis(50);

// 当前打开的数据源
enum ActiveSource {
    Serial(SerialLink),
    Simulated(SimulatedDevice),
}
impl ActiveSource {
    fn name(&self) -> &str {
        match self {
            ActiveSource::Serial(link) => link.port_name(),
            ActiveSource::Simulated(_) => "SIM",
        }
    }
    fn consume_rx_overflow(&mut self) -> u64 {
        match self {
            ActiveSource::Serial(link) => link.consume_rx_overflow(),
            ActiveSource::Simulated(_) => 0,
        }
    }
}

impl LineSource for ActiveSource {
    fn next_lines(&mut self) -> Result<Vec<String>, MonitorError> {
        match self {
            ActiveSource::Serial(link) => link.next_lines(),
            ActiveSource::Simulated(device) => device.next_lines(),
        }
    }
}

/// One read round. `Err` is the single report for a vanished device; the
/// GUI derives its disconnected status text from it.
fn poll_source(
    source: &mut dyn LineSource,
    name: &str,
) -> Result<Option<MonitorMessage>, MonitorMessage> {
    match source.next_lines() {
        Ok(lines) if lines.is_empty() => Ok(None),
        Ok(lines) => Ok(Some(MonitorMessage::Lines {
            lines,
            now: wall_clock_secs(),
        })),
        Err(e) => {
            warn!("{name}: {e}");
            Err(MonitorMessage::DeviceLost(name.to_owned()))
        }
    }
}

fn open_source(
    mode: ConnectionMode,
    settings: &SerialSettings,
) -> Result<(ActiveSource, String), MonitorError> {
    match mode {
        ConnectionMode::Simulation => Ok((
            ActiveSource::Simulated(SimulatedDevice::new(SIM_LINE_INTERVAL)),
            "SIM: Connected (simulated device)".to_owned(),
        )),
        ConnectionMode::Hardware => {
            let link = SerialLink::connect(settings)?;
            let status = format!("COM: Connected {} ({})", link.port_name(), settings.summary());
            Ok((ActiveSource::Serial(link), status))
        }
    }
}

fn send_ports(tx: &Sender<MonitorMessage>, known: &mut Vec<PortInfo>, force: bool) {
    match scan_ports() {
        Ok(ports) => {
            if force || ports != *known {
                debug!("port list changed: {} port(s)", ports.len());
                *known = ports.clone();
                tx.send(MonitorMessage::Ports(ports)).ok();
            }
        }
        Err(e) => warn!("port scan failed: {e}"),
    }
}

/// Starts the reader thread. It owns the device and only ever sends raw
/// lines; parsing and storage stay on the GUI side.
pub fn spawn_thread(
    tx: Sender<MonitorMessage>,
    rx_cmd: Receiver<GuiCommand>,
    config: MonitorConfig,
) -> JoinHandle<()> {
    thread::spawn(move || {
        tx.send(MonitorMessage::Log("Reader ready.".to_owned())).ok();
        let read_interval = config.read_interval();
        let hotplug_interval = config.hotplug_interval();

        let mut source: Option<ActiveSource> = None;
        let mut known_ports: Vec<PortInfo> = Vec::new();
        send_ports(&tx, &mut known_ports, true);
        let mut last_scan = Instant::now();

        loop {
            // ============================================================
            // 1. 消息处理 (处理 GUI 发来的命令)
            // ============================================================
            loop {
                let cmd = match rx_cmd.try_recv() {
                    Ok(cmd) => cmd,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        info!("GUI gone, reader thread exiting");
                        return;
                    }
                };
                match cmd {
                    GuiCommand::Connect(mode, settings) => {
                        source = None;
                        match open_source(mode, &settings) {
                            Ok((opened, status)) => {
                                info!("{status}");
                                source = Some(opened);
                                tx.send(MonitorMessage::Status(true, status)).ok();
                            }
                            Err(e) => {
                                warn!("connect failed: {e}");
                                tx.send(MonitorMessage::Log(format!("Connect failed: {e}"))).ok();
                                tx.send(MonitorMessage::Status(false, "COM: Disconnected".to_owned()))
                                    .ok();
                            }
                        }
                    }
                    GuiCommand::Disconnect => {
                        if let Some(old) = source.take() {
                            info!("closed {}", old.name());
                        }
                        tx.send(MonitorMessage::Status(false, "COM: Disconnected".to_owned()))
                            .ok();
                    }
                    GuiCommand::ScanPorts => {
                        send_ports(&tx, &mut known_ports, true);
                        last_scan = Instant::now();
                    }
                    GuiCommand::Shutdown => {
                        info!("reader thread shutting down");
                        return;
                    }
                }
            }

            // ============================================================
            // 2. 数据流循环
            // ============================================================
            if let Some(active) = source.as_mut() {
                let name = active.name().to_owned();
                match poll_source(&mut *active, &name) {
                    Ok(batch) => {
                        if let Some(msg) = batch {
                            tx.send(msg).ok();
                        }
                        let overflow = active.consume_rx_overflow();
                        if overflow > 0 {
                            tx.send(MonitorMessage::RxOverflow(overflow)).ok();
                        }
                    }
                    Err(lost) => {
                        source = None;
                        tx.send(lost).ok();
                        send_ports(&tx, &mut known_ports, true);
                        last_scan = Instant::now();
                    }
                }
            } else if last_scan.elapsed() >= hotplug_interval {
                // 热插拔扫描只在未连接时进行
                send_ports(&tx, &mut known_ports, false);
                last_scan = Instant::now();
            }
            thread::sleep(read_interval);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Result<Vec<String>, MonitorError>>);
    impl LineSource for Scripted {
        fn next_lines(&mut self) -> Result<Vec<String>, MonitorError> {
            self.0.pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    #[test]
    fn lost_device_yields_only_device_lost() {
        let mut source = Scripted(VecDeque::from([Err(MonitorError::Disconnected)]));
        match poll_source(&mut source, "COM7") {
            Err(MonitorMessage::DeviceLost(name)) => assert_eq!(name, "COM7"),
            other => panic!("expected DeviceLost, got {other:?}"),
        }
    }
    #[test]
    fn lines_are_forwarded_and_quiet_rounds_send_nothing() {
        let mut source = Scripted(VecDeque::from([
            Ok(vec!["CHG:1".to_owned(), "CHG:2".to_owned()]),
            Ok(Vec::new()),
        ]));
        match poll_source(&mut source, "SIM") {
            Ok(Some(MonitorMessage::Lines { lines, now })) => {
                assert_eq!(lines.len(), 2);
                assert!(now > 0.0);
            }
            other => panic!("expected Lines, got {other:?}"),
        }
        assert!(matches!(poll_source(&mut source, "SIM"), Ok(None)));
    }
}
