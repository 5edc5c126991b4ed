// src/types.rs
use crate::serial::PortInfo;
use crate::telemetry::SerialSettings;

// 连接模式
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}

// GUI 发给后台的命令
#[derive(Clone, Debug)]
pub enum GuiCommand {
    Connect(ConnectionMode, SerialSettings),
    Disconnect,
    ScanPorts,
    Shutdown,
}

// 后台发给 GUI 的消息
#[derive(Clone, Debug)]
pub enum MonitorMessage {
    Log(String),
    /// Connection state; the string is the status-bar text.
    Status(bool, String),
    /// Lines of one read round with the wall-clock capture time.
    Lines { lines: Vec<String>, now: f64 },
    Ports(Vec<PortInfo>),
    /// The open device vanished; carries the port name.
    DeviceLost(String),
    RxOverflow(u64),
}
