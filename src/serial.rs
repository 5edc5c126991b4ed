use std::io::{ErrorKind, Read};
use std::time::Duration;

use log::{debug, info};
use serialport::{FlowControl, SerialPort, SerialPortType};

use crate::telemetry::{LineSource, MonitorError, SerialSettings};

/// Receive-side line buffer cap; older bytes go first.
pub const MAX_RX_BUFFER: usize = 4096;
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// One entry of the port combo box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}
impl PortInfo {
    pub fn display(&self) -> String {
        if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.description)
        }
    }
}

pub fn scan_ports() -> Result<Vec<PortInfo>, MonitorError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                SerialPortType::UsbPort(usb) => usb
                    .product
                    .or(usb.manufacturer)
                    .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
                SerialPortType::PciPort => "PCI".to_owned(),
                SerialPortType::BluetoothPort => "Bluetooth".to_owned(),
                SerialPortType::Unknown => String::new(),
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect())
}

/// Splits a raw byte stream into `\n` terminated lines.
///
/// The pending tail is capped at `MAX_RX_BUFFER` bytes; when a device never
/// sends a newline the oldest bytes are discarded and counted.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8>,
    overflow: u64,
}
impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_RX_BUFFER {
            let excess = self.buffer.len() - MAX_RX_BUFFER;
            self.buffer.drain(..excess);
            self.overflow += excess as u64;
        }
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..pos]);
            let line = text.trim_matches('\r');
            if !line.is_empty() {
                lines.push(line.to_owned());
            }
        }
        lines
    }

    pub fn consume_overflow(&mut self) -> u64 {
        std::mem::take(&mut self.overflow)
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// An open serial device plus its line assembler.
pub struct SerialLink {
    port_name: String,
    port: Box<dyn SerialPort>,
    assembler: LineAssembler,
}
impl SerialLink {
    /// Validates the settings, checks the port is still present and opens it.
    pub fn connect(settings: &SerialSettings) -> Result<Self, MonitorError> {
        let (data_bits, parity, stop_bits) = settings.validate()?;
        let available = scan_ports()?;
        if available.is_empty() {
            return Err(MonitorError::NoPortsDetected);
        }
        if !available.iter().any(|p| p.name == settings.port) {
            return Err(MonitorError::PortNotFound(settings.port.clone()));
        }
        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        info!("opened {} ({})", settings.port, settings.summary());
        Ok(Self {
            port_name: settings.port.clone(),
            port,
            assembler: LineAssembler::new(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Reads whatever is waiting and returns the complete lines in it.
    /// Any port error means the device is gone.
    pub fn read_lines(&mut self) -> Result<Vec<String>, MonitorError> {
        let waiting = self.port.bytes_to_read().map_err(|e| {
            debug!("bytes_to_read on {} failed: {e}", self.port_name);
            MonitorError::Disconnected
        })? as usize;
        let mut chunk = vec![0u8; waiting.max(1)];
        match self.port.read(&mut chunk) {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => Ok(self.assembler.feed(&chunk[..n])),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(Vec::new())
            }
            Err(e) => {
                debug!("read on {} failed: {e}", self.port_name);
                Err(MonitorError::Disconnected)
            }
        }
    }

    pub fn consume_rx_overflow(&mut self) -> u64 {
        self.assembler.consume_overflow()
    }
}
impl LineSource for SerialLink {
    fn next_lines(&mut self) -> Result<Vec<String>, MonitorError> {
        self.read_lines()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn lines_split_across_reads() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.feed(b"state:5,CH").is_empty());
        let lines = assembler.feed(b"G:4179mv\r\n\r\nT1:2296mv\npartial");
        assert_eq!(lines, vec!["state:5,CHG:4179mv", "T1:2296mv"]);
        assert_eq!(assembler.pending_bytes(), "partial".len());
    }
    #[test]
    fn runaway_line_is_capped_and_counted() {
        let mut assembler = LineAssembler::new();
        assembler.feed(&vec![b'x'; MAX_RX_BUFFER]);
        assembler.feed(b"yyyy");
        assert_eq!(assembler.pending_bytes(), MAX_RX_BUFFER);
        assert_eq!(assembler.consume_overflow(), 4);
        assert_eq!(assembler.consume_overflow(), 0);
        let lines = assembler.feed(b"\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("yyyy"));
    }
    #[test]
    fn invalid_utf8_is_replaced() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.feed(b"a1:\xff7\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("a1:"));
    }
    #[test]
    fn port_display_includes_description() {
        let port = PortInfo {
            name: "COM3".into(),
            description: "CP2102".into(),
        };
        assert_eq!(port.display(), "COM3 - CP2102");
    }
}
