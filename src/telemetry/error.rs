use thiserror::Error;
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no serial port detected")]
    NoPortsDetected,
    #[error("selected port {0} disappeared")]
    PortNotFound(String),
    #[error("invalid baud rate: {0}")]
    InvalidBaudRate(u32),
    #[error("invalid data bits: {0}")]
    InvalidDataBits(u8),
    #[error("invalid stop bits: {0}")]
    InvalidStopBits(String),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("device disconnected")]
    Disconnected,
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for MonitorError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        MonitorError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for MonitorError {
    fn from(value: image::ImageError) -> Self {
        MonitorError::Plot(value.to_string())
    }
}
