// Command/data bus to the panel controller
//
// 4-wire SPI: SCK, MOSI, CS (owned by the SpiDevice) plus a D/C select
// line, a reset line and an active-low BUSY input. D/C is driven inside
// every send call, right before the write it labels; `&mut self` keeps
// the next transfer from being queued ahead of it.

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use embedded_hal_async::spi::SpiDevice as AsyncSpiDevice;

use crate::error::TransportError;

// stack chunk for repeated fills
const CHUNK: usize = 256;

pub trait Transport {
    fn send_command(&mut self, code: u8) -> Result<(), TransportError>;

    fn send_data(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Bulk data transfer: one write, one chip-select frame.
    fn send_block(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// `count` copies of `byte` as data.
    fn send_repeated(&mut self, byte: u8, count: usize) -> Result<(), TransportError>;

    fn set_reset(&mut self, high: bool) -> Result<(), TransportError>;

    /// `true` while the controller is busy.
    fn read_busy(&mut self) -> Result<bool, TransportError>;
}

/// Async bulk path used by the overlapped draw.
#[allow(async_fn_in_trait)]
pub trait AsyncTransport: Transport {
    async fn send_command_async(&mut self, code: u8) -> Result<(), TransportError>;

    async fn send_block_async(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

pub struct SpiTransport<SPI, DC, RST, BUSY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
}

impl<SPI, DC, RST, BUSY> SpiTransport<SPI, DC, RST, BUSY> {
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY) -> Self {
        Self { spi, dc, rst, busy }
    }

    pub fn release(self) -> (SPI, DC, RST, BUSY) {
        (self.spi, self.dc, self.rst, self.busy)
    }
}

impl<SPI, DC, RST, BUSY> SpiTransport<SPI, DC, RST, BUSY>
where
    DC: OutputPin,
{
    #[inline]
    fn select_command(&mut self) -> Result<(), TransportError> {
        self.dc.set_low().map_err(|_| TransportError::Pin)
    }

    #[inline]
    fn select_data(&mut self) -> Result<(), TransportError> {
        self.dc.set_high().map_err(|_| TransportError::Pin)
    }
}

// ── Synchronous ─────────────────────────────────────────────────────────

impl<SPI, DC, RST, BUSY> SpiTransport<SPI, DC, RST, BUSY>
where
    SPI: SpiDevice,
    DC: OutputPin,
{
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        SpiDevice::write(&mut self.spi, bytes).map_err(|_| TransportError::Bus)
    }
}

impl<SPI, DC, RST, BUSY> Transport for SpiTransport<SPI, DC, RST, BUSY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
{
    fn send_command(&mut self, code: u8) -> Result<(), TransportError> {
        self.select_command()?;
        self.write(&[code])
    }

    fn send_data(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.select_data()?;
        self.write(bytes)
    }

    fn send_block(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.select_data()?;
        self.write(bytes)
    }

    fn send_repeated(&mut self, byte: u8, count: usize) -> Result<(), TransportError> {
        self.select_data()?;
        let chunk = [byte; CHUNK];
        let mut left = count;
        while left > 0 {
            let n = left.min(CHUNK);
            self.write(&chunk[..n])?;
            left -= n;
        }
        Ok(())
    }

    fn set_reset(&mut self, high: bool) -> Result<(), TransportError> {
        let res = if high {
            self.rst.set_high()
        } else {
            self.rst.set_low()
        };
        res.map_err(|_| TransportError::Pin)
    }

    fn read_busy(&mut self) -> Result<bool, TransportError> {
        // BUSY is active low on the UC8179
        self.busy.is_low().map_err(|_| TransportError::Pin)
    }
}

// ── Asynchronous ────────────────────────────────────────────────────────
// SPI DMA completion is awaited; D/C handling is identical.

impl<SPI, DC, RST, BUSY> AsyncTransport for SpiTransport<SPI, DC, RST, BUSY>
where
    SPI: SpiDevice + AsyncSpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
{
    async fn send_command_async(&mut self, code: u8) -> Result<(), TransportError> {
        self.select_command()?;
        AsyncSpiDevice::write(&mut self.spi, &[code])
            .await
            .map_err(|_| TransportError::Bus)
    }

    async fn send_block_async(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.select_data()?;
        AsyncSpiDevice::write(&mut self.spi, bytes)
            .await
            .map_err(|_| TransportError::Bus)
    }
}
