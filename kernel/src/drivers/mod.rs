// Panel drivers: the bus transport, the UC8179 state machine and the
// waveform tables it uploads. Board-independent; pins and SPI wiring are
// supplied by the firmware.

pub mod transport;
pub mod uc8179;
pub mod waveform;

pub use transport::{AsyncTransport, SpiTransport, Transport};
pub use uc8179::{DrawInFlight, PanelDriver, PanelState};
pub use waveform::Waveform;
