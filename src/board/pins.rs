//! GPIO |     Function    |      Notes
//! -----+-----------------+----------------------------------
//!  1   | BTN NEXT        | Active HIGH, internal pulldown
//!  2   | BTN PREV        | Active HIGH, internal pulldown
//!  3   | BTN SLEEP       | Active HIGH, internal pulldown, RTC wake source
//!  4   | EPD DC          | Data/Command select
//!  5   | EPD RST         | Reset (active low)
//!  6   | EPD BUSY        | Low while the panel is busy
//!  8   | SPI2 SCK        | Panel clock
//! 10   | SPI2 MOSI       | Panel data out (write-only, no MISO)
//! 21   | EPD CS          | Display chip select
//!
//! Only GPIO0-5 sit in the RTC domain on the ESP32-C3, so the sleep
//! button must stay on one of those to wake the chip from deep sleep.

// ----- E-Paper Display -----
pub const EPD_CS: u8 = 21;
pub const EPD_DC: u8 = 4;
pub const EPD_RST: u8 = 5;
pub const EPD_BUSY: u8 = 6;

// ----- SPI Bus -----
pub const SPI_SCK: u8 = 8;
pub const SPI_MOSI: u8 = 10;

// ----- Buttons -----
pub const BTN_NEXT: u8 = 1;
pub const BTN_PREV: u8 = 2;
pub const BTN_SLEEP: u8 = 3;
