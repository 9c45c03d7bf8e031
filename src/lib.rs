// inkleaf firmware: ESP32-C3 wiring for the e-paper page reader
//
// The control core (panel driver, page ring, prefetch, events, sleep)
// is the hardware-independent inkleaf-kernel crate; this crate binds it
// to esp-hal peripherals, the Wi-Fi stack and RTC memory.

#![no_std]

extern crate alloc;

pub mod board;
pub mod net;
pub mod power;
pub mod tasks;
