// inkleaf kernel: the hardware-independent control core of the reader
//
// Everything here is generic over embedded-hal / embedded-io traits and
// an embassy-sync raw mutex, so it runs unchanged on the ESP32-C3 and
// under `cargo test` on the host. Board wiring lives in the firmware
// crate at the workspace root.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod net;
pub mod pages;
pub mod power;
pub mod reader;

#[cfg(test)]
mod mocks;

pub use config::{PanelConfig, ReaderConfig, StoreConfig};
pub use error::{
    BootError, FetchError, PanelError, PrefetchError, StoreError, TransportError, TurnError,
};
pub use events::{EdgeControl, EventDispatcher, Pin};
pub use pages::{Cursor, Direction, FetchIntent, PageNumber, PageSource, PageStore, PrefetchWorker};
pub use power::{PowerControl, ResetCause, RetainedStore};
pub use reader::{Flow, Reader};
