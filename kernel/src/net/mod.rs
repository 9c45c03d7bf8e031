// Network-facing codecs. Sockets, DNS and Wi-Fi belong to the firmware.

pub mod http;

pub use http::{Url, fetch_range, parse_url};
