// Error types for every layer of the control core
//
// Each layer reports its own enum; higher layers wrap lower ones with
// `From` so `?` carries the cause upward. None of these are fatal to the
// device: the control loop logs them and carries on, or goes to sleep.

use core::fmt;

/// Bus transfer failed. Fatal to the operation in flight, never retried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// SPI write failed.
    Bus,
    /// D/C, reset or busy line could not be driven or sampled.
    Pin,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Bus => write!(f, "spi transfer failed"),
            TransportError::Pin => write!(f, "control line failed"),
        }
    }
}

impl core::error::Error for TransportError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelError {
    Transport(TransportError),
    /// Panel still busy after the configured number of polls.
    BusyTimeout { attempts: u32 },
    /// Operation not allowed in the driver's current state.
    InvalidState,
    /// Bitmap length does not match the panel plane.
    BitmapSize { expected: usize, actual: usize },
}

impl From<TransportError> for PanelError {
    fn from(e: TransportError) -> Self {
        PanelError::Transport(e)
    }
}

impl fmt::Display for PanelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelError::Transport(e) => write!(f, "transport: {}", e),
            PanelError::BusyTimeout { attempts } => {
                write!(f, "panel busy after {} polls", attempts)
            }
            PanelError::InvalidState => write!(f, "invalid panel state"),
            PanelError::BitmapSize { expected, actual } => {
                write!(f, "bitmap is {} bytes, panel wants {}", actual, expected)
            }
        }
    }
}

impl core::error::Error for PanelError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            PanelError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Range fetch failed; the page simply stays unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    /// Name resolution or TCP connect failed.
    Connect,
    /// Socket read/write failed or timed out.
    Io,
    /// Server answered with an unexpected status code.
    Status(u16),
    /// Status line or headers could not be parsed.
    MalformedResponse,
    /// Connection closed before the full range arrived.
    ShortBody { expected: usize, received: usize },
    /// Only plain `http://` resources are supported.
    UnsupportedScheme,
    InvalidUrl,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Connect => write!(f, "connect failed"),
            FetchError::Io => write!(f, "socket error"),
            FetchError::Status(code) => write!(f, "unexpected status {}", code),
            FetchError::MalformedResponse => write!(f, "malformed response"),
            FetchError::ShortBody { expected, received } => {
                write!(f, "short body: {} of {} bytes", received, expected)
            }
            FetchError::UnsupportedScheme => write!(f, "unsupported url scheme"),
            FetchError::InvalidUrl => write!(f, "invalid url"),
        }
    }
}

impl core::error::Error for FetchError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Store lock not acquired within the bounded wait.
    LockTimeout,
    /// Installed bytes do not match the configured page size.
    PageSize { expected: usize, actual: usize },
    /// Target slot holds the displayed page.
    SlotReserved { page: u32, slot: usize },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::LockTimeout => write!(f, "store lock timeout"),
            StoreError::PageSize { expected, actual } => {
                write!(f, "page is {} bytes, expected {}", actual, expected)
            }
            StoreError::SlotReserved { page, slot } => {
                write!(f, "slot {} reserved, refusing page {}", slot, page)
            }
        }
    }
}

impl core::error::Error for StoreError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchError {
    Fetch(FetchError),
    Store(StoreError),
}

impl From<FetchError> for PrefetchError {
    fn from(e: FetchError) -> Self {
        PrefetchError::Fetch(e)
    }
}

impl From<StoreError> for PrefetchError {
    fn from(e: StoreError) -> Self {
        PrefetchError::Store(e)
    }
}

impl fmt::Display for PrefetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefetchError::Fetch(e) => write!(f, "fetch: {}", e),
            PrefetchError::Store(e) => write!(f, "store: {}", e),
        }
    }
}

impl core::error::Error for PrefetchError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            PrefetchError::Fetch(e) => Some(e),
            PrefetchError::Store(e) => Some(e),
        }
    }
}

/// Boot could not reach a displayable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    Panel(PanelError),
    /// The current page could not be loaded.
    CurrentUnavailable(PrefetchError),
    /// The current page was loaded but could not be locked for drawing.
    Store(StoreError),
    /// The current page vanished from the ring between load and draw.
    NotResident(u32),
}

impl From<PanelError> for BootError {
    fn from(e: PanelError) -> Self {
        BootError::Panel(e)
    }
}

impl From<StoreError> for BootError {
    fn from(e: StoreError) -> Self {
        BootError::Store(e)
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::Panel(e) => write!(f, "panel: {}", e),
            BootError::CurrentUnavailable(e) => write!(f, "current page unavailable: {}", e),
            BootError::Store(e) => write!(f, "store: {}", e),
            BootError::NotResident(page) => write!(f, "page {} not resident", page),
        }
    }
}

impl core::error::Error for BootError {}

/// A page turn that could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnError {
    Store(StoreError),
    Panel(PanelError),
}

impl From<StoreError> for TurnError {
    fn from(e: StoreError) -> Self {
        TurnError::Store(e)
    }
}

impl From<PanelError> for TurnError {
    fn from(e: PanelError) -> Self {
        TurnError::Panel(e)
    }
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::Store(e) => write!(f, "store: {}", e),
            TurnError::Panel(e) => write!(f, "panel: {}", e),
        }
    }
}

impl core::error::Error for TurnError {}
