// Tunables for the panel, the page ring and the control loop.
//
// All builders are const so the firmware can keep its configuration in
// `const` items next to the pin map.

use crate::drivers::waveform::{DEFAULT_WAVEFORM, Waveform};

/// Number of page slots in the ring.
pub const PAGE_SLOTS: usize = 3;

/// Capacity of the interrupt-to-task event queue.
pub const EVENT_QUEUE_CAP: usize = 4;

/// Capacity of the control-loop-to-worker fetch intent channel.
pub const INTENT_QUEUE_CAP: usize = 4;

pub const DEFAULT_WIDTH: u16 = 800;
pub const DEFAULT_HEIGHT: u16 = 480;

/// Bytes in one packed 1-bit frame of `width` x `height`.
pub const fn frame_len(width: u16, height: u16) -> usize {
    (width as usize).div_ceil(8) * height as usize
}

/// Reset pulse profile. `initialize` drives low, high, low, high:
/// both lows last `pulse_low_ms`, the first high `settle_high_ms` and
/// the final release `release_high_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetTiming {
    pub settle_high_ms: u32,
    pub pulse_low_ms: u32,
    pub release_high_ms: u32,
}

impl ResetTiming {
    pub const DEFAULT: Self = Self {
        settle_high_ms: 200,
        pulse_low_ms: 2,
        release_high_ms: 200,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct PanelConfig {
    pub width: u16,
    pub height: u16,
    pub reset: ResetTiming,
    /// Pause between two status polls.
    pub busy_poll_ms: u32,
    /// Polls before a busy panel is reported as timed out.
    pub busy_max_attempts: u32,
    /// Settle time after the panel reports idle.
    pub busy_settle_ms: u32,
    /// Time given to the booster after power-on / refresh before polling.
    pub command_settle_ms: u32,
    pub waveform: &'static Waveform,
}

impl PanelConfig {
    pub const fn new() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            reset: ResetTiming::DEFAULT,
            busy_poll_ms: 10,
            busy_max_attempts: 2000,
            busy_settle_ms: 20,
            command_settle_ms: 100,
            waveform: &DEFAULT_WAVEFORM,
        }
    }

    pub const fn with_size(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub const fn with_reset(mut self, reset: ResetTiming) -> Self {
        self.reset = reset;
        self
    }

    pub const fn with_busy_poll(mut self, poll_ms: u32, max_attempts: u32) -> Self {
        self.busy_poll_ms = poll_ms;
        self.busy_max_attempts = max_attempts;
        self
    }

    pub const fn with_settle(mut self, busy_settle_ms: u32, command_settle_ms: u32) -> Self {
        self.busy_settle_ms = busy_settle_ms;
        self.command_settle_ms = command_settle_ms;
        self
    }

    pub const fn with_waveform(mut self, waveform: &'static Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub const fn plane_len(&self) -> usize {
        frame_len(self.width, self.height)
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub page_size: usize,
    pub lock_poll_ms: u32,
    pub lock_max_attempts: u32,
    /// Fetched bitmaps use 1 = black; the panel's "new" plane wants
    /// 1 = white. Applied once when a page is installed, so resident
    /// pages are already in panel polarity.
    pub invert_pixels: bool,
}

impl StoreConfig {
    pub const fn new() -> Self {
        Self {
            page_size: frame_len(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            lock_poll_ms: 5,
            lock_max_attempts: 20,
            invert_pixels: true,
        }
    }

    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub const fn with_lock_wait(mut self, poll_ms: u32, max_attempts: u32) -> Self {
        self.lock_poll_ms = poll_ms;
        self.lock_max_attempts = max_attempts;
        self
    }

    pub const fn with_invert_pixels(mut self, invert: bool) -> Self {
        self.invert_pixels = invert;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the control core needs, bundled for the firmware's `const`.
#[derive(Debug, Clone, Copy)]
pub struct ReaderConfig {
    pub panel: PanelConfig,
    pub store: StoreConfig,
}

impl ReaderConfig {
    pub const fn new() -> Self {
        Self {
            panel: PanelConfig::new(),
            store: StoreConfig::new(),
        }
    }

    pub const fn with_panel(mut self, panel: PanelConfig) -> Self {
        self.panel = panel;
        self
    }

    pub const fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::new()
    }
}
