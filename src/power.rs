// Deep sleep, wake source and retained cursor on the ESP32-C3
//
// The cursor lives in RTC fast memory, which stays powered through deep
// sleep but holds garbage after a power cycle; a magic word tells the
// two apart. Deep sleep wakes on the sleep button's RTC pad and comes
// back through a full reset.

use esp_hal::gpio::RtcPinWithResistors;
use esp_hal::peripherals::{GPIO3, LPWR};
use esp_hal::rtc_cntl::sleep::{RtcioWakeupSource, WakeupLevel};
use esp_hal::rtc_cntl::{Rtc, SocResetReason, reset_reason, wakeup_cause};
use esp_hal::system::Cpu;
use esp_radio::wifi::WifiController;
use inkleaf_kernel::{Cursor, Pin, PowerControl, ResetCause, RetainedStore};
use log::{info, warn};

const RETAINED_MAGIC: u32 = 0x1EAF_C0DE;

#[derive(Clone, Copy)]
#[repr(C)]
struct RetainedCursor {
    magic: u32,
    lowest_known_prev: u32,
    current: u32,
    highest_known_next: u32,
}

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut RETAINED: RetainedCursor = RetainedCursor {
    magic: 0,
    lowest_known_prev: 0,
    current: 0,
    highest_known_next: 0,
};

/// Why this boot happened, from the reset reason register.
pub fn reset_cause() -> ResetCause {
    let reason = reset_reason(Cpu::ProCpu);
    info!("boot: reset_reason={:?} wakeup_cause={:?}", reason, wakeup_cause());
    match reason {
        Some(SocResetReason::CoreDeepSleep) => ResetCause::DeepSleepWake,
        Some(SocResetReason::ChipPowerOn) => ResetCause::PowerOn,
        _ => ResetCause::Other,
    }
}

/// Handle on the retained cursor. Only the control task holds one.
pub struct RtcRetained {
    _private: (),
}

impl RtcRetained {
    /// # Safety
    /// At most one instance may exist; it is the only accessor of the
    /// retained block.
    pub unsafe fn take() -> Self {
        Self { _private: () }
    }
}

impl RetainedStore for RtcRetained {
    fn load(&self) -> Cursor {
        // SAFETY: sole accessor, see `take`
        let r = unsafe { (&raw const RETAINED).read_volatile() };
        if r.magic != RETAINED_MAGIC {
            warn!("power: retained block not initialised");
            return Cursor::ORIGIN;
        }
        Cursor::new(r.lowest_known_prev, r.current, r.highest_known_next)
    }

    fn store(&mut self, cursor: Cursor) {
        let r = RetainedCursor {
            magic: RETAINED_MAGIC,
            lowest_known_prev: cursor.lowest_known_prev,
            current: cursor.current,
            highest_known_next: cursor.highest_known_next,
        };
        // SAFETY: sole accessor, see `take`
        unsafe { (&raw mut RETAINED).write_volatile(r) };
    }
}

/// Radio shutdown and deep sleep.
pub struct DeepSleep {
    rtc: Rtc<'static>,
    wake_pin: GPIO3<'static>,
    wifi: Option<WifiController<'static>>,
}

impl DeepSleep {
    pub fn new(lpwr: LPWR<'static>, wake_pin: GPIO3<'static>) -> Self {
        Self {
            rtc: Rtc::new(lpwr),
            wake_pin,
            wifi: None,
        }
    }

    /// Take ownership of the Wi-Fi controller so it can be stopped before sleep.
    pub fn attach_wifi(&mut self, wifi: WifiController<'static>) {
        self.wifi = Some(wifi);
    }
}

impl PowerControl for DeepSleep {
    fn stop_network(&mut self) {
        if let Some(mut wifi) = self.wifi.take() {
            if let Err(e) = wifi.stop() {
                warn!("power: wifi stop failed: {:?}", e);
            }
        }
    }

    fn arm_wake(&mut self, pin: Pin) {
        if pin == Pin::Sleep {
            self.wake_pin.rtcio_pullup(false);
            self.wake_pin.rtcio_pulldown(true);
        } else {
            warn!("power: {} has no RTC pad, cannot wake on it", pin);
        }
    }

    fn enter_deep_sleep(&mut self) {
        let mut pins: [(&mut dyn RtcPinWithResistors, WakeupLevel); 1] =
            [(&mut self.wake_pin, WakeupLevel::High)];
        let wake = RtcioWakeupSource::new(&mut pins);
        self.rtc.sleep_deep(&[&wake]);
    }
}
