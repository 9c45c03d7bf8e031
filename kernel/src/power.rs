// Sleep/wake: the cursor survives deep sleep in retained memory,
// page buffers do not.
//
// Going down: blank and power off the panel, persist the cursor, stop
// the radio, arm the sleep pin as wake source, power down.
// Coming up: a deep-sleep wake trusts the retained cursor; any other
// reset zeroes it. Either way the ring starts empty and the boot path
// re-fetches before input is accepted.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::drivers::transport::Transport;
use crate::drivers::uc8179::{PanelDriver, PanelState};
use crate::events::Pin;
use crate::pages::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    PowerOn,
    DeepSleepWake,
    /// Watchdog, panic, brownout, software reset.
    Other,
}

/// Three page numbers that survive deep sleep.
pub trait RetainedStore {
    fn load(&self) -> Cursor;
    fn store(&mut self, cursor: Cursor);
}

pub trait PowerControl {
    fn stop_network(&mut self);
    /// Wake on the rising edge of `pin`.
    fn arm_wake(&mut self, pin: Pin);
    /// Does not return on hardware.
    fn enter_deep_sleep(&mut self);
}

/// Cursor to boot with, given why we booted.
pub fn restore_cursor(cause: ResetCause, retained: &mut impl RetainedStore) -> Cursor {
    if cause == ResetCause::DeepSleepWake {
        let cursor = retained.load();
        if cursor.is_consistent() {
            info!(
                "power: woke at page {} (known [{}, {}])",
                cursor.current, cursor.lowest_known_prev, cursor.highest_known_next
            );
            return cursor;
        }
        warn!("power: retained cursor {:?} inconsistent, starting over", cursor);
    } else {
        info!("power: cold boot ({:?})", cause);
    }
    retained.store(Cursor::ORIGIN);
    Cursor::ORIGIN
}

/// Put the device to sleep. Panel failures are logged; the rest of the
/// sequence still runs so the device never stays up on a wedged panel.
pub fn power_down<T, D>(
    panel: &mut PanelDriver<T, D>,
    cursor: Cursor,
    retained: &mut impl RetainedStore,
    power: &mut impl PowerControl,
) where
    T: Transport,
    D: DelayNs,
{
    info!("power: going to sleep at page {}", cursor.current);

    if panel.state() != PanelState::Ready {
        warn!("power: panel {:?}, re-initializing before clear", panel.state());
        if let Err(e) = panel.initialize() {
            error!("power: panel init failed: {}", e);
        }
    }
    if let Err(e) = panel.clear() {
        error!("power: panel clear failed: {}", e);
    }
    if let Err(e) = panel.sleep() {
        error!("power: panel sleep failed: {}", e);
    }

    retained.store(cursor);
    power.stop_network();
    power.arm_wake(Pin::Sleep);
    power.enter_deep_sleep();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::mocks::{BusOp, Journal, MockDelay, MockPower, MockRetained, MockTransport};

    #[test]
    fn wake_trusts_retained_cursor() {
        let journal = Journal::new();
        let mut retained = MockRetained::new(Cursor::new(2, 3, 5), journal.clone());
        let c = restore_cursor(ResetCause::DeepSleepWake, &mut retained);
        assert_eq!(c, Cursor::new(2, 3, 5));
        assert!(journal.entries().is_empty());
    }

    #[test]
    fn cold_boot_zeroes_retained_cursor() {
        let journal = Journal::new();
        let mut retained = MockRetained::new(Cursor::new(2, 3, 5), journal.clone());
        assert_eq!(restore_cursor(ResetCause::PowerOn, &mut retained), Cursor::ORIGIN);
        assert_eq!(retained.load(), Cursor::ORIGIN);

        let mut retained = MockRetained::new(Cursor::new(2, 3, 5), journal);
        assert_eq!(restore_cursor(ResetCause::Other, &mut retained), Cursor::ORIGIN);
    }

    #[test]
    fn garbage_retained_cursor_falls_back_to_origin() {
        let mut retained = MockRetained::new(Cursor::new(9, 3, 1), Journal::new());
        assert_eq!(
            restore_cursor(ResetCause::DeepSleepWake, &mut retained),
            Cursor::ORIGIN
        );
        assert_eq!(retained.load(), Cursor::ORIGIN);
    }

    fn panel() -> PanelDriver<MockTransport, MockDelay> {
        PanelDriver::new(
            MockTransport::new(),
            MockDelay::new(),
            PanelConfig::new().with_size(16, 2).with_busy_poll(1, 3),
        )
    }

    fn take_ops(panel: &mut PanelDriver<MockTransport, MockDelay>) -> Vec<BusOp> {
        core::mem::take(&mut panel.transport_mut().ops)
    }

    #[test]
    fn sleep_sequence_runs_in_order() {
        let journal = Journal::new();
        let mut retained = MockRetained::new(Cursor::ORIGIN, journal.clone());
        let mut power = MockPower::new(journal.clone());
        let mut panel = panel();
        panel.initialize().unwrap();
        take_ops(&mut panel);

        power_down(&mut panel, Cursor::new(1, 2, 3), &mut retained, &mut power);

        assert_eq!(panel.state(), PanelState::Sleeping);
        let ops = take_ops(&mut panel);
        assert_eq!(ops[0], BusOp::Command(0x10));
        assert!(ops.contains(&BusOp::Command(0x07)));
        assert_eq!(ops.last(), Some(&BusOp::Data(vec![0xA5])));
        assert_eq!(retained.load(), Cursor::new(1, 2, 3));
        assert_eq!(
            journal.entries(),
            ["retain 1/2/3", "stop network", "arm wake sleep", "deep sleep"]
        );
    }

    #[test]
    fn wedged_panel_does_not_keep_device_awake() {
        let journal = Journal::new();
        let mut retained = MockRetained::new(Cursor::ORIGIN, journal.clone());
        let mut power = MockPower::new(journal.clone());
        let mut panel = panel();
        panel.initialize().unwrap();
        panel.transport_mut().always_busy = true;

        power_down(&mut panel, Cursor::new(0, 4, 4), &mut retained, &mut power);

        assert_eq!(panel.state(), PanelState::Uninitialized);
        assert_eq!(journal.entries().last().map(String::as_str), Some("deep sleep"));
        assert_eq!(retained.load().current, 4);
    }
}
