// UC8179 e-paper driver (board-independent)
// Tested on the 7.5" 800x480 black/white glass. No framebuffer: page
// bitmaps are streamed straight from the page ring, one full-frame write
// per refresh. Bitmaps arrive in panel polarity; the prefetch worker
// inverts each page once before installing it. Waveform tables are uploaded at init (register LUT mode).
//
// Every busy wait is bounded: the controller is polled with GET_STATUS
// and the BUSY line sampled, `busy_max_attempts` times at most, before
// the operation fails with `PanelError::BusyTimeout`.
//
// A failed draw, clear or sleep leaves the driver `Uninitialized`; the
// controller state is unknown and only `initialize()` recovers it.

use embedded_hal::delay::DelayNs;
use embedded_hal_async::delay::DelayNs as AsyncDelayNs;
use log::{debug, info};

use super::transport::{AsyncTransport, Transport};
use crate::config::PanelConfig;
use crate::error::PanelError;

// UC8179 commands
#[allow(dead_code)]
mod cmd {
    pub const PANEL_SETTING: u8 = 0x00;
    pub const POWER_SETTING: u8 = 0x01;
    pub const POWER_OFF: u8 = 0x02;
    pub const POWER_ON: u8 = 0x04;
    pub const BOOSTER_SOFT_START: u8 = 0x06;
    pub const DEEP_SLEEP: u8 = 0x07;
    pub const WRITE_OLD_PLANE: u8 = 0x10; // DTM1
    pub const DISPLAY_REFRESH: u8 = 0x12;
    pub const WRITE_NEW_PLANE: u8 = 0x13; // DTM2
    pub const DUAL_SPI: u8 = 0x15;
    pub const PLL_CONTROL: u8 = 0x30;
    pub const VCOM_DATA_INTERVAL: u8 = 0x50;
    pub const TCON_SETTING: u8 = 0x60;
    pub const RESOLUTION: u8 = 0x61;
    pub const GATE_SOURCE_START: u8 = 0x65;
    pub const GET_STATUS: u8 = 0x71;
    pub const VCM_DC: u8 = 0x82;
}

// guard byte the controller requires after DEEP_SLEEP
const DEEP_SLEEP_CHECK: u8 = 0xA5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Uninitialized,
    Reset,
    WaveformLoaded,
    Ready,
    Drawing,
    Sleeping,
}

pub struct PanelDriver<T, D> {
    transport: T,
    delay: D,
    config: PanelConfig,
    state: PanelState,
}

impl<T, D> PanelDriver<T, D> {
    pub fn new(transport: T, delay: D, config: PanelConfig) -> Self {
        Self {
            transport,
            delay,
            config,
            state: PanelState::Uninitialized,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn release(self) -> (T, D) {
        (self.transport, self.delay)
    }

    fn expect_state(&self, want: PanelState) -> Result<(), PanelError> {
        if self.state == want {
            Ok(())
        } else {
            Err(PanelError::InvalidState)
        }
    }

    fn check_bitmap(&self, bitmap: &[u8]) -> Result<(), PanelError> {
        let expected = self.config.plane_len();
        if bitmap.len() != expected {
            return Err(PanelError::BitmapSize {
                expected,
                actual: bitmap.len(),
            });
        }
        Ok(())
    }

    // any failure mid-sequence leaves the controller in an unknown state
    fn settle<R>(&mut self, res: Result<R, PanelError>, next: PanelState) -> Result<R, PanelError> {
        self.state = if res.is_ok() {
            next
        } else {
            PanelState::Uninitialized
        };
        res
    }
}

// ── Synchronous (blocking) API ──────────────────────────────────────────

impl<T, D> PanelDriver<T, D>
where
    T: Transport,
    D: DelayNs,
{
    /// Reset, program registers, upload waveforms, power on.
    ///
    /// Valid from any state; this is the only way out of `Sleeping` or
    /// out of a failed operation.
    pub fn initialize(&mut self) -> Result<(), PanelError> {
        self.state = PanelState::Uninitialized;
        let res = self.init_sequence();
        self.settle(res, PanelState::Ready)?;
        info!(
            "panel: ready ({}x{})",
            self.config.width, self.config.height
        );
        Ok(())
    }

    /// Zero both image planes and refresh.
    pub fn clear(&mut self) -> Result<(), PanelError> {
        self.expect_state(PanelState::Ready)?;
        self.state = PanelState::Drawing;
        let res = self.clear_sequence();
        self.settle(res, PanelState::Ready)
    }

    /// Write `bitmap` to the new plane, refresh and wait.
    pub fn draw_sync(&mut self, bitmap: &[u8]) -> Result<(), PanelError> {
        self.expect_state(PanelState::Ready)?;
        self.check_bitmap(bitmap)?;
        self.state = PanelState::Drawing;
        let res = self.draw_sequence(bitmap);
        self.settle(res, PanelState::Ready)
    }

    /// Power off and enter deep sleep.
    ///
    /// Call `clear()` first or the last image stays burnt into the glass
    /// while the controller is unpowered.
    pub fn sleep(&mut self) -> Result<(), PanelError> {
        self.expect_state(PanelState::Ready)?;
        let res = self.sleep_sequence();
        self.settle(res, PanelState::Sleeping)?;
        info!("panel: sleeping");
        Ok(())
    }

    fn init_sequence(&mut self) -> Result<(), PanelError> {
        let r = self.config.reset;
        // low-high-low-high; the first low discards whatever the
        // controller was doing before we got here
        self.transport.set_reset(false)?;
        DelayNs::delay_ms(&mut self.delay, r.pulse_low_ms);
        self.transport.set_reset(true)?;
        DelayNs::delay_ms(&mut self.delay, r.settle_high_ms);
        self.transport.set_reset(false)?;
        DelayNs::delay_ms(&mut self.delay, r.pulse_low_ms);
        self.transport.set_reset(true)?;
        DelayNs::delay_ms(&mut self.delay, r.release_high_ms);
        self.state = PanelState::Reset;

        let (w, h) = (self.config.width, self.config.height);
        self.command(cmd::POWER_SETTING, &[0x07, 0x17, 0x3F, 0x3F, 0x11])?;
        self.command(cmd::VCM_DC, &[0x24])?;
        self.command(cmd::BOOSTER_SOFT_START, &[0x27, 0x27, 0x2F, 0x17])?;
        self.command(cmd::PLL_CONTROL, &[0x06])?;
        self.command(cmd::PANEL_SETTING, &[0x3F])?; // KW mode, LUT from register
        self.command(
            cmd::RESOLUTION,
            &[(w >> 8) as u8, w as u8, (h >> 8) as u8, h as u8],
        )?;
        self.command(cmd::DUAL_SPI, &[0x00])?;
        self.command(cmd::VCOM_DATA_INTERVAL, &[0x10, 0x00])?;
        self.command(cmd::TCON_SETTING, &[0x22])?;
        self.command(cmd::GATE_SOURCE_START, &[0x00, 0x00, 0x00, 0x00])?;

        let waveform = self.config.waveform;
        for (code, table) in waveform.tables() {
            self.command(code, table)?;
        }
        self.state = PanelState::WaveformLoaded;

        self.transport.send_command(cmd::POWER_ON)?;
        DelayNs::delay_ms(&mut self.delay, self.config.command_settle_ms);
        self.wait_idle()
    }

    fn clear_sequence(&mut self) -> Result<(), PanelError> {
        let len = self.config.plane_len();
        self.transport.send_command(cmd::WRITE_OLD_PLANE)?;
        self.transport.send_repeated(0x00, len)?;
        self.transport.send_command(cmd::WRITE_NEW_PLANE)?;
        self.transport.send_repeated(0x00, len)?;
        self.refresh()
    }

    fn draw_sequence(&mut self, bitmap: &[u8]) -> Result<(), PanelError> {
        self.transport.send_command(cmd::WRITE_NEW_PLANE)?;
        self.transport.send_block(bitmap)?;
        self.refresh()
    }

    fn sleep_sequence(&mut self) -> Result<(), PanelError> {
        self.transport.send_command(cmd::POWER_OFF)?;
        self.wait_idle()?;
        self.command(cmd::DEEP_SLEEP, &[DEEP_SLEEP_CHECK])
    }

    fn refresh(&mut self) -> Result<(), PanelError> {
        self.transport.send_command(cmd::DISPLAY_REFRESH)?;
        DelayNs::delay_ms(&mut self.delay, self.config.command_settle_ms);
        self.wait_idle()
    }

    fn command(&mut self, code: u8, data: &[u8]) -> Result<(), PanelError> {
        self.transport.send_command(code)?;
        self.transport.send_data(data)?;
        Ok(())
    }

    // GET_STATUS, sample BUSY, back off; bounded
    fn wait_idle(&mut self) -> Result<(), PanelError> {
        let max = self.config.busy_max_attempts;
        for attempt in 0..max {
            self.transport.send_command(cmd::GET_STATUS)?;
            if !self.transport.read_busy()? {
                debug!("panel: idle after {} polls", attempt);
                DelayNs::delay_ms(&mut self.delay, self.config.busy_settle_ms);
                return Ok(());
            }
            DelayNs::delay_ms(&mut self.delay, self.config.busy_poll_ms);
        }
        Err(PanelError::BusyTimeout { attempts: max })
    }
}

// ── Asynchronous draw ───────────────────────────────────────────────────
// draw_async validates and claims the panel; the returned handle holds
// the three queued bus operations (select plane, bulk bitmap, refresh)
// and mutably borrows the driver until await_draw drains them.

impl<T, D> PanelDriver<T, D>
where
    T: AsyncTransport,
    D: DelayNs + AsyncDelayNs,
{
    /// Start a full-frame draw without blocking.
    ///
    /// Nothing else can use the bus until the returned handle is awaited.
    /// Dropping it unawaited leaves the panel `Drawing`; re-initialize.
    pub fn draw_async<'b>(
        &mut self,
        bitmap: &'b [u8],
    ) -> Result<DrawInFlight<'_, 'b, T, D>, PanelError> {
        self.expect_state(PanelState::Ready)?;
        self.check_bitmap(bitmap)?;
        self.state = PanelState::Drawing;
        Ok(DrawInFlight {
            panel: self,
            bitmap,
        })
    }

    async fn draw_sequence_async(&mut self, bitmap: &[u8]) -> Result<(), PanelError> {
        self.transport.send_command_async(cmd::WRITE_NEW_PLANE).await?;
        self.transport.send_block_async(bitmap).await?;
        self.transport.send_command_async(cmd::DISPLAY_REFRESH).await?;
        AsyncDelayNs::delay_ms(&mut self.delay, self.config.command_settle_ms).await;
        self.wait_idle_async().await
    }

    async fn wait_idle_async(&mut self) -> Result<(), PanelError> {
        let max = self.config.busy_max_attempts;
        for attempt in 0..max {
            self.transport.send_command_async(cmd::GET_STATUS).await?;
            if !self.transport.read_busy()? {
                debug!("panel: idle after {} polls", attempt);
                AsyncDelayNs::delay_ms(&mut self.delay, self.config.busy_settle_ms).await;
                return Ok(());
            }
            AsyncDelayNs::delay_ms(&mut self.delay, self.config.busy_poll_ms).await;
        }
        Err(PanelError::BusyTimeout { attempts: max })
    }
}

/// A draw queued by [`PanelDriver::draw_async`].
#[must_use = "the panel stays Drawing until await_draw completes"]
pub struct DrawInFlight<'a, 'b, T, D> {
    panel: &'a mut PanelDriver<T, D>,
    bitmap: &'b [u8],
}

impl<T, D> DrawInFlight<'_, '_, T, D>
where
    T: AsyncTransport,
    D: DelayNs + AsyncDelayNs,
{
    /// Drive the queued operations and the refresh to completion.
    pub async fn await_draw(self) -> Result<(), PanelError> {
        let res = self.panel.draw_sequence_async(self.bitmap).await;
        self.panel.settle(res, PanelState::Ready)
    }

    pub fn len(&self) -> usize {
        self.bitmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResetTiming;
    use crate::drivers::waveform::DEFAULT_WAVEFORM;
    use crate::error::TransportError;
    use crate::mocks::{BusOp, MockDelay, MockTransport};
    use alloc::vec::Vec;
    use embassy_futures::block_on;

    // 16x4 panel: 8-byte planes keep the op log readable
    fn small_config() -> PanelConfig {
        PanelConfig::new()
            .with_size(16, 4)
            .with_busy_poll(1, 5)
            .with_settle(0, 0)
    }

    fn ready_panel() -> PanelDriver<MockTransport, MockDelay> {
        let mut panel = PanelDriver::new(MockTransport::new(), MockDelay::new(), small_config());
        panel.initialize().unwrap();
        panel.transport.ops.clear();
        panel
    }

    fn ops_of(panel: &PanelDriver<MockTransport, MockDelay>) -> Vec<BusOp> {
        panel.transport.ops.clone()
    }

    #[test]
    fn initialize_programs_registers_then_waveforms_then_power() {
        let mut panel = PanelDriver::new(
            MockTransport::new(),
            MockDelay::new(),
            PanelConfig::new().with_reset(ResetTiming::DEFAULT),
        );
        panel.initialize().unwrap();
        assert_eq!(panel.state(), PanelState::Ready);

        let ops = ops_of(&panel);
        assert_eq!(
            &ops[..4],
            &[
                BusOp::Reset(false),
                BusOp::Reset(true),
                BusOp::Reset(false),
                BusOp::Reset(true),
            ]
        );
        assert_eq!(ops[4], BusOp::Command(0x01));
        assert_eq!(ops[5], BusOp::Data(vec![0x07, 0x17, 0x3F, 0x3F, 0x11]));

        let res = ops.iter().position(|op| *op == BusOp::Command(0x61)).unwrap();
        assert_eq!(ops[res + 1], BusOp::Data(vec![0x03, 0x20, 0x01, 0xE0]));

        let luts: Vec<usize> = [0x20, 0x21, 0x22, 0x23, 0x24]
            .iter()
            .map(|&c| ops.iter().position(|op| *op == BusOp::Command(c)).unwrap())
            .collect();
        assert!(luts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ops[luts[0] + 1], BusOp::Data(DEFAULT_WAVEFORM.vcom.to_vec()));
        assert_eq!(
            ops[luts[4] + 1],
            BusOp::Data(DEFAULT_WAVEFORM.black_to_black.to_vec())
        );

        let power_on = ops.iter().position(|op| *op == BusOp::Command(0x04)).unwrap();
        assert!(power_on > luts[4]);
        assert_eq!(ops[power_on + 1], BusOp::Command(0x71));
        assert_eq!(ops.len(), power_on + 2);
    }

    #[test]
    fn clear_zeroes_both_planes() {
        let mut panel = ready_panel();
        panel.clear().unwrap();
        assert_eq!(
            ops_of(&panel),
            [
                BusOp::Command(0x10),
                BusOp::Fill { byte: 0x00, count: 8 },
                BusOp::Command(0x13),
                BusOp::Fill { byte: 0x00, count: 8 },
                BusOp::Command(0x12),
                BusOp::Command(0x71),
            ]
        );
        assert_eq!(panel.state(), PanelState::Ready);
    }

    #[test]
    fn draw_sync_sends_bitmap_as_stored() {
        let mut panel = ready_panel();
        let bitmap = [0xFF, 0x00, 0x0F, 0xF0, 0, 0, 0, 0x80];
        panel.draw_sync(&bitmap).unwrap();
        let ops = ops_of(&panel);
        assert_eq!(ops[0], BusOp::Command(0x13));
        assert_eq!(ops[1], BusOp::Block(bitmap.to_vec()));
        assert_eq!(ops[2], BusOp::Command(0x12));
    }

    #[test]
    fn clear_then_draw_is_idempotent_on_the_bus() {
        let mut panel = ready_panel();
        let zero = [0u8; 8];

        panel.clear().unwrap();
        panel.draw_sync(&zero).unwrap();
        let first = ops_of(&panel);
        panel.transport.ops.clear();

        panel.clear().unwrap();
        panel.draw_sync(&zero).unwrap();
        assert_eq!(first, ops_of(&panel));

        panel.transport.ops.clear();
        block_on(async {
            panel.draw_async(&zero).unwrap().await_draw().await.unwrap();
        });
        let a = ops_of(&panel);
        panel.transport.ops.clear();
        block_on(async {
            panel.draw_async(&zero).unwrap().await_draw().await.unwrap();
        });
        assert_eq!(a, ops_of(&panel));
    }

    #[test]
    fn draw_async_issues_one_select_one_block_one_refresh() {
        let mut panel = ready_panel();
        let bitmap = [0x55u8; 8];

        let draw = panel.draw_async(&bitmap).unwrap();
        assert_eq!(draw.len(), 8);
        block_on(draw.await_draw()).unwrap();

        let ops = ops_of(&panel);
        let selects = ops.iter().filter(|op| **op == BusOp::Command(0x13)).count();
        let refreshes = ops.iter().filter(|op| **op == BusOp::Command(0x12)).count();
        let blocks: Vec<usize> = ops
            .iter()
            .filter_map(|op| match op {
                BusOp::Block(b) => Some(b.len()),
                _ => None,
            })
            .collect();
        assert_eq!(selects, 1);
        assert_eq!(refreshes, 1);
        assert_eq!(blocks, [8]);
        assert_eq!(&ops[..3], &[
            BusOp::Command(0x13),
            BusOp::Block(vec![0x55; 8]),
            BusOp::Command(0x12),
        ]);
        assert_eq!(panel.transport.async_ops, 3 + 1);
        assert_eq!(panel.state(), PanelState::Ready);
    }

    #[test]
    fn draw_async_claims_panel_until_awaited() {
        let mut panel = ready_panel();
        let bitmap = [0u8; 8];
        let draw = panel.draw_async(&bitmap).unwrap();
        drop(draw);
        assert_eq!(panel.state(), PanelState::Drawing);
        assert_eq!(panel.draw_sync(&bitmap), Err(PanelError::InvalidState));
        assert!(ops_of(&panel).is_empty());
    }

    #[test]
    fn wrong_bitmap_length_is_rejected() {
        let mut panel = ready_panel();
        assert_eq!(
            panel.draw_sync(&[0u8; 7]),
            Err(PanelError::BitmapSize { expected: 8, actual: 7 })
        );
        assert!(panel.draw_async(&[0u8; 9]).is_err());
        assert_eq!(panel.state(), PanelState::Ready);
    }

    #[test]
    fn stuck_busy_times_out_and_uninitializes() {
        let mut panel = ready_panel();
        panel.transport.always_busy = true;
        assert_eq!(
            panel.clear(),
            Err(PanelError::BusyTimeout { attempts: 5 })
        );
        assert_eq!(panel.state(), PanelState::Uninitialized);
        let polls = ops_of(&panel)
            .iter()
            .filter(|op| **op == BusOp::Command(0x71))
            .count();
        assert_eq!(polls, 5);
    }

    #[test]
    fn busy_wait_polls_until_idle() {
        let mut panel = ready_panel();
        panel.transport.busy_script.extend([true, true, true]);
        panel.clear().unwrap();
        let polls = ops_of(&panel)
            .iter()
            .filter(|op| **op == BusOp::Command(0x71))
            .count();
        assert_eq!(polls, 4);
    }

    #[test]
    fn transport_error_aborts_draw() {
        let mut panel = ready_panel();
        panel.transport.fail_at = Some(1);
        assert_eq!(
            panel.draw_sync(&[0u8; 8]),
            Err(PanelError::Transport(TransportError::Bus))
        );
        assert_eq!(panel.state(), PanelState::Uninitialized);
        assert_eq!(panel.clear(), Err(PanelError::InvalidState));
    }

    #[test]
    fn sleep_powers_off_then_deep_sleeps() {
        let mut panel = ready_panel();
        panel.sleep().unwrap();
        assert_eq!(
            ops_of(&panel),
            [
                BusOp::Command(0x02),
                BusOp::Command(0x71),
                BusOp::Command(0x07),
                BusOp::Data(vec![0xA5]),
            ]
        );
        assert_eq!(panel.state(), PanelState::Sleeping);
        assert_eq!(panel.clear(), Err(PanelError::InvalidState));

        panel.initialize().unwrap();
        assert_eq!(panel.state(), PanelState::Ready);
    }

    #[test]
    fn operations_before_initialize_are_refused() {
        let mut panel = PanelDriver::new(MockTransport::new(), MockDelay::new(), small_config());
        assert_eq!(panel.clear(), Err(PanelError::InvalidState));
        assert_eq!(panel.sleep(), Err(PanelError::InvalidState));
        assert!(ops_of(&panel).is_empty());
    }
}
