// The reader: one owned context for the control task
//
// Owns the panel driver; borrows the page store, the intent channel to
// the prefetch worker, the event dispatcher and the pin masks. Built
// once at startup and driven by the control task:
//
//   boot   -> restore cursor, panel up, load current (+ neighbours),
//             draw, unmask buttons
//   run    -> pop event, turn page / stop on sleep, unmask pin
//   power_down -> blank, sleep panel, persist cursor, deep sleep
//
// A page turn claims the panel with the async draw, hands the prefetch
// intent for the page beyond the new edge to the worker, then drives the
// bulk transfer and the refresh in await_draw. A turn that is not ready
// asks the worker again for the page it could not move onto.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;
use embedded_hal::delay::DelayNs;
use embedded_hal_async::delay::DelayNs as AsyncDelayNs;
use log::{debug, error, info, warn};

use crate::drivers::transport::AsyncTransport;
use crate::drivers::uc8179::PanelDriver;
use crate::error::{BootError, TurnError};
use crate::events::{EdgeControl, EventDispatcher, Pin};
use crate::pages::{Cursor, Direction, FetchIntent, PageNumber, PageSource, PageStore, PrefetchWorker};
use crate::power::{self, PowerControl, ResetCause, RetainedStore};

/// What the control loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Sleep,
}

pub struct Reader<'a, T, D, M, SD, E, const Q: usize, const N: usize>
where
    M: RawMutex,
{
    panel: PanelDriver<T, D>,
    store: &'a PageStore<M, SD>,
    intents: Sender<'a, M, FetchIntent, Q>,
    events: &'a EventDispatcher<M, N>,
    edges: &'a E,
    // last cursor read under the lock; used if the lock is busy at sleep
    cursor: Cursor,
}

impl<'a, T, D, M, SD, E, const Q: usize, const N: usize> Reader<'a, T, D, M, SD, E, Q, N>
where
    T: AsyncTransport,
    D: DelayNs + AsyncDelayNs,
    M: RawMutex,
    SD: AsyncDelayNs + Clone,
    E: EdgeControl,
{
    pub fn new(
        panel: PanelDriver<T, D>,
        store: &'a PageStore<M, SD>,
        intents: Sender<'a, M, FetchIntent, Q>,
        events: &'a EventDispatcher<M, N>,
        edges: &'a E,
    ) -> Self {
        Self {
            panel,
            store,
            intents,
            events,
            edges,
            cursor: Cursor::ORIGIN,
        }
    }

    pub fn panel(&self) -> &PanelDriver<T, D> {
        &self.panel
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Bring the device to a displayed page.
    ///
    /// Runs the fetches inline through `worker` (the worker task is not
    /// running yet) and unmasks the buttons only once the current page
    /// is on the glass.
    pub async fn boot<S, const WQ: usize>(
        &mut self,
        cause: ResetCause,
        retained: &mut impl RetainedStore,
        worker: &mut PrefetchWorker<'_, M, SD, S, WQ>,
    ) -> Result<Cursor, BootError>
    where
        S: PageSource,
    {
        let cursor = power::restore_cursor(cause, retained);
        // set first: a failed boot still persists where we were
        self.cursor = cursor;
        self.store.restore(cursor).await?;

        self.panel.initialize()?;
        self.panel.clear()?;

        let current = cursor.current;
        worker
            .load(current)
            .await
            .map_err(BootError::CurrentUnavailable)?;
        for neighbour in [current.checked_add(1), current.checked_sub(1)]
            .into_iter()
            .flatten()
        {
            // a missing neighbour only limits navigation
            let _ = worker.load(neighbour).await;
        }

        self.draw_current(current).await?;
        self.cursor = self.store.cursor().await?;

        for pin in Pin::ALL {
            self.events.rearm(pin, self.edges);
        }
        info!(
            "reader: page {} up, known [{}, {}]",
            self.cursor.current, self.cursor.lowest_known_prev, self.cursor.highest_known_next
        );
        Ok(self.cursor)
    }

    async fn draw_current(&mut self, page: PageNumber) -> Result<(), BootError> {
        let Some(bitmap) = self.store.resident_buffer(page).await? else {
            return Err(BootError::NotResident(page));
        };
        self.panel.draw_sync(&bitmap)?;
        Ok(())
    }

    /// Handle events until a sleep request; returns the cursor to persist.
    /// The sleep pin stays masked: the wake source takes over from here.
    pub async fn run(&mut self) -> Cursor {
        loop {
            let pin = self.events.next_event().await;
            match self.handle(pin).await {
                Flow::Sleep => return self.cursor,
                Flow::Continue => self.events.rearm(pin, self.edges),
            }
        }
    }

    pub async fn handle(&mut self, pin: Pin) -> Flow {
        let direction = match pin {
            Pin::Next => Direction::Next,
            Pin::Prev => Direction::Prev,
            Pin::Sleep => {
                if let Ok(cursor) = self.store.cursor().await {
                    self.cursor = cursor;
                }
                return Flow::Sleep;
            }
        };

        match self.turn(direction).await {
            Ok(Some(page)) => info!("reader: page {}", page),
            Ok(None) => warn!("reader: {:?} not ready", direction),
            Err(TurnError::Store(e)) => warn!("reader: turn skipped: {}", e),
            Err(TurnError::Panel(e)) => {
                error!("reader: draw failed: {}", e);
                self.recover().await;
            }
        }
        Flow::Continue
    }

    /// Move one page, draw it, and prefetch the page beyond it.
    ///
    /// The cursor only moves once the page is locked for the draw; a
    /// store error leaves it where it was.
    pub async fn turn(&mut self, direction: Direction) -> Result<Option<PageNumber>, TurnError> {
        let store = self.store;
        let Some(advanced) = store.advance(direction).await? else {
            self.request_missing(direction).await?;
            return Ok(None);
        };
        self.cursor = advanced.cursor;

        let draw = self.panel.draw_async(&advanced.bitmap)?;
        if let Some(p) = advanced.beyond {
            if self.intents.try_send(FetchIntent::for_page(p)).is_err() {
                warn!("reader: intent queue full, page {} not requested", p);
            }
        }
        draw.await_draw().await?;
        Ok(Some(advanced.page()))
    }

    // the neighbour is not resident: a fetch for it failed or is still
    // queued, so ask again
    async fn request_missing(&mut self, direction: Direction) -> Result<(), TurnError> {
        let cursor = self.store.cursor().await?;
        self.cursor = cursor;
        let Some(page) = direction.step(cursor.current) else {
            return Ok(());
        };
        if !self.store.is_resident(page).await? {
            if self.intents.try_send(FetchIntent::for_page(page)).is_err() {
                warn!("reader: intent queue full, page {} not requested", page);
            } else {
                debug!("reader: page {} requested again", page);
            }
        }
        Ok(())
    }

    // panel lost its state mid-draw: bring it back on the current page
    async fn recover(&mut self) {
        if let Err(e) = self.panel.initialize() {
            error!("reader: panel re-init failed: {}", e);
            return;
        }
        if let Err(e) = self.draw_current(self.cursor.current).await {
            error!("reader: redraw failed: {}", e);
        }
    }

    /// Blank the panel, persist the cursor and power down.
    pub fn power_down(&mut self, retained: &mut impl RetainedStore, power: &mut impl PowerControl) {
        power::power_down(&mut self.panel, self.cursor, retained, power);
    }
}
