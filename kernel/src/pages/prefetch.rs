// Prefetch worker
//
// Long-lived task that turns fetch intents into byte-range fetches and
// installs the result into the page ring. Fetched bytes are flipped to
// panel polarity in the scratch buffer first, so a draw is one verbatim
// bulk write. A failed fetch is logged and
// the intent dropped: the page stays outside the known bounds, so the
// control loop refuses to navigate onto it until it is asked for again.
//
// During boot the same path runs inline (`load`) before the task is
// spawned, so the first pages are resident before input is accepted.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;
use embedded_hal_async::delay::DelayNs;
use log::{debug, warn};

use super::store::{PageBuffer, PageNumber, PageStore, slot_of};
use crate::error::{FetchError, PrefetchError};

/// Request to bring `page` into `slot`. Consumed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchIntent {
    pub page: PageNumber,
    pub slot: usize,
}

impl FetchIntent {
    pub const fn for_page(page: PageNumber) -> Self {
        Self {
            page,
            slot: slot_of(page),
        }
    }
}

/// Byte-range fetch collaborator.
///
/// Fills `dest` completely from `resource` starting at `offset`, or fails.
/// Connection setup, timeouts and transport security are its business.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch_range(
        &mut self,
        resource: &str,
        offset: u64,
        dest: &mut [u8],
    ) -> Result<(), FetchError>;
}

pub struct PrefetchWorker<'a, M: RawMutex, D, S, const N: usize> {
    store: &'a PageStore<M, D>,
    intents: Receiver<'a, M, FetchIntent, N>,
    source: S,
    resource: &'a str,
    scratch: PageBuffer,
}

impl<'a, M, D, S, const N: usize> PrefetchWorker<'a, M, D, S, N>
where
    M: RawMutex,
    D: DelayNs + Clone,
    S: PageSource,
{
    pub fn new(
        store: &'a PageStore<M, D>,
        intents: Receiver<'a, M, FetchIntent, N>,
        source: S,
        resource: &'a str,
    ) -> Self {
        Self {
            store,
            intents,
            source,
            resource,
            scratch: PageBuffer::zeroed(store.page_size()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub async fn run(&mut self) -> ! {
        loop {
            // errors are logged in process(); the intent is gone either way
            let _ = self.step().await;
        }
    }

    /// Wait for one intent and process it.
    pub async fn step(&mut self) -> Result<(), PrefetchError> {
        let intent = self.intents.receive().await;
        self.process(intent).await
    }

    /// Fetch and install one page; the boot path calls this directly.
    pub async fn load(&mut self, page: PageNumber) -> Result<(), PrefetchError> {
        self.process(FetchIntent::for_page(page)).await
    }

    pub async fn process(&mut self, intent: FetchIntent) -> Result<(), PrefetchError> {
        let res = self.fetch_and_install(intent).await;
        match &res {
            Ok(()) => debug!("prefetch: page {} -> slot {}", intent.page, intent.slot),
            Err(e) => warn!("prefetch: page {} dropped: {}", intent.page, e),
        }
        res
    }

    async fn fetch_and_install(&mut self, intent: FetchIntent) -> Result<(), PrefetchError> {
        debug_assert_eq!(intent.slot, slot_of(intent.page));
        let offset = intent.page as u64 * self.scratch.len() as u64;
        self.source
            .fetch_range(self.resource, offset, &mut self.scratch)
            .await?;
        if self.store.config().invert_pixels {
            for b in self.scratch.iter_mut() {
                *b = !*b;
            }
        }
        self.store.install(intent.page, &self.scratch).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::error::StoreError;
    use crate::mocks::{MockDelay, MockSource, page_bytes};
    use crate::pages::store::{Cursor, Direction};
    use alloc::vec::Vec;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Channel;

    const PS: usize = 32;

    type Store = PageStore<CriticalSectionRawMutex, MockDelay>;

    fn store() -> Store {
        PageStore::new(StoreConfig::new().with_page_size(PS), MockDelay::new())
    }

    #[test]
    fn fetches_the_pages_byte_range() {
        let s = store();
        let ch: Channel<CriticalSectionRawMutex, FetchIntent, 2> = Channel::new();
        let mut w = PrefetchWorker::new(&s, ch.receiver(), MockSource::new(PS), "/book.ebm");

        block_on(async {
            w.load(0).await.unwrap();
            ch.try_send(FetchIntent::for_page(1)).unwrap();
            w.step().await.unwrap();

            let buf = s.resident_buffer(1).await.unwrap().unwrap();
            let flipped: Vec<u8> = page_bytes(1, PS).iter().map(|b| !b).collect();
            assert_eq!(&*buf, &flipped[..]);
        });
        assert_eq!(w.source.requests, [(0, PS), (PS as u64, PS)]);
        assert!(w.source.resources.iter().all(|r| r == "/book.ebm"));
    }

    #[test]
    fn matching_polarity_installs_bytes_as_fetched() {
        let s: Store = PageStore::new(
            StoreConfig::new().with_page_size(PS).with_invert_pixels(false),
            MockDelay::new(),
        );
        let ch: Channel<CriticalSectionRawMutex, FetchIntent, 2> = Channel::new();
        let mut w = PrefetchWorker::new(&s, ch.receiver(), MockSource::new(PS), "book");
        block_on(async {
            w.load(0).await.unwrap();
            let buf = s.resident_buffer(0).await.unwrap().unwrap();
            assert_eq!(&*buf, &page_bytes(0, PS)[..]);
        });
    }

    #[test]
    fn fetch_error_leaves_bounds_and_refuses_advance() {
        let s = store();
        let ch: Channel<CriticalSectionRawMutex, FetchIntent, 2> = Channel::new();
        let mut source = MockSource::new(PS);
        source.failing.push(2);
        let mut w = PrefetchWorker::new(&s, ch.receiver(), source, "book");

        block_on(async {
            w.load(0).await.unwrap();
            w.load(1).await.unwrap();
            s.advance(Direction::Next).await.unwrap().unwrap();
            assert_eq!(s.cursor().await.unwrap(), Cursor::new(0, 1, 1));

            assert_eq!(
                w.load(2).await,
                Err(PrefetchError::Fetch(FetchError::Io))
            );
            assert_eq!(s.cursor().await.unwrap().highest_known_next, 1);
            assert!(s.advance(Direction::Next).await.unwrap().is_none());
            assert!(!s.is_resident(2).await.unwrap());
        });
    }

    #[test]
    fn reserved_slot_surfaces_store_error() {
        let s = store();
        let ch: Channel<CriticalSectionRawMutex, FetchIntent, 2> = Channel::new();
        let mut w = PrefetchWorker::new(&s, ch.receiver(), MockSource::new(PS), "book");
        block_on(async {
            w.load(0).await.unwrap();
            assert_eq!(
                w.load(3).await,
                Err(PrefetchError::Store(StoreError::SlotReserved { page: 3, slot: 0 }))
            );
        });
    }
}
