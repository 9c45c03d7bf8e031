// Page ring and navigation cursor
//
// PAGE_SLOTS heap buffers indexed by `page % PAGE_SLOTS`, plus the
// cursor `(lowest_known_prev, current, highest_known_next)`. The cursor
// and the slot table sit behind one mutex; each buffer has its own so a
// draw can hold the displayed slot while the worker fills another.
//
// Lock order is always ring -> slot. Every acquisition is bounded by
// `StoreConfig::lock_max_attempts` and reported as `LockTimeout`.
//
// Known bounds are the contiguous run of resident pages around
// `current`: an install that extends the run widens them, one that wraps
// the ring over a page inside the run narrows them.

use alloc::boxed::Box;
use alloc::vec;
use core::ops::{Deref, DerefMut};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embedded_hal_async::delay::DelayNs;
use log::{debug, info};

use crate::config::{PAGE_SLOTS, StoreConfig};
use crate::error::StoreError;

pub type PageNumber = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

impl Direction {
    pub fn step(self, page: PageNumber) -> Option<PageNumber> {
        match self {
            Direction::Next => page.checked_add(1),
            Direction::Prev => page.checked_sub(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub lowest_known_prev: PageNumber,
    pub current: PageNumber,
    pub highest_known_next: PageNumber,
}

impl Cursor {
    pub const ORIGIN: Self = Self::new(0, 0, 0);

    pub const fn new(lowest_known_prev: PageNumber, current: PageNumber, highest_known_next: PageNumber) -> Self {
        Self {
            lowest_known_prev,
            current,
            highest_known_next,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.lowest_known_prev <= self.current && self.current <= self.highest_known_next
    }

    pub fn contains(&self, page: PageNumber) -> bool {
        (self.lowest_known_prev..=self.highest_known_next).contains(&page)
    }
}

#[inline]
pub const fn slot_of(page: PageNumber) -> usize {
    page as usize % PAGE_SLOTS
}

/// One page's packed bitmap.
pub struct PageBuffer(Box<[u8]>);

impl PageBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0u8; len].into_boxed_slice())
    }
}

impl Deref for PageBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for PageBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// Read-only view of a resident page; holds the slot lock.
pub struct ResidentPage<'a, M: RawMutex> {
    page: PageNumber,
    guard: MutexGuard<'a, M, PageBuffer>,
}

impl<M: RawMutex> ResidentPage<'_, M> {
    pub fn page(&self) -> PageNumber {
        self.page
    }
}

impl<M: RawMutex> Deref for ResidentPage<'_, M> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

/// A committed [`PageStore::advance`]: the page to draw, already locked.
pub struct Advanced<'a, M: RawMutex> {
    /// Cursor after the move.
    pub cursor: Cursor,
    /// Next page further in the same direction, when it is not resident.
    pub beyond: Option<PageNumber>,
    pub bitmap: ResidentPage<'a, M>,
}

impl<M: RawMutex> Advanced<'_, M> {
    pub fn page(&self) -> PageNumber {
        self.bitmap.page
    }
}

struct Ring {
    cursor: Cursor,
    // page held by each slot; None until filled
    resident: [Option<PageNumber>; PAGE_SLOTS],
}

impl Ring {
    fn holds(&self, page: PageNumber) -> bool {
        self.resident[slot_of(page)] == Some(page)
    }

    fn recompute_bounds(&mut self) {
        let c = self.cursor.current;
        let (mut lo, mut hi) = (c, c);
        if self.holds(c) {
            while lo > 0 && self.holds(lo - 1) {
                lo -= 1;
            }
            while hi < PageNumber::MAX && self.holds(hi + 1) {
                hi += 1;
            }
        }
        self.cursor.lowest_known_prev = lo;
        self.cursor.highest_known_next = hi;
    }
}

pub struct PageStore<M: RawMutex, D> {
    config: StoreConfig,
    delay: D,
    ring: Mutex<M, Ring>,
    slots: [Mutex<M, PageBuffer>; PAGE_SLOTS],
}

impl<M, D> PageStore<M, D>
where
    M: RawMutex,
    D: DelayNs + Clone,
{
    /// Allocate the ring with empty slots and the cursor at the origin.
    pub fn new(config: StoreConfig, delay: D) -> Self {
        Self {
            config,
            delay,
            ring: Mutex::new(Ring {
                cursor: Cursor::ORIGIN,
                resident: [None; PAGE_SLOTS],
            }),
            slots: core::array::from_fn(|_| Mutex::new(PageBuffer::zeroed(config.page_size))),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    async fn lock<'m, T>(&self, m: &'m Mutex<M, T>) -> Result<MutexGuard<'m, M, T>, StoreError> {
        let mut delay = self.delay.clone();
        for _ in 0..self.config.lock_max_attempts {
            if let Ok(guard) = m.try_lock() {
                return Ok(guard);
            }
            delay.delay_ms(self.config.lock_poll_ms).await;
        }
        m.try_lock().map_err(|_| StoreError::LockTimeout)
    }

    pub async fn cursor(&self) -> Result<Cursor, StoreError> {
        Ok(self.lock(&self.ring).await?.cursor)
    }

    /// Adopt a retained cursor after a wake. Every slot is marked empty:
    /// buffer contents never survive a power-down.
    pub async fn restore(&self, cursor: Cursor) -> Result<(), StoreError> {
        let mut ring = self.lock(&self.ring).await?;
        ring.cursor = cursor;
        ring.resident = [None; PAGE_SLOTS];
        info!(
            "store: cursor restored ({}, {}, {})",
            cursor.lowest_known_prev, cursor.current, cursor.highest_known_next
        );
        Ok(())
    }

    /// Move `current` one page in `direction` if that page is known and
    /// resident, handing back its slot locked for the draw.
    ///
    /// `Ok(None)` means not ready. On `Ok(None)` or an error the cursor
    /// is left alone: `current` only moves once the slot is held.
    pub async fn advance(&self, direction: Direction) -> Result<Option<Advanced<'_, M>>, StoreError> {
        let mut ring = self.lock(&self.ring).await?;
        let Some(target) = direction.step(ring.cursor.current) else {
            return Ok(None);
        };
        if !ring.cursor.contains(target) || !ring.holds(target) {
            debug!("store: page {} not ready", target);
            return Ok(None);
        }
        let guard = self.lock(&self.slots[slot_of(target)]).await?;
        ring.cursor.current = target;
        let beyond = direction.step(target).filter(|&p| !ring.holds(p));
        Ok(Some(Advanced {
            cursor: ring.cursor,
            beyond,
            bitmap: ResidentPage { page: target, guard },
        }))
    }

    /// Copy `bytes` into the slot of `page` and widen the known bounds.
    ///
    /// The displayed page's slot is reserved: only `current` itself may
    /// be written there.
    pub async fn install(&self, page: PageNumber, bytes: &[u8]) -> Result<(), StoreError> {
        if bytes.len() != self.config.page_size {
            return Err(StoreError::PageSize {
                expected: self.config.page_size,
                actual: bytes.len(),
            });
        }

        let mut ring = self.lock(&self.ring).await?;
        let slot = slot_of(page);
        let current = ring.cursor.current;
        if page != current && slot == slot_of(current) {
            return Err(StoreError::SlotReserved { page, slot });
        }

        let mut buf = self.lock(&self.slots[slot]).await?;
        buf.copy_from_slice(bytes);
        drop(buf);

        if let Some(evicted) = ring.resident[slot].replace(page) {
            if evicted != page {
                debug!("store: page {} evicted from slot {}", evicted, slot);
            }
        }
        ring.recompute_bounds();
        debug!(
            "store: page {} in slot {}, known [{}, {}]",
            page, slot, ring.cursor.lowest_known_prev, ring.cursor.highest_known_next
        );
        Ok(())
    }

    /// Lock the slot holding `page`; `Ok(None)` if it is not resident.
    pub async fn resident_buffer(
        &self,
        page: PageNumber,
    ) -> Result<Option<ResidentPage<'_, M>>, StoreError> {
        let ring = self.lock(&self.ring).await?;
        if !ring.holds(page) {
            return Ok(None);
        }
        let guard = self.lock(&self.slots[slot_of(page)]).await?;
        drop(ring);
        Ok(Some(ResidentPage { page, guard }))
    }

    pub async fn is_resident(&self, page: PageNumber) -> Result<bool, StoreError> {
        Ok(self.lock(&self.ring).await?.holds(page))
    }
}
