// Host-side stand-ins for the hardware and network collaborators.
// Each records what it was asked to do so tests can assert on order.

use std::collections::VecDeque;
use std::string::{String, ToString};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use crate::drivers::transport::{AsyncTransport, Transport};
use crate::error::{FetchError, TransportError};
use crate::events::{EdgeControl, Pin};
use crate::pages::{Cursor, PageNumber, PageSource};
use crate::power::{PowerControl, RetainedStore};

/// Deterministic, page-specific content.
pub fn page_bytes(page: PageNumber, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (page as u8).wrapping_mul(37).wrapping_add(i as u8))
        .collect()
}

/// Shared, ordered record of side effects across several mocks.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ── Bus ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Command(u8),
    Data(Vec<u8>),
    /// Bulk payload, one per write.
    Block(Vec<u8>),
    Fill { byte: u8, count: usize },
    Reset(bool),
}

#[derive(Default)]
pub struct MockTransport {
    pub ops: Vec<BusOp>,
    /// Busy samples to return before reporting idle.
    pub busy_script: VecDeque<bool>,
    pub always_busy: bool,
    /// Fail the op that would land at this index of `ops` (once).
    pub fail_at: Option<usize>,
    pub async_ops: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, op: BusOp) -> Result<(), TransportError> {
        if self.fail_at == Some(self.ops.len()) {
            self.fail_at = None;
            return Err(TransportError::Bus);
        }
        self.ops.push(op);
        Ok(())
    }
}

impl Transport for MockTransport {
    fn send_command(&mut self, code: u8) -> Result<(), TransportError> {
        self.record(BusOp::Command(code))
    }

    fn send_data(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.record(BusOp::Data(bytes.to_vec()))
    }

    fn send_block(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.record(BusOp::Block(bytes.to_vec()))
    }

    fn send_repeated(&mut self, byte: u8, count: usize) -> Result<(), TransportError> {
        self.record(BusOp::Fill { byte, count })
    }

    fn set_reset(&mut self, high: bool) -> Result<(), TransportError> {
        self.record(BusOp::Reset(high))
    }

    fn read_busy(&mut self) -> Result<bool, TransportError> {
        if self.always_busy {
            return Ok(true);
        }
        Ok(self.busy_script.pop_front().unwrap_or(false))
    }
}

impl AsyncTransport for MockTransport {
    async fn send_command_async(&mut self, code: u8) -> Result<(), TransportError> {
        self.async_ops += 1;
        self.record(BusOp::Command(code))
    }

    async fn send_block_async(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.async_ops += 1;
        self.record(BusOp::Block(bytes.to_vec()))
    }
}

// ── Delays ──────────────────────────────────────────────────────────────

/// Returns immediately; counts the time it was asked to wait.
#[derive(Clone, Default)]
pub struct MockDelay {
    pub elapsed_ns: u64,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}

/// Really sleeps the calling thread; for cross-thread lock tests.
#[derive(Clone, Copy)]
pub struct StdDelay;

impl embedded_hal_async::delay::DelayNs for StdDelay {
    async fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(ns as u64));
    }
}

// ── Network ─────────────────────────────────────────────────────────────

pub struct MockSource {
    page_size: usize,
    pub failing: Vec<PageNumber>,
    pub requests: Vec<(u64, usize)>,
    pub resources: Vec<String>,
    journal: Option<Journal>,
}

impl MockSource {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            failing: Vec::new(),
            requests: Vec::new(),
            resources: Vec::new(),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Pages requested so far, in order.
    pub fn pages(&self) -> Vec<PageNumber> {
        self.requests
            .iter()
            .map(|&(offset, _)| (offset / self.page_size as u64) as PageNumber)
            .collect()
    }
}

impl PageSource for MockSource {
    async fn fetch_range(
        &mut self,
        resource: &str,
        offset: u64,
        dest: &mut [u8],
    ) -> Result<(), FetchError> {
        self.requests.push((offset, dest.len()));
        self.resources.push(resource.to_string());
        let page = (offset / self.page_size as u64) as PageNumber;
        if let Some(journal) = &self.journal {
            journal.push(format!("fetch {}", page));
        }
        if self.failing.contains(&page) {
            return Err(FetchError::Io);
        }
        dest.copy_from_slice(&page_bytes(page, dest.len()));
        Ok(())
    }
}

// ── GPIO edges ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOp {
    Disable(Pin),
    Enable(Pin),
}

#[derive(Default)]
pub struct MockEdges {
    ops: Mutex<Vec<EdgeOp>>,
    journal: Option<Journal>,
}

impl MockEdges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn ops(&self) -> Vec<EdgeOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn is_enabled(&self, pin: Pin) -> bool {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|op| match *op {
                EdgeOp::Enable(p) if p == pin => Some(true),
                EdgeOp::Disable(p) if p == pin => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    fn record(&self, op: EdgeOp) {
        if let Some(journal) = &self.journal {
            match op {
                EdgeOp::Enable(p) => journal.push(format!("enable {}", p)),
                EdgeOp::Disable(p) => journal.push(format!("disable {}", p)),
            }
        }
        self.ops.lock().unwrap().push(op);
    }
}

impl EdgeControl for MockEdges {
    fn disable(&self, pin: Pin) {
        self.record(EdgeOp::Disable(pin));
    }

    fn enable(&self, pin: Pin) {
        self.record(EdgeOp::Enable(pin));
    }
}

// ── Retained memory / power ─────────────────────────────────────────────

pub struct MockRetained {
    cursor: Cursor,
    journal: Journal,
}

impl MockRetained {
    pub fn new(cursor: Cursor, journal: Journal) -> Self {
        Self { cursor, journal }
    }
}

impl RetainedStore for MockRetained {
    fn load(&self) -> Cursor {
        self.cursor
    }

    fn store(&mut self, cursor: Cursor) {
        self.journal.push(format!(
            "retain {}/{}/{}",
            cursor.lowest_known_prev, cursor.current, cursor.highest_known_next
        ));
        self.cursor = cursor;
    }
}

pub struct MockPower {
    journal: Journal,
}

impl MockPower {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl PowerControl for MockPower {
    fn stop_network(&mut self) {
        self.journal.push("stop network");
    }

    fn arm_wake(&mut self, pin: Pin) {
        self.journal.push(format!("arm wake {}", pin));
    }

    fn enter_deep_sleep(&mut self) {
        self.journal.push("deep sleep");
    }
}
