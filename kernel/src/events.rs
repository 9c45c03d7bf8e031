// Interrupt-to-task event dispatch
//
// The GPIO interrupt handler only masks the pin that fired and queues
// it; everything that blocks (bus, busy polling, network) runs in the
// control task, which pops one event, handles it, then unmasks the pin.
// A masked pin cannot queue twice, so bounces and held buttons collapse
// into one event.
//
// Queue order is FIFO, except that sleep jumps to the front. No
// allocation; the ring is a fixed array behind a critical section.

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    Next,
    Prev,
    Sleep,
}

impl Pin {
    pub const ALL: [Pin; 3] = [Pin::Next, Pin::Prev, Pin::Sleep];
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Next => write!(f, "next"),
            Pin::Prev => write!(f, "prev"),
            Pin::Sleep => write!(f, "sleep"),
        }
    }
}

/// Per-pin edge interrupt mask. Must be callable from interrupt context.
pub trait EdgeControl {
    fn disable(&self, pin: Pin);
    fn enable(&self, pin: Pin);
}

// ring buffer for pin events
pub struct EventRing<const N: usize> {
    buf: [Option<Pin>; N],
    head: usize, // next to read
    tail: usize, // next to write
    len: usize,
}

impl<const N: usize> EventRing<N> {
    pub const fn new() -> Self {
        Self {
            buf: [None; N],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    pub fn push_back(&mut self, pin: Pin) -> Result<(), Pin> {
        if self.len >= N {
            return Err(pin);
        }
        self.buf[self.tail] = Some(pin);
        self.tail = (self.tail + 1) % N;
        self.len += 1;
        Ok(())
    }

    /// Queue ahead of everything pending. When full, the newest entry is
    /// evicted to make room and handed back.
    pub fn push_front(&mut self, pin: Pin) -> Option<Pin> {
        let evicted = if self.len >= N {
            self.tail = (self.tail + N - 1) % N;
            self.len -= 1;
            self.buf[self.tail].take()
        } else {
            None
        };
        self.head = (self.head + N - 1) % N;
        self.buf[self.head] = Some(pin);
        self.len += 1;
        evicted
    }

    pub fn pop(&mut self) -> Option<Pin> {
        if self.len == 0 {
            return None;
        }
        let pin = self.buf[self.head].take();
        self.head = (self.head + 1) % N;
        self.len -= 1;
        pin
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for EventRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventDispatcher<M: RawMutex, const N: usize> {
    queue: Mutex<M, RefCell<EventRing<N>>>,
    ready: Signal<M, ()>,
}

impl<M: RawMutex, const N: usize> EventDispatcher<M, N> {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(EventRing::new())),
            ready: Signal::new(),
        }
    }

    /// Interrupt side: mask `pin`, queue it, wake the consumer. O(1).
    pub fn on_edge(&self, pin: Pin, edges: &impl EdgeControl) {
        edges.disable(pin);
        let dropped = self.queue.lock(|q| {
            let mut q = q.borrow_mut();
            match pin {
                Pin::Sleep => q.push_front(pin),
                _ => q.push_back(pin).err(),
            }
        });
        // a dropped event must not leave its pin masked forever
        if let Some(dropped) = dropped {
            warn!("events: queue full, dropped {}", dropped);
            edges.enable(dropped);
        }
        self.ready.signal(());
    }

    pub fn try_next(&self) -> Option<Pin> {
        self.queue.lock(|q| q.borrow_mut().pop())
    }

    pub async fn next_event(&self) -> Pin {
        loop {
            if let Some(pin) = self.try_next() {
                return pin;
            }
            self.ready.wait().await;
        }
    }

    /// Task side: unmask `pin` once its event has been handled.
    pub fn rearm(&self, pin: Pin, edges: &impl EdgeControl) {
        edges.enable(pin);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock(|q| q.borrow().len())
    }
}

impl<M: RawMutex, const N: usize> Default for EventDispatcher<M, N> {
    fn default() -> Self {
        Self::new()
    }
}
