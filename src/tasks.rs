// Embassy spawned tasks and the statics they share with the control task
//
//   • `net_task`      — drives the embassy-net runner for the life of
//                       the boot.
//
//   • `prefetch_task` — owns the HTTP page source; receives fetch
//                       intents from the reader and installs pages
//                       into the store. One fetch at a time.
//
// The control task itself is `main`: it owns the panel and handles
// button events (see bin/main.rs).

use embassy_net::Runner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Delay;
use embedded_hal_async::delay::DelayNs;
use esp_radio::wifi::WifiDevice;
use inkleaf_kernel::config::INTENT_QUEUE_CAP;
use inkleaf_kernel::{FetchIntent, PageStore, PrefetchWorker};

use crate::net::HttpPageSource;

pub type Store = PageStore<CriticalSectionRawMutex, LockDelay>;
pub type Worker =
    PrefetchWorker<'static, CriticalSectionRawMutex, LockDelay, HttpPageSource, INTENT_QUEUE_CAP>;

/// Timer-backed delay the store clones for each bounded lock wait.
#[derive(Clone, Copy, Default)]
pub struct LockDelay;

impl DelayNs for LockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        Delay.delay_ns(ns).await
    }
}

/// Prefetch requests from the reader to the worker. Bounded; the
/// reader drops an intent rather than wait on a full queue.
pub static INTENTS: Channel<CriticalSectionRawMutex, FetchIntent, INTENT_QUEUE_CAP> =
    Channel::new();

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
pub async fn prefetch_task(mut worker: Worker) -> ! {
    worker.run().await
}
