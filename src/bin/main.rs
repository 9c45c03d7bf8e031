// inkleaf entry point
//
// Boot sequence: logger -> heap -> board -> RTOS -> Wi-Fi -> reader boot
// -> spawn prefetch worker -> control loop
//
// `main` is the control task: it owns the panel through the reader and
// handles button events until a sleep request, then blanks the panel,
// persists the cursor and enters deep sleep. The next wake is a reset
// that comes back through here.
//
// Any failure before the first page is on the glass also ends in deep
// sleep; pressing sleep again retries from scratch.

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};
use static_cell::StaticCell;

use inkleaf::board::{Board, BoardEdges, EVENTS};
use inkleaf::net::{self, HttpPageSource, RESOURCE_URL};
use inkleaf::power::{self, DeepSleep, RtcRetained};
use inkleaf::tasks::{self, INTENTS, LockDelay, Store, Worker};
use inkleaf_kernel::{PageStore, PrefetchWorker, Reader, ReaderConfig};

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

const CONFIG: ReaderConfig = ReaderConfig::new();

static STORE: StaticCell<Store> = StaticCell::new();

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    // page ring + fetch scratch live here, as does the radio
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);
    esp_alloc::heap_allocator!(size: 256720);

    info!("booting...");
    let cause = power::reset_cause();

    let board = match Board::init(peripherals, CONFIG.panel) {
        Ok(board) => board,
        Err(e) => {
            error!("board: spi config rejected: {:?}", e);
            esp_hal::system::software_reset()
        }
    };
    let system = board.system;
    let mut panel = board.panel;

    let sw_int = SoftwareInterruptControl::new(system.sw_interrupt);
    esp_rtos::start(TimerGroup::new(system.timg0).timer0, sw_int.software_interrupt0);
    info!("rtos started.");

    // SAFETY: the only handle; it stays in this task until deep sleep
    let mut retained = unsafe { RtcRetained::take() };
    let mut sleep = DeepSleep::new(system.lpwr, system.wake_pin);

    let network = match net::join(system.wifi, &spawner).await {
        Ok(network) => network,
        Err(e) => {
            error!("net: join failed: {:?}", e);
            let cursor = inkleaf_kernel::power::restore_cursor(cause, &mut retained);
            inkleaf_kernel::power::power_down(&mut panel, cursor, &mut retained, &mut sleep);
            halt()
        }
    };
    sleep.attach_wifi(network.controller);

    let store: &'static Store = STORE.init(PageStore::new(CONFIG.store, LockDelay));
    let mut worker: Worker = PrefetchWorker::new(
        store,
        INTENTS.receiver(),
        HttpPageSource::new(network.stack),
        RESOURCE_URL,
    );
    let mut reader = Reader::new(panel, store, INTENTS.sender(), &EVENTS, &BoardEdges);

    match reader.boot(cause, &mut retained, &mut worker).await {
        Ok(cursor) => info!("reader ready at page {}.", cursor.current),
        Err(e) => {
            error!("boot: {}", e);
            reader.power_down(&mut retained, &mut sleep);
            halt()
        }
    }

    if let Err(e) = spawner.spawn(tasks::prefetch_task(worker)) {
        error!("prefetch: spawn failed: {:?}", e);
    }

    reader.run().await;
    reader.power_down(&mut retained, &mut sleep);
    halt()
}

// deep sleep returned: start over
fn halt() -> ! {
    error!("power: still awake after deep sleep request, resetting");
    esp_hal::system::software_reset()
}
