// Page-turn and sleep buttons
//
// One GPIO interrupt handler serves all three buttons. It clears the
// pending edge, and hands each pin that fired to the kernel's event
// dispatcher, which masks the pin and queues the event. The control
// task unmasks the pin through `BoardEdges` once the event is handled.
//
// The inputs live in a critical-section mutex so the handler and the
// control task can both reach them.

use core::cell::RefCell;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_hal::gpio::{Event, Input};
use inkleaf_kernel::config::EVENT_QUEUE_CAP;
use inkleaf_kernel::{EdgeControl, EventDispatcher, Pin};

/// Button events from the GPIO handler to the control task.
pub static EVENTS: EventDispatcher<CriticalSectionRawMutex, EVENT_QUEUE_CAP> =
    EventDispatcher::new();

static BUTTONS: Mutex<RefCell<Option<ButtonPins>>> = Mutex::new(RefCell::new(None));

pub struct ButtonPins {
    pub next: Input<'static>,
    pub prev: Input<'static>,
    pub sleep: Input<'static>,
}

impl ButtonPins {
    fn input(&mut self, pin: Pin) -> &mut Input<'static> {
        match pin {
            Pin::Next => &mut self.next,
            Pin::Prev => &mut self.prev,
            Pin::Sleep => &mut self.sleep,
        }
    }
}

/// Hand the buttons to the interrupt handler. Every edge starts masked;
/// the reader unmasks them once the first page is on the glass.
pub fn install(mut pins: ButtonPins) {
    for pin in Pin::ALL {
        let input = pins.input(pin);
        input.unlisten();
        input.clear_interrupt();
    }
    critical_section::with(|cs| {
        BUTTONS.borrow_ref_mut(cs).replace(pins);
    });
}

fn with_input(pin: Pin, f: impl FnOnce(&mut Input<'static>)) {
    critical_section::with(|cs| {
        if let Some(pins) = BUTTONS.borrow_ref_mut(cs).as_mut() {
            f(pins.input(pin));
        }
    });
}

/// Edge masking on the real GPIO block.
pub struct BoardEdges;

impl EdgeControl for BoardEdges {
    fn disable(&self, pin: Pin) {
        with_input(pin, |input| input.unlisten());
    }

    fn enable(&self, pin: Pin) {
        with_input(pin, |input| {
            // drop any bounce latched while masked
            input.clear_interrupt();
            input.listen(Event::RisingEdge);
        });
    }
}

#[esp_hal::handler(priority = esp_hal::interrupt::Priority::Priority1)]
pub fn button_handler() {
    let mut fired = [false; Pin::ALL.len()];
    critical_section::with(|cs| {
        if let Some(pins) = BUTTONS.borrow_ref_mut(cs).as_mut() {
            for (i, pin) in Pin::ALL.into_iter().enumerate() {
                let input = pins.input(pin);
                if input.is_interrupt_set() {
                    input.clear_interrupt();
                    fired[i] = true;
                }
            }
        }
    });
    // outside the borrow: on_edge calls back into BoardEdges
    for (i, pin) in Pin::ALL.into_iter().enumerate() {
        if fired[i] {
            EVENTS.on_edge(pin, &BoardEdges);
        }
    }
}
