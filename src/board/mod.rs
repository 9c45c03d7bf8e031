//! Board support for the inkleaf reader (ESP32-C3 + 7.5" UC8179 panel)
//!
//! Maps physical hardware to named subsystems so the control core never
//! sees a GPIO number. The panel sits alone on SPI2 in async mode; the
//! three buttons are plain GPIO inputs with edge interrupts.

pub mod buttons;
pub mod pins;

pub use buttons::{BoardEdges, ButtonPins, EVENTS};

use embassy_time::Delay;
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use esp_hal::{
    Async,
    gpio::{Input, InputConfig, Io, Level, Output, OutputConfig, Pull},
    peripherals::{GPIO3, LPWR, Peripherals, TIMG0, SW_INTERRUPT, WIFI},
    spi,
    time::Rate,
};
use inkleaf_kernel::PanelConfig;
use inkleaf_kernel::drivers::{PanelDriver, SpiTransport};
use log::info;

pub const SPI_FREQ_MHZ: u32 = 20;

// Type Aliases
pub type SpiBus = spi::master::Spi<'static, Async>;
pub type SpiDevice = ExclusiveDevice<SpiBus, Output<'static>, NoDelay>;
pub type PanelTransport = SpiTransport<SpiDevice, Output<'static>, Output<'static>, Input<'static>>;
pub type Panel = PanelDriver<PanelTransport, Delay>;

/// Peripherals the board hands on untouched.
pub struct SystemHw {
    pub timg0: TIMG0<'static>,
    pub sw_interrupt: SW_INTERRUPT<'static>,
    pub wifi: WIFI<'static>,
    pub lpwr: LPWR<'static>,
    /// Second handle on the sleep button pad for the RTC wake source.
    pub wake_pin: GPIO3<'static>,
}

/// Complete board hardware, ready for driver initialization.
pub struct Board {
    pub panel: Panel,
    pub system: SystemHw,
}

impl Board {
    /// Configure the panel bus and hand the buttons to the GPIO handler.
    pub fn init(p: Peripherals, panel_config: PanelConfig) -> Result<Self, spi::master::ConfigError> {
        let wake_pin = unsafe { p.GPIO3.clone_unchecked() };

        let mut io = Io::new(p.IO_MUX);
        io.set_interrupt_handler(buttons::button_handler);

        let button_cfg = InputConfig::default().with_pull(Pull::Down);
        buttons::install(ButtonPins {
            next: Input::new(p.GPIO1, button_cfg),
            prev: Input::new(p.GPIO2, button_cfg),
            sleep: Input::new(p.GPIO3, button_cfg),
        });

        // GPIO setup
        let cs = Output::new(p.GPIO21, Level::High, OutputConfig::default());
        let dc = Output::new(p.GPIO4, Level::High, OutputConfig::default());
        let rst = Output::new(p.GPIO5, Level::High, OutputConfig::default());
        let busy = Input::new(p.GPIO6, InputConfig::default().with_pull(Pull::None));

        // SPI bus
        let spi_cfg = spi::master::Config::default().with_frequency(Rate::from_mhz(SPI_FREQ_MHZ));
        let spi_bus = spi::master::Spi::new(p.SPI2, spi_cfg)?
            .with_sck(p.GPIO8)
            .with_mosi(p.GPIO10)
            .into_async();

        // chip select cannot fail on esp-hal outputs
        let Ok(spi_dev) = ExclusiveDevice::new_no_delay(spi_bus, cs);

        info!(
            "board: panel on SPI2 (sck {}, mosi {}, cs {}, dc {}, rst {}, busy {})",
            pins::SPI_SCK,
            pins::SPI_MOSI,
            pins::EPD_CS,
            pins::EPD_DC,
            pins::EPD_RST,
            pins::EPD_BUSY
        );
        info!(
            "board: buttons next {}, prev {}, sleep {}",
            pins::BTN_NEXT,
            pins::BTN_PREV,
            pins::BTN_SLEEP
        );

        let transport = SpiTransport::new(spi_dev, dc, rst, busy);
        let panel = PanelDriver::new(transport, Delay, panel_config);

        Ok(Board {
            panel,
            system: SystemHw {
                timg0: p.TIMG0,
                sw_interrupt: p.SW_INTERRUPT,
                wifi: p.WIFI,
                lpwr: p.LPWR,
                wake_pin,
            },
        })
    }
}
