// Wi-Fi station bring-up and the HTTP page source
//
// ┌────────────────────────────────────────────────────────────┐
// │  Build with INKLEAF_SSID, INKLEAF_PASSWORD and INKLEAF_URL │
// │  set in the environment.                                   │
// └────────────────────────────────────────────────────────────┘
//
// `join` brings the radio up, connects and waits for a DHCP lease; the
// embassy-net runner lives in its own task for the life of the boot.
// `HttpPageSource` opens one TCP connection per page and hands it to
// the kernel's range client.

use alloc::string::String;
use core::net::Ipv4Addr;

use embassy_executor::Spawner;
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack, StackResources};
use embassy_time::{Duration, WithTimeout};
use esp_radio::wifi::{ClientConfig, Config, ModeConfig, WifiController, WifiError};
use inkleaf_kernel::net::http;
use inkleaf_kernel::{FetchError, PageSource};
use log::{info, warn};
use static_cell::StaticCell;

use crate::tasks;

// ── Build-time configuration ────────────────────────────────────────

pub const SSID: &str = env!("INKLEAF_SSID", "Set INKLEAF_SSID before building.");
pub const PASSWORD: &str = env!("INKLEAF_PASSWORD", "Set INKLEAF_PASSWORD before building.");
/// Page file, fetched by byte range. Plain `http://` only.
pub const RESOURCE_URL: &str = env!("INKLEAF_URL", "Set INKLEAF_URL before building.");

const DHCP_TIMEOUT_SECS: u64 = 15;
/// Whole-fetch bound: connect, request and body.
const FETCH_TIMEOUT_SECS: u64 = 5;

const RX_BUF: usize = 4096;
const TX_BUF: usize = 512;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();

#[derive(Debug)]
pub enum JoinError {
    Radio(esp_radio::InitializationError),
    Wifi(WifiError),
    DhcpTimeout,
}

impl From<WifiError> for JoinError {
    fn from(e: WifiError) -> Self {
        JoinError::Wifi(e)
    }
}

/// A connected station.
pub struct Network {
    pub stack: Stack<'static>,
    pub controller: WifiController<'static>,
}

/// Bring the radio up and wait for an address. Spawns the network runner.
pub async fn join(
    wifi: esp_hal::peripherals::WIFI<'static>,
    spawner: &Spawner,
) -> Result<Network, JoinError> {
    let radio = RADIO.init(esp_radio::init().map_err(JoinError::Radio)?);
    let (mut controller, interfaces) = esp_radio::wifi::new(radio, wifi, Config::default())?;

    let client_cfg = ClientConfig::default()
        .with_ssid(String::from(SSID))
        .with_password(String::from(PASSWORD));
    controller.set_config(&ModeConfig::Client(client_cfg))?;
    controller.start_async().await?;
    info!("net: wifi started, connecting to '{}'", SSID);
    controller.connect_async().await?;
    info!("net: connected to '{}'", SSID);

    let net_config = embassy_net::Config::dhcpv4(Default::default());
    let seed = {
        let rng = esp_hal::rng::Rng::new();
        (rng.random() as u64) << 32 | rng.random() as u64
    };
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        net_config,
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(tasks::net_task(runner)).ok();

    stack
        .wait_config_up()
        .with_timeout(Duration::from_secs(DHCP_TIMEOUT_SECS))
        .await
        .map_err(|_| JoinError::DhcpTimeout)?;
    if let Some(cfg) = stack.config_v4() {
        info!("net: address {}", cfg.address.address());
    }

    Ok(Network { stack, controller })
}

// ── Page source ─────────────────────────────────────────────────────

pub struct HttpPageSource {
    stack: Stack<'static>,
    rx: [u8; RX_BUF],
    tx: [u8; TX_BUF],
}

impl HttpPageSource {
    pub fn new(stack: Stack<'static>) -> Self {
        Self {
            stack,
            rx: [0; RX_BUF],
            tx: [0; TX_BUF],
        }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddress, FetchError> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(IpAddress::Ipv4(ip));
        }
        let addrs = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                warn!("net: dns lookup of {} failed: {:?}", host, e);
                FetchError::Connect
            })?;
        addrs.first().copied().ok_or(FetchError::Connect)
    }

    async fn fetch_once(
        &mut self,
        url: &http::Url<'_>,
        offset: u64,
        dest: &mut [u8],
    ) -> Result<(), FetchError> {
        let addr = self.resolve(url.host).await?;

        let mut socket = TcpSocket::new(self.stack, &mut self.rx, &mut self.tx);
        socket.set_timeout(Some(Duration::from_secs(FETCH_TIMEOUT_SECS)));
        if let Err(e) = socket.connect((addr, url.port)).await {
            warn!("net: connect to {}:{} failed: {:?}", url.host, url.port, e);
            return Err(FetchError::Connect);
        }

        let result = http::fetch_range(&mut socket, url, offset, dest).await;
        socket.close();
        socket.abort();
        result
    }
}

impl PageSource for HttpPageSource {
    async fn fetch_range(
        &mut self,
        resource: &str,
        offset: u64,
        dest: &mut [u8],
    ) -> Result<(), FetchError> {
        let url = http::parse_url(resource)?;
        self.fetch_once(&url, offset, dest)
            .with_timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .await
            .map_err(|_| FetchError::Io)?
    }
}
