#![deny(unsafe_code)]
#![no_main]
#![no_std]

use defmt::{info, trace};
use embassy_executor::Spawner;
use embassy_net::{dns::DnsSocket, StackResources};
use embassy_time::{Instant, Timer};
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{clock::CpuClock, rng::Rng, timer::timg::TimerGroup};
use esp_println as _;
use esp_wifi::{esp_now::enable_esp_now_with_wifi, init, wifi::WifiStaDevice, EspWifiController};

use iss_relay::config::{self, Settings};
use iss_relay::driver::Driver;
use iss_relay::net::espnow;
use iss_relay::net::http::{HttpTcp, ReqwlessHttp, TcpState};
use iss_relay::net::mqtt::{Broker, MqttSession, SocketBuffers};
use iss_relay::net::wifi::{net_task, WifiLink};
use iss_relay::relay::Relay;

macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

/// Yield between loop iterations.
const TICK_MS: u64 = 10;

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) -> ! {
    info!("Initializing");

    let peripherals = esp_hal::init({
        let mut config = esp_hal::Config::default();
        config.cpu_clock = CpuClock::max();
        config
    });

    esp_alloc::heap_allocator!(72 * 1024);

    let settings = Settings::from_env();

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut rng = Rng::new(peripherals.RNG);
    let init = &*mk_static!(
        EspWifiController<'static>,
        init(timg0.timer0, rng, peripherals.RADIO_CLK).unwrap()
    );

    let timg1 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timg1.timer0);

    // Station and ESP-NOW share the one radio
    let (wifi, esp_now_token) = enable_esp_now_with_wifi(peripherals.WIFI);
    let (device, controller) = esp_wifi::wifi::new_with_mode(init, wifi, WifiStaDevice).unwrap();

    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, runner) = embassy_net::new(
        device,
        embassy_net::Config::dhcpv4(Default::default()),
        mk_static!(StackResources<4>, StackResources::<4>::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).ok();

    let link = WifiLink::new(controller, stack, config::WIFI_SSID, config::WIFI_PASSWORD);

    let tcp = &*mk_static!(HttpTcp, ReqwlessHttp::tcp(stack, mk_static!(TcpState, TcpState::new())));
    let dns = &*mk_static!(DnsSocket<'static>, DnsSocket::new(stack));
    let http = ReqwlessHttp::new(tcp, dns);

    let session = MqttSession::new(
        stack,
        mk_static!(SocketBuffers, SocketBuffers::new()),
        Broker {
            host: config::BROKER_HOST,
            port: config::broker_port(),
            client_id: config::CLIENT_ID,
            user: config::BROKER_USER,
            password: config::BROKER_PASSWORD,
        },
    );

    // A radio that fails here stays off; the broker path carries on without it
    let relay = Relay::new(
        espnow::start(&spawner, init, esp_now_token, settings.peer),
        settings.peer,
    );

    let mut driver = Driver::new(settings, link, http, session, relay);

    info!("Initializing complete");

    loop {
        let report = driver.step(Instant::now()).await;
        trace!("{:?}", report);
        Timer::after_millis(TICK_MS).await;
    }
}
