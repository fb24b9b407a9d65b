#![deny(unsafe_code)]
#![no_main]
#![no_std]

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::{with_timeout, Duration, Instant, Timer};
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{
    delay::Delay,
    gpio::{Input, Level, Output, Pull},
    rng::Rng,
    timer::timg::TimerGroup,
};
use esp_println as _;
use esp_wifi::{init, wifi::WifiStaDevice, EspWifiController};

use iss_relay::config;
use iss_relay::net::mqtt::{Broker, MqttSession, SocketBuffers};
use iss_relay::net::wifi::{net_task, WifiLink};
use iss_relay::poll::Link;
use iss_relay::publish::Session;
use iss_relay::ranger::{self, CONNECT_ATTEMPTS, CONNECT_BACKOFF, MAX_ECHO_US, PERIOD};

macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

/// One HC-SR04 ping. Returns the echo pulse width in microseconds, 0 if none.
async fn ping(trigger: &mut Output<'_>, echo: &mut Input<'_>, delay: &Delay) -> u64 {
    let timeout = Duration::from_micros(MAX_ECHO_US);

    trigger.set_low();
    delay.delay_micros(2);
    trigger.set_high();
    delay.delay_micros(10);
    trigger.set_low();

    if with_timeout(timeout, echo.wait_for_high()).await.is_err() {
        return 0;
    }
    let rise = Instant::now();
    if with_timeout(timeout, echo.wait_for_low()).await.is_err() {
        return 0;
    }
    rise.elapsed().as_micros()
}

async fn ensure_session(session: &mut MqttSession) -> bool {
    for attempt in 1..=CONNECT_ATTEMPTS {
        if session.is_connected() {
            return true;
        }
        match session.connect().await {
            Ok(()) => return true,
            Err(fault) => {
                warn!("broker attempt {}/{}: {}", attempt, CONNECT_ATTEMPTS, fault.as_str());
                if attempt < CONNECT_ATTEMPTS {
                    Timer::after(CONNECT_BACKOFF).await;
                }
            }
        }
    }
    false
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) -> ! {
    info!("Initializing");

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(72 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut rng = Rng::new(peripherals.RNG);
    let init = &*mk_static!(
        EspWifiController<'static>,
        init(timg0.timer0, rng, peripherals.RADIO_CLK).unwrap()
    );

    let timg1 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timg1.timer0);

    let (device, controller) =
        esp_wifi::wifi::new_with_mode(init, peripherals.WIFI, WifiStaDevice).unwrap();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, runner) = embassy_net::new(
        device,
        embassy_net::Config::dhcpv4(Default::default()),
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).ok();

    let mut link = WifiLink::new(controller, stack, config::WIFI_SSID, config::WIFI_PASSWORD);
    let mut session = MqttSession::new(
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

    let mut trigger = Output::new(peripherals.GPIO5, Level::Low);
    let mut echo = Input::new(peripherals.GPIO6, Pull::None);
    let delay = Delay::new();

    info!("Initializing complete");

    loop {
        Timer::after(PERIOD).await;

        if !link.is_up() {
            if let Err(fault) = link.associate().await {
                warn!("wifi: {:?}", fault);
                continue;
            }
        }
        if !ensure_session(&mut session).await {
            continue;
        }
        if let Err(fault) = session.pump().await {
            warn!("broker: {}", fault.as_str());
            continue;
        }

        let distance = ranger::echo_to_cm(ping(&mut trigger, &mut echo, &delay).await);
        match distance {
            Some(cm) => info!("distance {} cm", cm),
            None => info!("no echo"),
        }
        if let Err(fault) = ranger::report(&mut session, distance).await {
            warn!("publish failed: {}", fault.as_str());
        }
    }
}
