use embassy_net::{Runner, Stack};
use embassy_time::{with_timeout, Duration};
use esp_wifi::wifi::{
    wifi_state, ClientConfiguration, Configuration, WifiController, WifiDevice, WifiStaDevice,
    WifiState,
};

use crate::fmt::{debug, info, warn};
use crate::poll::{Link, LinkFault};

/// How long one association attempt may wait on the access point.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long DHCP may take once associated.
const DHCP_TIMEOUT: Duration = Duration::from_secs(10);

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static, WifiStaDevice>>) {
    runner.run().await
}

/// Station-mode association plus the IP stack riding on it.
pub struct WifiLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
    ssid: &'static str,
    password: &'static str,
}

impl WifiLink {
    pub fn new(
        controller: WifiController<'static>,
        stack: Stack<'static>,
        ssid: &'static str,
        password: &'static str,
    ) -> Self {
        Self {
            controller,
            stack,
            ssid,
            password,
        }
    }

    pub fn stack(&self) -> Stack<'static> {
        self.stack
    }

    async fn start(&mut self) -> Result<(), LinkFault> {
        if matches!(self.controller.is_started(), Ok(true)) {
            return Ok(());
        }

        let config = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.try_into().map_err(|_| LinkFault::Rejected)?,
            password: self.password.try_into().map_err(|_| LinkFault::Rejected)?,
            ..Default::default()
        });
        self.controller.set_configuration(&config).map_err(|e| {
            warn!("wifi configuration refused: {:?}", e);
            LinkFault::Rejected
        })?;

        info!("starting wifi");
        self.controller.start_async().await.map_err(|e| {
            warn!("wifi start failed: {:?}", e);
            LinkFault::Rejected
        })
    }
}

impl Link for WifiLink {
    fn is_up(&self) -> bool {
        matches!(wifi_state(), WifiState::StaConnected) && self.stack.is_config_up()
    }

    async fn associate(&mut self) -> Result<(), LinkFault> {
        self.start().await?;

        if !matches!(wifi_state(), WifiState::StaConnected) {
            debug!("connecting to '{}'", self.ssid);
            match with_timeout(CONNECT_TIMEOUT, self.controller.connect_async()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("wifi connect: {:?}", e);
                    return Err(LinkFault::Rejected);
                }
                Err(_) => return Err(LinkFault::Timeout),
            }
        }

        with_timeout(DHCP_TIMEOUT, self.stack.wait_config_up())
            .await
            .map_err(|_| LinkFault::Timeout)?;

        if let Some(config) = self.stack.config_v4() {
            info!("got address {}", config.address);
        }
        Ok(())
    }
}
