use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, with_timeout};
use log::{debug, warn};
use torpor_core::error::NetworkTimeError;
use torpor_core::hal::NetworkTime;
use torpor_core::time::{DateTime, sntp};

use crate::radio::SharedRadio;

/// SNTP over the station link. Joins the network for the fetch and leaves
/// again afterwards, whatever the outcome.
pub struct SntpClient {
    radio: &'static SharedRadio,
    server: &'static str,
}

impl SntpClient {
    pub fn new(radio: &'static SharedRadio, server: &'static str) -> Self {
        Self { radio, server }
    }
}

impl NetworkTime for SntpClient {
    async fn fetch(&mut self, timeout_ms: u32) -> Result<DateTime, NetworkTimeError> {
        let mut radio = self.radio.lock().await;

        let result = async {
            let stack = radio.join().await.map_err(|e| {
                warn!("{}", e);
                NetworkTimeError::Link
            })?;
            query(stack, self.server).await
        };
        let result = match with_timeout(Duration::from_millis(timeout_ms.into()), result).await {
            Ok(result) => result,
            Err(_) => Err(NetworkTimeError::Timeout { timeout_ms }),
        };

        radio.leave().await;
        result
    }
}

async fn query(stack: Stack<'static>, server: &str) -> Result<DateTime, NetworkTimeError> {
    let addresses = stack
        .dns_query(server, DnsQueryType::A)
        .await
        .map_err(|_| NetworkTimeError::Dns)?;
    let address = addresses.first().copied().ok_or(NetworkTimeError::Dns)?;
    debug!("{} resolved to {}", server, address);

    let mut rx_meta = [PacketMetadata::EMPTY; 1];
    let mut tx_meta = [PacketMetadata::EMPTY; 1];
    let mut rx_buffer = [0u8; 128];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(0).map_err(|_| NetworkTimeError::Link)?;

    socket
        .send_to(&sntp::request(), IpEndpoint::new(address, sntp::NTP_PORT))
        .await
        .map_err(|_| NetworkTimeError::Link)?;

    let mut reply = [0u8; sntp::PACKET_LEN];
    let (len, _) = socket
        .recv_from(&mut reply)
        .await
        .map_err(|_| NetworkTimeError::BadResponse("receive failed"))?;
    sntp::parse_response(&reply[..len])
}
