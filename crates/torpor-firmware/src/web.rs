//! Operator page served while the interactive window is open
//!
//! The device joins the configured network and answers plain HTTP on port 80:
//!
//! | Route                                | Response                               |
//! |--------------------------------------|----------------------------------------|
//! | `GET /`                              | Last reading, log history, time form   |
//! | `GET /download`                      | `DATALOG.CSV` streamed from the card   |
//! | `GET /set_time?Y=..&M=..&D=..&h=..&m=..` | Queues the time for the lifecycle  |
//!
//! Every request counts as activity; the window reports idle once none
//! arrived for the configured timeout. Without `TORPOR_WIFI_SSID` at build
//! time the station never joins and the page is unreachable.

use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embassy_time::{Duration, Instant, with_timeout};
use log::{debug, error, info, warn};
use torpor_core::error::InteractionError;
use torpor_core::hal::{Interaction, Reading, ReadingStore};
use torpor_core::page::{self, DOWNLOAD_PATH, SET_TIME_PATH};
use torpor_core::time::manual::parse_set_time_query;
use torpor_core::time::{DateTime, TimestampText};

use crate::radio::{LinkError, SharedRadio};

const HTTP_PORT: u16 = 80;
const JOIN_TIMEOUT: Duration = Duration::from_secs(15);
/// How long one `service` call listens for a connection
const ACCEPT_WINDOW: Duration = Duration::from_millis(250);
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);
/// One SD card read per chunk
const DOWNLOAD_CHUNK: usize = 512;

const HTML: &str = "text/html";
const TEXT: &str = "text/plain";

enum Route {
    Home,
    Download,
    SetTime(Option<DateTime>),
    NotFound,
}

pub struct WebConsole {
    radio: &'static SharedRadio,
    idle_timeout: Duration,
    active: bool,
    last_activity: Instant,
    pending: Option<DateTime>,
    reading: Reading,
    measured_at: TimestampText,
}

impl WebConsole {
    pub fn new(radio: &'static SharedRadio, idle_timeout_ms: u64) -> Self {
        Self {
            radio,
            idle_timeout: Duration::from_millis(idle_timeout_ms),
            active: false,
            last_activity: Instant::now(),
            pending: None,
            reading: Reading::UNSET,
            measured_at: TimestampText::new(),
        }
    }

    async fn handle<S: ReadingStore>(&mut self, socket: &mut TcpSocket<'_>, store: &mut S) {
        let mut request = [0u8; 512];
        let mut filled = 0;
        while filled < request.len() {
            match socket.read(&mut request[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    debug!("HTTP read failed: {:?}", e);
                    return;
                }
            }
            if request[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }

        let sent = match route(&request[..filled]) {
            Route::Home => {
                let home = page::render_home(&self.reading, &self.measured_at);
                respond(socket, "200 OK", HTML, home.as_bytes()).await
            }
            Route::Download => send_log(socket, store).await,
            Route::SetTime(Some(value)) => {
                info!("Operator set time to {}", value);
                self.pending = Some(value);
                respond(
                    socket,
                    "200 OK",
                    HTML,
                    b"<h1>Time updated</h1><a href=\"/\">Back</a>",
                )
                .await
            }
            Route::SetTime(None) => {
                respond(socket, "400 Bad Request", TEXT, b"Missing or invalid parameters").await
            }
            Route::NotFound => respond(socket, "404 Not Found", TEXT, b"404 Not Found").await,
        };
        if let Err(e) = sent {
            debug!("HTTP write failed: {:?}", e);
            return;
        }
        let _ = socket.flush().await;
    }
}

impl Interaction for WebConsole {
    async fn activate(&mut self, reading: &Reading, measured_at: &str) -> Result<(), InteractionError> {
        self.reading = *reading;
        self.measured_at.clear();
        let _ = self.measured_at.push_str(measured_at);

        let mut radio = self.radio.lock().await;
        let joined = match with_timeout(JOIN_TIMEOUT, radio.join()).await {
            Ok(Err(LinkError::NoCredentials)) => {
                error!("Operator page unavailable: build with TORPOR_WIFI_SSID set");
                Err(InteractionError::Radio(LinkError::NoCredentials.label()))
            }
            Ok(joined) => joined.map_err(|e| InteractionError::Radio(e.label())),
            Err(_) => Err(InteractionError::Radio("join timed out")),
        };

        match joined {
            Ok(stack) => {
                if let Some(config) = stack.config_v4() {
                    info!("Operator page at http://{}/", config.address.address());
                }
                self.active = true;
                self.last_activity = Instant::now();
                Ok(())
            }
            Err(e) => {
                radio.leave().await;
                Err(e)
            }
        }
    }

    async fn service<S: ReadingStore>(&mut self, store: &mut S) {
        if !self.active {
            return;
        }
        let Some(stack) = self.radio.lock().await.stack() else {
            return;
        };

        let mut rx_buffer = [0u8; 1024];
        let mut tx_buffer = [0u8; 1024];
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        match with_timeout(ACCEPT_WINDOW, socket.accept(HTTP_PORT)).await {
            Ok(Ok(())) => {
                self.last_activity = Instant::now();
                self.handle(&mut socket, store).await;
                socket.close();
                let _ = socket.flush().await;
            }
            Ok(Err(e)) => warn!("HTTP accept failed: {:?}", e),
            Err(_) => {}
        }
    }

    fn take_time_request(&mut self) -> Option<DateTime> {
        self.pending.take()
    }

    fn is_idle(&mut self) -> bool {
        !self.active || self.last_activity.elapsed() >= self.idle_timeout
    }

    async fn deactivate(&mut self) {
        self.active = false;
        self.radio.lock().await.leave().await;
    }
}

fn route(request: &[u8]) -> Route {
    let Ok(text) = core::str::from_utf8(request) else {
        return Route::NotFound;
    };
    let mut parts = text.split(' ');
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        return Route::NotFound;
    };

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    match path {
        "/" => Route::Home,
        DOWNLOAD_PATH => Route::Download,
        SET_TIME_PATH => Route::SetTime(parse_set_time_query(query).ok()),
        _ => Route::NotFound,
    }
}

async fn respond(
    socket: &mut TcpSocket<'_>,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> Result<(), TcpError> {
    let mut head: heapless::String<160> = heapless::String::new();
    let _ = core::fmt::write(
        &mut head,
        format_args!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            content_type,
            body.len()
        ),
    );
    write_all(socket, head.as_bytes()).await?;
    write_all(socket, body).await
}

/// Stream the log without a length; the response ends when the socket closes.
async fn send_log<S: ReadingStore>(
    socket: &mut TcpSocket<'_>,
    store: &mut S,
) -> Result<(), TcpError> {
    let mut chunk = [0u8; DOWNLOAD_CHUNK];
    let mut n = match store.read_at(0, &mut chunk).await {
        Ok(0) => return respond(socket, "404 Not Found", TEXT, b"Log file not found.").await,
        Ok(n) => n,
        Err(e) => {
            warn!("Log download failed: {}", e);
            return respond(socket, "503 Service Unavailable", TEXT, b"Log store unavailable").await;
        }
    };

    write_all(
        socket,
        b"HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\n\
Content-Disposition: attachment; filename=\"DATALOG.CSV\"\r\nConnection: close\r\n\r\n",
    )
    .await?;

    let mut offset = 0u64;
    while n > 0 {
        write_all(socket, &chunk[..n]).await?;
        offset += n as u64;
        n = match store.read_at(offset, &mut chunk).await {
            Ok(n) => n,
            Err(e) => {
                // Headers are out; a short body is all that is left to signal it
                warn!("Log download cut short at {} bytes: {}", offset, e);
                0
            }
        };
    }
    debug!("Sent {} log bytes", offset);
    Ok(())
}

async fn write_all(socket: &mut TcpSocket<'_>, mut bytes: &[u8]) -> Result<(), TcpError> {
    while !bytes.is_empty() {
        let written = socket.write(bytes).await?;
        if written == 0 {
            return Err(TcpError::ConnectionReset);
        }
        bytes = &bytes[written..];
    }
    Ok(())
}
