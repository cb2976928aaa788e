use crate::core_error::{FtpError, FtpResult};
use crate::core_network::data_channel::DataEndpoint;
use crate::core_reply::Reply;
use crate::session::Session;
use log::{debug, info};
use rand::Rng;
use regex::Regex;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::OnceLock;
use tokio::net::TcpListener;

fn pasv_port_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})")
            .expect("PASV regex is valid")
    })
}

fn epsv_port_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\|\|\|(\d{1,5})\|").expect("EPSV regex is valid"))
}

/// Builds the `227` reply advertising `ip:port`.
pub fn format_pasv_reply(ip: Ipv4Addr, port: u16) -> Reply {
    let [a, b, c, d] = ip.octets();
    Reply::new(
        227,
        format!(
            "Entering Passive Mode ({},{},{},{},{},{}).",
            a,
            b,
            c,
            d,
            port >> 8,
            port & 0xff
        ),
    )
}

pub fn format_epsv_reply(port: u16) -> Reply {
    Reply::new(229, format!("Entering Extended Passive Mode (|||{}|)", port))
}

/// Extracts the data address from a `227` reply.
pub fn parse_pasv_reply(reply: &Reply) -> FtpResult<SocketAddrV4> {
    let text = reply.message();
    let caps = pasv_port_re().captures(&text).ok_or_else(|| {
        FtpError::DataChannelSetupFailed(format!("no address in PASV reply: {}", reply))
    })?;

    let mut numbers = [0u8; 6];
    for (i, slot) in numbers.iter_mut().enumerate() {
        *slot = caps[i + 1].parse().map_err(|_| {
            FtpError::DataChannelSetupFailed(format!("bad number in PASV reply: {}", reply))
        })?;
    }

    let ip = Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]);
    let port = (u16::from(numbers[4]) << 8) | u16::from(numbers[5]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Extracts the port from a `229` reply.
pub fn parse_epsv_reply(reply: &Reply) -> FtpResult<u16> {
    let text = reply.message();
    epsv_port_re()
        .captures(&text)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| {
            FtpError::DataChannelSetupFailed(format!("no port in EPSV reply: {}", reply))
        })
}

/// Binds the passive listener on `ip`, on an ephemeral port or the first free
/// port of `port_range` starting from a random offset.
pub async fn setup_pasv_listener(
    ip: IpAddr,
    port_range: Option<(u16, u16)>,
) -> io::Result<TcpListener> {
    let (low, high) = match port_range {
        None => return TcpListener::bind((ip, 0)).await,
        Some(range) => range,
    };

    let span = u32::from(high - low) + 1;
    let offset = rand::thread_rng().gen_range(0..span);
    let mut last_err = io::Error::new(io::ErrorKind::AddrInUse, "passive port range exhausted");
    for step in 0..span {
        let port = low + ((offset + step) % span) as u16;
        match TcpListener::bind((ip, port)).await {
            Ok(listener) => {
                debug!("PASV listener set up on {}:{}", ip, port);
                return Ok(listener);
            }
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

impl Session {
    async fn open_passive_listener(&mut self) -> FtpResult<u16> {
        // Any endpoint left over from an earlier PASV/PORT is discarded.
        self.data_endpoint = None;

        let listener = setup_pasv_listener(self.local_addr.ip(), self.settings.pasv_port_range)
            .await
            .map_err(|e| FtpError::DataChannelSetupFailed(format!("passive bind failed: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| FtpError::DataChannelSetupFailed(e.to_string()))?
            .port();

        self.data_endpoint = Some(DataEndpoint::Listening {
            listener,
            expected_peer: Some(self.peer_addr.ip()),
        });
        Ok(port)
    }

    /// Handles the PASV (Passive Mode) FTP command.
    pub(crate) async fn handle_pasv_command(&mut self) -> FtpResult<()> {
        let advertised = match self.settings.pasv_address.unwrap_or(self.local_addr.ip()) {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => v6.to_ipv4_mapped().ok_or_else(|| {
                FtpError::DataChannelSetupFailed("PASV needs an IPv4 address, use EPSV".into())
            })?,
        };

        let port = self.open_passive_listener().await?;
        info!("[{}] Entering passive mode on port {}", self.peer_addr, port);
        self.send(&format_pasv_reply(advertised, port)).await
    }

    /// Handles the EPSV (Extended Passive Mode) FTP command.
    pub(crate) async fn handle_epsv_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        if let Some(arg) = arg.as_deref() {
            if arg.eq_ignore_ascii_case("ALL") {
                return self.reply(200, "EPSV ALL command successful.").await;
            }
        }

        let port = self.open_passive_listener().await?;
        info!("[{}] Entering extended passive mode on port {}", self.peer_addr, port);
        self.send(&format_epsv_reply(port)).await
    }
}
