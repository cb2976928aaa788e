use crate::core_error::{FtpError, FtpResult};
use crate::core_network::data_channel::DataEndpoint;
use crate::session::Session;
use log::{info, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

/// Parses a PORT argument `h1,h2,h3,h4,p1,p2`.
pub fn parse_port_argument(arg: &str) -> FtpResult<SocketAddr> {
    let parts: Vec<&str> = arg.trim().split(',').collect();
    if parts.len() != 6 {
        return Err(FtpError::InvalidArgument(format!("PORT argument {:?}", arg)));
    }

    let mut numbers = [0u8; 6];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| FtpError::InvalidArgument(format!("PORT argument {:?}", arg)))?;
    }

    let ip = Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]);
    let port = (u16::from(numbers[4]) << 8) | u16::from(numbers[5]);
    Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

/// Parses an EPRT argument `<d>proto<d>addr<d>port<d>`.
pub fn parse_eprt_argument(arg: &str) -> FtpResult<SocketAddr> {
    let invalid = || FtpError::InvalidArgument(format!("EPRT argument {:?}", arg));
    let delimiter = arg.chars().next().ok_or_else(invalid)?;
    let fields: Vec<&str> = arg.split(delimiter).collect();
    // Leading and trailing delimiters produce empty first/last fields.
    if fields.len() != 5 || !fields[0].is_empty() || !fields[4].is_empty() {
        return Err(invalid());
    }

    let ip: IpAddr = fields[2].parse().map_err(|_| invalid())?;
    match (fields[1], ip) {
        ("1", IpAddr::V4(_)) | ("2", IpAddr::V6(_)) => {}
        _ => return Err(invalid()),
    }
    let port: u16 = fields[3].parse().map_err(|_| invalid())?;
    Ok(SocketAddr::new(ip, port))
}

pub fn format_port_argument(addr: SocketAddrV4) -> String {
    let [a, b, c, d] = addr.ip().octets();
    format!("{},{},{},{},{},{}", a, b, c, d, addr.port() >> 8, addr.port() & 0xff)
}

pub fn format_eprt_argument(addr: SocketAddr) -> String {
    let proto = match addr {
        SocketAddr::V4(_) => 1,
        SocketAddr::V6(_) => 2,
    };
    format!("|{}|{}|{}|", proto, addr.ip(), addr.port())
}

impl Session {
    fn set_active_target(&mut self, addr: SocketAddr) -> FtpResult<()> {
        // Only the control peer may receive data, which rules out bounce attacks.
        let peer = self.peer_addr.ip();
        let same = match (peer, addr.ip()) {
            (IpAddr::V6(v6), IpAddr::V4(v4)) => v6.to_ipv4_mapped() == Some(v4),
            (p, a) => p == a,
        };
        if !same || addr.port() == 0 {
            warn!("[{}] Refused active data target {}", self.peer_addr, addr);
            return Err(FtpError::InvalidArgument(format!(
                "data address {} does not match control peer",
                addr
            )));
        }

        info!("[{}] Active mode data target {}", self.peer_addr, addr);
        self.data_endpoint = Some(DataEndpoint::Connect(addr));
        Ok(())
    }

    /// Handles the PORT (Active Mode) FTP command.
    pub(crate) async fn handle_port_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        self.data_endpoint = None;
        let arg = arg.ok_or_else(|| FtpError::InvalidArgument("PORT needs an address".into()))?;
        let addr = parse_port_argument(&arg)?;
        self.set_active_target(addr)?;
        self.reply(200, "PORT command successful.").await
    }

    /// Handles the EPRT (Extended Port) FTP command.
    pub(crate) async fn handle_eprt_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        self.data_endpoint = None;
        let arg = arg.ok_or_else(|| FtpError::InvalidArgument("EPRT needs an address".into()))?;
        let addr = parse_eprt_argument(&arg)?;
        self.set_active_target(addr)?;
        self.reply(200, "EPRT command successful.").await
    }
}
