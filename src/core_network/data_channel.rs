use crate::core_error::{FtpError, FtpResult};
use log::{debug, warn};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// One negotiated, not yet used, data connection.
///
/// Bound to a single transfer: `establish` consumes it.
#[derive(Debug)]
pub enum DataEndpoint {
    /// We listen and the peer connects to us.
    Listening {
        listener: TcpListener,
        expected_peer: Option<IpAddr>,
    },
    /// We connect to the peer.
    Connect(SocketAddr),
    /// Already connected.
    Connected(TcpStream),
}

impl DataEndpoint {
    pub fn describe(&self) -> String {
        match self {
            DataEndpoint::Listening { listener, .. } => match listener.local_addr() {
                Ok(addr) => format!("listening on {}", addr),
                Err(_) => "listening".to_string(),
            },
            DataEndpoint::Connect(addr) => format!("connect to {}", addr),
            DataEndpoint::Connected(_) => "connected".to_string(),
        }
    }

    /// Turns the endpoint into a connected stream, waiting at most `timeout`
    /// for the peer. Dropping the future releases the socket.
    pub async fn establish(self, timeout: Duration) -> FtpResult<TcpStream> {
        match self {
            DataEndpoint::Connected(stream) => Ok(stream),
            DataEndpoint::Connect(addr) => {
                debug!("Opening data connection to {}", addr);
                match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(stream)) => Ok(stream),
                    Ok(Err(e)) => Err(FtpError::DataChannelSetupFailed(format!(
                        "connect to {} failed: {}",
                        addr, e
                    ))),
                    Err(_) => Err(FtpError::DataChannelTimeout),
                }
            }
            DataEndpoint::Listening {
                listener,
                expected_peer,
            } => tokio::time::timeout(timeout, accept_from(&listener, expected_peer))
                .await
                .map_err(|_| FtpError::DataChannelTimeout)?,
        }
    }
}

async fn accept_from(listener: &TcpListener, expected_peer: Option<IpAddr>) -> FtpResult<TcpStream> {
    loop {
        let (stream, addr) = listener.accept().await.map_err(|e| {
            FtpError::DataChannelSetupFailed(format!("accept failed: {}", e))
        })?;
        match expected_peer {
            Some(ip) if !same_host(ip, addr.ip()) => {
                warn!("Dropping data connection from unexpected peer {}", addr);
            }
            _ => {
                debug!("Accepted data connection from {}", addr);
                return Ok(stream);
            }
        }
    }
}

fn same_host(a: IpAddr, b: IpAddr) -> bool {
    let canonical = |ip: IpAddr| match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    };
    canonical(a) == canonical(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_listening_endpoint_accepts_single_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let endpoint = DataEndpoint::Listening {
            listener,
            expected_peer: Some("127.0.0.1".parse().unwrap()),
        };

        let client = tokio::spawn(async move {
            let mut s = TcpStream::connect(addr).await.unwrap();
            s.write_all(b"ping").await.unwrap();
        });

        let mut stream = endpoint.establish(Duration::from_secs(5)).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"ping");
        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_listening_endpoint_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = DataEndpoint::Listening {
            listener,
            expected_peer: None,
        };
        assert!(matches!(
            endpoint.establish(Duration::from_millis(50)).await,
            Err(FtpError::DataChannelTimeout)
        ));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails_setup() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let result = DataEndpoint::Connect(addr)
            .establish(Duration::from_secs(5))
            .await;
        assert!(matches!(
            result,
            Err(FtpError::DataChannelSetupFailed(_)) | Err(FtpError::DataChannelTimeout)
        ));
    }

    #[test]
    fn test_mapped_addresses_are_same_host() {
        let v4: IpAddr = "127.0.0.1".parse().unwrap();
        let mapped: IpAddr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(same_host(v4, mapped));
        assert!(!same_host(v4, "10.0.0.1".parse().unwrap()));
    }
}
