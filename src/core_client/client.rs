use crate::constants::{
    DEFAULT_BUFFER_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DATA_TIMEOUT_SECS,
    DEFAULT_READ_TIMEOUT_SECS,
};
use crate::core_client::listing::{classify_by_size, parse_listing, RemoteEntry};
use crate::core_error::{FtpError, FtpResult};
use crate::core_network::pasv::{parse_epsv_reply, parse_pasv_reply};
use crate::core_network::port::{format_eprt_argument, format_port_argument};
use crate::core_network::DataEndpoint;
use crate::core_reply::{Command, Reply, ReplyReader};
use crate::core_transfer::TransferPump;
use log::{debug, info, trace, warn};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

/// How the client asks for data connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataMode {
    /// PASV, then EPSV if PASV is refused.
    #[default]
    Passive,
    /// PORT for IPv4, EPRT for IPv6.
    Active,
    /// Passive, falling back to active when the server refuses both.
    PassiveThenActive,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub data_timeout: Duration,
    pub buffer_size: usize,
    pub data_mode: DataMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            data_timeout: Duration::from_secs(DEFAULT_DATA_TIMEOUT_SECS),
            buffer_size: DEFAULT_BUFFER_SIZE,
            data_mode: DataMode::Passive,
        }
    }
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub bytes: u64,
    /// The final status reply, normally 226.
    pub reply: Reply,
}

struct ControlConnection {
    reader: ReplyReader<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

/// Client side of one control connection.
///
/// Commands are strictly paired with their replies, so a session has a
/// single owner and methods take `&mut self`. Once the connection is lost
/// every call fails with [`FtpError::NotConnected`].
pub struct ControlSession {
    conn: Option<ControlConnection>,
    config: ClientConfig,
    welcome: Option<Reply>,
    last_reply: Option<Reply>,
    authenticated: bool,
}

impl ControlSession {
    /// Opens the control connection and reads the server greeting.
    pub async fn connect(host: &str, port: u16, config: ClientConfig) -> FtpResult<Self> {
        let addr = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };

        info!("Connecting to {}", addr);
        let stream = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(FtpError::ConnectionRefused { addr, source }),
            Err(_) => return Err(FtpError::Timeout(format!("connection to {}", addr))),
        };
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (read_half, writer) = stream.into_split();

        let mut session = Self {
            conn: Some(ControlConnection {
                reader: ReplyReader::new(BufReader::new(read_half), config.read_timeout),
                writer,
                local_addr,
                peer_addr,
            }),
            config,
            welcome: None,
            last_reply: None,
            authenticated: false,
        };

        // 120 means "ready in a few minutes"; the real greeting follows.
        let mut greeting = session.read_reply().await?;
        while greeting.code == 120 {
            greeting = session.read_reply().await?;
        }
        if !greeting.is_success() {
            session.conn = None;
            return Err(FtpError::UnexpectedReply {
                command: "connect".to_string(),
                reply: greeting,
            });
        }

        debug!("Server greeting: {}", greeting);
        session.welcome = Some(greeting);
        Ok(session)
    }

    pub fn welcome(&self) -> Option<&Reply> {
        self.welcome.as_ref()
    }

    /// The most recent reply read from the server, whatever its code.
    pub fn last_reply(&self) -> Option<&Reply> {
        self.last_reply.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_data_mode(&mut self, mode: DataMode) {
        self.config.data_mode = mode;
    }

    /// Logs in and switches to binary transfers.
    pub async fn login(&mut self, user: &str, password: &str) -> FtpResult<()> {
        let reply = self.command("USER", Some(user)).await?;
        let reply = match reply.code {
            230 => reply,
            331 | 332 => self.command("PASS", Some(password)).await?,
            _ => return Err(FtpError::AuthenticationRejected(reply.to_string())),
        };
        if !matches!(reply.code, 230 | 202) {
            return Err(FtpError::AuthenticationRejected(reply.to_string()));
        }

        info!("Logged in as {}", user);
        self.authenticated = true;
        self.expect("TYPE", Some("I"), &[200]).await?;
        Ok(())
    }

    /// Lists `path` with NLST, classifying each name with a SIZE probe.
    ///
    /// Names that do not answer SIZE are reported as directories. This is a
    /// heuristic: see [`crate::core_client::listing`].
    pub async fn list(&mut self, path: Option<&str>) -> FtpResult<Vec<RemoteEntry>> {
        let names = self.nlst(path).await?;
        let mut entries = Vec::with_capacity(names.len());

        for name in names {
            let probe = match path {
                Some(dir) if !name.contains('/') => format!("{}/{}", dir.trim_end_matches('/'), name),
                _ => name.clone(),
            };
            let size = match self.size(&probe).await {
                Ok(size) => Some(size),
                Err(e) if is_connection_lost(&e) || matches!(e, FtpError::NotConnected) => {
                    return Err(e)
                }
                Err(e) => {
                    trace!("SIZE {} failed ({}), assuming directory", probe, e);
                    None
                }
            };
            entries.push(classify_by_size(name, size));
        }
        Ok(entries)
    }

    /// Names in `path`, as sent by NLST.
    pub async fn nlst(&mut self, path: Option<&str>) -> FtpResult<Vec<String>> {
        let (text, _) = self.fetch_text("NLST", path).await?;
        Ok(text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Entries in `path` classified from LIST output.
    pub async fn list_long(&mut self, path: Option<&str>) -> FtpResult<Vec<RemoteEntry>> {
        let (text, _) = self.fetch_text("LIST", path).await?;
        Ok(parse_listing(&text))
    }

    /// Uploads a local file as `remote_name`.
    pub async fn upload(&mut self, local_path: &Path, remote_name: &str) -> FtpResult<TransferReport> {
        let mut file = File::open(local_path).await.map_err(|source| FtpError::LocalFile {
            path: local_path.to_path_buf(),
            source,
        })?;
        self.store_from(&mut file, remote_name).await
    }

    /// Uploads everything `source` yields as `remote_name`.
    pub async fn store_from<R>(&mut self, source: &mut R, remote_name: &str) -> FtpResult<TransferReport>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut stream = self.begin_transfer("STOR", Some(remote_name)).await?;
        let outcome = self.pump().send(source, &mut stream).await;
        drop(stream);
        self.finish_transfer("STOR", outcome).await
    }

    /// Downloads `remote_name` into a local file, created once the server
    /// has accepted the request.
    pub async fn download(&mut self, remote_name: &str, local_path: &Path) -> FtpResult<TransferReport> {
        let mut stream = self.begin_transfer("RETR", Some(remote_name)).await?;

        let mut file = match File::create(local_path).await {
            Ok(file) => file,
            Err(source) => {
                drop(stream);
                // The server still sends a final reply; keep the channel in step.
                let _ = self.read_reply().await;
                return Err(FtpError::LocalFile {
                    path: local_path.to_path_buf(),
                    source,
                });
            }
        };

        let outcome = self.pump().receive(&mut stream, &mut file).await;
        drop(stream);
        if let Err(e) = file.shutdown().await {
            warn!("Closing {:?} failed: {}", local_path, e);
        }
        self.finish_transfer("RETR", outcome).await
    }

    /// Downloads `remote_name` into any writer.
    pub async fn retrieve_into<W>(&mut self, remote_name: &str, sink: &mut W) -> FtpResult<TransferReport>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut stream = self.begin_transfer("RETR", Some(remote_name)).await?;
        let outcome = self.pump().receive(&mut stream, sink).await;
        drop(stream);
        self.finish_transfer("RETR", outcome).await
    }

    pub async fn size(&mut self, path: &str) -> FtpResult<u64> {
        let reply = self.expect("SIZE", Some(path), &[213]).await?;
        reply
            .message()
            .trim()
            .parse()
            .map_err(|_| FtpError::MalformedReply(reply.to_string()))
    }

    pub async fn cwd(&mut self, path: &str) -> FtpResult<()> {
        self.expect("CWD", Some(path), &[200, 250]).await.map(|_| ())
    }

    pub async fn pwd(&mut self) -> FtpResult<String> {
        let reply = self.expect("PWD", None, &[257]).await?;
        parse_quoted_path(&reply.message()).ok_or_else(|| FtpError::MalformedReply(reply.to_string()))
    }

    pub async fn mkdir(&mut self, path: &str) -> FtpResult<()> {
        self.expect("MKD", Some(path), &[257]).await.map(|_| ())
    }

    pub async fn rmdir(&mut self, path: &str) -> FtpResult<()> {
        self.expect("RMD", Some(path), &[250]).await.map(|_| ())
    }

    pub async fn delete(&mut self, path: &str) -> FtpResult<()> {
        self.expect("DELE", Some(path), &[250]).await.map(|_| ())
    }

    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        self.expect("RNFR", Some(from), &[350]).await?;
        self.expect("RNTO", Some(to), &[250]).await.map(|_| ())
    }

    pub async fn noop(&mut self) -> FtpResult<()> {
        self.expect("NOOP", None, &[200]).await.map(|_| ())
    }

    /// Sends an arbitrary command line and returns the reply, whatever its code.
    pub async fn raw_command(&mut self, line: &str) -> FtpResult<Reply> {
        let command = Command::parse(line)?;
        self.exchange(&command).await
    }

    /// Says goodbye and closes the control connection. A no-op once closed.
    pub async fn quit(&mut self) -> FtpResult<()> {
        if self.conn.is_none() {
            return Ok(());
        }

        let outcome = self.command("QUIT", None).await;
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.writer.shutdown().await;
        }
        self.authenticated = false;

        match outcome {
            Ok(reply) if reply.code == 221 => Ok(()),
            Ok(reply) => {
                debug!("QUIT answered with {}", reply);
                Ok(())
            }
            // The server may close first; nothing left to do either way.
            Err(FtpError::ConnectionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn pump(&self) -> TransferPump {
        TransferPump::new(self.config.buffer_size).with_stall_timeout(self.config.data_timeout)
    }

    fn conn_mut(&mut self) -> FtpResult<&mut ControlConnection> {
        self.conn.as_mut().ok_or(FtpError::NotConnected)
    }

    /// Drops the connection after errors that leave it out of step.
    fn track<T>(&mut self, result: FtpResult<T>) -> FtpResult<T> {
        if let Err(e) = &result {
            if is_connection_lost(e) {
                warn!("Control connection lost: {}", e);
                self.conn = None;
                self.authenticated = false;
            }
        }
        result
    }

    async fn send_command(&mut self, command: &Command) -> FtpResult<()> {
        let timeout = self.config.read_timeout;
        let conn = self.conn_mut()?;
        debug!("CC OUT: {}", command);
        let write = async {
            conn.writer.write_all(command.to_wire().as_bytes()).await?;
            conn.writer.flush().await
        };
        let result = match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FtpError::Io(e)),
            Err(_) => Err(FtpError::Timeout(format!("sending {}", command.verb))),
        };
        self.track(result)
    }

    async fn read_reply(&mut self) -> FtpResult<Reply> {
        let conn = self.conn_mut()?;
        let result = conn.reader.next_reply().await;
        if let Ok(reply) = &result {
            debug!("CC IN: {}", reply);
            self.last_reply = Some(reply.clone());
        }
        self.track(result)
    }

    async fn exchange(&mut self, command: &Command) -> FtpResult<Reply> {
        self.send_command(command).await?;
        self.read_reply().await
    }

    async fn command(&mut self, verb: &str, arg: Option<&str>) -> FtpResult<Reply> {
        self.exchange(&Command::new(verb, arg)).await
    }

    async fn expect(&mut self, verb: &str, arg: Option<&str>, accepted: &[u16]) -> FtpResult<Reply> {
        let command = Command::new(verb, arg);
        let reply = self.exchange(&command).await?;
        if accepted.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(FtpError::UnexpectedReply {
                command: command.to_string(),
                reply,
            })
        }
    }

    async fn data_endpoint(&mut self) -> FtpResult<DataEndpoint> {
        match self.config.data_mode {
            DataMode::Passive => self.passive_endpoint().await,
            DataMode::Active => self.active_endpoint().await,
            DataMode::PassiveThenActive => match self.passive_endpoint().await {
                Ok(endpoint) => Ok(endpoint),
                Err(e) if !is_connection_lost(&e) => {
                    warn!("Passive mode failed ({}), trying active mode", e);
                    self.active_endpoint().await
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Passive mode connects right away, before the transfer command: some
    /// servers only send their 150 once the data connection is up. Failing
    /// to reach the advertised address counts as a passive failure.
    async fn passive_endpoint(&mut self) -> FtpResult<DataEndpoint> {
        let addr = self.passive_address().await?;
        let stream = DataEndpoint::Connect(addr)
            .establish(self.config.data_timeout)
            .await?;
        Ok(DataEndpoint::Connected(stream))
    }

    async fn passive_address(&mut self) -> FtpResult<SocketAddr> {
        let peer_ip = self.conn_mut()?.peer_addr.ip();

        let reply = self.command("PASV", None).await?;
        if reply.code == 227 {
            let addr = parse_pasv_reply(&reply)?;
            // Some servers behind NAT advertise 0.0.0.0; use the control peer.
            let ip = if addr.ip().is_unspecified() {
                peer_ip
            } else {
                IpAddr::V4(*addr.ip())
            };
            return Ok(SocketAddr::new(ip, addr.port()));
        }

        debug!("PASV refused ({}), trying EPSV", reply);
        let reply = self.command("EPSV", None).await?;
        if reply.code == 229 {
            let port = parse_epsv_reply(&reply)?;
            return Ok(SocketAddr::new(peer_ip, port));
        }

        Err(FtpError::DataChannelSetupFailed(format!(
            "passive mode refused: {}",
            reply
        )))
    }

    async fn active_endpoint(&mut self) -> FtpResult<DataEndpoint> {
        let (local_ip, peer_ip) = {
            let conn = self.conn_mut()?;
            (conn.local_addr.ip(), conn.peer_addr.ip())
        };

        let listener = TcpListener::bind(SocketAddr::new(local_ip, 0))
            .await
            .map_err(|e| FtpError::DataChannelSetupFailed(format!("bind failed: {}", e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| FtpError::DataChannelSetupFailed(e.to_string()))?;

        let command = match addr {
            SocketAddr::V4(v4) => Command::new("PORT", Some(&format_port_argument(v4))),
            SocketAddr::V6(_) => Command::new("EPRT", Some(&format_eprt_argument(addr))),
        };
        let reply = self.exchange(&command).await?;
        if reply.code != 200 {
            return Err(FtpError::DataChannelSetupFailed(format!(
                "{} refused: {}",
                command.verb, reply
            )));
        }

        debug!("Active mode, listening on {}", addr);
        Ok(DataEndpoint::Listening {
            listener,
            expected_peer: Some(peer_ip),
        })
    }

    /// Negotiates a data connection, sends the transfer command and waits for
    /// its preliminary reply.
    async fn begin_transfer(&mut self, verb: &str, arg: Option<&str>) -> FtpResult<TcpStream> {
        let data_timeout = self.config.data_timeout;
        let endpoint = self.data_endpoint().await?;

        let command = Command::new(verb, arg);
        let reply = self.exchange(&command).await?;
        if !reply.is_preliminary() {
            return Err(FtpError::UnexpectedReply {
                command: command.to_string(),
                reply,
            });
        }

        match endpoint.establish(data_timeout).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                let _ = self.read_reply().await;
                Err(e)
            }
        }
    }

    /// Reads the final status reply of a transfer. The reply is read even
    /// when the local side failed, so the control connection stays in step.
    async fn finish_transfer(&mut self, verb: &str, outcome: FtpResult<u64>) -> FtpResult<TransferReport> {
        let reply = self.read_reply().await;
        match (outcome, reply) {
            (Ok(bytes), Ok(reply)) if reply.is_success() => {
                info!("{} complete, {} bytes", verb, bytes);
                Ok(TransferReport { bytes, reply })
            }
            (Ok(_), Ok(reply)) => Err(FtpError::UnexpectedReply {
                command: verb.to_string(),
                reply,
            }),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    async fn fetch_text(&mut self, verb: &str, path: Option<&str>) -> FtpResult<(String, TransferReport)> {
        let mut stream = self.begin_transfer(verb, path).await?;
        let mut buffer = Vec::new();
        let outcome = self.pump().receive(&mut stream, &mut buffer).await;
        drop(stream);
        let report = self.finish_transfer(verb, outcome).await?;
        Ok((String::from_utf8_lossy(&buffer).into_owned(), report))
    }
}

/// Errors after which replies can no longer be matched to commands.
fn is_connection_lost(e: &FtpError) -> bool {
    matches!(
        e,
        FtpError::Io(_) | FtpError::ConnectionClosed | FtpError::Timeout(_) | FtpError::MalformedReply(_)
    )
}

/// Extracts the path from a 257 reply such as `"/pub" is current directory`.
pub fn parse_quoted_path(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let mut path = String::new();
    let mut chars = text[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                path.push('"');
                chars.next();
            } else {
                return Some(path);
            }
        } else {
            path.push(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_path() {
        assert_eq!(parse_quoted_path("\"/pub\" is the current directory."), Some("/pub".into()));
        assert_eq!(parse_quoted_path("\"/a\"\"b\" created"), Some("/a\"b".into()));
        assert_eq!(parse_quoted_path("no quotes"), None);
    }

    #[test]
    fn test_fatal_errors_drop_connection() {
        assert!(is_connection_lost(&FtpError::ConnectionClosed));
        assert!(is_connection_lost(&FtpError::Timeout("x".into())));
        assert!(!is_connection_lost(&FtpError::DataChannelTimeout));
    }

    #[tokio::test]
    async fn test_connect_refused_is_typed() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = ControlSession::connect("127.0.0.1", port, ClientConfig::default()).await;
        assert!(matches!(result, Err(FtpError::ConnectionRefused { .. })));
    }

    #[tokio::test]
    async fn test_greeting_and_quit_against_scripted_server() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"220-Welcome\r\n220 ready\r\n").await.unwrap();
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(line, "QUIT");
            write.write_all(b"221 Bye\r\n").await.unwrap();
        });

        let mut session = ControlSession::connect("127.0.0.1", port, ClientConfig::default())
            .await
            .unwrap();
        assert_eq!(session.welcome().unwrap().text, vec!["Welcome", "ready"]);
        session.quit().await.unwrap();
        assert!(!session.is_connected());
        session.quit().await.unwrap();
        assert!(matches!(session.noop().await, Err(FtpError::NotConnected)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_passive_address_falls_back_to_active() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

        let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_port = dead.local_addr().unwrap().port();
        drop(dead);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"220 ready\r\n").await.unwrap();

            assert_eq!(lines.next_line().await.unwrap().unwrap(), "PASV");
            let pasv = format!(
                "227 Entering Passive Mode (127,0,0,1,{},{}).\r\n",
                dead_port >> 8,
                dead_port & 0xff
            );
            write.write_all(pasv.as_bytes()).await.unwrap();

            let port_line = lines.next_line().await.unwrap().unwrap();
            let target = crate::core_network::port::parse_port_argument(&port_line[5..]).unwrap();
            write.write_all(b"200 PORT command successful.\r\n").await.unwrap();

            assert_eq!(lines.next_line().await.unwrap().unwrap(), "NLST");
            write.write_all(b"150 Here it comes.\r\n").await.unwrap();
            let mut data = TcpStream::connect(target).await.unwrap();
            data.write_all(b"a.txt\r\nb.txt\r\n").await.unwrap();
            drop(data);
            write.write_all(b"226 Done.\r\n").await.unwrap();
        });

        let config = ClientConfig {
            data_mode: DataMode::PassiveThenActive,
            data_timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        };
        let mut session = ControlSession::connect("127.0.0.1", port, config).await.unwrap();
        assert_eq!(session.nlst(None).await.unwrap(), vec!["a.txt", "b.txt"]);
        server.await.unwrap();
    }
}
