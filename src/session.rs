use crate::constants::{
    DEFAULT_BUFFER_SIZE, DEFAULT_DATA_TIMEOUT_SECS, DEFAULT_GREETING, DEFAULT_IDLE_TIMEOUT_SECS,
    DEFAULT_MAX_LOGIN_FAILURES, DEFAULT_READ_TIMEOUT_SECS, MAX_LINE_LENGTH,
};
use crate::core_auth::{Authorizer, CredentialRecord, Permission};
use crate::core_error::{FtpError, FtpResult};
use crate::core_ftpcommand::ftpcommand::FtpCommand;
use crate::core_network::DataEndpoint;
use crate::core_reply::{read_control_line, Command, Reply};
use crate::core_transfer::TransferPump;
use crate::helpers::{send_reply, PathJail, ResolvedPath};
use log::{debug, error, info, warn};
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Per-instance knobs every session of a server reads.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub greeting: String,
    pub max_login_failures: u32,
    pub idle_timeout: Duration,
    pub data_timeout: Duration,
    pub stall_timeout: Duration,
    pub buffer_size: usize,
    /// Address advertised in PASV replies instead of the control socket's.
    pub pasv_address: Option<IpAddr>,
    pub pasv_port_range: Option<(u16, u16)>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            max_login_failures: DEFAULT_MAX_LOGIN_FAILURES,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            data_timeout: Duration::from_secs(DEFAULT_DATA_TIMEOUT_SECS),
            stall_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            buffer_size: DEFAULT_BUFFER_SIZE,
            pasv_address: None,
            pasv_port_range: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    AwaitingDataConnection,
    Transferring,
    Closed,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub record: Arc<CredentialRecord>,
    pub jail: PathJail,
}

/// What the command loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Close,
}

/// What showed up on the control connection while a transfer was running.
enum ControlEvent {
    Line(String),
    TooLong,
    Closed,
}

enum Watch {
    Finished(FtpResult<u64>),
    Control(ControlEvent),
}

/// Server side of one control connection.
pub struct Session {
    pub(crate) reader: BufReader<OwnedReadHalf>,
    pub(crate) writer: OwnedWriteHalf,
    pub(crate) peer_addr: SocketAddr,
    pub(crate) local_addr: SocketAddr,
    pub(crate) authorizer: Arc<Authorizer>,
    pub(crate) settings: Arc<SessionSettings>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) state: SessionState,
    pub(crate) pending_user: Option<String>,
    pub(crate) user: Option<AuthenticatedUser>,
    /// Working directory relative to the user's root, always `/`-rooted.
    pub(crate) current_dir: String,
    pub(crate) data_endpoint: Option<DataEndpoint>,
    pub(crate) rename_from: Option<ResolvedPath>,
    pub(crate) failed_logins: u32,
    /// A command that arrived while a transfer was running, served next.
    pub(crate) queued_line: Option<String>,
    /// The primary transfer type (A or I). Bytes are always sent unmodified.
    pub(crate) type_: String,
}

impl Session {
    pub fn new(
        socket: TcpStream,
        authorizer: Arc<Authorizer>,
        settings: Arc<SessionSettings>,
        shutdown: CancellationToken,
    ) -> io::Result<Self> {
        let peer_addr = socket.peer_addr()?;
        let local_addr = socket.local_addr()?;
        let (read_half, write_half) = socket.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer_addr,
            local_addr,
            authorizer,
            settings,
            shutdown,
            state: SessionState::Unauthenticated,
            pending_user: None,
            user: None,
            current_dir: String::from("/"),
            data_endpoint: None,
            rename_from: None,
            failed_logins: 0,
            queued_line: None,
            type_: "A".to_string(),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Greets the client and serves commands until QUIT, disconnect,
    /// shutdown or a transport failure.
    pub async fn run(mut self) -> FtpResult<()> {
        let greeting = Reply::new(220, self.settings.greeting.clone());
        let result = match self.send(&greeting).await {
            Ok(()) => self.command_loop().await,
            Err(e) => Err(e),
        };

        self.state = SessionState::Closed;
        self.data_endpoint = None;
        let _ = self.writer.shutdown().await;
        result
    }

    async fn command_loop(&mut self) -> FtpResult<()> {
        loop {
            if let Some(line) = self.queued_line.take() {
                match self.process_line(&line).await? {
                    Flow::Continue => continue,
                    Flow::Close => return Ok(()),
                }
            }

            let shutdown = self.shutdown.clone();
            let idle = self.settings.idle_timeout;
            let read = tokio::select! {
                _ = shutdown.cancelled() => None,
                read = tokio::time::timeout(idle, read_control_line(&mut self.reader, MAX_LINE_LENGTH)) => Some(read),
            };

            let line = match read {
                None => {
                    info!("[{}] Closing session for shutdown", self.peer_addr);
                    self.reply(421, "Service shutting down, closing control connection.")
                        .await?;
                    return Ok(());
                }
                Some(Err(_)) => {
                    info!("[{}] Idle timeout", self.peer_addr);
                    self.reply(421, "Idle timeout, closing control connection.")
                        .await?;
                    return Ok(());
                }
                Some(Ok(Ok(Some(line)))) => line,
                Some(Ok(Ok(None))) => {
                    info!("[{}] Client disconnected", self.peer_addr);
                    return Ok(());
                }
                Some(Ok(Err(e))) if e.kind() == io::ErrorKind::InvalidData => {
                    match tokio::time::timeout(idle, self.skip_rest_of_line()).await {
                        Ok(result) => result?,
                        Err(_) => return Ok(()),
                    }
                    self.reply(500, "Command line too long.").await?;
                    continue;
                }
                Some(Ok(Err(e))) => return Err(FtpError::Io(e)),
            };

            if self.process_line(&line).await? == Flow::Close {
                return Ok(());
            }
        }
    }

    /// Runs one command line. Non-fatal failures are answered here.
    async fn process_line(&mut self, line: &str) -> FtpResult<Flow> {
        match self.handle_line(line).await {
            Ok(flow) => Ok(flow),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("[{}] Command failed: {}", self.peer_addr, e);
                self.reply_error(&e).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn skip_rest_of_line(&mut self) -> io::Result<()> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.reader.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = buf.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> FtpResult<Flow> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("[{}] {}", self.peer_addr, e);
                self.reply(500, "Syntax error, command unrecognized.").await?;
                return Ok(Flow::Continue);
            }
        };
        debug!("[{}] Received command: {}", self.peer_addr, command);

        let Some(ftp_command) = FtpCommand::from_verb(&command.verb) else {
            self.reply(502, "Command not implemented.").await?;
            return Ok(Flow::Continue);
        };

        if self.user.is_none() && !ftp_command.allowed_unauthenticated() {
            return Err(FtpError::NotAuthenticated);
        }

        self.dispatch(ftp_command, command.argument).await
    }

    async fn dispatch(&mut self, command: FtpCommand, arg: Option<String>) -> FtpResult<Flow> {
        match command {
            FtpCommand::USER => self.handle_user_command(arg).await?,
            FtpCommand::PASS => return self.handle_pass_command(arg).await,
            FtpCommand::QUIT => return self.handle_quit_command().await,
            FtpCommand::ABOR => self.handle_abor_command().await?,
            FtpCommand::NOOP => self.handle_noop_command().await?,
            FtpCommand::SYST => self.handle_syst_command().await?,
            FtpCommand::FEAT => self.handle_feat_command().await?,
            FtpCommand::TYPE => self.handle_type_command(arg).await?,
            FtpCommand::PWD => self.handle_pwd_command().await?,
            FtpCommand::CWD => self.handle_cwd_command(arg).await?,
            FtpCommand::CDUP => self.handle_cdup_command().await?,
            FtpCommand::MKD => self.handle_mkd_command(arg).await?,
            FtpCommand::RMD => self.handle_rmd_command(arg).await?,
            FtpCommand::DELE => self.handle_dele_command(arg).await?,
            FtpCommand::RNFR => self.handle_rnfr_command(arg).await?,
            FtpCommand::RNTO => self.handle_rnto_command(arg).await?,
            FtpCommand::SIZE => self.handle_size_command(arg).await?,
            FtpCommand::LIST => return self.handle_list_command(arg).await,
            FtpCommand::NLST => return self.handle_nlst_command(arg).await,
            FtpCommand::RETR => return self.handle_retr_command(arg).await,
            FtpCommand::STOR => return self.handle_stor_command(arg).await,
            FtpCommand::PASV => self.handle_pasv_command().await?,
            FtpCommand::EPSV => self.handle_epsv_command(arg).await?,
            FtpCommand::PORT => self.handle_port_command(arg).await?,
            FtpCommand::EPRT => self.handle_eprt_command(arg).await?,
        }
        Ok(Flow::Continue)
    }

    pub(crate) async fn send(&mut self, reply: &Reply) -> FtpResult<()> {
        send_reply(&mut self.writer, reply).await?;
        Ok(())
    }

    pub(crate) async fn reply(&mut self, code: u16, text: impl Into<String>) -> FtpResult<()> {
        self.send(&Reply::new(code, text)).await
    }

    pub(crate) async fn reply_error(&mut self, error: &FtpError) -> FtpResult<()> {
        let line = format!("{}\r\n", error.to_ftp_response());
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub(crate) fn require_user(&self) -> FtpResult<&AuthenticatedUser> {
        self.user.as_ref().ok_or(FtpError::NotAuthenticated)
    }

    pub(crate) fn require_arg(arg: Option<String>, verb: &str) -> FtpResult<String> {
        arg.filter(|a| !a.trim().is_empty())
            .ok_or_else(|| FtpError::InvalidArgument(format!("{} needs an argument", verb)))
    }

    /// Resolves a client path against the working directory, confined to the
    /// user's root. Nothing on disk is modified.
    pub(crate) fn resolve(&self, arg: &str) -> FtpResult<ResolvedPath> {
        let user = self.require_user()?;
        user.jail.resolve(&self.current_dir, arg)
    }

    pub(crate) fn authorize(&self, permission: Permission, target: &ResolvedPath) -> FtpResult<()> {
        let user = self.require_user()?;
        self.authorizer
            .authorize(&user.record.username, permission, &target.physical)
    }

    /// A pump for one transfer, stopped early once `abort` is cancelled.
    pub(crate) fn pump(&self, abort: &CancellationToken) -> TransferPump {
        TransferPump::new(self.settings.buffer_size)
            .with_stall_timeout(self.settings.stall_timeout)
            .with_cancellation(abort.clone())
    }

    /// Sends the preliminary reply and waits for the negotiated data connection.
    pub(crate) async fn open_data_connection(
        &mut self,
        endpoint: Option<DataEndpoint>,
        preliminary: &str,
    ) -> FtpResult<TcpStream> {
        let endpoint = endpoint
            .ok_or_else(|| FtpError::DataChannelSetupFailed("use PORT or PASV first".into()))?;

        self.state = SessionState::AwaitingDataConnection;
        self.reply(150, preliminary).await?;
        debug!("[{}] Waiting for data connection ({})", self.peer_addr, endpoint.describe());

        match endpoint.establish(self.settings.data_timeout).await {
            Ok(stream) => {
                self.state = SessionState::Transferring;
                Ok(stream)
            }
            Err(e) => {
                warn!("[{}] Data connection failed: {}", self.peer_addr, e);
                self.state = SessionState::Authenticated;
                Err(e)
            }
        }
    }

    /// Drives `transfer` to its end while still listening on the control
    /// connection, then sends the final reply.
    ///
    /// `transfer` must own the data connection so it is closed by the time
    /// the final reply goes out. ABOR and QUIT cut the transfer short; any
    /// other command is held back until the transfer is done. A client that
    /// disappears aborts the transfer and ends the session.
    pub(crate) async fn supervise_transfer<F>(
        &mut self,
        transfer: F,
        abort: CancellationToken,
        what: &str,
    ) -> FtpResult<Flow>
    where
        F: Future<Output = FtpResult<u64>>,
    {
        tokio::pin!(transfer);
        let watched = tokio::select! {
            outcome = &mut transfer => Watch::Finished(outcome),
            event = self.next_control_event() => Watch::Control(event),
        };

        let line = match watched {
            Watch::Finished(outcome) => {
                self.finish_transfer(outcome, what).await?;
                return Ok(Flow::Continue);
            }
            Watch::Control(ControlEvent::Closed) => {
                info!("[{}] Client went away during {}", self.peer_addr, what);
                abort.cancel();
                if let Err(e) = transfer.await {
                    warn!("[{}] {} abandoned: {}", self.peer_addr, what, e);
                }
                self.state = SessionState::Authenticated;
                return Ok(Flow::Close);
            }
            Watch::Control(ControlEvent::TooLong) => {
                let outcome = transfer.await;
                self.finish_transfer(outcome, what).await?;
                match tokio::time::timeout(self.settings.idle_timeout, self.skip_rest_of_line()).await {
                    Ok(result) => result?,
                    Err(_) => return Ok(Flow::Close),
                }
                self.reply(500, "Command line too long.").await?;
                return Ok(Flow::Continue);
            }
            Watch::Control(ControlEvent::Line(line)) => line,
        };

        let verb = Command::parse(&line)
            .ok()
            .and_then(|command| FtpCommand::from_verb(&command.verb));
        match verb {
            Some(FtpCommand::ABOR) => {
                info!("[{}] {} aborted by client", self.peer_addr, what);
                abort.cancel();
                let outcome = transfer.await;
                self.finish_transfer(outcome, what).await?;
                self.reply(226, "Abort successful.").await?;
                Ok(Flow::Continue)
            }
            Some(FtpCommand::QUIT) => {
                abort.cancel();
                let outcome = transfer.await;
                self.finish_transfer(outcome, what).await?;
                self.handle_quit_command().await
            }
            _ => {
                debug!("[{}] Holding {:?} until {} ends", self.peer_addr, line, what);
                self.queued_line = Some(line);
                let outcome = transfer.await;
                self.finish_transfer(outcome, what).await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Waits until the client sends something, then reads one line.
    /// Nothing is consumed before data is buffered, so dropping the wait
    /// loses no input.
    async fn next_control_event(&mut self) -> ControlEvent {
        match self.reader.fill_buf().await {
            Ok(buf) if !buf.is_empty() => {}
            _ => return ControlEvent::Closed,
        }
        let read = tokio::time::timeout(
            self.settings.idle_timeout,
            read_control_line(&mut self.reader, MAX_LINE_LENGTH),
        )
        .await;
        match read {
            Ok(Ok(Some(line))) => ControlEvent::Line(line),
            Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => ControlEvent::TooLong,
            _ => ControlEvent::Closed,
        }
    }

    /// Sends the final status reply of a transfer. The data connection must
    /// already be closed.
    pub(crate) async fn finish_transfer(&mut self, outcome: FtpResult<u64>, what: &str) -> FtpResult<()> {
        self.state = SessionState::Authenticated;
        match outcome {
            Ok(bytes) => {
                info!("[{}] {} complete, {} bytes", self.peer_addr, what, bytes);
                self.reply(226, format!("Transfer complete ({} bytes).", bytes))
                    .await
            }
            Err(e) => {
                error!("[{}] {} failed: {}", self.peer_addr, what, e);
                self.reply_error(&e).await
            }
        }
    }
}
