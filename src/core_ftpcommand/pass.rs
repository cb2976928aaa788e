use crate::core_error::{FtpError, FtpResult};
use crate::helpers::PathJail;
use crate::session::{AuthenticatedUser, Flow, Session, SessionState};
use log::{error, info, warn};
use std::io;
use std::sync::Arc;

impl Session {
    /// Handles the PASS FTP command.
    ///
    /// Checks the password for the name given by the preceding USER. Each
    /// failure is counted; reaching the configured limit closes the connection.
    pub(crate) async fn handle_pass_command(&mut self, arg: Option<String>) -> FtpResult<Flow> {
        let Some(username) = self.pending_user.take() else {
            return Err(FtpError::BadSequence("PASS must follow USER".into()));
        };
        let password = arg.unwrap_or_default();

        // bcrypt verification is CPU bound and must stay off the async workers.
        let authorizer = Arc::clone(&self.authorizer);
        let name = username.clone();
        let checked = tokio::task::spawn_blocking(move || authorizer.authenticate(&name, &password))
            .await
            .map_err(|e| FtpError::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        let record = match checked {
            Ok(record) => record,
            Err(e) => {
                self.failed_logins += 1;
                warn!(
                    "[{}] Login failed for {} ({} of {})",
                    self.peer_addr, username, self.failed_logins, self.settings.max_login_failures
                );
                if self.failed_logins >= self.settings.max_login_failures {
                    self.reply(421, "Too many failed login attempts, closing control connection.")
                        .await?;
                    return Ok(Flow::Close);
                }
                self.reply_error(&e).await?;
                return Ok(Flow::Continue);
            }
        };

        let jail = match PathJail::new(&record.root) {
            Ok(jail) => jail,
            Err(e) => {
                error!(
                    "[{}] Root {:?} of user {} is unusable: {}",
                    self.peer_addr, record.root, username, e
                );
                self.reply(530, "Login incorrect.").await?;
                return Ok(Flow::Continue);
            }
        };

        info!("[{}] User {} logged in", self.peer_addr, username);
        self.user = Some(AuthenticatedUser { record, jail });
        self.current_dir = String::from("/");
        self.state = SessionState::Authenticated;
        self.failed_logins = 0;
        self.reply(230, "User logged in, proceed.").await?;
        Ok(Flow::Continue)
    }
}
