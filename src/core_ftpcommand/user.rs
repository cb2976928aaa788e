use crate::core_error::FtpResult;
use crate::session::{Session, SessionState};
use log::info;

impl Session {
    /// Handles the USER FTP command.
    ///
    /// Records the username and asks for a password. Sending USER while
    /// logged in ends the current login, so the next PASS starts over.
    pub(crate) async fn handle_user_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        let username = Self::require_arg(arg, "USER")?;
        info!("[{}] Received USER command with username: {}", self.peer_addr, username);

        if let Some(previous) = self.user.take() {
            info!("[{}] User {} logged out by new USER", self.peer_addr, previous.record.username);
            self.current_dir = String::from("/");
            self.rename_from = None;
            self.data_endpoint = None;
        }
        self.state = SessionState::Unauthenticated;
        self.pending_user = Some(username);

        self.reply(331, "User name okay, need password.").await
    }
}
