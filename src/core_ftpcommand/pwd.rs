use crate::core_error::FtpResult;
use crate::core_ftpcommand::utils::quote_path;
use crate::session::Session;

impl Session {
    /// Handles the PWD FTP command. The reported path is relative to the
    /// user's root, never the server's real filesystem path.
    pub(crate) async fn handle_pwd_command(&mut self) -> FtpResult<()> {
        let response = format!("{} is the current directory.", quote_path(&self.current_dir));
        self.reply(257, response).await
    }
}
