use crate::core_error::FtpResult;
use crate::session::{Flow, Session};
use log::info;

impl Session {
    /// Handles the QUIT FTP command. Any negotiated data endpoint is dropped.
    pub(crate) async fn handle_quit_command(&mut self) -> FtpResult<Flow> {
        info!("[{}] Received QUIT command", self.peer_addr);
        self.data_endpoint = None;
        self.reply(221, "Goodbye.").await?;
        Ok(Flow::Close)
    }
}
