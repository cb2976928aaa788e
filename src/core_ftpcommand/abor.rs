use crate::core_error::FtpResult;
use crate::session::Session;
use log::info;

impl Session {
    /// Handles ABOR when no transfer is running. A pending PASV/PORT
    /// endpoint is dropped. An ABOR that arrives during a transfer is
    /// served by the transfer itself.
    pub(crate) async fn handle_abor_command(&mut self) -> FtpResult<()> {
        if self.data_endpoint.take().is_some() {
            info!("[{}] Dropped pending data endpoint on ABOR", self.peer_addr);
        }
        self.reply(225, "No transfer to abort.").await
    }
}
