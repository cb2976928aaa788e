use crate::core_error::FtpResult;
use crate::session::Session;

impl Session {
    pub(crate) async fn handle_noop_command(&mut self) -> FtpResult<()> {
        self.reply(200, "NOOP ok.").await
    }
}
