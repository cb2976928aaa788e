use crate::core_error::FtpResult;
use crate::session::Session;

impl Session {
    /// Handles the CDUP FTP command, which is CWD to the parent directory.
    pub(crate) async fn handle_cdup_command(&mut self) -> FtpResult<()> {
        self.change_dir("..").await
    }
}
