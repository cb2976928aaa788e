use crate::core_error::FtpResult;
use crate::core_reply::Reply;
use crate::session::Session;

impl Session {
    /// Handles the SYST FTP command.
    pub(crate) async fn handle_syst_command(&mut self) -> FtpResult<()> {
        self.reply(215, "UNIX Type: L8").await
    }

    /// Handles the FEAT FTP command with the list of supported extensions.
    pub(crate) async fn handle_feat_command(&mut self) -> FtpResult<()> {
        let reply = Reply::multiline(
            211,
            vec![
                "Features:".to_string(),
                " SIZE".to_string(),
                " EPSV".to_string(),
                " EPRT".to_string(),
                " PASV".to_string(),
                "End".to_string(),
            ],
        );
        self.send(&reply).await
    }
}
