use crate::core_auth::Permission;
use crate::core_error::FtpResult;
use crate::core_ftpcommand::utils::fs_failure;
use crate::session::Session;
use log::info;

impl Session {
    /// Handles the RNFR (Rename From) FTP command.
    ///
    /// Remembers the source for the following RNTO. Any earlier pending
    /// source is forgotten first, even when this one is rejected.
    pub(crate) async fn handle_rnfr_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        self.rename_from = None;
        let arg = Self::require_arg(arg, "RNFR")?;
        let source = self.resolve(&arg)?;
        self.authorize(Permission::Rename, &source)?;

        tokio::fs::symlink_metadata(&source.physical)
            .await
            .map_err(|e| fs_failure(&source, e))?;

        info!("[{}] Rename source set to {}", self.peer_addr, source.virtual_path);
        self.rename_from = Some(source);
        self.reply(350, "Ready for RNTO.").await
    }
}
