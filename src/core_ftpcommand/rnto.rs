use crate::core_auth::Permission;
use crate::core_error::{FtpError, FtpResult};
use crate::core_ftpcommand::utils::fs_failure;
use crate::session::Session;
use log::info;
use tokio::fs;

impl Session {
    /// Handles the RNTO (Rename To) FTP command.
    ///
    /// Completes the rename started by RNFR. Replacing an existing target
    /// additionally needs the overwrite permission.
    pub(crate) async fn handle_rnto_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        let Some(source) = self.rename_from.take() else {
            return Err(FtpError::BadSequence("RNTO must follow RNFR".into()));
        };
        let arg = Self::require_arg(arg, "RNTO")?;
        let target = self.resolve(&arg)?;
        self.authorize(Permission::Rename, &target)?;

        if fs::symlink_metadata(&target.physical).await.is_ok() {
            self.authorize(Permission::Overwrite, &target)?;
        }

        fs::rename(&source.physical, &target.physical)
            .await
            .map_err(|e| fs_failure(&target, e))?;

        info!(
            "[{}] Renamed {} to {}",
            self.peer_addr, source.virtual_path, target.virtual_path
        );
        self.reply(250, "Rename successful.").await
    }
}
