use crate::core_auth::Permission;
use crate::core_error::{FtpError, FtpResult};
use crate::core_ftpcommand::utils::fs_failure;
use crate::session::Session;
use log::info;
use tokio::fs;

impl Session {
    /// Handles the RMD (Remove Directory) FTP command.
    ///
    /// Only empty directories are removed, and never the user's root.
    pub(crate) async fn handle_rmd_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        let arg = Self::require_arg(arg, "RMD")?;
        let target = self.resolve(&arg)?;
        self.authorize(Permission::RemoveDirectory, &target)?;

        if target.is_root() {
            return Err(FtpError::FileUnavailable("cannot remove the root directory".into()));
        }

        fs::remove_dir(&target.physical)
            .await
            .map_err(|e| fs_failure(&target, e))?;

        info!("[{}] Directory removed: {}", self.peer_addr, target.virtual_path);
        self.reply(250, "Directory removed.").await
    }
}
