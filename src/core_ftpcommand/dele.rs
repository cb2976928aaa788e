use crate::core_auth::Permission;
use crate::core_error::{FtpError, FtpResult};
use crate::core_ftpcommand::utils::fs_failure;
use crate::session::Session;
use log::info;
use tokio::fs;

impl Session {
    /// Handles the DELE (Delete File) FTP command. Directories are refused.
    pub(crate) async fn handle_dele_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        let arg = Self::require_arg(arg, "DELE")?;
        let target = self.resolve(&arg)?;
        self.authorize(Permission::Delete, &target)?;

        let metadata = fs::symlink_metadata(&target.physical)
            .await
            .map_err(|e| fs_failure(&target, e))?;
        if metadata.is_dir() {
            return Err(FtpError::FileUnavailable(format!(
                "{}: is a directory",
                target.virtual_path
            )));
        }

        fs::remove_file(&target.physical)
            .await
            .map_err(|e| fs_failure(&target, e))?;

        info!("[{}] File deleted: {}", self.peer_addr, target.virtual_path);
        self.reply(250, "File deleted.").await
    }
}
