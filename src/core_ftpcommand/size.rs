use crate::core_auth::Permission;
use crate::core_error::{FtpError, FtpResult};
use crate::core_ftpcommand::utils::fs_failure;
use crate::session::Session;

impl Session {
    /// Handles the SIZE (File Size) FTP command.
    ///
    /// Replies 213 with the byte count of a regular file. Directories get a
    /// 550, which clients use to tell the two apart.
    pub(crate) async fn handle_size_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        let arg = Self::require_arg(arg, "SIZE")?;
        let target = self.resolve(&arg)?;
        self.authorize(Permission::List, &target)?;

        let metadata = tokio::fs::metadata(&target.physical)
            .await
            .map_err(|e| fs_failure(&target, e))?;
        if !metadata.is_file() {
            return Err(FtpError::FileUnavailable(format!(
                "{}: not a regular file",
                target.virtual_path
            )));
        }

        self.reply(213, metadata.len().to_string()).await
    }
}
