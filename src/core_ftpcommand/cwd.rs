use crate::core_auth::Permission;
use crate::core_error::{FtpError, FtpResult};
use crate::session::Session;
use log::info;

impl Session {
    /// Handles the CWD FTP command.
    ///
    /// The target must be an existing directory inside the user's root.
    pub(crate) async fn handle_cwd_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        let arg = Self::require_arg(arg, "CWD")?;
        self.change_dir(&arg).await
    }

    pub(crate) async fn change_dir(&mut self, arg: &str) -> FtpResult<()> {
        let target = self.resolve(arg)?;
        self.authorize(Permission::ChangeWorkingDirectory, &target)?;

        let is_dir = tokio::fs::metadata(&target.physical)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(FtpError::FileUnavailable(format!(
                "{}: not a directory",
                target.virtual_path
            )));
        }

        info!("[{}] Changed directory to {}", self.peer_addr, target.virtual_path);
        self.current_dir = target.virtual_path;
        self.reply(250, "Directory successfully changed.").await
    }
}
