use crate::core_auth::Permission;
use crate::core_error::FtpResult;
use crate::core_ftpcommand::utils::{fs_failure, quote_path};
use crate::session::Session;
use log::info;
use tokio::fs;

impl Session {
    /// Handles the MKD (Make Directory) FTP command.
    ///
    /// Creates a single directory; the parent must already exist and an
    /// existing entry of the same name is an error.
    pub(crate) async fn handle_mkd_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        let arg = Self::require_arg(arg, "MKD")?;
        let target = self.resolve(&arg)?;
        self.authorize(Permission::MakeDirectory, &target)?;

        fs::create_dir(&target.physical)
            .await
            .map_err(|e| fs_failure(&target, e))?;

        info!("[{}] Directory created: {}", self.peer_addr, target.virtual_path);
        self.reply(257, format!("{} directory created.", quote_path(&target.virtual_path)))
            .await
    }
}
