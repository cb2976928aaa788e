use crate::core_auth::Permission;
use crate::core_error::{FtpError, FtpResult};
use crate::core_ftpcommand::utils::fs_failure;
use crate::session::{Flow, Session};
use log::info;
use tokio::fs::File;

impl Session {
    /// Handles the RETR (Retrieve File) FTP command.
    ///
    /// The file is opened before the 150 reply, so a missing or unreadable
    /// file is reported without touching the data connection.
    pub(crate) async fn handle_retr_command(&mut self, arg: Option<String>) -> FtpResult<Flow> {
        let endpoint = self.data_endpoint.take();
        let arg = Self::require_arg(arg, "RETR")?;
        let target = self.resolve(&arg)?;
        self.authorize(Permission::Retrieve, &target)?;

        let mut file = File::open(&target.physical)
            .await
            .map_err(|e| fs_failure(&target, e))?;
        let metadata = file.metadata().await.map_err(|e| fs_failure(&target, e))?;
        if !metadata.is_file() {
            return Err(FtpError::FileUnavailable(format!(
                "{}: not a regular file",
                target.virtual_path
            )));
        }

        info!(
            "[{}] Sending {} ({} bytes)",
            self.peer_addr,
            target.virtual_path,
            metadata.len()
        );
        let preliminary = format!(
            "Opening BINARY mode data connection for {} ({} bytes).",
            target.file_name(),
            metadata.len()
        );
        let mut stream = self.open_data_connection(endpoint, &preliminary).await?;

        let abort = self.shutdown.child_token();
        let pump = self.pump(&abort);
        let transfer = async move { pump.send(&mut file, &mut stream).await };
        self.supervise_transfer(transfer, abort, "RETR").await
    }
}
