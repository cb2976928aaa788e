use crate::core_auth::Permission;
use crate::core_error::{FtpError, FtpResult};
use crate::core_ftpcommand::utils::fs_failure;
use crate::session::{Flow, Session};
use log::{info, warn};
use tokio::fs::{self, OpenOptions};

impl Session {
    /// Handles the STOR (Store File) FTP command.
    ///
    /// Stores the uploaded bytes at the target path inside the user's root.
    /// Replacing an existing file needs the overwrite permission on top of
    /// store. The file is opened before the 150 reply but only truncated
    /// once the data connection is up: if it never arrives, an existing
    /// file keeps its contents and a newly created one is removed again.
    /// A transfer interrupted midway leaves the partial file in place.
    pub(crate) async fn handle_stor_command(&mut self, arg: Option<String>) -> FtpResult<Flow> {
        let endpoint = self.data_endpoint.take();
        let arg = Self::require_arg(arg, "STOR")?;
        let target = self.resolve(&arg)?;
        self.authorize(Permission::Store, &target)?;

        let existed = match fs::symlink_metadata(&target.physical).await {
            Ok(metadata) if metadata.is_dir() => {
                return Err(FtpError::FileUnavailable(format!(
                    "{}: is a directory",
                    target.virtual_path
                )));
            }
            Ok(_) => true,
            Err(_) => false,
        };
        if existed {
            self.authorize(Permission::Overwrite, &target)?;
        }
        if endpoint.is_none() {
            return Err(FtpError::DataChannelSetupFailed("use PORT or PASV first".into()));
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&target.physical)
            .await
            .map_err(|e| fs_failure(&target, e))?;

        let preliminary = format!(
            "Opening BINARY mode data connection for {}.",
            target.file_name()
        );
        let mut stream = match self.open_data_connection(endpoint, &preliminary).await {
            Ok(stream) => stream,
            Err(e) => {
                drop(file);
                if !existed {
                    if let Err(remove_err) = fs::remove_file(&target.physical).await {
                        warn!("Could not remove {:?}: {}", target.physical, remove_err);
                    }
                }
                return Err(e);
            }
        };

        if existed {
            file.set_len(0).await.map_err(|e| fs_failure(&target, e))?;
        }

        info!("[{}] Receiving {}", self.peer_addr, target.virtual_path);
        let abort = self.shutdown.child_token();
        let pump = self.pump(&abort);
        let transfer = async move { pump.receive(&mut stream, &mut file).await };
        self.supervise_transfer(transfer, abort, "STOR").await
    }
}
