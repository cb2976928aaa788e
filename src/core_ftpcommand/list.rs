use crate::core_auth::Permission;
use crate::core_error::FtpResult;
use crate::core_ftpcommand::utils::fs_failure;
use crate::helpers::ResolvedPath;
use crate::session::{Flow, Session};
use chrono::{DateTime, Duration as ChronoDuration, Local};
use log::info;
use std::fs::Metadata;
use std::io::Cursor;
use tokio::fs;

/// Renders one `ls -l` style line, CRLF terminated.
pub fn format_list_line(name: &str, metadata: &Metadata, now: DateTime<Local>) -> String {
    let kind = if metadata.is_dir() {
        'd'
    } else if metadata.file_type().is_symlink() {
        'l'
    } else {
        '-'
    };

    let modified = metadata
        .modified()
        .map(DateTime::<Local>::from)
        .unwrap_or(now);
    // Recent entries show the time of day, older ones the year.
    let date = if now.signed_duration_since(modified) < ChronoDuration::days(180) {
        modified.format("%b %e %H:%M")
    } else {
        modified.format("%b %e  %Y")
    };

    format!(
        "{}{} 1 ftp ftp {:>12} {} {}\r\n",
        kind,
        mode_string(metadata),
        metadata.len(),
        date,
        name
    )
}

#[cfg(unix)]
fn mode_string(metadata: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    let mode = metadata.permissions().mode();
    let mut out = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(not(unix))]
fn mode_string(metadata: &Metadata) -> String {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => "rwxr-xr-x".to_string(),
        (false, true) => "r--r--r--".to_string(),
        (false, false) => "rw-r--r--".to_string(),
    }
}

/// The path part of a LIST/NLST argument. Leading `ls`-style flags such as
/// `-la` are skipped; no path means the working directory.
fn listing_path(arg: Option<&str>) -> &str {
    let mut rest = arg.unwrap_or_default().trim();
    while rest.starts_with('-') {
        rest = match rest.find(char::is_whitespace) {
            Some(end) => rest[end..].trim_start(),
            None => "",
        };
    }
    if rest.is_empty() {
        "."
    } else {
        rest
    }
}

impl Session {
    /// Handles the LIST FTP command.
    ///
    /// The listing is built in memory, then sent over the data connection.
    /// `ls`-style flags such as `-la` are ignored, a path after them is not.
    pub(crate) async fn handle_list_command(&mut self, arg: Option<String>) -> FtpResult<Flow> {
        self.send_listing(arg, true).await
    }

    /// Handles the NLST FTP command: names only, one per line.
    pub(crate) async fn handle_nlst_command(&mut self, arg: Option<String>) -> FtpResult<Flow> {
        self.send_listing(arg, false).await
    }

    async fn send_listing(&mut self, arg: Option<String>, long: bool) -> FtpResult<Flow> {
        let endpoint = self.data_endpoint.take();

        let target = self.resolve(listing_path(arg.as_deref()))?;
        self.authorize(Permission::List, &target)?;

        let listing = build_listing(&target, long).await?;
        info!(
            "[{}] Listing {} ({} bytes)",
            self.peer_addr,
            target.virtual_path,
            listing.len()
        );

        let mut stream = self
            .open_data_connection(endpoint, "Here comes the directory listing.")
            .await?;
        let abort = self.shutdown.child_token();
        let pump = self.pump(&abort);
        let mut source = Cursor::new(listing);
        let transfer = async move { pump.send(&mut source, &mut stream).await };
        self.supervise_transfer(transfer, abort, "Listing").await
    }
}

async fn build_listing(target: &ResolvedPath, long: bool) -> FtpResult<Vec<u8>> {
    let now = Local::now();
    let metadata = fs::metadata(&target.physical)
        .await
        .map_err(|e| fs_failure(target, e))?;

    if !metadata.is_dir() {
        let name = target.file_name();
        let line = if long {
            format_list_line(name, &metadata, now)
        } else {
            format!("{}\r\n", name)
        };
        return Ok(line.into_bytes());
    }

    let mut entries = fs::read_dir(&target.physical)
        .await
        .map_err(|e| fs_failure(target, e))?;
    let mut lines = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| fs_failure(target, e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if long {
            // Vanished between read_dir and stat; skip it.
            let Ok(metadata) = fs::symlink_metadata(entry.path()).await else {
                continue;
            };
            lines.push((name.clone(), format_list_line(&name, &metadata, now)));
        } else {
            lines.push((name.clone(), format!("{}\r\n", name)));
        }
    }
    lines.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(lines.into_iter().map(|(_, line)| line).collect::<String>().into_bytes())
}
