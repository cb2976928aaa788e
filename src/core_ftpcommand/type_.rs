use crate::core_error::FtpResult;
use crate::session::Session;
use log::debug;

impl Session {
    /// Handles the TYPE FTP command.
    ///
    /// ASCII and image types are both accepted, but file bytes always travel
    /// unmodified.
    pub(crate) async fn handle_type_command(&mut self, arg: Option<String>) -> FtpResult<()> {
        let arg = Self::require_arg(arg, "TYPE")?;
        let normalized = arg.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();

        let type_ = match normalized.as_str() {
            "A" | "A N" => "A",
            "I" | "L 8" => "I",
            _ => {
                return self.reply(504, "Command not implemented for that parameter.").await;
            }
        };
        debug!("[{}] Transfer type set to {}", self.peer_addr, type_);
        self.type_ = type_.to_string();
        self.reply(200, format!("Type set to {}.", type_)).await
    }
}
