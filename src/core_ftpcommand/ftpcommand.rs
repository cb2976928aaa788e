#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
pub enum FtpCommand {
    USER,
    PASS,
    QUIT,
    ABOR,
    PWD,
    LIST,
    NLST,
    CWD,
    CDUP,
    NOOP,
    MKD,
    RMD,
    DELE,
    RNFR,
    RNTO,
    RETR,
    STOR,
    SIZE,
    PORT,
    EPRT,
    PASV,
    EPSV,
    FEAT,
    SYST,
    TYPE,
}

impl FtpCommand {
    pub fn from_verb(verb: &str) -> Option<FtpCommand> {
        match verb.to_ascii_uppercase().as_str() {
            "USER" => Some(FtpCommand::USER),
            "PASS" => Some(FtpCommand::PASS),
            "QUIT" => Some(FtpCommand::QUIT),
            "ABOR" => Some(FtpCommand::ABOR),
            "PWD" | "XPWD" => Some(FtpCommand::PWD),
            "LIST" => Some(FtpCommand::LIST),
            "NLST" => Some(FtpCommand::NLST),
            "CWD" | "XCWD" => Some(FtpCommand::CWD),
            "CDUP" | "XCUP" => Some(FtpCommand::CDUP),
            "NOOP" => Some(FtpCommand::NOOP),
            "MKD" | "XMKD" => Some(FtpCommand::MKD),
            "RMD" | "XRMD" => Some(FtpCommand::RMD),
            "DELE" => Some(FtpCommand::DELE),
            "RNFR" => Some(FtpCommand::RNFR),
            "RNTO" => Some(FtpCommand::RNTO),
            "RETR" => Some(FtpCommand::RETR),
            "STOR" => Some(FtpCommand::STOR),
            "SIZE" => Some(FtpCommand::SIZE),
            "PORT" => Some(FtpCommand::PORT),
            "EPRT" => Some(FtpCommand::EPRT),
            "PASV" => Some(FtpCommand::PASV),
            "EPSV" => Some(FtpCommand::EPSV),
            "FEAT" => Some(FtpCommand::FEAT),
            "SYST" => Some(FtpCommand::SYST),
            "TYPE" => Some(FtpCommand::TYPE),
            _ => None,
        }
    }

    /// Commands accepted before a successful login.
    pub fn allowed_unauthenticated(&self) -> bool {
        matches!(self, FtpCommand::USER | FtpCommand::PASS | FtpCommand::QUIT)
    }
}
