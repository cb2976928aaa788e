// The FTP verbs understood by the server
pub mod ftpcommand;

// One handler per command, each an `impl Session` block
pub mod abor;
pub mod cdup;
pub mod cwd;
pub mod dele;
pub mod list;
pub mod mkd;
pub mod noop;
pub mod pass;
pub mod pwd;
pub mod quit;
pub mod retr;
pub mod rmd;
pub mod rnfr;
pub mod rnto;
pub mod size;
pub mod stor;
pub mod syst;
pub mod type_;
pub mod user;

// The utils and common functions are here
pub mod utils;
