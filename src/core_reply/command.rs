use crate::core_error::{FtpError, FtpResult};
use std::fmt;

/// A control connection command line: `VERB[ SP argument]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: String,
    pub argument: Option<String>,
}

impl Command {
    pub fn new(verb: &str, argument: Option<&str>) -> Self {
        Self {
            verb: verb.to_ascii_uppercase(),
            argument: argument.map(str::to_string),
        }
    }

    /// Parses one command line. The verb is case-insensitive and stored
    /// upper-cased; the argument is everything after the first space.
    pub fn parse(line: &str) -> FtpResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(FtpError::ProtocolViolation("empty command line".into()));
        }

        let (verb, argument) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (line, None),
        };

        if verb.is_empty() || !verb.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FtpError::ProtocolViolation(format!(
                "invalid command verb {:?}",
                verb
            )));
        }

        Ok(Self {
            verb: verb.to_ascii_uppercase(),
            argument: argument.filter(|a| !a.is_empty()).map(str::to_string),
        })
    }

    pub fn to_wire(&self) -> String {
        match &self.argument {
            Some(arg) => format!("{} {}\r\n", self.verb, arg),
            None => format!("{}\r\n", self.verb),
        }
    }
}

/// Displays the command for logs, masking the PASS secret.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.argument, self.verb.as_str()) {
            (Some(_), "PASS") => write!(f, "PASS ****"),
            (Some(arg), _) => write!(f, "{} {}", self.verb, arg),
            (None, _) => write!(f, "{}", self.verb),
        }
    }
}
