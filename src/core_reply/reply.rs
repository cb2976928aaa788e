use std::fmt;

/// Class of a reply, given by the first digit of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    Preliminary,
    Success,
    Intermediate,
    TransientFailure,
    PermanentFailure,
    Unknown,
}

/// A decoded control connection reply.
///
/// `text` holds one entry per wire line with the leading `DDD-`/`DDD ` stripped
/// from the first and last lines. Continuation lines are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub multiline: bool,
    pub text: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            multiline: false,
            text: vec![text.into()],
        }
    }

    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        Self {
            code,
            multiline: lines.len() > 1,
            text: lines,
        }
    }

    pub fn class(&self) -> ReplyClass {
        match self.code / 100 {
            1 => ReplyClass::Preliminary,
            2 => ReplyClass::Success,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::TransientFailure,
            5 => ReplyClass::PermanentFailure,
            _ => ReplyClass::Unknown,
        }
    }

    pub fn is_preliminary(&self) -> bool {
        self.class() == ReplyClass::Preliminary
    }

    pub fn is_success(&self) -> bool {
        self.class() == ReplyClass::Success
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.class(),
            ReplyClass::TransientFailure | ReplyClass::PermanentFailure
        )
    }

    /// All text lines joined with `\n`, for display.
    pub fn message(&self) -> String {
        self.text.join("\n")
    }

    /// Encodes the reply as CRLF-terminated wire lines.
    pub fn to_wire(&self) -> String {
        let code = self.code;
        match self.text.as_slice() {
            [] => format!("{} \r\n", code),
            [only] => format!("{} {}\r\n", code, only),
            [first, middle @ .., last] => {
                let mut out = format!("{}-{}\r\n", code, first);
                for line in middle {
                    // A continuation starting with a digit could be mistaken for a reply line.
                    if line.starts_with(|c: char| c.is_ascii_digit()) {
                        out.push(' ');
                    }
                    out.push_str(line);
                    out.push_str("\r\n");
                }
                out.push_str(&format!("{} {}\r\n", code, last));
                out
            }
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text.join(" | "))
    }
}
