use crate::constants::MAX_LINE_LENGTH;
use crate::core_error::{FtpError, FtpResult};
use crate::core_reply::Reply;
use log::trace;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Reads one CRLF (or LF) terminated line, without its terminator.
///
/// Returns `Ok(None)` when the peer closed the stream before sending anything.
/// Lines longer than `max_len` fail with `InvalidData`.
pub async fn read_control_line<R>(reader: &mut R, max_len: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(max_len as u64)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') && n >= max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "control line exceeds maximum length",
        ));
    }

    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Splits `DDD<sep>rest` into its parts. Anything else is not a reply line.
fn split_code(line: &str) -> Option<(u16, Option<char>, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code: u16 = line[..3].parse().ok()?;
    match bytes.get(3) {
        None => Some((code, None, "")),
        Some(b' ') => Some((code, Some(' '), &line[4..])),
        Some(b'-') => Some((code, Some('-'), &line[4..])),
        Some(_) => None,
    }
}

/// Decodes replies from a control connection, one at a time.
pub struct ReplyReader<R> {
    inner: R,
    timeout: Duration,
}

impl<R> ReplyReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(inner: R, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads the next complete reply, failing with `Timeout` if its
    /// terminating line does not arrive in time.
    pub async fn next_reply(&mut self) -> FtpResult<Reply> {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.read_reply())
            .await
            .map_err(|_| FtpError::Timeout("server reply".into()))?
    }

    async fn read_reply(&mut self) -> FtpResult<Reply> {
        let first = self.read_line().await?;
        let (code, sep, rest) =
            split_code(&first).ok_or_else(|| FtpError::MalformedReply(first.clone()))?;

        if sep != Some('-') {
            return Ok(Reply::new(code, rest));
        }

        let mut lines = vec![rest.to_string()];
        let prefix_dash = format!("{}-", code);
        loop {
            let line = self.read_line().await?;
            match split_code(&line) {
                Some((c, sep, rest)) if c == code && sep != Some('-') => {
                    lines.push(rest.to_string());
                    break;
                }
                _ if line.starts_with(&prefix_dash) => {
                    lines.push(line[prefix_dash.len()..].to_string());
                }
                _ => lines.push(line),
            }
        }

        Ok(Reply {
            code,
            multiline: true,
            text: lines,
        })
    }

    async fn read_line(&mut self) -> FtpResult<String> {
        match read_control_line(&mut self.inner, MAX_LINE_LENGTH).await {
            Ok(Some(line)) => {
                trace!("CC IN: {:?}", line);
                Ok(line)
            }
            Ok(None) => Err(FtpError::ConnectionClosed),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                Err(FtpError::MalformedReply("reply line too long".into()))
            }
            Err(e) => Err(FtpError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &'static [u8]) -> ReplyReader<&'static [u8]> {
        ReplyReader::new(bytes, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_single_line_reply() {
        let mut r = reader(b"220 Service ready\r\n");
        let reply = r.next_reply().await.unwrap();
        assert_eq!(reply.code, 220);
        assert!(!reply.multiline);
        assert_eq!(reply.text, vec!["Service ready".to_string()]);
    }

    #[tokio::test]
    async fn test_multiline_reply_accumulates_until_terminator() {
        let mut r = reader(
            b"150- listing starts\r\nfile-a\r\n 226 inside\r\n150-still going\r\n150 listing ends\r\n",
        );
        let reply = r.next_reply().await.unwrap();
        assert_eq!(reply.code, 150);
        assert!(reply.multiline);
        assert_eq!(
            reply.text,
            vec![
                " listing starts".to_string(),
                "file-a".to_string(),
                " 226 inside".to_string(),
                "still going".to_string(),
                "listing ends".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_consecutive_replies_are_read_lazily() {
        let mut r = reader(b"331 need password\r\n230 logged in\r\n");
        assert_eq!(r.next_reply().await.unwrap().code, 331);
        assert_eq!(r.next_reply().await.unwrap().code, 230);
        assert!(matches!(
            r.next_reply().await,
            Err(FtpError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_line_without_code_is_malformed() {
        let mut r = reader(b"hello there\r\n");
        assert!(matches!(
            r.next_reply().await,
            Err(FtpError::MalformedReply(_))
        ));

        let mut r = reader(b"22x nope\r\n");
        assert!(matches!(
            r.next_reply().await,
            Err(FtpError::MalformedReply(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_terminator_times_out() {
        let (client, mut server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut server, b"211-partial\r\n")
            .await
            .unwrap();
        let mut r = ReplyReader::new(
            tokio::io::BufReader::new(client),
            Duration::from_millis(50),
        );
        assert!(matches!(r.next_reply().await, Err(FtpError::Timeout(_))));
        drop(server);
    }

    #[tokio::test]
    async fn test_overlong_line_is_rejected() {
        let mut line = vec![b'2', b'0', b'0', b' '];
        line.extend(std::iter::repeat(b'x').take(MAX_LINE_LENGTH + 10));
        line.extend_from_slice(b"\r\n");
        let leaked: &'static [u8] = Box::leak(line.into_boxed_slice());
        let mut r = reader(leaked);
        assert!(matches!(
            r.next_reply().await,
            Err(FtpError::MalformedReply(_))
        ));
    }
}
