//! Classification of remote directory entries.
//!
//! Plain FTP has no reliable way to tell files from directories. Two
//! best-effort strategies are offered here:
//!
//! * [`classify_by_size`]: an entry that answered SIZE is a file, anything
//!   else is taken to be a directory. Servers without SIZE, or servers that
//!   report sizes for directories, are misclassified.
//! * [`parse_list_line`]: reads the type out of Unix or DOS style LIST
//!   output. Formats it does not recognise yield [`EntryKind::Unknown`].
//!
//! Neither is authoritative.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Unknown,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: Option<u64>,
    pub kind: EntryKind,
}

/// The SIZE heuristic: a size means file, no size means directory.
pub fn classify_by_size(name: impl Into<String>, size: Option<u64>) -> RemoteEntry {
    let kind = match size {
        Some(_) => EntryKind::File,
        None => EntryKind::Directory,
    };
    RemoteEntry {
        name: name.into(),
        size,
        kind,
    }
}

/// Parses one line of LIST output. Returns `None` for lines that carry no
/// entry, such as the `total N` header.
pub fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with("total ") {
        return None;
    }

    parse_unix_line(line)
        .or_else(|| parse_dos_line(line))
        .or_else(|| {
            Some(RemoteEntry {
                name: line.trim().to_string(),
                size: None,
                kind: EntryKind::Unknown,
            })
        })
}

pub fn parse_listing(text: &str) -> Vec<RemoteEntry> {
    text.lines().filter_map(parse_list_line).collect()
}

// drwxr-xr-x 1 owner group 4096 Jan  1 00:00 name with spaces
fn parse_unix_line(line: &str) -> Option<RemoteEntry> {
    let mode = line.split_whitespace().next()?;
    if mode.len() != 10 {
        return None;
    }
    let kind = match mode.chars().next()? {
        'd' => EntryKind::Directory,
        '-' => EntryKind::File,
        'l' => EntryKind::Unknown,
        _ => return None,
    };

    // mode links owner group size month day time-or-year, then the name
    let (fields, name) = split_fields(line, 8)?;
    let size = fields[4].parse::<u64>().ok()?;
    let name = match kind {
        EntryKind::Unknown => name.split(" -> ").next().unwrap_or(name),
        _ => name,
    };

    Some(RemoteEntry {
        name: name.to_string(),
        size: (kind == EntryKind::File).then_some(size),
        kind,
    })
}

// 01-16-24  02:30PM       <DIR>          docs
// 01-16-24  02:30PM                 1234 file.txt
fn parse_dos_line(line: &str) -> Option<RemoteEntry> {
    let (fields, name) = split_fields(line, 3)?;
    if !fields[0].contains('-') || !fields[1].contains(':') {
        return None;
    }

    if fields[2].eq_ignore_ascii_case("<DIR>") {
        Some(RemoteEntry {
            name: name.to_string(),
            size: None,
            kind: EntryKind::Directory,
        })
    } else {
        Some(RemoteEntry {
            name: name.to_string(),
            size: Some(fields[2].parse().ok()?),
            kind: EntryKind::File,
        })
    }
}

/// Splits off `count` whitespace-separated fields and returns the remainder
/// untouched, so names keep their inner spacing.
fn split_fields(line: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = line.trim_start();
    for _ in 0..count {
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    if rest.is_empty() {
        return None;
    }
    Some((fields, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_heuristic() {
        assert_eq!(classify_by_size("a.txt", Some(3)).kind, EntryKind::File);
        assert_eq!(classify_by_size("pub", None).kind, EntryKind::Directory);
    }

    #[test]
    fn test_unix_lines() {
        let file = parse_list_line("-rw-r--r-- 1 ftp ftp         1234 Jan  1 00:00 my file.txt\r\n")
            .unwrap();
        assert_eq!(file.name, "my file.txt");
        assert_eq!(file.size, Some(1234));
        assert_eq!(file.kind, EntryKind::File);

        let dir = parse_list_line("drwxr-xr-x 2 ftp ftp 4096 Mar 10  2021 pub").unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);
        assert_eq!(dir.size, None);

        let link = parse_list_line("lrwxrwxrwx 1 ftp ftp 7 Jan  1 00:00 latest -> v1.2").unwrap();
        assert_eq!(link.name, "latest");
        assert_eq!(link.kind, EntryKind::Unknown);
    }

    #[test]
    fn test_dos_lines() {
        let dir = parse_list_line("01-16-24  02:30PM       <DIR>          docs").unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);
        let file = parse_list_line("01-16-24  02:30PM                 1234 file.txt").unwrap();
        assert_eq!(file.size, Some(1234));
        assert_eq!(file.name, "file.txt");
    }

    #[test]
    fn test_listing_skips_total_and_blank_lines() {
        let text = "total 8\r\n-rw-r--r-- 1 a b 1 Jan  1 00:00 x\r\n\r\nweird\r\n";
        let entries = parse_listing(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kind, EntryKind::Unknown);
        assert_eq!(entries[1].name, "weird");
    }
}
