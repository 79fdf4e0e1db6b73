//! LIST / MLSD payload parser.
//!
//! Supports three formats:
//! 1. **Unix-style** (`ls -l`): `-rwxr-xr-x 1 owner group 1234 Jan  1 12:00 file.txt`
//! 2. **MS-DOS / IIS-style**: `01-01-26  12:00AM       1234 file.txt`
//! 3. **MLSD facts** (RFC 3659): `type=file;size=1234;modify=20260101120000; file.txt`
//!
//! `total N` headers, blank lines, `.` and `..` are dropped. Lines that
//! match no format are skipped.

use crate::ftp::types::{EntryKind, RemoteEntry};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref UNIX_RE: Regex = Regex::new(
        r"(?x)
        ^([dlbcps-])([rwxsStTl-]{9})[+.@]?\s+    # type + permissions (+ACL marker)
        (\d+)\s+                                 # link count
        (\S+)\s+                                 # owner
        (?:(\S+)\s+)?                            # group (optional)
        (\d+)\s+                                 # size
        ([A-Za-z]{3}\s+\d{1,2}\s+(?:\d{1,2}:\d{2}|\d{4}))\s+   # date
        (.+)$                                    # name (possibly with -> target)
        "
    )
    .unwrap();
    static ref DOS_RE: Regex = Regex::new(
        r"(?x)
        ^(\d{2}-\d{2}-(?:\d{4}|\d{2}))\s+        # date
        (\d{1,2}:\d{2}\s*(?:[AaPp][Mm])?)\s+     # time
        (<DIR>|\d+)\s+                           # size or <DIR>
        (.+)$                                    # name
        "
    )
    .unwrap();
}

/// Parse a complete LIST or MLSD payload.
pub fn parse_listing(raw: &str) -> Vec<RemoteEntry> {
    raw.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty() && !is_total_line(l))
        .filter_map(|line| {
            let entry = parse_line(line);
            if entry.is_none() {
                log::debug!("Skipping unparseable listing line: {:?}", line);
            }
            entry
        })
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

fn is_total_line(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    parts.next() == Some("total")
        && parts.next().map_or(false, |n| n.chars().all(|c| c.is_ascii_digit()))
        && parts.next().is_none()
}

/// Parse a single listing line in any supported format.
pub fn parse_line(line: &str) -> Option<RemoteEntry> {
    if looks_like_mlsd(line) {
        if let Some(e) = parse_mlsd(line) {
            return Some(e);
        }
    }
    parse_unix(line).or_else(|| parse_dos(line))
}

fn looks_like_mlsd(line: &str) -> bool {
    match line.find(' ') {
        Some(pos) => line[..pos].contains('=') && line[..pos].contains(';'),
        None => false,
    }
}

fn entry(name: String, kind: EntryKind, line: &str) -> RemoteEntry {
    RemoteEntry {
        name,
        kind,
        size: 0,
        modified: None,
        permissions: None,
        owner: None,
        group: None,
        link_target: None,
        raw: line.to_string(),
    }
}

// ─── MLSD parser ─────────────────────────────────────────────────────

/// Parse an MLSD fact line: `fact1=val1;fact2=val2; filename`
fn parse_mlsd(line: &str) -> Option<RemoteEntry> {
    let pos = line.find(' ')?;
    let (facts_str, name) = (&line[..pos], &line[pos + 1..]);
    if name.is_empty() {
        return None;
    }

    let facts: HashMap<String, String> = facts_str
        .split(';')
        .filter_map(|seg| seg.split_once('='))
        .map(|(k, v)| (k.trim().to_lowercase(), v.to_string()))
        .collect();

    let kind = match facts.get("type").map(|s| s.to_lowercase()).as_deref() {
        Some("dir") => EntryKind::Directory,
        // current / parent directory
        Some("cdir") | Some("pdir") => return None,
        Some("file") => EntryKind::File,
        Some(t) if t.starts_with("os.unix=symlink") || t.starts_with("os.unix=slink") => {
            EntryKind::Symlink
        }
        _ => EntryKind::Other,
    };

    let mut e = entry(name.to_string(), kind, line);
    e.size = facts
        .get("size")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    e.modified = facts.get("modify").and_then(|v| parse_mlsd_time(v));
    e.permissions = facts
        .get("unix.mode")
        .or_else(|| facts.get("perm"))
        .cloned();
    e.owner = facts.get("unix.owner").cloned();
    e.group = facts.get("unix.group").cloned();
    Some(e)
}

/// MLSD timestamp: `YYYYMMDDHHmmSS[.fraction]`, always UTC.
fn parse_mlsd_time(s: &str) -> Option<DateTime<Utc>> {
    let base = s.get(..14)?;
    NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

// ─── Unix-style parser ───────────────────────────────────────────────

/// Parse a Unix `ls -l` line:
/// ```text
/// drwxr-xr-x   2 user group  4096 Jan  1 12:00 dirname
/// -rw-r--r--   1 user group  1234 Jan  1  2025 file.txt
/// lrwxrwxrwx   1 user group    42 Jan  1 12:00 link -> target
/// ```
fn parse_unix(line: &str) -> Option<RemoteEntry> {
    let caps = UNIX_RE.captures(line)?;

    let type_char = caps.get(1)?.as_str();
    let perms = format!("{}{}", type_char, caps.get(2)?.as_str());
    let name_raw = caps.get(8)?.as_str();

    let kind = match type_char {
        "d" => EntryKind::Directory,
        "l" => EntryKind::Symlink,
        "-" => EntryKind::File,
        _ => EntryKind::Other,
    };

    let (name, link_target) = match (kind, name_raw.find(" -> ")) {
        (EntryKind::Symlink, Some(pos)) => (
            name_raw[..pos].to_string(),
            Some(name_raw[pos + 4..].to_string()),
        ),
        _ => (name_raw.to_string(), None),
    };

    let mut e = entry(name, kind, line);
    e.size = caps.get(6)?.as_str().parse::<u64>().unwrap_or(0);
    e.modified = parse_unix_date(caps.get(7)?.as_str(), Utc::now());
    e.permissions = Some(perms);
    e.owner = caps.get(4).map(|m| m.as_str().to_string());
    e.group = caps.get(5).map(|m| m.as_str().to_string());
    e.link_target = link_target;
    Some(e)
}

/// Parse "Jan  1 12:00" (recent, year implied) or "Jan  1  2025".
///
/// A recent-form date that would land more than a day in the future belongs
/// to the previous year.
fn parse_unix_date(s: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalised = s.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalised.contains(':') {
        let year = now.year();
        let dt = NaiveDateTime::parse_from_str(
            &format!("{} {}", year, normalised),
            "%Y %b %d %H:%M",
        )
        .ok()?;
        let dt = Utc.from_utc_datetime(&dt);
        if dt > now + Duration::days(1) {
            let prev = NaiveDateTime::parse_from_str(
                &format!("{} {}", year - 1, normalised),
                "%Y %b %d %H:%M",
            )
            .ok()?;
            return Some(Utc.from_utc_datetime(&prev));
        }
        return Some(dt);
    }

    let date = NaiveDate::parse_from_str(&normalised, "%b %d %Y").ok()?;
    Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(0, 0, 0)?)))
}

// ─── MS-DOS / IIS parser ─────────────────────────────────────────────

/// Parse an MS-DOS / IIS style line:
/// ```text
/// 01-01-26  12:00AM       1234 file.txt
/// 01-01-2026  14:05      <DIR> Directory Name
/// ```
fn parse_dos(line: &str) -> Option<RemoteEntry> {
    let caps = DOS_RE.captures(line)?;

    let date_str = caps.get(1)?.as_str();
    let time_str = caps.get(2)?.as_str();
    let size_or_dir = caps.get(3)?.as_str();
    let name = caps.get(4)?.as_str().to_string();

    let (kind, size) = if size_or_dir == "<DIR>" {
        (EntryKind::Directory, 0)
    } else {
        (EntryKind::File, size_or_dir.parse::<u64>().unwrap_or(0))
    };

    let mut e = entry(name, kind, line);
    e.size = size;
    e.modified = parse_dos_date(date_str, time_str);
    Some(e)
}

fn parse_dos_date(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let date_fmt = if date.len() == 10 { "%m-%d-%Y" } else { "%m-%d-%y" };
    let date = NaiveDate::parse_from_str(date, date_fmt).ok()?;

    let time: String = time.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = time.to_ascii_uppercase();
    let time = if upper.ends_with("AM") || upper.ends_with("PM") {
        NaiveTime::parse_from_str(&upper, "%I:%M%p").ok()?
    } else {
        NaiveTime::parse_from_str(&upper, "%H:%M").ok()?
    };
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}
