// src/process/archive.rs
use encoding_rs::{Encoding, SHIFT_JIS};
use regex::Regex;
use std::io::{Cursor, Read};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::{ErrorKind, Result};
use crate::process::encoding;
use crate::source::Period;

/// Local-file header signature every ZIP starts with.
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Upper bound on one decompressed member.
pub const MAX_MEMBER_BYTES: u64 = 512 * 1024 * 1024;

pub fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Read at most `limit` bytes; more than that is an error.
fn read_bounded(reader: impl Read, limit: u64) -> std::result::Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut buf)
        .map_err(|e| format!("read failed: {e}"))?;
    if buf.len() as u64 > limit {
        return Err(format!("member exceeds {limit} bytes"));
    }
    Ok(buf)
}

/// The member chosen for a period, already decoded to text.
#[derive(Debug)]
pub struct ExtractedMember {
    pub name: String,
    pub text: String,
    pub encoding: &'static Encoding,
}

/// Filename patterns for `period`, most specific first.
pub fn member_patterns(period: Period) -> Vec<Regex> {
    let ym = period.year_month();
    let year = period.year;
    let mm = format!("{:02}", period.month);
    let m = period.month;
    [
        // 1) contiguous YYYYMM
        regex::escape(&ym),
        // 2) year and zero-padded month separated by something
        format!(r"{year}[^0-9](?:.*[^0-9])?{mm}(?:[^0-9]|$)"),
        // 3) localized month name, e.g. 4月 or 04月
        format!(r"(?:^|[^0-9])0?{m}月"),
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
}

/// Pick the member for `period` out of `names` (already filtered to eligible CSVs).
/// Falls back to the first name when nothing matches.
pub fn select_member(names: &[String], period: Period) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    for (rank, re) in member_patterns(period).iter().enumerate() {
        if let Some(idx) = names.iter().position(|n| re.is_match(n)) {
            debug!(member = %names[idx], rank, "archive member matched");
            return Some(idx);
        }
    }
    warn!(
        %period,
        candidates = ?names,
        "no archive member matches the period; using the first CSV"
    );
    Some(0)
}

/// Member names may be Shift_JIS on archives built by Japanese tooling.
fn decode_member_name(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => SHIFT_JIS.decode_without_bom_handling(raw).0.into_owned(),
    }
}

/// Open the archive in memory, select the CSV for `period` and decode it.
#[tracing::instrument(level = "debug", skip_all, fields(len = bytes.len(), period = %period))]
pub fn extract(bytes: &[u8], period: Period, encoding_label: &str) -> Result<ExtractedMember> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ErrorKind::Archive(format!("invalid archive: {e}")))?;

    // ─── 1) list eligible members ───
    let mut names = Vec::new();
    let mut indices = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ErrorKind::Archive(format!("entry #{i}: {e}")))?;
        let name = decode_member_name(entry.name_raw());
        if entry.is_file() && name.to_lowercase().ends_with(".csv") {
            names.push(name);
            indices.push(i);
        }
    }

    // ─── 2) choose ───
    let Some(pos) = select_member(&names, period) else {
        return Err(ErrorKind::Archive(format!(
            "no CSV members among {} entries",
            archive.len()
        )));
    };

    // ─── 3) read + decode ───
    let mut entry = archive
        .by_index(indices[pos])
        .map_err(|e| ErrorKind::Archive(format!("{}: {e}", names[pos])))?;
    // declared sizes are untrusted; never size buffers from them
    let buf = read_bounded(&mut entry, MAX_MEMBER_BYTES)
        .map_err(|e| ErrorKind::Archive(format!("{}: {e}", names[pos])))?;

    let (text, encoding) = encoding::decode(&buf, encoding_label)?;
    info!(member = %names[pos], encoding = encoding.name(), "extracted archive member");
    Ok(ExtractedMember {
        name: names.swap_remove(pos),
        text,
        encoding,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    pub(crate) fn build_zip(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            for (name, data) in members {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_year_month_beats_other_patterns() {
        let p = Period::new(2024, 4).unwrap();
        let list = names(&["4月.csv", "data_2024_04.csv", "eria_jukyu_202404.csv"]);
        assert_eq!(select_member(&list, p), Some(2));
    }

    #[test]
    fn separated_and_localized_patterns() {
        let p = Period::new(2024, 4).unwrap();
        assert_eq!(
            select_member(&names(&["jukyu_2024_03.csv", "jukyu_2024_04.csv"]), p),
            Some(1)
        );
        assert_eq!(
            select_member(&names(&["実績_3月.csv", "実績_4月.csv"]), p),
            Some(1)
        );
        // 14月 is not April
        assert_eq!(
            select_member(&names(&["x_14月.csv", "x_04月.csv"]), p),
            Some(1)
        );
    }

    #[test]
    fn unmatched_falls_back_to_first() {
        let p = Period::new(2024, 4).unwrap();
        assert_eq!(select_member(&names(&["a.csv", "b.csv"]), p), Some(0));
        assert_eq!(select_member(&[], p), None);
    }

    #[test]
    fn extract_skips_non_csv_members() {
        let zip = build_zip(&[
            ("readme.txt", &b"not data"[..]),
            ("eria_jukyu_202404.csv", &b"DATE,TIME\n2024/4/1,0:00\n"[..]),
        ]);
        assert!(looks_like_zip(&zip));
        let m = extract(&zip, Period::new(2024, 4).unwrap(), "shift_jis").unwrap();
        assert_eq!(m.name, "eria_jukyu_202404.csv");
        assert!(m.text.starts_with("DATE,TIME"));
    }

    /// Overwrite the zip64 uncompressed size of the first central directory entry.
    fn corrupt_zip64_size(zip: &mut [u8], size: u64) -> bool {
        let Some(cd) = zip.windows(4).position(|w| w == b"PK\x01\x02") else {
            return false;
        };
        let le16 = |b: &[u8], at: usize| u16::from_le_bytes([b[at], b[at + 1]]) as usize;
        let name_len = le16(&*zip, cd + 28);
        let extra_len = le16(&*zip, cd + 30);
        let mut at = cd + 46 + name_len;
        let end = at + extra_len;
        while at + 4 <= end {
            let (id, len) = (le16(&*zip, at), le16(&*zip, at + 2));
            if id == 0x0001 && len >= 8 {
                zip[at + 4..at + 12].copy_from_slice(&size.to_le_bytes());
                return true;
            }
            at += 4 + len;
        }
        false
    }

    #[test]
    fn huge_declared_size_does_not_panic() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Stored)
                .large_file(true);
            zip.start_file("eria_jukyu_202404.csv", options).unwrap();
            zip.write_all(b"DATE,TIME\n").unwrap();
            zip.finish().unwrap();
        }
        assert!(corrupt_zip64_size(&mut buf, u64::MAX));

        match extract(&buf, Period::new(2024, 4).unwrap(), "utf-8") {
            Ok(m) => assert_eq!(m.name, "eria_jukyu_202404.csv"),
            Err(ErrorKind::Archive(_)) => {}
            Err(other) => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn oversized_member_is_rejected() {
        assert_eq!(read_bounded(&b"abcd"[..], 4).unwrap(), b"abcd");
        assert!(read_bounded(&b"abcde"[..], 4).is_err());
    }

    #[test]
    fn archive_errors() {
        let p = Period::new(2024, 4).unwrap();
        assert!(matches!(
            extract(b"PK\x03\x04garbage", p, "utf-8"),
            Err(ErrorKind::Archive(_))
        ));
        let only_text = build_zip(&[("readme.txt", &b"x"[..])]);
        assert!(matches!(
            extract(&only_text, p, "utf-8"),
            Err(ErrorKind::Archive(_))
        ));
    }
}
