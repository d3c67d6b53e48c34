// src/process/encoding.rs
//
// Text recovery for publisher payloads. Japanese sources mix Shift_JIS,
// CP932, EUC-JP and UTF-8 (with and without BOM), often mislabelled.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, EUC_JP, SHIFT_JIS, UTF_8};
use tracing::{debug, warn};

use crate::error::{ErrorKind, Result};

/// Minimum share of non-replacement characters before a heuristic guess is trusted.
pub const MIN_GUESS_CONFIDENCE: f64 = 0.7;

const FALLBACK_CHAIN: [&Encoding; 3] = [UTF_8, SHIFT_JIS, EUC_JP];

/// Decode `bytes` to text. Returns the text and the encoding that produced it.
///
/// Order of attempts:
/// 1) BOM, if any.
/// 2) Strict decodes: `primary_label`, then UTF-8, Shift_JIS, EUC-JP.
/// 3) `chardetng` guess, accepted when its lossy decode is at least
///    [`MIN_GUESS_CONFIDENCE`] clean; otherwise a lossy decode with the primary.
pub fn decode(bytes: &[u8], primary_label: &str) -> Result<(String, &'static Encoding)> {
    if bytes.is_empty() {
        return Err(ErrorKind::Decode("empty payload".into()));
    }
    let primary = Encoding::for_label(primary_label.as_bytes())
        .ok_or_else(|| ErrorKind::Decode(format!("unknown encoding label {primary_label:?}")))?;

    // ─── 1) BOM ───
    if let Some((enc, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = enc.decode_without_bom_handling(&bytes[bom_len..]);
        debug!(encoding = enc.name(), "decoded via BOM");
        return Ok((text.into_owned(), enc));
    }

    // ─── 2) strict chain ───
    let mut tried: Vec<&'static Encoding> = Vec::with_capacity(4);
    for enc in std::iter::once(primary).chain(FALLBACK_CHAIN) {
        if tried.contains(&enc) {
            continue;
        }
        tried.push(enc);
        if let Some(text) = enc.decode_without_bom_handling_and_without_replacement(bytes) {
            if enc != primary {
                debug!(declared = primary.name(), used = enc.name(), "declared encoding did not fit");
            }
            return Ok((text.into_owned(), enc));
        }
    }

    // ─── 3) heuristic ───
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    Ok(accept_guess_or_primary(bytes, detector.guess(None, true), primary))
}

/// Take `guess` when its decode is clean enough, else decode lossily with
/// `primary`. Single-byte guesses map every byte and always pass; the lossy
/// branch is reached by multi-byte guesses that leave many invalid sequences.
fn accept_guess_or_primary(
    bytes: &[u8],
    guess: &'static Encoding,
    primary: &'static Encoding,
) -> (String, &'static Encoding) {
    let (text, _) = guess.decode_without_bom_handling(bytes);
    let confidence = clean_ratio(&text);
    if confidence >= MIN_GUESS_CONFIDENCE {
        warn!(encoding = guess.name(), confidence, "using heuristic encoding guess");
        return (text.into_owned(), guess);
    }

    let (text, _) = primary.decode_without_bom_handling(bytes);
    warn!(
        encoding = primary.name(),
        confidence, "no clean decode; substituting undecodable bytes"
    );
    (text.into_owned(), primary)
}

/// Share of characters that are not U+FFFD.
fn clean_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut bad = 0usize;
    for c in text.chars() {
        total += 1;
        if c == char::REPLACEMENT_CHARACTER {
            bad += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    1.0 - bad as f64 / total as f64
}
