// src/process/mod.rs
use encoding_rs::Encoding;
use tracing::{debug, info};

use crate::error::Result;
use crate::source::{ContentKind, Period};

pub mod archive;
pub mod date_parser;
pub mod encoding;
pub mod parser;
pub mod raw_table;
pub mod utils;

pub use parser::{parse, ParseHints};
pub use raw_table::RawTable;

/// Payload text ready for the tabular parser.
#[derive(Debug)]
pub struct DecodedPayload {
    pub text: String,
    pub encoding: &'static Encoding,
    /// Archive member the text came from, if the payload was an archive.
    pub member: Option<String>,
}

/// Turn fetched bytes into text.
///
/// Archives are detected by declared kind or by the ZIP signature, since some
/// publishers serve a zipped CSV under a `.csv` locator.
#[tracing::instrument(level = "debug", skip(bytes), fields(len = bytes.len()))]
pub fn decode_payload(
    bytes: &[u8],
    kind: ContentKind,
    encoding_label: &str,
    period: Period,
) -> Result<DecodedPayload> {
    let is_archive = match kind {
        ContentKind::ArchiveOfCsv => true,
        ContentKind::Csv if archive::looks_like_zip(bytes) => {
            info!("payload carries a ZIP signature; extracting");
            true
        }
        ContentKind::Csv => false,
    };

    if is_archive {
        let m = archive::extract(bytes, period, encoding_label)?;
        return Ok(DecodedPayload {
            text: m.text,
            encoding: m.encoding,
            member: Some(m.name),
        });
    }

    let (text, enc) = encoding::decode(bytes, encoding_label)?;
    debug!(encoding = enc.name(), chars = text.len(), "decoded payload");
    Ok(DecodedPayload {
        text,
        encoding: enc,
        member: None,
    })
}
