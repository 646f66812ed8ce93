//! Large-payload compression for the issue-listing tool.
//!
//! Listings with full descriptions and custom fields can run to hundreds of
//! kilobytes. Payloads whose compact serialization fits within
//! [`COMPRESSION_THRESHOLD`] pass through untouched; anything larger is
//! gzipped and base64-encoded into a small envelope that records both sizes,
//! leaving the client to decide whether inflating it is worth the tokens.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::{write::GzEncoder, Compression};
use serde_json::{json, Value};
use std::io::Write;

/// Compact-JSON byte length above which a listing is compressed.
pub const COMPRESSION_THRESHOLD: usize = 100 * 1024;

/// Serializes `value` compactly and compresses it when oversized.
///
/// Returns the text to ship as tool-result content together with the JSON
/// value backing the structured content: the original value when it fits,
/// or a `{compressed, data, originalSize, compressedSize}` envelope when it
/// does not. A payload of exactly [`COMPRESSION_THRESHOLD`] bytes stays
/// plain; one byte over compresses.
pub fn compress(value: Value) -> Result<(String, Value)> {
    let compact = serde_json::to_string(&value)?;
    if compact.len() <= COMPRESSION_THRESHOLD {
        return Ok((compact, value));
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(compact.as_bytes())?;
    let compressed = encoder.finish()?;
    let envelope = json!({
        "compressed": true,
        "data": BASE64.encode(&compressed),
        "originalSize": compact.len(),
        "compressedSize": compressed.len(),
    });
    let text = serde_json::to_string(&envelope)?;
    Ok((text, envelope))
}
