//! PlantUML text encoding: raw DEFLATE plus a rotated base64 alphabet.
//!
//! The "short code" is the URL-safe surrogate for diagram source text used
//! across the PlantUML ecosystem. It is plain DEFLATE (no zlib or gzip
//! wrapper) of the UTF-8 source, base64-encoded over an alphabet where
//! digits precede letters and `+`/`/` become `-`/`_`.
//!
//! Different deflate implementations produce different but mutually
//! compatible streams, so [`decode`] accepts any conformant stream while
//! [`encode`] is only required to be deterministic within one build.

use std::io::{Read, Write};
use std::sync::LazyLock;

use base64::Engine;
use base64::alphabet::Alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use thiserror::Error;

const PLANTUML_ALPHABET: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

static ENGINE: LazyLock<GeneralPurpose> = LazyLock::new(|| {
    let alphabet = Alphabet::new(PLANTUML_ALPHABET).expect("alphabet is 64 unique ASCII chars");
    // Upstream servers emit both padded and unpadded short codes.
    let config = GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent);
    GeneralPurpose::new(&alphabet, config)
});

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("short code is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("short code payload is not a valid deflate stream: {0}")]
    Inflate(std::io::Error),
    #[error("failed to compress diagram: {0}")]
    Deflate(std::io::Error),
    #[error("decompressed diagram is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Encode diagram source text into its short-code form.
pub fn encode(source: &str) -> Result<String, CodecError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(source.as_bytes())
        .map_err(CodecError::Deflate)?;
    let compressed = encoder.finish().map_err(CodecError::Deflate)?;
    Ok(ENGINE.encode(compressed))
}

/// Decode a short code back into diagram source text.
pub fn decode(short: &str) -> Result<String, CodecError> {
    let compressed = ENGINE.decode(short.trim())?;
    let mut inflated = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .read_to_end(&mut inflated)
        .map_err(CodecError::Inflate)?;
    Ok(String::from_utf8(inflated)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "@startuml\nBob -> Alice : hello\n@enduml";

    #[test]
    fn round_trips_source_text() {
        let short = encode(SOURCE).expect("encode");
        assert_eq!(decode(&short).expect("decode"), SOURCE);
    }

    #[test]
    fn round_trips_multibyte_text() {
        let source = "@startuml\nBob -> Alice : héllo → wörld\n@enduml";
        let short = encode(source).expect("encode");
        assert_eq!(decode(&short).expect("decode"), source);
    }

    #[test]
    fn encode_is_deterministic() {
        assert_eq!(encode(SOURCE).unwrap(), encode(SOURCE).unwrap());
    }

    #[test]
    fn decodes_upstream_plantuml_output() {
        // Produced by the reference PlantUML server. Its deflate stream
        // differs byte-for-byte from ours but must decode identically.
        let short = "SoWkIImgAStDuNBAJrBGjLDmpCbCJbMmKiX8pSd9vt98pKi1IW80";
        assert_eq!(decode(short).expect("decode"), SOURCE);
    }

    #[test]
    fn decodes_padded_short_codes() {
        let short = "SYWkIImgAStDuNBAJrBGjLDmpCbCJbMmKiX8pSd9vt98pKifpSq11000__y=";
        assert_eq!(decode(short).expect("decode"), SOURCE);
    }

    #[test]
    fn rejects_characters_outside_the_alphabet() {
        assert!(matches!(decode("not!valid"), Err(CodecError::Base64(_))));
    }

    #[test]
    fn rejects_payload_that_is_not_deflate() {
        // Valid base64 for the single byte 0xff, which names a reserved
        // deflate block type.
        assert!(matches!(decode("_m=="), Err(CodecError::Inflate(_))));
    }
}
