//! PNG metadata extraction.
//!
//! A PNG is a signature followed by `length | type | data | crc` chunks.
//! The renderer stores diagram text, zlib-compressed and prefixed with the
//! keyword `plantuml`, in an ancillary `iTXt` chunk. The walk reads chunk
//! headers only, skipping payloads it does not care about, and stops at
//! `IEND` or the first matching chunk.

use std::io::Read;

use flate2::read::ZlibDecoder;

use super::{ExtractError, extract_metadata};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const KEYWORD: &[u8] = b"plantuml";

// Null separator, compression flag, compression method, and two empty
// null-terminated language/translated-keyword fields. The renderer always
// writes the two strings empty, so the offset is fixed.
const KEYWORD_TRAILER: usize = 5;

pub(crate) fn from_png(image: &[u8]) -> Result<String, ExtractError> {
    if image.len() < PNG_SIGNATURE.len() || image[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
        return Err(ExtractError::NotPng);
    }

    let mut offset = PNG_SIGNATURE.len();
    loop {
        let header = image
            .get(offset..offset + 8)
            .ok_or(ExtractError::TruncatedPng)?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let ctype = &header[4..8];
        let data_start = offset + 8;

        match ctype {
            b"iTXt" => {
                let data = image
                    .get(data_start..data_start + length)
                    .ok_or(ExtractError::TruncatedPng)?;
                if !data.starts_with(KEYWORD) {
                    // Some other producer's text chunk; skip data and CRC.
                    offset = data_start + length + 4;
                    continue;
                }

                let payload = data
                    .get(KEYWORD.len() + KEYWORD_TRAILER..)
                    .ok_or(ExtractError::TruncatedPng)?;
                let mut inflated = Vec::new();
                ZlibDecoder::new(payload)
                    .read_to_end(&mut inflated)
                    .map_err(ExtractError::Zlib)?;
                let metadata =
                    String::from_utf8(inflated).map_err(|_| ExtractError::Utf8)?;

                let text = extract_metadata(&metadata);
                if text.is_empty() {
                    return Err(ExtractError::NoMetadata);
                }
                return Ok(text);
            }
            b"IEND" => return Err(ExtractError::NoMetadata),
            _ => {
                // Skip data and CRC without touching the payload.
                offset = data_start + length + 4;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    use super::*;

    fn chunk(ctype: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len() + 12);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(ctype);
        out.extend_from_slice(data);
        // CRC is never verified by the walk.
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    fn plantuml_itxt(metadata: &str) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(metadata.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(KEYWORD);
        data.extend_from_slice(&[0, 1, 0, 0, 0]);
        data.extend_from_slice(&compressed);
        chunk(b"iTXt", &data)
    }

    fn png_with_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut image = PNG_SIGNATURE.to_vec();
        image.extend_from_slice(&chunk(b"IHDR", &[0; 13]));
        for c in chunks {
            image.extend_from_slice(c);
        }
        image.extend_from_slice(&chunk(b"IEND", &[]));
        image
    }

    const METADATA: &str =
        "@startuml\nBob -> Alice : hello\n@enduml\n\nPlantUML version 1.2022.2(Tue Jan 01)\n";

    #[test]
    fn finds_diagram_text_in_itxt_chunk() {
        let image = png_with_chunks(&[plantuml_itxt(METADATA)]);
        assert_eq!(
            from_png(&image).expect("extract"),
            "@startuml\nBob -> Alice : hello\n@enduml"
        );
    }

    #[test]
    fn skips_foreign_itxt_chunks() {
        let mut foreign = Vec::new();
        foreign.extend_from_slice(b"exif");
        foreign.extend_from_slice(&[0, 0, 0, 0, 0]);
        foreign.extend_from_slice(b"unrelated");
        let image = png_with_chunks(&[chunk(b"iTXt", &foreign), plantuml_itxt(METADATA)]);
        assert_eq!(
            from_png(&image).expect("extract"),
            "@startuml\nBob -> Alice : hello\n@enduml"
        );
    }

    #[test]
    fn stops_at_iend_without_metadata() {
        let image = png_with_chunks(&[]);
        assert!(matches!(from_png(&image), Err(ExtractError::NoMetadata)));
    }

    #[test]
    fn rejects_non_png_input() {
        assert!(matches!(
            from_png(b"<svg></svg>"),
            Err(ExtractError::NotPng)
        ));
    }

    #[test]
    fn rejects_truncated_chunks() {
        let mut image = PNG_SIGNATURE.to_vec();
        image.extend_from_slice(&[0, 0, 0, 64, b'i', b'T', b'X', b't']);
        assert!(matches!(
            from_png(&image),
            Err(ExtractError::TruncatedPng)
        ));
    }
}
