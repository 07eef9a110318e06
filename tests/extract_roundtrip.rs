//! Facade-level extraction tests over synthesized renderer output: the
//! embedded metadata carries the original diagram and, when macros were
//! used, a second expanded copy.

#![cfg(unix)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use tempfile::TempDir;

use umlpipe::application::error::AppError;
use umlpipe::application::render::{DirectRenderer, PoolConfig, RenderPool, RenderService};
use umlpipe::domain::diagram;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const ORIGINAL: &str = "@startuml\n!include <tupadr3/common>\nrectangle Foo\n@enduml";
const EXPANDED: &str = "@startuml\nhide stereotype\nrectangle Foo\n@enduml";

fn chunk(ctype: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 12);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(ctype);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}

/// Build a minimal PNG carrying renderer metadata the way PlantUML writes
/// it: a `plantuml`-keyword iTXt chunk with zlib-compressed text ending in
/// the version banner.
fn png_with_metadata(metadata: &str) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(metadata.as_bytes()).expect("compress");
    let compressed = encoder.finish().expect("finish");

    let mut data = Vec::new();
    data.extend_from_slice(b"plantuml");
    data.extend_from_slice(&[0, 1, 0, 0, 0]);
    data.extend_from_slice(&compressed);

    let mut image = PNG_SIGNATURE.to_vec();
    image.extend_from_slice(&chunk(b"IHDR", &[0; 13]));
    image.extend_from_slice(&chunk(b"iTXt", &data));
    image.extend_from_slice(&chunk(b"IEND", &[]));
    image
}

fn metadata_with_macro_expansion() -> String {
    format!("{ORIGINAL}\n{EXPANDED}\n\nPlantUML version 1.2022.2(Tue Jan 01)\n")
}

fn service(dir: &TempDir) -> RenderService {
    let script = dir.path().join("fake-plantuml");
    fs::write(&script, "#!/bin/sh\nwhile IFS= read -r line; do :; done\n").expect("write script");
    let mut perms = fs::metadata(&script).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).expect("set perms");

    let pool = RenderPool::start(PoolConfig {
        workers: 1,
        render_timeout: Duration::from_secs(5),
        java_path: script,
        plantuml_path: PathBuf::from("unused.jar"),
        search_path: dir.path().join("search"),
        pipe_delimiter: "XXXPUMLXXX".to_string(),
    })
    .expect("start pool");
    RenderService::new(Arc::new(DirectRenderer::new(pool)), None)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extract_returns_the_original_diagram() {
    let dir = TempDir::new().expect("temp dir");
    let service = service(&dir);
    let image = png_with_metadata(&metadata_with_macro_expansion());

    let diagram = service.extract(&image, false).expect("extract");
    assert_eq!(diagram.source, diagram::normalize(ORIGINAL));
    assert!(diagram.source.contains("!include"));

    // The short code must expand back to the same text.
    assert_eq!(
        service.expand(&diagram.encoded).expect("expand"),
        diagram.source
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extract_can_return_the_macro_expanded_diagram() {
    let dir = TempDir::new().expect("temp dir");
    let service = service(&dir);
    let image = png_with_metadata(&metadata_with_macro_expansion());

    let diagram = service.extract(&image, true).expect("extract");
    assert_eq!(diagram.source, diagram::normalize(EXPANDED));
    assert!(!diagram.source.contains("!include"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extract_falls_back_to_original_when_no_expansion_present() {
    let dir = TempDir::new().expect("temp dir");
    let service = service(&dir);
    let metadata = format!("{ORIGINAL}\n\nPlantUML version 1.2022.2(Tue Jan 01)\n");
    let image = png_with_metadata(&metadata);

    let diagram = service.extract(&image, true).expect("extract");
    assert_eq!(diagram.source, diagram::normalize(ORIGINAL));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extract_of_unknown_bytes_is_not_found() {
    let dir = TempDir::new().expect("temp dir");
    let service = service(&dir);

    let err = service
        .extract(b"neither png nor svg", false)
        .expect_err("garbage must not extract");
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
}
