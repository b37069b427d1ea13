use paperback::bitmap;
use paperback::compression::CompressionLevel;
use paperback::config::{DecodeConfig, EncodeConfig};
use paperback::decode::{DecodeState, StepOutcome as DecodeOutcome};
use paperback::encode::{EncodeState, StepOutcome as EncodeOutcome};
use tempfile::NamedTempFile;

fn run_encode(path: &std::path::Path, config: EncodeConfig) -> Vec<paperback::MonoBitmap> {
    let mut state = EncodeState::printfile(path, config);
    let mut pages = Vec::new();
    loop {
        match state.next_step() {
            EncodeOutcome::Continue => {}
            EncodeOutcome::PageReady { bitmap, .. } => pages.push(bitmap),
            EncodeOutcome::Finished => break,
        }
    }
    assert!(state.error.is_none(), "encode failed: {:?}", state.error.map(|e| e.to_string()));
    pages
}

fn run_decode(pages: Vec<paperback::GrayBitmap>, config: DecodeConfig) -> Vec<paperback::RestoredFile> {
    let mut state = DecodeState::new(pages, config);
    let mut restored = Vec::new();
    loop {
        match state.next_step() {
            DecodeOutcome::Continue => {}
            DecodeOutcome::PageDone { .. } => {}
            DecodeOutcome::FileReady(file) => restored.push(file),
            DecodeOutcome::Finished => break,
        }
    }
    assert!(state.error.is_none(), "decode failed: {:?}", state.error.map(|e| e.to_string()));
    restored
}

#[test]
fn round_trips_a_small_uncompressed_unencrypted_file() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(temp_file.path(), b"HELLO\n").unwrap();

    let mut config = EncodeConfig::default();
    config.compression = CompressionLevel::None;
    config.encryption = false;
    config.redundancy = 5;
    config.printheader = false;
    config.printborder = false;

    let pages = run_encode(temp_file.path(), config);
    assert_eq!(pages.len(), 1);

    let gray_pages: Vec<_> = pages.iter().map(|p| p.to_gray()).collect();
    let restored = run_decode(gray_pages, DecodeConfig::default());

    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].bytes, b"HELLO\n");
}

#[test]
fn round_trips_a_larger_compressed_file_across_pages() {
    let temp_file = NamedTempFile::new().unwrap();
    // Repetitive-ish but not trivially empty, to exercise the compressor.
    let mut data = Vec::with_capacity(20_000);
    for i in 0..20_000u32 {
        data.push((i % 251) as u8);
    }
    std::fs::write(temp_file.path(), &data).unwrap();

    let mut config = EncodeConfig::default();
    config.compression = CompressionLevel::Fast;
    config.redundancy = 3;
    config.dotpercent = 90;
    config.printheader = false;
    config.printborder = false;

    let pages = run_encode(temp_file.path(), config);
    assert!(!pages.is_empty());

    let gray_pages: Vec<_> = pages.iter().map(|p| p.to_gray()).collect();
    let restored = run_decode(gray_pages, DecodeConfig::default());

    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].bytes, data);
}

#[test]
fn bmp_round_trip_preserves_rendered_pixels() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(temp_file.path(), b"roundtrip through a bmp file").unwrap();

    let mut config = EncodeConfig::default();
    config.compression = CompressionLevel::None;
    config.printheader = false;
    let pages = run_encode(temp_file.path(), config);
    let gray = pages[0].to_gray();

    let mut buf = Vec::new();
    bitmap::write_bmp_gray(&mut buf, &gray).unwrap();
    let read_back = bitmap::read_bmp_gray(&buf[..]).unwrap();

    let restored = run_decode(vec![read_back], DecodeConfig::default());
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].bytes, b"roundtrip through a bmp file");
}

#[test]
fn wrong_password_surfaces_integrity_failure_not_garbage() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(temp_file.path(), b"a secret payload worth protecting").unwrap();

    let mut config = EncodeConfig::default();
    config.compression = CompressionLevel::None;
    config.encryption = true;
    config.password = Some("correct horse battery".to_string());
    config.printheader = false;

    let pages = run_encode(temp_file.path(), config);
    let gray_pages: Vec<_> = pages.iter().map(|p| p.to_gray()).collect();

    let mut bad_config = DecodeConfig::default();
    bad_config.password = Some("wrong password".to_string());

    let mut state = DecodeState::new(gray_pages, bad_config);
    let mut restored = None;
    loop {
        match state.next_step() {
            DecodeOutcome::Continue | DecodeOutcome::PageDone { .. } => {}
            DecodeOutcome::FileReady(file) => restored = Some(file),
            DecodeOutcome::Finished => break,
        }
    }
    // The slot is retained (not force-completed with garbage) when the
    // password is wrong; no file should ever come back out.
    assert!(restored.is_none());
}
