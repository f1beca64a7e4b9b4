use quickcheck_macros::quickcheck;

use super::*;

fn header(width: u16, height: u16) -> Vec<u8> {
    let mut out = b"GIF89a".to_vec();
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    // global table with 2 entries
    out.extend_from_slice(&[0x80, 0, 0]);
    out.extend_from_slice(&[0, 0, 0, 255, 255, 255]);
    out
}

fn control(delay_cs: u16, transparent: bool) -> Vec<u8> {
    let mut out = vec![0x21, 0xF9, 0x04, u8::from(transparent)];
    out.extend_from_slice(&delay_cs.to_le_bytes());
    out.extend_from_slice(&[0, 0]);
    out
}

fn image(width: u16, height: u16) -> Vec<u8> {
    let mut out = vec![0x2C, 0, 0, 0, 0];
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.push(0);
    out.extend_from_slice(&[0x02, 0x02, 0x4C, 0x01, 0x00]);
    out
}

fn stream(frames: &[u16], width: u16, height: u16) -> Vec<u8> {
    let mut out = header(width, height);
    for &delay in frames {
        out.extend(control(delay, false));
        out.extend(image(width, height));
    }
    out.push(0x3B);
    out
}

#[test]
fn rejects_bad_signature() {
    let mut bytes = stream(&[10], 2, 1);
    bytes[3] = b'9';
    bytes[4] = b'0';
    assert_eq!(
        read_metadata(&bytes),
        Err(BitstreamError::Signature("GIF90a".to_owned()))
    );
    assert!(read_metadata(b"PNG").is_err());
    assert!(read_metadata(&[]).is_err());
}

#[test]
fn single_frame_with_half_second_delay() {
    let bytes = stream(&[50], 2, 1);
    let meta = read_metadata(&bytes).unwrap();

    assert_eq!(meta.width, 2);
    assert_eq!(meta.height, 1);
    assert_eq!(meta.frame_count, 1);
    assert!((meta.duration - 0.5).abs() < 1e-9);
    assert!((meta.fps - 2.0).abs() < 1e-9);
    assert_eq!(meta.file_size, 43);
    assert!(meta.complete);
    assert!(!meta.has_transparency);
    assert!(!meta.looping);
}

#[test]
fn accepts_gif87a() {
    let mut bytes = stream(&[10, 10], 4, 4);
    bytes[4] = b'7';
    let meta = read_metadata(&bytes).unwrap();
    assert_eq!(meta.frame_count, 2);
}

#[test]
fn accumulates_delays() {
    let meta = read_metadata(&stream(&[10, 20, 30], 8, 8)).unwrap();
    assert_eq!(meta.frame_count, 3);
    assert!(meta.duration_matches(0.6, 1e-9));
    assert!(meta.fps_matches(5.0, 1e-9));
}

#[test]
fn truncation_keeps_partial_metadata() {
    let bytes = stream(&[10, 10], 2, 1);
    let cut = &bytes[..bytes.len() - 6];
    let meta = read_metadata(cut).unwrap();
    assert_eq!(meta.frame_count, 2);
    assert!(!meta.complete);

    let meta = read_metadata(b"GIF89a\x10").unwrap();
    assert_eq!(meta.width, 0);
    assert_eq!(meta.frame_count, 0);
    assert_eq!(meta.fps, 0.0);
}

#[test]
fn no_delay_means_zero_fps() {
    let meta = read_metadata(&stream(&[0], 2, 1)).unwrap();
    assert_eq!(meta.frame_count, 1);
    assert_eq!(meta.duration, 0.0);
    assert_eq!(meta.fps, 0.0);
}

#[test]
fn detects_transparency_and_loop() {
    let mut bytes = header(2, 1);
    bytes.extend_from_slice(&[0x21, 0xFF, 0x0B]);
    bytes.extend_from_slice(b"NETSCAPE2.0");
    bytes.extend_from_slice(&[0x03, 0x01, 0x00, 0x00, 0x00]);
    bytes.extend(control(10, true));
    bytes.extend(image(2, 1));
    bytes.push(0x3B);

    let meta = read_metadata(&bytes).unwrap();
    assert!(meta.looping);
    assert!(meta.has_transparency);
    assert_eq!(meta.frame_count, 1);
    assert!(meta.complete);
}

#[test]
fn skips_local_color_tables_and_comments() {
    let mut bytes = header(2, 1);
    bytes.extend_from_slice(&[0x21, 0xFE, 0x03, b'h', b'e', b'y', 0x00]);
    bytes.extend(control(25, false));
    let mut local = image(2, 1);
    // four-entry local table
    local[9] = 0x81;
    local.splice(10..10, [0u8; 12]);
    bytes.extend(local);
    bytes.push(0x3B);

    let meta = read_metadata(&bytes).unwrap();
    assert_eq!(meta.frame_count, 1);
    assert!(meta.duration_matches(0.25, 1e-9));
    assert!(meta.complete);
}

#[test]
fn comparison_helpers() {
    let meta = read_metadata(&stream(&[50], 2, 1)).unwrap();
    assert!(meta.resolution_matches(2, 1, 0));
    assert!(meta.resolution_matches(3, 2, 1));
    assert!(!meta.resolution_matches(4, 1, 1));
    assert!(meta.aspect_ratio_preserved(200, 100, 0.01));
    assert!(!meta.aspect_ratio_preserved(100, 100, 0.01));
    assert!(meta.file_size_plausible());

    let bloated = BitstreamMetadata {
        file_size: 1 << 20,
        ..meta.clone()
    };
    assert!(!bloated.file_size_plausible());

    let empty = BitstreamMetadata {
        file_size: 10,
        ..meta
    };
    assert!(!empty.file_size_plausible());
}

#[quickcheck]
fn never_panics_after_valid_signature(tail: Vec<u8>) -> bool {
    let mut bytes = b"GIF89a".to_vec();
    bytes.extend(tail);
    read_metadata(&bytes).is_ok_and(|m| m.file_size == bytes.len())
}
