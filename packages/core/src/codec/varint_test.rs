//! Varint boundary tests.

use super::varint::{put_varint, read_varint, varint_len, VARINT_MAX};

#[test]
fn length_boundaries() {
    assert_eq!(varint_len(0), 1);
    assert_eq!(varint_len(127), 1);
    assert_eq!(varint_len(128), 2);
    assert_eq!(varint_len(16383), 2);
    assert_eq!(varint_len(16384), 3);
    assert_eq!(varint_len(VARINT_MAX), 3);
}

#[test]
fn round_trip_all_widths() {
    for v in [0u32, 1, 127, 128, 300, 16383, 16384, 100_000, VARINT_MAX] {
        let mut buf = Vec::new();
        put_varint(&mut buf, v).unwrap();
        assert_eq!(buf.len(), varint_len(v), "width for {}", v);
        let (decoded, consumed) = read_varint(&buf).unwrap();
        assert_eq!(decoded, v);
        assert_eq!(consumed, buf.len());
    }
}

#[test]
fn encoding_is_big_endian_grouped() {
    let mut buf = Vec::new();
    put_varint(&mut buf, 128).unwrap();
    assert_eq!(buf, vec![0x81, 0x00]);

    buf.clear();
    put_varint(&mut buf, 16384).unwrap();
    assert_eq!(buf, vec![0x81, 0x80, 0x00]);
}

#[test]
fn rejects_oversized_values() {
    let mut buf = Vec::new();
    assert!(put_varint(&mut buf, VARINT_MAX + 1).is_err());
}

#[test]
fn rejects_four_byte_sequences() {
    assert!(read_varint(&[0x81, 0x81, 0x81, 0x01]).is_err());
}

#[test]
fn rejects_truncated_input() {
    assert!(read_varint(&[0x81]).is_err());
    assert!(read_varint(&[]).is_err());
}
