use bytes::Bytes;
use strand_wire::{Frame, HeaderField};

// (description, frame, expected hex)
fn vectors() -> Vec<(&'static str, Frame, &'static str)> {
    vec![
        ("empty data", Frame::Data(Bytes::new()), "0000"),
        (
            "short data",
            Frame::Data(Bytes::from_static(b"abcd")),
            "000461626364",
        ),
        (
            "status only",
            Frame::Headers(vec![HeaderField::new(":status", "200")]),
            "010c073a73746174757303323030",
        ),
        (
            "two byte length",
            Frame::Data(Bytes::from(vec![0x5a; 64])),
            concat!(
                "004040",
                "5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a",
                "5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a"
            ),
        ),
    ]
}

#[test]
fn vectors_match_frame_encoding() {
    for (name, frame, hex) in vectors() {
        let expected = hex_to_bytes(hex);
        let encoded = frame.to_bytes().expect("encode");
        assert_eq!(encoded.as_ref(), expected.as_slice(), "encode mismatch for {name}");

        let (decoded, consumed) = Frame::decode(&expected, 1024)
            .expect("decode")
            .expect("complete frame");
        assert_eq!(consumed, expected.len(), "length mismatch for {name}");
        assert_eq!(decoded, frame, "decode mismatch for {name}");
    }
}

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    assert!(hex.len().is_multiple_of(2), "hex length must be even");
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = from_hex_char(pair[0]) << 4;
            let lo = from_hex_char(pair[1]);
            hi | lo
        })
        .collect()
}

fn from_hex_char(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex char"),
    }
}
