//! Raw CBOR header emission for documents assembled from byte ranges.

use crate::token::Major;

/// Writes the shortest header for `major` carrying `arg`.
pub fn write_header(out: &mut Vec<u8>, major: Major, arg: u64) {
    let prefix = major.bits() << 5;
    if arg < 24 {
        out.push(prefix | arg as u8);
    } else if arg <= u64::from(u8::MAX) {
        out.push(prefix | 24);
        out.push(arg as u8);
    } else if arg <= u64::from(u16::MAX) {
        out.push(prefix | 25);
        out.extend_from_slice(&(arg as u16).to_be_bytes());
    } else if arg <= u64::from(u32::MAX) {
        out.push(prefix | 26);
        out.extend_from_slice(&(arg as u32).to_be_bytes());
    } else {
        out.push(prefix | 27);
        out.extend_from_slice(&arg.to_be_bytes());
    }
}

pub fn write_map_header(out: &mut Vec<u8>, pairs: usize) {
    write_header(out, Major::Map, pairs as u64);
}

pub fn write_array_header(out: &mut Vec<u8>, items: usize) {
    write_header(out, Major::Array, items as u64);
}

pub fn write_text(out: &mut Vec<u8>, text: &str) {
    write_header(out, Major::Text, text.len() as u64);
    out.extend_from_slice(text.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn headers_match_serde_cbor() {
        for len in [0usize, 5, 23, 24, 255, 256, 70_000] {
            let text = "x".repeat(len);
            let mut out = Vec::new();
            write_text(&mut out, &text);
            assert_eq!(out, serde_cbor::to_vec(&text).unwrap(), "len {len}");
        }
    }

    #[test]
    fn assembled_document_decodes() {
        let mut out = Vec::new();
        write_map_header(&mut out, 2);
        write_text(&mut out, "name");
        write_text(&mut out, "brook");
        write_text(&mut out, "list");
        write_array_header(&mut out, 2);
        out.extend_from_slice(&serde_cbor::to_vec(&1u8).unwrap());
        out.extend_from_slice(&serde_cbor::to_vec(&true).unwrap());

        let decoded: Value = serde_cbor::from_slice(&out).unwrap();
        assert_eq!(decoded, json!({"name": "brook", "list": [1, true]}));
    }
}
