//! MIDI variable-length quantities: 7 bits per byte, most significant group
//! first, high bit set on every byte except the last.

/// Longest encoding of a `u32`.
pub const MAX_LEN: usize = 5;

pub fn write(value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; MAX_LEN];
    let mut len = 0;
    let mut rest = value;
    loop {
        groups[len] = (rest & 0x7F) as u8;
        len += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i == 0 { 0x00 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

pub fn encode(value: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(4);
    write(value, &mut out);
    out
}

/// Reads one quantity from the front of `bytes`, returning the value and the
/// number of bytes consumed. `None` if the input ends mid-quantity or the
/// value does not fit a `u32`.
pub fn decode(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in bytes.iter().take(MAX_LEN).enumerate() {
        if value > (u32::MAX >> 7) {
            return None;
        }
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}
