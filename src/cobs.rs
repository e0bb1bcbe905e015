// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Variant consistent-overhead byte stuffing used by SPIKE Prime hubs.
//!
//! Frames end with a single 0x02 delimiter. Because the transparency set
//! is {0x00, 0x01, 0x02} rather than just the delimiter, a code byte packs
//! both the removed byte's value and the distance to the next removed
//! byte: `code = value * 84 + block_len + 2`. Blocks longer than 84 bytes
//! are broken with the 0xFF "no delimiter" code. After stuffing, every
//! byte is XORed with 0x03, which keeps the delimiter unique on the wire;
//! a raw leading 0x01 may precede a frame to mark it high-priority.

/// Frame delimiter, appended once per packed frame.
pub const DELIMITER: u8 = 0x02;
/// Code byte meaning "84 literal bytes follow, none of them stuffed".
pub const NO_DELIMITER: u8 = 0xFF;
/// Mask applied to every stuffed byte before framing.
pub const XOR_MASK: u8 = 0x03;
/// Raw prefix marking a high-priority frame.
pub const PRIORITY: u8 = 0x01;
/// Longest run of literal bytes a single code byte can describe.
pub const MAX_BLOCK_SIZE: usize = 84;

const COBS_CODE_OFFSET: u8 = 2;

/// Stuff `data` so that no byte of the output is in {0x00, 0x01, 0x02}.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(data.len() + data.len() / MAX_BLOCK_SIZE + 1);

    let mut code_index = buffer.len();
    buffer.push(NO_DELIMITER);
    let mut block = 1usize;

    for &byte in data {
        if byte > DELIMITER {
            buffer.push(byte);
            block += 1;
        }
        if byte <= DELIMITER || block > MAX_BLOCK_SIZE {
            if byte <= DELIMITER {
                buffer[code_index] =
                    byte * MAX_BLOCK_SIZE as u8 + block as u8 + COBS_CODE_OFFSET;
            }
            code_index = buffer.len();
            buffer.push(NO_DELIMITER);
            block = 1;
        }
    }

    buffer
}

/// Reverse [`encode`]. Truncated or garbage input yields whatever prefix
/// decodes cleanly; it never panics.
pub fn decode(data: &[u8]) -> Vec<u8> {
    fn unescape(code: u8) -> (Option<u8>, usize) {
        if code == NO_DELIMITER {
            return (None, MAX_BLOCK_SIZE + 1);
        }
        let adjusted = code.wrapping_sub(COBS_CODE_OFFSET);
        let mut value = adjusted / MAX_BLOCK_SIZE as u8;
        let mut block = (adjusted % MAX_BLOCK_SIZE as u8) as usize;
        if block == 0 {
            block = MAX_BLOCK_SIZE;
            value = value.wrapping_sub(1);
        }
        (Some(value), block)
    }

    let Some((&first, rest)) = data.split_first() else {
        return Vec::new();
    };

    let mut buffer = Vec::with_capacity(data.len());
    let (mut value, mut block) = unescape(first);

    for &byte in rest {
        block -= 1;
        if block > 0 {
            buffer.push(byte);
            continue;
        }
        if let Some(value) = value {
            buffer.push(value);
        }
        (value, block) = unescape(byte);
    }

    buffer
}

/// Stuff, mask, and frame one outbound payload.
pub fn pack(data: &[u8]) -> Vec<u8> {
    let mut frame = encode(data);
    for byte in frame.iter_mut() {
        *byte ^= XOR_MASK;
    }
    frame.push(DELIMITER);
    frame
}

/// Reverse [`pack`]. Accepts an optional leading [`PRIORITY`] byte.
/// A frame without the trailing delimiter decodes to nothing.
pub fn unpack(data: &[u8]) -> Vec<u8> {
    let data = match data.split_last() {
        Some((&DELIMITER, body)) => body,
        _ => return Vec::new(),
    };
    let data = match data.split_first() {
        Some((&PRIORITY, body)) => body,
        _ => data,
    };

    let unmasked: Vec<u8> = data.iter().map(|byte| byte ^ XOR_MASK).collect();
    decode(&unmasked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_simple() {
        // a run without transparency bytes keeps the 0xFF lead code
        assert_eq!(encode(&[0x10, 0x20, 0x30]), vec![0xFF, 0x10, 0x20, 0x30]);
    }

    #[test]
    fn encode_escapes() {
        // 0x00 at the head of the stream: code 0*84+1+2
        assert_eq!(encode(&[0x00]), vec![0x03, 0xFF]);
        // 0x01: code 1*84+1+2
        assert_eq!(encode(&[0x01]), vec![0x57, 0xFF]);
        // 0x02: code 2*84+1+2
        assert_eq!(encode(&[0x02]), vec![0xAB, 0xFF]);
    }

    #[test]
    fn decode_inverts_encode() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x00],
            vec![0x02; 10],
            vec![0x00, 0x01, 0x02, 0x03],
            (0u8..=255).collect(),
            vec![0x42; 500],
            (0u8..=255).cycle().take(10_000).collect(),
        ];
        for case in cases {
            assert_eq!(decode(&encode(&case)), case, "len {}", case.len());
        }
    }

    #[test]
    fn saturated_blocks() {
        // exactly one full block of literals
        let data = vec![0x10; MAX_BLOCK_SIZE];
        assert_eq!(decode(&encode(&data)), data);
        // a delimiter straight after a full block
        let mut data = vec![0x10; MAX_BLOCK_SIZE];
        data.push(0x02);
        assert_eq!(decode(&encode(&data)), data);
        // two full blocks and change
        let data = vec![0x10; MAX_BLOCK_SIZE * 2 + 5];
        assert_eq!(decode(&encode(&data)), data);
    }

    #[test]
    fn pack_frames_once() {
        let cases: Vec<Vec<u8>> = vec![
            vec![0x00, 0x01, 0x02, 0x03],
            vec![0x02; 300],
            (0u8..=255).cycle().take(10_000).collect(),
        ];
        for case in cases {
            let packed = pack(&case);
            assert_eq!(packed.last(), Some(&DELIMITER));
            let delimiters =
                packed.iter().filter(|&&byte| byte == DELIMITER).count();
            assert_eq!(delimiters, 1, "delimiter must appear exactly once");
            assert!(packed[..packed.len() - 1]
                .iter()
                .all(|&byte| byte != PRIORITY && byte != DELIMITER));
            assert_eq!(unpack(&packed), case);
        }
    }

    #[test]
    fn unpack_tolerates_garbage() {
        // missing delimiter
        assert_eq!(unpack(&[0xFF ^ 0x03, 0x10 ^ 0x03]), Vec::<u8>::new());
        assert_eq!(unpack(&[]), Vec::<u8>::new());
        // delimiter alone
        assert_eq!(unpack(&[DELIMITER]), Vec::<u8>::new());
        // truncated mid-block must not panic
        let mut packed = pack(&[0x00, 0x55, 0x66, 0x77]);
        packed.truncate(2);
        packed.push(DELIMITER);
        let _ = unpack(&packed);
    }

    #[test]
    fn priority_prefix() {
        let payload = vec![0x11, 0x22, 0x00];
        let mut packed = pack(&payload);
        packed.insert(0, PRIORITY);
        assert_eq!(unpack(&packed), payload);
    }
}
