//! Notice identifiers
//!
//! An id is a five-digit number (10000-99999) followed by three uppercase
//! ASCII letters, e.g. `48213QZK`. Collisions are not checked.

use rand::Rng;

/// Length of every generated id
pub const NOTICE_ID_LEN: usize = 8;

/// Generate a fresh notice id
pub fn generate_notice_id() -> String {
    let mut rng = rand::thread_rng();
    let number: u32 = rng.gen_range(10_000..=99_999);
    let letters: String = (0..3)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect();
    format!("{number}{letters}")
}

/// Whether `id` has the shape produced by [`generate_notice_id`]
pub fn is_notice_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == NOTICE_ID_LEN
        && bytes[0] != b'0'
        && bytes[..5].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_uppercase)
}
