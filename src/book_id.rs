//! Reader identifiers.
//!
//! WeRead does not expose the numeric `bookId` in reader URLs. The web client
//! derives an obfuscated id from it, and a reader link only resolves when that
//! id is reproduced bit for bit.

use md5::{Digest as _, Md5};

const NUMERIC_CHUNK: usize = 9;
const MIN_LEN: usize = 20;

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Splits an id into its class tag and hex-encoded chunks.
///
/// All-digit ids are cut into runs of nine decimal digits, each rendered as
/// lowercase hex. Anything else becomes one chunk of per-character code
/// points.
fn transform(book_id: &str) -> (&'static str, Vec<String>) {
    if book_id.bytes().all(|b| b.is_ascii_digit()) {
        let chunks = book_id
            .as_bytes()
            .chunks(NUMERIC_CHUNK)
            .map(|digits| {
                // Nine ASCII digits always fit into a u64.
                let value = digits
                    .iter()
                    .fold(0_u64, |acc, d| acc * 10 + u64::from(d - b'0'));
                format!("{value:x}")
            })
            .collect();
        return ("3", chunks);
    }

    let encoded = book_id
        .chars()
        .map(|c| format!("{:x}", u32::from(c)))
        .collect::<String>();
    ("4", vec![encoded])
}

/// Computes the reader id for a WeRead `bookId`.
pub fn reader_id(book_id: &str) -> String {
    let digest = md5_hex(book_id);
    let (class, chunks) = transform(book_id);

    let mut out = String::with_capacity(32);
    out.push_str(&digest[..3]);
    out.push_str(class);
    out.push('2');
    out.push_str(&digest[30..32]);

    let encoded = chunks
        .iter()
        .map(|chunk| format!("{:02x}{chunk}", chunk.len()))
        .collect::<Vec<_>>()
        .join("g");
    out.push_str(&encoded);

    if out.len() < MIN_LEN {
        let missing = MIN_LEN - out.len();
        out.push_str(&digest[..missing]);
    }

    let check = md5_hex(&out);
    out.push_str(&check[..3]);
    out
}

/// Builds the web reader URL for a book.
pub fn reader_url(base_url: &str, book_id: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/web/reader/{}", reader_id(book_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_split_into_nine_digit_chunks() {
        let (class, chunks) = transform("12345678901");
        assert_eq!(class, "3");
        assert_eq!(chunks, vec!["75bcd15".to_owned(), "1".to_owned()]);
    }

    #[test]
    fn mixed_ids_encode_code_points() {
        let (class, chunks) = transform("CB_3");
        assert_eq!(class, "4");
        assert_eq!(chunks, vec!["43425f33".to_owned()]);
    }

    #[test]
    fn known_vectors() {
        assert_eq!(reader_id("12345678901"), "bfd32730775bcd15g011abd");
        assert_eq!(reader_id("695233"), "ce032b305a9bc1ce0b0dd2a");
        assert_eq!(reader_id("123456789"), "25f320b0775bcd1525f9647");
        assert_eq!(reader_id("0"), "cfc32da010cfcd208495488");
        assert_eq!(reader_id("CB_3Xz8D9"), "f0842571243425f33587a3844399a1");
    }

    #[test]
    fn reader_id_is_stable_lowercase_hex_with_separator() {
        for id in ["812443", "12345678901", "CB_3Xz8D9", "a"] {
            let first = reader_id(id);
            assert_eq!(first, reader_id(id));
            assert!(first.len() >= MIN_LEN + 3);
            assert!(
                first
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='g').contains(&c))
            );
        }
    }

    #[test]
    fn reader_url_joins_base() {
        assert_eq!(
            reader_url("https://weread.qq.com/", "695233"),
            "https://weread.qq.com/web/reader/ce032b305a9bc1ce0b0dd2a"
        );
    }
}
