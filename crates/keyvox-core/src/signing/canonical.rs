//! Canonical request construction
//!
//! Pure functions that turn request parts into the canonical strings the
//! signature is computed over.

use std::collections::BTreeMap;
use sha2::{Digest, Sha256};
use url::Url;

/// Headers that proxies and clients commonly rewrite; never signed
pub const UNSIGNED_HEADERS: [&str; 3] = ["connection", "user-agent", "accept-encoding"];

/// Hex SHA-256 of `data`
pub fn hash_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode everything except the unreserved set `A-Z a-z 0-9 - _ . ~`
pub fn uri_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Request path exactly as given, `/` when empty
pub fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Query parameters encoded, sorted by key then value, joined with `&`
pub fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Trim a header value and collapse internal whitespace runs to one space
pub fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical header block and the `;`-joined signed header list.
///
/// Names are lower-cased, repeated headers are comma-joined in order, and
/// [`UNSIGNED_HEADERS`] are skipped.
pub fn canonical_headers(headers: &[(String, String)]) -> (String, String) {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.trim().to_ascii_lowercase();
        if UNSIGNED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        grouped
            .entry(name)
            .or_default()
            .push(normalize_header_value(value));
    }

    let block = grouped
        .iter()
        .map(|(name, values)| format!("{}:{}\n", name, values.join(",")))
        .collect::<String>();
    let signed = grouped.keys().cloned().collect::<Vec<_>>().join(";");

    (block, signed)
}

/// `METHOD\nURI\nQUERY\nHEADERS\nSIGNEDHEADERS\nPAYLOADHASH`
pub fn canonical_request(
    method: &str,
    url: &Url,
    headers: &[(String, String)],
    payload_hash: &str,
) -> (String, String) {
    let (header_block, signed_headers) = canonical_headers(headers);
    let request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        canonical_uri(url),
        canonical_query(url),
        header_block,
        signed_headers,
        payload_hash
    );
    (request, signed_headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_payload_hash() {
        assert_eq!(
            hash_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("abc-_.~XYZ019"), "abc-_.~XYZ019");
        assert_eq!(uri_encode("a b/c=d"), "a%20b%2Fc%3Dd");
        assert_eq!(uri_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_canonical_uri() {
        let url = Url::parse("https://polly.us-east-1.amazonaws.com/v1/speech").unwrap();
        assert_eq!(canonical_uri(&url), "/v1/speech");

        let root = Url::parse("https://iam.amazonaws.com").unwrap();
        assert_eq!(canonical_uri(&root), "/");
    }

    #[test]
    fn test_canonical_query_sorted_and_encoded() {
        let url = Url::parse("https://example.com/?b=2&a=z&a=y&c=hello%20world&flag").unwrap();
        assert_eq!(canonical_query(&url), "a=y&a=z&b=2&c=hello%20world&flag=");

        let none = Url::parse("https://example.com/path").unwrap();
        assert_eq!(canonical_query(&none), "");
    }

    #[test]
    fn test_canonical_headers() {
        let headers = pairs(&[
            ("X-Amz-Date", "20150830T123600Z"),
            ("Host", "  iam.amazonaws.com "),
            ("User-Agent", "keyvox/0.1"),
            ("My-Header", "a   b \t c"),
            ("my-header", "second"),
            ("Connection", "keep-alive"),
        ]);

        let (block, signed) = canonical_headers(&headers);
        assert_eq!(
            block,
            "host:iam.amazonaws.com\nmy-header:a b c,second\nx-amz-date:20150830T123600Z\n"
        );
        assert_eq!(signed, "host;my-header;x-amz-date");
    }

    #[test]
    fn test_canonical_request_matches_published_example() {
        let url = Url::parse("https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08").unwrap();
        let headers = pairs(&[
            ("Content-Type", "application/x-www-form-urlencoded; charset=utf-8"),
            ("Host", "iam.amazonaws.com"),
            ("X-Amz-Date", "20150830T123600Z"),
        ]);

        let (request, signed) = canonical_request("get", &url, &headers, &hash_hex(b""));
        assert_eq!(signed, "content-type;host;x-amz-date");
        assert_eq!(
            hash_hex(request.as_bytes()),
            "f536975d06c0309214f805bb90ccff089219ecd68b2577efef23edd43b7e1a59"
        );
    }
}
