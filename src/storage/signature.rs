use hmac::{Hmac, Mac};
use itertools::Itertools;
use reqwest::{header::HeaderMap, Method, Url};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

// Standard headers taking part in the Shared Key string-to-sign, in order.
const SIGNED_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

pub fn string_to_sign(method: &Method, url: &Url, headers: &HeaderMap, account: &str) -> String {
    let mut lines = Vec::with_capacity(SIGNED_HEADERS.len() + 2);
    lines.push(method.as_str().to_owned());
    for name in SIGNED_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // A zero length must be signed as an empty string.
        if name == "content-length" && value == "0" {
            lines.push(String::new());
        } else {
            lines.push(value.to_owned());
        }
    }

    let canonical_headers = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?.trim())))
        .sorted_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(name, value)| format!("{}:{}", name, value))
        .join("\n");
    lines.push(canonical_headers);

    let mut resource = format!("/{}{}", account, url.path());
    for (name, values) in &url
        .query_pairs()
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .sorted()
        .group_by(|(k, _)| k.clone())
    {
        resource.push_str(&format!("\n{}:{}", name, values.map(|(_, v)| v).join(",")));
    }
    lines.push(resource);

    lines.join("\n")
}

pub fn sign(key: &[u8], string_to_sign: &str) -> String {
    // HMAC accepts keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC key of any size");
    mac.update(string_to_sign.as_bytes());
    base64::encode(mac.finalize().into_bytes())
}

pub fn authorization(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    account: &str,
    key: &[u8],
) -> String {
    let signature = sign(key, &string_to_sign(method, url, headers, account));
    format!("SharedKey {}:{}", account, signature)
}
