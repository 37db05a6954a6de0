//! Body summaries for captured payloads.
//!
//! History keeps bodies as text. Anything that is not text, or is larger than
//! the configured limit, is replaced by a short placeholder. The client always
//! receives the real bytes; only the recorded copy is summarized.

const BINARY_PREFIXES: &[&str] = &["image/", "audio/", "video/", "font/"];

const BINARY_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/x-protobuf",
    "application/protobuf",
    "application/grpc",
    "application/wasm",
];

/// True for content types whose bodies are never treated as text
pub fn is_binary_content_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    BINARY_PREFIXES.iter().any(|p| media.starts_with(p)) || BINARY_TYPES.contains(&media.as_str())
}

/// Text to record for `body`: the body itself, or a placeholder.
pub fn summarize_body(body: &[u8], content_type: Option<&str>, limit: usize) -> String {
    if body.len() > limit {
        return format!("[payload too large: {} bytes, limit {} bytes]", body.len(), limit);
    }

    let media = content_type
        .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_string())
        .filter(|ct| !ct.is_empty());

    if media.as_deref().is_some_and(is_binary_content_type) {
        return binary_placeholder(body.len(), media.as_deref());
    }

    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => binary_placeholder(body.len(), media.as_deref()),
    }
}

fn binary_placeholder(len: usize, media: Option<&str>) -> String {
    format!("[binary payload: {} bytes, {}]", len, media.unwrap_or("unknown type"))
}
