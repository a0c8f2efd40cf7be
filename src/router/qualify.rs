//! Provider qualification of tool names.
//!
//! A qualified name is `<encoded provider id>__<bare tool name>`. Provider
//! ids built from ASCII alphanumerics, `-` and lone interior `_` are used
//! verbatim (`files__read_file`). Any other id is written as `_x` followed
//! by the lowercase hex of its UTF-8 bytes. An encoded id therefore never
//! contains the separator and never ends in `_`, so splitting on the first
//! separator is unambiguous even when the bare tool name contains `__`.
//! Verbatim ids never start with `_`, so the two spellings cannot collide.

/// Separator between the encoded provider id and the bare tool name.
pub const SEPARATOR: &str = "__";

const ESCAPE_PREFIX: &str = "_x";

fn is_verbatim(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !id.contains(SEPARATOR)
        && !id.starts_with('_')
        && !id.ends_with('_')
}

/// Encode a provider id for use as a qualification prefix.
pub fn encode_provider_id(id: &str) -> String {
    if is_verbatim(id) {
        return id.to_string();
    }
    let mut out = String::with_capacity(ESCAPE_PREFIX.len() + id.len() * 2);
    out.push_str(ESCAPE_PREFIX);
    for byte in id.as_bytes() {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Reverse `encode_provider_id`. `None` for a prefix no encoder produces.
pub fn decode_provider_id(encoded: &str) -> Option<String> {
    if let Some(hex) = encoded.strip_prefix(ESCAPE_PREFIX) {
        if hex.len() % 2 != 0
            || !hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return None;
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
            .collect::<Option<Vec<u8>>>()?;
        return String::from_utf8(bytes).ok();
    }
    is_verbatim(encoded).then(|| encoded.to_string())
}

/// Build the model-facing name for a provider's tool.
pub fn qualify(provider_id: &str, tool_name: &str) -> String {
    format!("{}{SEPARATOR}{tool_name}", encode_provider_id(provider_id))
}

/// Split a qualified name into `(provider_id, bare_tool_name)`.
///
/// Returns `None` when there is no separator or the prefix is not a valid
/// encoded provider id.
pub fn split_qualified(name: &str) -> Option<(String, String)> {
    let (prefix, tool) = name.split_once(SEPARATOR)?;
    let provider = decode_provider_id(prefix)?;
    Some((provider, tool.to_string()))
}
