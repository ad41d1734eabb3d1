//! Test helpers for building authorized-key lines.

use base64::Engine as _;

/// Build a one-line key whose blob embeds `inner_tag` per RFC 4253, followed
/// by `material`.  Passing different outer and inner tags produces a line
/// with an inconsistent header.
pub(crate) fn key_line(
    tag: &str,
    inner_tag: &str,
    material: &[u8],
    comment: Option<&str>,
) -> String {
    let mut blob = Vec::new();
    blob.extend_from_slice(&(inner_tag.len() as u32).to_be_bytes());
    blob.extend_from_slice(inner_tag.as_bytes());
    blob.extend_from_slice(material);
    let b64 = base64::engine::general_purpose::STANDARD.encode(&blob);
    match comment {
        Some(c) => format!("{tag} {b64} {c}"),
        None => format!("{tag} {b64}"),
    }
}

/// A well-formed Ed25519 key line.
pub(crate) fn ed25519_line(material: &[u8; 32], comment: Option<&str>) -> String {
    key_line("ssh-ed25519", "ssh-ed25519", material, comment)
}
