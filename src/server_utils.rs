use crate::types::Vec2;

const MAX_KEY_LEN: usize = 64;

/// Session keys are opaque alphanumeric strings. Anything else is rejected
/// so it can be replaced by a fresh key.
pub fn sanitize_session_key(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed.len() > MAX_KEY_LEN
        || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(trimmed.to_string())
}

/// World ids name a store document: letters, digits, `_` and `-` only.
pub fn normalize_world_id(raw: Option<&str>, default_id: &str) -> Option<String> {
    let Some(value) = raw else {
        return Some(default_id.to_string());
    };
    let trimmed = value.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= MAX_KEY_LEN
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then(|| trimmed.to_string())
}

/// Keeps a pointer target inside the playable square.
pub fn clamp_to_map(x: f64, y: f64, half_size: i32) -> Vec2 {
    let half = half_size as f64;
    Vec2::new(x.clamp(-half, half), y.clamp(-half, half))
}

pub fn parse_port(raw: Option<&str>, default_port: u16) -> u16 {
    raw.and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(default_port)
}
