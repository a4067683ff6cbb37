//! Utility functions shared across the crate.

use std::path::PathBuf;

/// Get the user's config directory following XDG conventions.
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Content fingerprint used to recognise the same upload twice.
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Percentage of `done` out of `total`, in [0, 100].
#[allow(clippy::cast_precision_loss)]
pub fn percent(done: usize, total: usize) -> f32 {
    if total == 0 {
        return 100.0;
    }
    ((done as f32 / total as f32) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_digest_is_stable() {
        assert_eq!(content_digest(b"abc"), content_digest(b"abc"));
        assert_ne!(content_digest(b"abc"), content_digest(b"abd"));
        assert_eq!(content_digest(b"").len(), 32);
    }

    #[test]
    fn test_percent() {
        assert!((percent(1, 4) - 25.0).abs() < f32::EPSILON);
        assert!((percent(4, 4) - 100.0).abs() < f32::EPSILON);
        assert!((percent(0, 0) - 100.0).abs() < f32::EPSILON);
        assert!((percent(9, 4) - 100.0).abs() < f32::EPSILON);
    }
}
