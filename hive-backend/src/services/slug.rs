//! Workspace slug validation

use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_SLUG_LEN: usize = 2;
pub const MAX_SLUG_LEN: usize = 50;

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").unwrap());

/// Slugs that collide with top-level routes
pub const RESERVED_SLUGS: &[&str] = &[
    "api", "admin", "auth", "dashboard", "settings", "login", "logout", "signup", "new", "w",
    "workspaces", "onboarding", "user", "users", "help", "docs", "static", "public",
];

pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.len() < MIN_SLUG_LEN || slug.len() > MAX_SLUG_LEN {
        return Err(format!(
            "Slug must be between {} and {} characters",
            MIN_SLUG_LEN, MAX_SLUG_LEN
        ));
    }
    if !SLUG_RE.is_match(slug) {
        return Err(
            "Slug may only contain lowercase letters, numbers and hyphens, and must start and end with a letter or number"
                .to_string(),
        );
    }
    if RESERVED_SLUGS.contains(&slug) {
        return Err(format!("Slug '{}' is reserved", slug));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slugs() {
        for slug in ["ab", "acme", "my-team-2", "a1", &"x".repeat(50)] {
            assert!(validate_slug(slug).is_ok(), "{}", slug);
        }
    }

    #[test]
    fn test_invalid_slugs() {
        for slug in ["a", "", "-acme", "acme-", "Acme", "ac_me", "ac me", &"x".repeat(51)] {
            assert!(validate_slug(slug).is_err(), "{}", slug);
        }
    }

    #[test]
    fn test_reserved_slugs() {
        assert!(validate_slug("api").is_err());
        assert!(validate_slug("workspaces").is_err());
        assert!(validate_slug("api-team").is_ok());
    }
}
