//! Shared User-Agent strings for resolver and download HTTP traffic.
//!
//! File-hosting sites routinely reject tool-identifying agents, so the
//! transport rotates through a fixed pool of desktop browser strings by
//! default. The tool-identifying agent stays available for callers that
//! opt out of rotation.

use rand::seq::SliceRandom;

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/narugo1992/netdriveurls";

/// Desktop browser agents (Chrome, Firefox, Edge on Windows and macOS).
const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Tool-identifying User-Agent (used when rotation is disabled).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("netdrive/{version} (+{PROJECT_UA_URL})")
}

/// Picks a browser User-Agent from the rotation pool.
#[must_use]
pub(crate) fn random_browser_user_agent() -> &'static str {
    BROWSER_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(BROWSER_USER_AGENTS[0])
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent_contains_version_and_url() {
        let ua = default_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL");
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("netdrive/")
                .and_then(|s| s.split(' ').next())
                .expect("UA has version"),
        );
    }

    #[test]
    fn test_random_browser_user_agent_comes_from_pool() {
        for _ in 0..20 {
            let ua = random_browser_user_agent();
            assert!(BROWSER_USER_AGENTS.contains(&ua));
            assert!(ua.starts_with("Mozilla/5.0"));
        }
    }
}
