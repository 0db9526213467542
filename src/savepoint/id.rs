//! Savepoint identifier generation.
//!
//! Identifiers are the leading hex characters of a SHA-256 digest over
//! `{host}:{pid}:{timestamp}:nested:{counter}`. They only need to keep
//! savepoint names apart within one connection's nesting stack, so
//! uniqueness is probabilistic and must not be relied on for security.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::config::NestingConfig;

/// Process-wide counter. Starts at zero and is never reset.
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generator shared by [`next_id`]. Resolves the host name once per process.
static DEFAULT_GENERATOR: Lazy<IdGenerator> =
    Lazy::new(|| IdGenerator::from_config(&NestingConfig::default()));

/// An opaque savepoint name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SavepointId(String);

impl SavepointId {
    /// Wrap an existing token. Used for externally chosen names.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the identifier in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the identifier is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SavepointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SavepointId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Produces savepoint identifiers.
///
/// All generators in a process draw from the same counter, so two
/// generators configured alike still never hand out the same input to
/// the digest.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    host: String,
    length: usize,
}

impl IdGenerator {
    /// Build a generator from configuration. The configuration is expected
    /// to have been validated; an out-of-range length is clamped.
    pub fn from_config(config: &NestingConfig) -> Self {
        Self::from_config_with_sources(config, host_sources())
    }

    fn from_config_with_sources(
        config: &NestingConfig,
        sources: impl IntoIterator<Item = Option<String>>,
    ) -> Self {
        Self {
            host: resolve_host_from(&config.host_fallback, sources),
            length: config.id_length.clamp(1, MAX_ID_LENGTH),
        }
    }

    /// The process-wide default generator.
    pub fn global() -> &'static IdGenerator {
        &DEFAULT_GENERATOR
    }

    /// Host identity folded into every identifier.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Number of characters in every identifier.
    pub fn id_length(&self) -> usize {
        self.length
    }

    /// Generate the next identifier. Never fails and never blocks.
    pub fn next_id(&self) -> SavepointId {
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let seed = format!(
            "{}:{}:{}.{:06}:nested:{}",
            self.host,
            std::process::id(),
            now.timestamp(),
            now.timestamp_subsec_micros(),
            count
        );

        let digest = format!("{:x}", Sha256::digest(seed.as_bytes()));
        let id = SavepointId(digest[..self.length].to_string());
        log::trace!("generated savepoint id {} (counter {})", id, count);
        id
    }
}

/// Hex characters in a SHA-256 digest.
pub const MAX_ID_LENGTH: usize = 64;

/// Generate an identifier with the process-wide default generator.
pub fn next_id() -> SavepointId {
    DEFAULT_GENERATOR.next_id()
}

/// Resolve this machine's host name.
///
/// Sources are tried in order: `HOSTNAME`, the kernel host name, then
/// `/etc/hostname`. Blank values are skipped. If none yields a name the
/// result is `fallback`; resolution itself never fails.
pub fn resolve_host(fallback: &str) -> String {
    resolve_host_from(fallback, host_sources())
}

/// Candidate host names, most specific first. Sources are read lazily.
fn host_sources() -> impl Iterator<Item = Option<String>> {
    let readers: [fn() -> Option<String>; 3] = [
        || std::env::var("HOSTNAME").ok(),
        || std::fs::read_to_string("/proc/sys/kernel/hostname").ok(),
        || std::fs::read_to_string("/etc/hostname").ok(),
    ];
    readers.into_iter().map(|read| read())
}

/// First non-blank candidate, trimmed, or `fallback`.
fn resolve_host_from(
    fallback: &str,
    sources: impl IntoIterator<Item = Option<String>>,
) -> String {
    let resolved = sources
        .into_iter()
        .find_map(|candidate| candidate.and_then(non_empty));

    match resolved {
        Some(host) => host,
        None => {
            log::warn!(
                "host name unavailable, using {:?} for savepoint ids",
                fallback
            );
            fallback.to_string()
        }
    }
}

fn non_empty(name: String) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_default_id_shape() {
        let id = next_id();
        assert_eq!(id.len(), 11);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sequential_ids_distinct() {
        let ids: HashSet<SavepointId> = (0..10_000).map(|_| next_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_concurrent_ids_distinct() {
        let generator = Arc::new(IdGenerator::global().clone());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || {
                    (0..2_000)
                        .map(|_| generator.next_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 8_000);
    }

    #[test]
    fn test_configured_length() {
        let config = NestingConfig::default().id_length(20);
        let generator = IdGenerator::from_config(&config);
        assert_eq!(generator.next_id().len(), 20);
    }

    #[test]
    fn test_resolve_host_never_empty() {
        let host = resolve_host("localhost");
        assert!(!host.is_empty());
    }

    #[test]
    fn test_resolve_host_all_sources_fail() {
        let host = resolve_host_from("localhost", [None, None, None]);
        assert_eq!(host, "localhost");

        let host = resolve_host_from("localhost", Vec::<Option<String>>::new());
        assert_eq!(host, "localhost");
    }

    #[test]
    fn test_resolve_host_skips_blank_sources() {
        let sources = [
            Some(String::new()),
            Some("vm\n".to_string()),
            Some("other".to_string()),
        ];
        let host = resolve_host_from("FALLBACK", sources);
        assert_eq!(host, "vm");

        let host = resolve_host_from("FALLBACK", [Some("  \n".to_string()), None]);
        assert_eq!(host, "FALLBACK");
    }

    #[test]
    fn test_fallback_host_still_generates_ids() {
        let config = NestingConfig::default().host_fallback("db-host");
        let sources = [None, Some(" ".to_string())];
        let generator = IdGenerator::from_config_with_sources(&config, sources);
        assert_eq!(generator.host(), "db-host");

        let first = generator.next_id();
        let second = generator.next_id();
        assert_eq!(first.len(), 11);
        assert_ne!(first, second);
    }

    #[test]
    fn test_display() {
        let id = SavepointId::new("abc1234de56");
        assert_eq!(id.to_string(), "abc1234de56");
        assert_eq!(id.as_ref(), "abc1234de56");
    }
}
