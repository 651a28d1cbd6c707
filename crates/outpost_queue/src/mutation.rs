//! Queued mutation entries.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Length of the random part of a generated id.
const ID_SUFFIX_LEN: usize = 9;

/// Identifier of a queued mutation.
///
/// Generated ids are `<epoch millis in base 36>-<9 random [a-z0-9]>`: the
/// time prefix keeps them roughly ordered, the suffix keeps two workers that
/// enqueue in the same millisecond from colliding without any coordination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(String);

impl MutationId {
    /// Wraps an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh id stamped with `at`.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let millis = u64::try_from(at.timestamp_millis()).unwrap_or(0);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ID_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self(format!("{}-{}", base36(millis), suffix))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// A replayable snapshot of a write request that failed to reach the network.
///
/// The body is captured as text up front because the original request body
/// can only be read once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Unique id assigned at enqueue time.
    pub id: MutationId,
    /// Absolute target URL.
    pub url: String,
    /// HTTP verb (anything but GET).
    pub method: String,
    /// Request body captured as text.
    pub body: String,
    /// Flattened request headers.
    pub headers: BTreeMap<String, String>,
    /// Creation time; only used to order replay.
    pub timestamp: DateTime<Utc>,
}

impl QueuedMutation {
    /// Captures a mutation with a freshly generated id.
    pub fn capture(
        method: impl Into<String>,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        body: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MutationId::generate(at),
            url: url.into(),
            method: method.into().to_ascii_uppercase(),
            body: body.into(),
            headers,
            timestamp: at,
        }
    }

    /// Returns true for every verb the classifier treats as a mutation.
    pub fn is_replayable_method(&self) -> bool {
        !self.method.is_empty() && self.method != "GET"
    }

    /// ISO-8601 creation time with millisecond precision.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}

/// Sorts entries into replay order: oldest first.
///
/// The sort is stable, so entries captured in the same tick keep the order
/// they arrived in. Feed it [`QueueStore::get_all`](crate::QueueStore::get_all)
/// output, which is in append order.
pub fn replay_order(entries: &mut [QueuedMutation]) {
    entries.sort_by_key(|entry| entry.timestamp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn generated_id_shape() {
        let id = MutationId::generate(at(1_700_000_000_000));
        let (prefix, suffix) = id.as_str().split_once('-').unwrap();

        assert_eq!(prefix, base36(1_700_000_000_000));
        assert_eq!(suffix.len(), ID_SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn generated_ids_do_not_collide() {
        let now = at(1_700_000_000_000);
        let ids: std::collections::HashSet<_> =
            (0..500).map(|_| MutationId::generate(now)).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn base36_digits() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }

    #[test]
    fn capture_normalizes_method() {
        let entry = QueuedMutation::capture(
            "patch",
            "https://app.test/api/items/1",
            BTreeMap::new(),
            "{}",
            at(0),
        );
        assert_eq!(entry.method, "PATCH");
        assert!(entry.is_replayable_method());
        assert_eq!(entry.timestamp_iso(), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn only_get_is_not_replayable() {
        let capture = |method: &str| QueuedMutation::capture(method, "https://app.test/api", BTreeMap::new(), "", at(0));
        assert!(!capture("GET").is_replayable_method());
        assert!(!capture("get").is_replayable_method());
        assert!(capture("HEAD").is_replayable_method());
        assert!(capture("OPTIONS").is_replayable_method());
    }

    #[test]
    fn replay_order_keeps_arrival_order_within_a_tick() {
        let mut entries = vec![
            QueuedMutation::capture("POST", "https://app.test/api/a", BTreeMap::new(), "", at(10)),
            QueuedMutation::capture("PATCH", "https://app.test/api/a", BTreeMap::new(), "", at(10)),
            QueuedMutation::capture("POST", "https://app.test/api/z", BTreeMap::new(), "", at(5)),
            QueuedMutation::capture("DELETE", "https://app.test/api/a", BTreeMap::new(), "", at(10)),
        ];
        replay_order(&mut entries);

        let methods: Vec<_> = entries.iter().map(|e| e.method.as_str()).collect();
        assert_eq!(methods, vec!["POST", "POST", "PATCH", "DELETE"]);
        assert_eq!(entries[0].url, "https://app.test/api/z");
    }

    #[test]
    fn replay_order_is_oldest_first() {
        let mut entries = vec![
            QueuedMutation::capture("PUT", "https://app.test/api/b", BTreeMap::new(), "", at(20)),
            QueuedMutation::capture("POST", "https://app.test/api/a", BTreeMap::new(), "", at(10)),
            QueuedMutation::capture("DELETE", "https://app.test/api/c", BTreeMap::new(), "", at(30)),
        ];
        replay_order(&mut entries);

        let urls: Vec<_> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://app.test/api/a",
                "https://app.test/api/b",
                "https://app.test/api/c"
            ]
        );
    }
}
