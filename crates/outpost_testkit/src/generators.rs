//! Property-based test generators using proptest.
//!
//! Strategies here produce requests and queue entries that stay inside the
//! fixture origin unless asked otherwise.

use crate::fixtures::{default_config, start_time, ORIGIN};
use chrono::Duration;
use outpost_engine::{Method, RequestMode};
use outpost_queue::QueuedMutation;
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for one lowercase path segment.
pub fn path_segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9][a-z0-9_-]{0,11}").expect("Invalid regex")
}

/// Strategy for a path of one to four segments, without a leading slash.
pub fn relative_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(path_segment_strategy(), 1..=4).prop_map(|segments| segments.join("/"))
}

/// Strategy for a mutating HTTP method.
pub fn mutation_method_strategy() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::Post),
        Just(Method::Put),
        Just(Method::Patch),
        Just(Method::Delete),
    ]
}

/// Strategy for any method the classifier may see.
pub fn any_method_strategy() -> impl Strategy<Value = Method> {
    prop_oneof![
        3 => Just(Method::Get),
        1 => Just(Method::Head),
        1 => Just(Method::Options),
        4 => mutation_method_strategy(),
    ]
}

/// Strategy for a request mode.
pub fn request_mode_strategy() -> impl Strategy<Value = RequestMode> {
    prop_oneof![
        Just(RequestMode::Navigate),
        Just(RequestMode::SameOrigin),
        Just(RequestMode::Cors),
        Just(RequestMode::NoCors),
    ]
}

/// Strategy for a default static extension in random letter case.
pub fn static_extension_strategy() -> impl Strategy<Value = String> {
    let extensions = default_config().static_extensions;
    (prop::sample::select(extensions), any::<u64>()).prop_map(|(ext, mask)| {
        ext.chars()
            .enumerate()
            .map(|(i, c)| {
                if (mask >> (i % 64)) & 1 == 1 {
                    c.to_ascii_uppercase()
                } else {
                    c
                }
            })
            .collect()
    })
}

/// Strategy for an optional query string, including the `?`.
pub fn query_strategy() -> impl Strategy<Value = String> {
    prop::option::of(prop::string::string_regex("[a-z]{1,6}=[a-z0-9]{0,6}").expect("Invalid regex"))
        .prop_map(|q| q.map(|q| format!("?{q}")).unwrap_or_default())
}

/// Strategy for another origin the fixture does not control.
pub fn foreign_origin_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("http://app.test".to_string()),
        Just("https://app.test:8443".to_string()),
        Just("https://cdn.app.test".to_string()),
        path_segment_strategy().prop_map(|host| format!("https://{host}.example")),
    ]
    .prop_filter("must differ from the fixture origin", |origin| origin != ORIGIN)
}

/// Strategy for a queued mutation with a timestamp within a day of the
/// fixture start time and a unique-ish target path.
pub fn queued_mutation_strategy() -> impl Strategy<Value = QueuedMutation> {
    (
        mutation_method_strategy(),
        relative_path_strategy(),
        prop::string::string_regex("[ -~]{0,64}").expect("Invalid regex"),
        0i64..86_400_000,
    )
        .prop_map(|(method, path, body, offset_ms)| {
            QueuedMutation::capture(
                method.as_str(),
                format!("{ORIGIN}/api/{path}"),
                BTreeMap::new(),
                body,
                start_time() + Duration::milliseconds(offset_ms),
            )
        })
}

/// Strategy for capture-time offsets in milliseconds, duplicates allowed.
pub fn timestamp_offsets_strategy(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..5_000, 1..=max_len)
}
