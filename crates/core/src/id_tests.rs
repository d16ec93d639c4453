// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn generated_ids_carry_prefix_and_are_unique() {
    let a = JobId::generate();
    let b = JobId::generate();
    assert!(a.as_str().starts_with("job-"));
    assert_eq!(a.suffix().len(), 19);
    assert_ne!(a, b);
}

#[test]
fn id_lookup_by_str() {
    let mut map = HashMap::new();
    map.insert(JobId::from_string("job-abc"), 42);
    assert_eq!(map.get("job-abc"), Some(&42));
}

#[test]
fn short_truncates_suffix() {
    let id = JobId::from_string("job-abcdefghijklmnop");
    assert_eq!(id.short(8), "abcdefgh");
    assert_eq!(id.short(100), "abcdefghijklmnop");
}

#[test]
fn short_respects_char_boundaries() {
    assert_eq!(short("héllo", 2), "hé");
    assert_eq!(short("", 3), "");
}

#[test]
fn id_serde_is_transparent() {
    let id = JobId::from_string("job-1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"job-1\"");
    let parsed: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}
