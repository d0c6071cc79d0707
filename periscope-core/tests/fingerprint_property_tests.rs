//! Property tests for query fingerprinting

use periscope_core::{Fingerprint, Query, QueryType};
use proptest::prelude::*;

fn query_type_strategy() -> impl Strategy<Value = QueryType> {
    prop::sample::select(QueryType::ALL.to_vec())
}

proptest! {
    /// The same query fields in any JSON key order fingerprint identically.
    #[test]
    fn prop_fingerprint_independent_of_field_order(
        location in "[a-z][a-z0-9-]{0,15}",
        query_type in query_type_strategy(),
        vrf in "[a-z0-9-]{1,12}",
        target in "[0-9a-f:./ ]{1,40}",
        order in Just(vec![0usize, 1, 2, 3]).prop_shuffle(),
    ) {
        let fields = [
            ("query_location", serde_json::Value::String(location.clone())),
            ("query_type", serde_json::Value::String(query_type.as_str().to_string())),
            ("query_vrf", serde_json::Value::String(vrf.clone())),
            ("query_target", serde_json::Value::String(target.clone())),
        ];
        let body = order
            .iter()
            .map(|&i| format!("{}:{}", serde_json::Value::String(fields[i].0.to_string()), fields[i].1))
            .collect::<Vec<_>>()
            .join(",");
        let parsed: Query = serde_json::from_str(&format!("{{{}}}", body))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let direct = Query::new(location, query_type, vrf, target);
        prop_assert_eq!(parsed.fingerprint(), direct.fingerprint());
    }

    /// Fingerprints ignore the submission time.
    #[test]
    fn prop_fingerprint_ignores_timestamp(offset_secs in 0i64..10_000_000) {
        let query = Query::new("edge1", QueryType::BgpRoute, "default", "192.0.2.0/24");
        let later = query
            .clone()
            .with_timestamp(query.timestamp + chrono::Duration::seconds(offset_secs));
        prop_assert_eq!(query.fingerprint(), later.fingerprint());
    }

    /// Distinct targets never collide.
    #[test]
    fn prop_distinct_targets_distinct_fingerprints(a in "[0-9.]{1,15}", b in "[0-9.]{1,15}") {
        prop_assume!(a != b);
        let qa = Query::new("edge1", QueryType::Ping, "default", a);
        let qb = Query::new("edge1", QueryType::Ping, "default", b);
        prop_assert_ne!(qa.fingerprint(), qb.fingerprint());
    }

    /// Fingerprints are well-formed hex digests.
    #[test]
    fn prop_fingerprint_shape(target in ".{0,64}") {
        let fp: Fingerprint = Query::new("edge1", QueryType::BgpAspath, "default", target).fingerprint();
        prop_assert_eq!(fp.as_str().len(), 64);
        prop_assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
