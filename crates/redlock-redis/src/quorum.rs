//! Quorum arithmetic: thresholds, drift, validity, TTL settlement.

use std::collections::HashMap;

/// Allowance for server clock skew, as a fraction of the TTL.
pub(crate) const DRIFT_FACTOR: f64 = 0.01;

/// Minimum agreeing set for a safe grant: a strict majority.
pub(crate) fn quorum(instance_count: usize) -> usize {
    instance_count / 2 + 1
}

/// Conservative drift allowance in milliseconds.
///
/// The `+ 2` absorbs Redis's 1 ms expiry granularity plus a 1 ms floor for
/// very small TTLs.
pub(crate) fn drift_millis(ttl_millis: u64) -> u64 {
    (ttl_millis as f64 * DRIFT_FACTOR) as u64 + 2
}

/// Portion of the requested TTL the holder may safely assume, after
/// subtracting the acquisition fan-out latency and the drift allowance.
/// Negative means the acquisition took too long to be usable.
pub(crate) fn validity_millis(ttl_millis: u64, elapsed_millis: u64) -> i64 {
    ttl_millis as i64 - elapsed_millis as i64 - drift_millis(ttl_millis) as i64
}

/// The token the largest agreeing group of servers reports, with the TTL
/// at least `quorum` of them still guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QuorumTtl {
    pub value: String,
    pub ttl_millis: i64,
}

/// Settles a set of `(value, pttl)` readings into the authoritative TTL.
///
/// Readings are grouped by value; the largest group wins. If it is smaller
/// than the quorum there is no authoritative holder. Otherwise, with the
/// group's TTLs sorted ascending, the `(len - quorum)`-th entry is the
/// largest `m` such that at least `quorum` servers report a TTL of at
/// least `m`; the result is `m` minus the read latency and the drift
/// allowance, and may be zero or negative once the lock has lapsed.
pub(crate) fn settle_ttl(
    readings: Vec<(String, i64)>,
    quorum: usize,
    elapsed_millis: u64,
) -> Option<QuorumTtl> {
    let mut groups: HashMap<String, Vec<i64>> = HashMap::new();
    for (value, pttl) in readings {
        groups.entry(value).or_default().push(pttl);
    }

    let (value, mut ttls) = groups.into_iter().max_by_key(|(_, ttls)| ttls.len())?;
    if ttls.len() < quorum {
        return None;
    }

    ttls.sort_unstable();
    let floor = ttls[ttls.len() - quorum];
    let ttl_millis =
        floor - elapsed_millis as i64 - drift_millis(floor.max(0) as u64) as i64;
    Some(QuorumTtl { value, ttl_millis })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_is_a_strict_majority() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);
    }

    #[test]
    fn drift_scales_with_ttl_plus_granularity_floor() {
        assert_eq!(drift_millis(0), 2);
        assert_eq!(drift_millis(99), 2);
        assert_eq!(drift_millis(100), 3);
        assert_eq!(drift_millis(1000), 12);
        assert_eq!(drift_millis(2000), 22);
    }

    #[test]
    fn validity_subtracts_elapsed_and_drift() {
        assert_eq!(validity_millis(1000, 100), 1000 - 100 - 12);
        assert_eq!(validity_millis(1000, 988), 0);
        assert!(validity_millis(1000, 989) < 0);
    }

    #[test]
    fn settle_requires_a_quorum_sized_group() {
        let readings = vec![
            ("a".to_string(), 800),
            ("b".to_string(), 700),
            ("c".to_string(), 600),
        ];
        assert_eq!(settle_ttl(readings, 2, 0), None);
    }

    #[test]
    fn settle_picks_the_largest_group() {
        let readings = vec![
            ("a".to_string(), 800),
            ("a".to_string(), 750),
            ("b".to_string(), 900),
        ];
        let settled = settle_ttl(readings, 2, 0).unwrap();
        assert_eq!(settled.value, "a");
    }

    #[test]
    fn settle_takes_the_quorum_order_statistic() {
        // 5 servers, quorum 3: the third-largest TTL is what at least 3
        // servers still guarantee.
        let readings: Vec<_> = [500, 900, 700, 800, 600]
            .into_iter()
            .map(|ttl| ("a".to_string(), ttl))
            .collect();
        let settled = settle_ttl(readings, 3, 0).unwrap();
        assert_eq!(settled.ttl_millis, 700 - drift_millis(700) as i64);
    }

    #[test]
    fn settle_subtracts_read_latency() {
        let readings = vec![("a".to_string(), 800), ("a".to_string(), 800)];
        let settled = settle_ttl(readings, 2, 50).unwrap();
        assert_eq!(settled.ttl_millis, 800 - 50 - drift_millis(800) as i64);
    }

    #[test]
    fn settle_may_report_a_lapsed_lock() {
        let readings = vec![("a".to_string(), 10), ("a".to_string(), 10)];
        let settled = settle_ttl(readings, 2, 100).unwrap();
        assert!(settled.ttl_millis < 0);
    }

    #[test]
    fn settle_with_no_readings_is_none() {
        assert_eq!(settle_ttl(Vec::new(), 1, 0), None);
    }
}
