use std::collections::{BTreeMap, BTreeSet};

use crate::models::Weekday;

/// Label to count. Iteration is in ascending key order, which the reporter
/// relies on for tie-breaking.
pub type Counts<K> = BTreeMap<K, usize>;

/// Composite grouping key for per-year weekday breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearWeekday {
    pub year: i32,
    pub weekday: Weekday,
}

/// Row count per key.
#[must_use]
pub fn count_by<I, K>(keys: I) -> Counts<K>
where
    I: IntoIterator<Item = K>,
    K: Ord,
{
    let mut counts = Counts::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Number of distinct members per key; repeated `(key, member)` pairs count
/// once.
#[must_use]
pub fn count_distinct_by<I, K, M>(pairs: I) -> Counts<K>
where
    I: IntoIterator<Item = (K, M)>,
    K: Ord,
    M: Ord,
{
    let mut members: BTreeMap<K, BTreeSet<M>> = BTreeMap::new();
    for (key, member) in pairs {
        members.entry(key).or_default().insert(member);
    }
    members
        .into_iter()
        .map(|(key, members)| (key, members.len()))
        .collect()
}

#[must_use]
pub fn total<K>(counts: &Counts<K>) -> usize {
    counts.values().sum()
}
