//! Calendar boundary detection from the raw tick stream.

use crate::domain::PeriodKind;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Last-seen aligned period per boundary kind.
///
/// A boundary fires only when the aligned marker is strictly greater than the
/// last one seen, so several ticks inside one period fire at most once. The
/// first tick seeds every marker and fires nothing.
#[derive(Debug, Clone, Default)]
pub struct PeriodClock {
    last_seen: BTreeMap<PeriodKind, DateTime<Utc>>,
}

impl PeriodClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to `date`; returns crossed boundaries in ascending kind order
    /// (minute, hour, day, week, month).
    pub fn advance(&mut self, date: DateTime<Utc>) -> Vec<PeriodKind> {
        let mut crossed = Vec::new();
        for kind in PeriodKind::ALL {
            let marker = kind.align(date);
            match self.last_seen.get(&kind) {
                Some(last) if marker > *last => {
                    crossed.push(kind);
                    self.last_seen.insert(kind, marker);
                }
                Some(_) => {}
                None => {
                    self.last_seen.insert(kind, marker);
                }
            }
        }
        crossed
    }

    pub fn last_seen(&self, kind: PeriodKind) -> Option<DateTime<Utc>> {
        self.last_seen.get(&kind).copied()
    }
}
