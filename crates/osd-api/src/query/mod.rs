// Path: crates/osd-api/src/query/mod.rs

//! Structured representation of a QUERY command.
//!
//! A [`QueryPlan`] is a list of typed range predicates over attribute values,
//! a combinator, and the collection that scopes the candidates. Storage
//! adapters lower it to whatever access path they have.

use crate::storage::StorageError;
use serde::{Deserialize, Serialize};

/// How per-criterion result sets are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combinator {
    Union,
    Intersect,
}

/// A range predicate over the value of attribute `(page, number)`.
///
/// Bounds compare raw bytes lexicographically and are inclusive. An absent
/// bound does not constrain; a criterion without bounds matches every object
/// that has the attribute set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub page: u32,
    pub number: u32,
    pub min: Option<Vec<u8>>,
    pub max: Option<Vec<u8>>,
}

impl Criterion {
    pub fn new(page: u32, number: u32) -> Self {
        Self {
            page,
            number,
            min: None,
            max: None,
        }
    }

    pub fn with_min(mut self, min: impl Into<Vec<u8>>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn with_max(mut self, max: impl Into<Vec<u8>>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn matches(&self, value: &[u8]) -> bool {
        let above = self.min.as_deref().map_or(true, |min| value >= min);
        let below = self.max.as_deref().map_or(true, |max| value <= max);
        above && below
    }
}

/// A fully resolved query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub pid: u64,
    pub cid: u64,
    pub combinator: Combinator,
    pub criteria: Vec<Criterion>,
}

impl QueryPlan {
    pub fn builder(pid: u64, cid: u64) -> QueryBuilder {
        QueryBuilder {
            plan: QueryPlan {
                pid,
                cid,
                combinator: Combinator::Union,
                criteria: Vec::new(),
            },
        }
    }
}

/// Incrementally assembles a [`QueryPlan`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    plan: QueryPlan,
}

impl QueryBuilder {
    pub fn combinator(mut self, combinator: Combinator) -> Self {
        self.plan.combinator = combinator;
        self
    }

    pub fn criterion(mut self, criterion: Criterion) -> Self {
        self.plan.criteria.push(criterion);
        self
    }

    pub fn build(self) -> QueryPlan {
        self.plan
    }
}

/// Executes a plan against a store snapshot.
pub trait QueryExecutor {
    /// Returns the matching member ids of `plan.cid`, ascending and without
    /// duplicates.
    fn execute_query(&self, plan: &QueryPlan) -> Result<Vec<u64>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        let c = Criterion::new(0x10000, 1)
            .with_min(40u64.to_be_bytes())
            .with_max(80u64.to_be_bytes());
        assert!(c.matches(&40u64.to_be_bytes()));
        assert!(c.matches(&80u64.to_be_bytes()));
        assert!(c.matches(&59u64.to_be_bytes()));
        assert!(!c.matches(&39u64.to_be_bytes()));
        assert!(!c.matches(&81u64.to_be_bytes()));
    }

    #[test]
    fn comparison_is_bytewise_not_numeric() {
        // A shorter prefix sorts first.
        let c = Criterion::new(1, 1).with_min(b"ab".to_vec());
        assert!(c.matches(b"ab"));
        assert!(c.matches(b"abc"));
        assert!(!c.matches(b"a"));
        assert!(Criterion::new(1, 1).matches(b""));
    }

    #[test]
    fn builder_keeps_criteria_order() {
        let plan = QueryPlan::builder(0x10000, 0x10001)
            .combinator(Combinator::Intersect)
            .criterion(Criterion::new(1, 1))
            .criterion(Criterion::new(2, 2))
            .build();
        assert_eq!(plan.combinator, Combinator::Intersect);
        assert_eq!(plan.criteria.len(), 2);
        assert_eq!(plan.criteria[1].page, 2);
    }
}
