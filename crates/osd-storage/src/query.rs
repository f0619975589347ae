// Path: crates/osd-storage/src/query.rs

//! Lowers a [`QueryPlan`] onto the key-value tables: the collection's
//! membership range supplies the candidates, each criterion becomes a point
//! lookup per candidate, and the combinator folds the per-criterion sets.

use ahash::AHashSet;
use osd_api::query::{Combinator, Criterion, QueryPlan};
use osd_api::storage::{AttributeRead, CatalogRead, StorageError};

fn matching<V: AttributeRead + ?Sized>(
    view: &V,
    pid: u64,
    candidates: &[u64],
    criterion: &Criterion,
) -> Result<AHashSet<u64>, StorageError> {
    let mut hits = AHashSet::new();
    for &oid in candidates {
        if let Some(value) = view.try_get_attr(pid, oid, criterion.page, criterion.number)? {
            if criterion.matches(&value) {
                hits.insert(oid);
            }
        }
    }
    Ok(hits)
}

pub fn execute_plan<V: AttributeRead + CatalogRead + ?Sized>(
    view: &V,
    plan: &QueryPlan,
) -> Result<Vec<u64>, StorageError> {
    let members = view.collection_members(plan.pid, plan.cid, 0)?;
    if plan.criteria.is_empty() {
        return Ok(members);
    }

    let mut acc: Option<AHashSet<u64>> = None;
    for criterion in &plan.criteria {
        let hits = matching(view, plan.pid, &members, criterion)?;
        acc = Some(match (acc, plan.combinator) {
            (None, _) => hits,
            (Some(prev), Combinator::Union) => prev.union(&hits).copied().collect(),
            (Some(prev), Combinator::Intersect) => prev.intersection(&hits).copied().collect(),
        });
        if plan.combinator == Combinator::Intersect && acc.as_ref().is_some_and(|s| s.is_empty()) {
            break;
        }
    }

    let mut ids: Vec<u64> = acc.unwrap_or_default().into_iter().collect();
    ids.sort_unstable();
    Ok(ids)
}
