//! Relationship graph → pedagogical chapter order.
//!
//! An edge `A -> B` reads "A depends on / is used by B", so B is presented
//! before A. The order is a stable topological sort that prefers nodes with
//! fewer outgoing edges, tie-broken by discovery index.
//!
//! Graphs extracted from prose are not guaranteed to be acyclic. When no node
//! is ready, the node with the fewest unemitted dependencies (then the lowest
//! discovery index) is emitted anyway. The result is therefore a best-effort
//! reading order: inside a cycle some chapter will come before a chapter it
//! depends on.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::context::TutorialContext;
use crate::error::StageError;
use crate::flow::Stage;
use crate::model::{Abstraction, AbstractionId, ChapterOrder, RelationshipEdge};

/// Deterministic ordering of `abstractions`; always a permutation of their ids.
///
/// Edges that reference unknown ids are ignored.
pub fn order_chapters(abstractions: &[Abstraction], edges: &[RelationshipEdge]) -> ChapterOrder {
    let n = abstractions.len();
    let slot_of = |id: AbstractionId| abstractions.iter().position(|a| a.id == id);

    // deps[i]: slots that i depends on (edge targets), deduplicated.
    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for edge in edges {
        if let (Some(from), Some(to)) = (slot_of(edge.from), slot_of(edge.to)) {
            if from != to {
                deps[from].insert(to);
            }
        }
    }
    let out_degree: Vec<usize> = deps.iter().map(BTreeSet::len).collect();

    let mut emitted = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let pending = |i: &usize| deps[*i].iter().filter(|&&d| !emitted[d]).count();

        let ready = (0..n)
            .filter(|&i| !emitted[i] && pending(&i) == 0)
            .min_by_key(|&i| (out_degree[i], abstractions[i].discovery_index));

        let next = match ready {
            Some(i) => i,
            None => {
                let forced = (0..n)
                    .filter(|&i| !emitted[i])
                    .min_by_key(|&i| (pending(&i), abstractions[i].discovery_index));
                match forced {
                    Some(i) => {
                        debug!(
                            abstraction = %abstractions[i].name,
                            unmet = pending(&i),
                            "Breaking dependency cycle"
                        );
                        i
                    }
                    None => break,
                }
            }
        };
        emitted[next] = true;
        order.push(abstractions[next].id);
    }

    ChapterOrder::new(order)
}

pub struct ChapterOrderer;

#[async_trait]
impl Stage<TutorialContext> for ChapterOrderer {
    fn name(&self) -> &'static str {
        "order_chapters"
    }

    async fn run(&self, ctx: TutorialContext) -> Result<TutorialContext, StageError> {
        let order = order_chapters(ctx.abstractions()?, &ctx.graph()?.edges);
        info!(chapters = order.len(), order = ?order.ids(), "Computed chapter order");
        ctx.with_order(order)
    }
}
