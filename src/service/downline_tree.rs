use std::collections::HashMap;

use serde::Serialize;

use crate::{
    models::referralmodel::{
        DownlineNode, GenerationStore, NodeAttributes, ReferralId, ReferralRecord,
    },
    utils::currency::CurrencyFormat,
};

const ROOT: usize = 0;

/// Tree projection of a generation store together with the number of
/// generation >= 2 records whose sponsor could not be found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownlineTree {
    pub tree: DownlineNode,
    pub orphaned: usize,
}

struct ArenaNode<'a> {
    record: Option<&'a ReferralRecord>,
    generation: u32,
    children: Vec<usize>,
}

/// Flat node storage used while linking. A child is always pushed after its
/// parent, so every child index is greater than its parent's index.
struct TreeArena<'a> {
    nodes: Vec<ArenaNode<'a>>,
    by_user_id: HashMap<&'a ReferralId, Vec<usize>>,
}

impl<'a> TreeArena<'a> {
    fn with_root() -> Self {
        Self {
            nodes: vec![ArenaNode {
                record: None,
                generation: 0,
                children: Vec::new(),
            }],
            by_user_id: HashMap::new(),
        }
    }

    fn attach(&mut self, parent: usize, record: &'a ReferralRecord, generation: u32) {
        let index = self.nodes.len();
        self.nodes.push(ArenaNode {
            record: Some(record),
            generation,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);

        if let Some(user_id) = record.id.as_ref() {
            self.by_user_id.entry(user_id).or_default().push(index);
        }
    }

    fn find_sponsor(&self, sponsor_id: &ReferralId) -> Option<usize> {
        match self.by_user_id.get(sponsor_id)?.as_slice() {
            [] => None,
            [only] => Some(*only),
            duplicates => self.first_in_preorder(duplicates),
        }
    }

    // Only reached when upstream sent the same id more than once.
    fn first_in_preorder(&self, candidates: &[usize]) -> Option<usize> {
        let mut stack = vec![ROOT];
        while let Some(index) = stack.pop() {
            if candidates.contains(&index) {
                return Some(index);
            }
            stack.extend(self.nodes[index].children.iter().rev().copied());
        }
        None
    }

    fn into_tree(self, root_label: &str, currency: &CurrencyFormat) -> DownlineNode {
        let mut built: Vec<Option<DownlineNode>> = (0..self.nodes.len()).map(|_| None).collect();

        for index in (0..self.nodes.len()).rev() {
            let node = &self.nodes[index];
            let children = node
                .children
                .iter()
                .filter_map(|child| built[*child].take())
                .collect();

            built[index] = Some(match node.record {
                Some(record) => record_node(record, node.generation, children, currency),
                None => root_node(root_label, children, currency),
            });
        }

        built[ROOT]
            .take()
            .unwrap_or_else(|| root_node(root_label, Vec::new(), currency))
    }
}

fn root_node(label: &str, children: Vec<DownlineNode>, currency: &CurrencyFormat) -> DownlineNode {
    DownlineNode {
        name: label.to_string(),
        attributes: NodeAttributes {
            generation: 0,
            commission: currency.format(0.0),
            status: None,
            user_id: None,
            sponsor_id: None,
        },
        children,
    }
}

fn record_node(
    record: &ReferralRecord,
    generation: u32,
    children: Vec<DownlineNode>,
    currency: &CurrencyFormat,
) -> DownlineNode {
    DownlineNode {
        name: record.display_name().to_string(),
        attributes: NodeAttributes {
            generation,
            commission: currency.format(record.commission_amount()),
            status: record.effective_status().map(str::to_string),
            user_id: record.id.clone(),
            sponsor_id: record.sponsor_id.clone(),
        },
        children,
    }
}

/// Rebuild the ownership tree from per-generation buckets.
///
/// Generation 1 always hangs off the synthetic root. Every later record is
/// attached under the first node, in pre-order, whose user id equals its
/// sponsor id; records without a match are counted as orphans and left out.
/// Nodes keep the order of their source bucket.
pub fn build_tree(store: &GenerationStore, root_label: &str, currency: &CurrencyFormat) -> DownlineTree {
    let mut arena = TreeArena::with_root();
    let mut orphaned = 0;

    match store {
        GenerationStore::Malformed => {}
        GenerationStore::Flat(records) => {
            for record in records {
                arena.attach(ROOT, record, 1);
            }
        }
        GenerationStore::Nested(buckets) => {
            for (offset, bucket) in buckets.iter().enumerate() {
                let generation = offset as u32 + 1;

                for record in bucket {
                    if generation == 1 {
                        arena.attach(ROOT, record, generation);
                        continue;
                    }

                    let sponsor = record
                        .sponsor_id
                        .as_ref()
                        .and_then(|sponsor_id| arena.find_sponsor(sponsor_id));

                    match sponsor {
                        Some(parent) => arena.attach(parent, record, generation),
                        None => {
                            orphaned += 1;
                            tracing::debug!(
                                "Orphaned referral {:?} in generation {}: sponsor {:?} not in tree",
                                record.id,
                                generation,
                                record.sponsor_id
                            );
                        }
                    }
                }
            }
        }
    }

    DownlineTree {
        tree: arena.into_tree(root_label, currency),
        orphaned,
    }
}
