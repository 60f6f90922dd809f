//! Folds selections that share a response key into one field.
//!
//! Two selections may use the same key only when they select the same field
//! with the same arguments; their sub-selections are then concatenated and
//! merged again one level down. Any other overlap is a conflict reported at
//! the position of the first selection using the key.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::selection::SelectionNode;

/// One response position after merging.
#[derive(Debug)]
pub(super) enum Slot<'n> {
    /// A field to resolve.
    Field(Cow<'n, SelectionNode>),
    /// Two or more incompatible selections claim this key.
    Conflict {
        /// The shared response key.
        key: &'n str,
        /// Explanation naming the clashing fields.
        message: String,
    },
}

impl Slot<'_> {
    pub(super) fn response_key(&self) -> &str {
        match self {
            Self::Field(node) => node.response_key(),
            Self::Conflict { key, .. } => key,
        }
    }
}

/// Merges `nodes` in selection order.
pub(super) fn merge_fields(nodes: &[SelectionNode]) -> Vec<Slot<'_>> {
    let mut slots: Vec<Slot<'_>> = Vec::with_capacity(nodes.len());
    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();

    for node in nodes {
        let key = node.response_key();
        let Some(slot) = positions.get(key).and_then(|&index| slots.get_mut(index)) else {
            positions.insert(key, slots.len());
            slots.push(Slot::Field(Cow::Borrowed(node)));
            continue;
        };
        let Slot::Field(existing) = slot else {
            continue;
        };
        if existing.name == node.name && existing.arguments == node.arguments {
            existing
                .to_mut()
                .selections
                .extend(node.selections.iter().cloned());
        } else {
            let message = format!(
                "fields '{}' and '{}' both use response key '{key}'",
                existing.name, node.name
            );
            *slot = Slot::Conflict { key, message };
        }
    }
    slots
}
