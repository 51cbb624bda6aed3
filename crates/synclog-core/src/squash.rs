//! Change squashing applied when events fold into the baseline.
//!
//! The rebaser assembles the ordered union of the baseline's changes and the
//! folded events' changes; a squasher decides how changes to the same
//! logical object combine.
//!
//! # Rules (`LatestPerObject`)
//!
//! | Earlier | Later | Result |
//! |---------|-------|--------|
//! | Insert | Update | Insert, properties overlaid |
//! | Insert | Delete | nothing |
//! | Update | Update | Update, properties overlaid |
//! | Update | Delete | Delete |
//! | Delete | Insert | Insert |
//! | Delete | Update | Delete |

use crate::event::{ChangeType, ObjectChange};
use std::collections::HashMap;

/// Combines an ordered set of object changes into the baseline's change set.
pub trait ChangeSquasher: Send + Sync {
    /// Squash changes, given in fold order (baseline first).
    fn squash(&self, changes: Vec<ObjectChange>) -> Vec<ObjectChange>;
}

/// Keeps every change as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetainAll;

impl ChangeSquasher for RetainAll {
    fn squash(&self, changes: Vec<ObjectChange>) -> Vec<ObjectChange> {
        changes
    }
}

/// Keeps the cumulative effect per `(entity, object_id)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestPerObject;

enum Slot {
    Live(ObjectChange),
    Cancelled,
}

impl ChangeSquasher for LatestPerObject {
    fn squash(&self, changes: Vec<ObjectChange>) -> Vec<ObjectChange> {
        let input_len = changes.len();
        let mut index: HashMap<(String, String), usize> = HashMap::new();
        let mut slots: Vec<Slot> = Vec::new();

        for change in changes {
            let key = (change.entity.clone(), change.object_id.clone());
            match index.get(&key) {
                Some(&position) => {
                    let previous = std::mem::replace(&mut slots[position], Slot::Cancelled);
                    slots[position] = combine(previous, change);
                }
                None => {
                    index.insert(key, slots.len());
                    slots.push(Slot::Live(change));
                }
            }
        }

        let squashed: Vec<ObjectChange> = slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Live(change) => Some(change),
                Slot::Cancelled => None,
            })
            .collect();

        tracing::debug!(input_len, output_len = squashed.len(), "Squashed changes");
        squashed
    }
}

fn combine(earlier: Slot, later: ObjectChange) -> Slot {
    let Slot::Live(mut earlier) = earlier else {
        return match later.change_type {
            ChangeType::Delete => Slot::Cancelled,
            ChangeType::Insert | ChangeType::Update => Slot::Live(later),
        };
    };

    match (earlier.change_type, later.change_type) {
        (ChangeType::Insert, ChangeType::Delete) => Slot::Cancelled,
        (ChangeType::Delete, ChangeType::Update) => Slot::Live(earlier),
        (_, ChangeType::Delete) | (ChangeType::Delete, ChangeType::Insert) => Slot::Live(later),
        (ChangeType::Insert | ChangeType::Update, ChangeType::Insert | ChangeType::Update) => {
            overlay(&mut earlier.properties, later.properties);
            if later.change_type == ChangeType::Insert {
                earlier.change_type = ChangeType::Insert;
            }
            Slot::Live(earlier)
        }
    }
}

/// Overlay object properties; non-object values are replaced.
fn overlay(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target), serde_json::Value::Object(update)) => {
            for (key, value) in update {
                target.insert(key, value);
            }
        }
        (target, update) => *target = update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retain_all_is_identity() {
        let changes = vec![
            ObjectChange::insert("Note", "n1", json!({"a": 1})),
            ObjectChange::delete("Note", "n1"),
        ];
        assert_eq!(RetainAll.squash(changes.clone()), changes);
    }

    #[test]
    fn insert_then_update_overlays() {
        let squashed = LatestPerObject.squash(vec![
            ObjectChange::insert("Note", "n1", json!({"title": "a", "body": "x"})),
            ObjectChange::update("Note", "n1", json!({"title": "b"})),
        ]);

        assert_eq!(
            squashed,
            vec![ObjectChange::insert(
                "Note",
                "n1",
                json!({"title": "b", "body": "x"})
            )]
        );
    }

    #[test]
    fn insert_then_delete_cancels() {
        let squashed = LatestPerObject.squash(vec![
            ObjectChange::insert("Note", "n1", json!({})),
            ObjectChange::insert("Note", "n2", json!({})),
            ObjectChange::delete("Note", "n1"),
        ]);

        assert_eq!(squashed.len(), 1);
        assert_eq!(squashed[0].object_id, "n2");
    }

    #[test]
    fn update_then_delete_keeps_delete() {
        let squashed = LatestPerObject.squash(vec![
            ObjectChange::update("Note", "n1", json!({"title": "b"})),
            ObjectChange::delete("Note", "n1"),
        ]);

        assert_eq!(squashed, vec![ObjectChange::delete("Note", "n1")]);
    }

    #[test]
    fn reinsert_after_cancel() {
        let squashed = LatestPerObject.squash(vec![
            ObjectChange::insert("Note", "n1", json!({"v": 1})),
            ObjectChange::delete("Note", "n1"),
            ObjectChange::insert("Note", "n1", json!({"v": 2})),
        ]);

        assert_eq!(squashed, vec![ObjectChange::insert("Note", "n1", json!({"v": 2}))]);
    }

    #[test]
    fn entities_are_distinct_keys() {
        let squashed = LatestPerObject.squash(vec![
            ObjectChange::insert("Note", "x", json!({})),
            ObjectChange::delete("Tag", "x"),
        ]);

        assert_eq!(squashed.len(), 2);
    }
}
