//! Who is in the room, as seen by one participant.
//!
//! The roster is built from `join`/`leave` broadcasts. A broadcast relayed
//! by a membership-aware server can carry a full `users` snapshot, which
//! replaces the roster outright. A one-off fetch from the room catalog is
//! merged in as a fallback for joins that were missed.

use std::collections::BTreeSet;

use campfire_protocol::{Signal, Username};

/// Membership difference produced by one roster update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterChange {
    pub added: Vec<Username>,
    pub removed: Vec<Username>,
}

impl RosterChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The set of participants currently present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    members: BTreeSet<Username>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one participant. Returns `true` if they were not present.
    pub fn on_join(&mut self, user: &Username) -> bool {
        self.members.insert(user.clone())
    }

    /// Remove one participant. Returns `true` if they were present.
    pub fn on_leave(&mut self, user: &Username) -> bool {
        self.members.remove(user)
    }

    /// Replace the roster with an authoritative snapshot.
    pub fn replace(
        &mut self,
        snapshot: impl IntoIterator<Item = Username>,
    ) -> RosterChange {
        let next: BTreeSet<Username> = snapshot.into_iter().collect();
        let change = RosterChange {
            added: next.difference(&self.members).cloned().collect(),
            removed: self.members.difference(&next).cloned().collect(),
        };
        self.members = next;
        change
    }

    /// Union a best-effort snapshot into the roster. Never removes anyone.
    pub fn merge(
        &mut self,
        users: impl IntoIterator<Item = Username>,
    ) -> RosterChange {
        let added = users
            .into_iter()
            .filter(|user| self.members.insert(user.clone()))
            .collect();
        RosterChange {
            added,
            removed: Vec::new(),
        }
    }

    /// Update the roster from a signaling envelope.
    ///
    /// Negotiation messages prove their sender is present, so they add
    /// the sender too. Fire messages don't touch the roster.
    pub fn apply_signal(&mut self, signal: &Signal) -> RosterChange {
        match signal {
            Signal::Join {
                users: Some(users), ..
            }
            | Signal::Leave {
                users: Some(users), ..
            } => self.replace(users.iter().cloned()),
            Signal::Join { sender, users: None }
            | Signal::Offer { sender, .. }
            | Signal::Answer { sender, .. }
            | Signal::IceCandidate { sender, .. } => {
                let mut change = RosterChange::default();
                if self.on_join(sender) {
                    change.added.push(sender.clone());
                }
                change
            }
            Signal::Leave { sender, users: None } => {
                let mut change = RosterChange::default();
                if self.on_leave(sender) {
                    change.removed.push(sender.clone());
                }
                change
            }
            Signal::FireUpdate { .. } | Signal::RequestFireSync { .. } => {
                RosterChange::default()
            }
        }
    }

    pub fn contains(&self, user: &Username) -> bool {
        self.members.contains(user)
    }

    /// Members in name order.
    pub fn members(&self) -> Vec<Username> {
        self.members.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Username> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}
