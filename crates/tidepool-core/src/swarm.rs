//! Swarm grouping and hit-point redistribution for crawler bodies.

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};

use crate::{
    body::{BodyArena, BodyId, BodyMap},
    error::WorldError,
};

new_key_type! {
    /// Stable handle for swarms backed by a generational slot map.
    pub struct SwarmId;
}

/// A group of crawler bodies that share damage.
///
/// Member order is enrollment order and is stable. Merge transfers do not
/// follow it; they walk the movers in registry order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Swarm {
    pub(crate) members: Vec<BodyId>,
}

impl Swarm {
    /// Member handles in enrollment order.
    #[must_use]
    pub fn members(&self) -> &[BodyId] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the swarm has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Swarm registry plus the body-to-swarm back-reference table.
///
/// Both sides of the membership relation live here so they can never drift
/// apart; the world mutates them only through this ledger.
#[derive(Debug, Default)]
pub(crate) struct SwarmLedger {
    swarms: SlotMap<SwarmId, Swarm>,
    membership: BodyMap<SwarmId>,
}

impl SwarmLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register an empty swarm.
    pub(crate) fn create(&mut self) -> SwarmId {
        self.swarms.insert(Swarm::default())
    }

    pub(crate) fn swarm_count(&self) -> usize {
        self.swarms.len()
    }

    pub(crate) fn contains(&self, id: SwarmId) -> bool {
        self.swarms.contains_key(id)
    }

    pub(crate) fn get(&self, id: SwarmId) -> Option<&Swarm> {
        self.swarms.get(id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (SwarmId, &Swarm)> + '_ {
        self.swarms.iter()
    }

    /// Swarm the body belongs to, if any.
    pub(crate) fn swarm_of(&self, body: BodyId) -> Option<SwarmId> {
        self.membership.get(body).copied()
    }

    /// Enroll `body` into `target`.
    ///
    /// A body with no previous swarm is added plainly. A body moving between
    /// swarms triggers the balancing transfer: every remaining member of the
    /// old swarm gains 1 hit point, every member of the target loses 1, and
    /// the mover itself gains `|new - old + 1|` hit points, added when the
    /// old swarm was the smaller-or-equal side and subtracted otherwise. An
    /// old swarm left empty terminates.
    pub(crate) fn enroll(
        &mut self,
        arena: &mut BodyArena,
        body: BodyId,
        target: SwarmId,
    ) -> Result<(), WorldError> {
        if !self.swarms.contains_key(target) {
            return Err(WorldError::InvalidTransition("swarm is not registered"));
        }
        match self.swarm_of(body) {
            Some(current) if current == target => Ok(()),
            Some(current) => {
                self.transfer(arena, body, current, target);
                Ok(())
            }
            None => {
                self.swarms[target].members.push(body);
                self.membership.insert(body, target);
                Ok(())
            }
        }
    }

    fn transfer(&mut self, arena: &mut BodyArena, body: BodyId, old: SwarmId, target: SwarmId) {
        let old_members = self.swarms[old].members.clone();
        let target_members = self.swarms[target].members.clone();
        let old_size = old_members.len() as i64;
        let new_size = target_members.len() as i64;

        // Dead members keep their membership until the grace sweep removes
        // them, but they take no part in the rebalancing.
        for member in old_members {
            if member == body {
                continue;
            }
            if let Some(row) = arena.get_mut(member) {
                if !row.is_dead() {
                    row.gain_hit_points(1);
                }
            }
        }
        for member in target_members {
            if let Some(row) = arena.get_mut(member) {
                if !row.is_dead() {
                    row.lose_hit_points(1);
                }
            }
        }
        let magnitude = (new_size - old_size + 1).unsigned_abs() as u32;
        if let Some(row) = arena.get_mut(body) {
            if !row.is_dead() {
                if old_size <= new_size {
                    row.gain_hit_points(magnitude);
                } else {
                    row.lose_hit_points(magnitude);
                }
            }
        }

        let old_swarm = &mut self.swarms[old];
        old_swarm.members.retain(|member| *member != body);
        let emptied = old_swarm.is_empty();
        self.swarms[target].members.push(body);
        self.membership.insert(body, target);
        if emptied {
            self.swarms.remove(old);
        }
    }

    /// Remove one hit point from every other living member of the source's
    /// swarm. The source's own loss already happened through its own channel.
    pub(crate) fn share_loss(&self, arena: &mut BodyArena, source: BodyId) {
        let Some(swarm) = self.swarm_of(source) else {
            return;
        };
        let Some(group) = self.swarms.get(swarm) else {
            return;
        };
        let members = group.members.clone();
        for member in members {
            if member == source {
                continue;
            }
            if let Some(row) = arena.get_mut(member) {
                if !row.is_dead() {
                    row.lose_hit_points(1);
                }
            }
        }
    }

    /// Merge the swarms of two touching crawlers.
    ///
    /// The smaller swarm's members transfer one at a time, in registry order
    /// rather than enrollment order, into the larger; on equal sizes the
    /// lower swarm handle absorbs the other. The walk order is observable:
    /// sizes mutate per transfer, and earlier movers get docked by later
    /// arrivals. Returns the surviving swarm, or `None` when the bodies
    /// already share one.
    pub(crate) fn merge_for_contact(
        &mut self,
        arena: &mut BodyArena,
        a: BodyId,
        b: BodyId,
    ) -> Option<SwarmId> {
        let swarm_a = self.swarm_of(a)?;
        let swarm_b = self.swarm_of(b)?;
        if swarm_a == swarm_b {
            return None;
        }
        let size_a = self.swarms.get(swarm_a)?.len();
        let size_b = self.swarms.get(swarm_b)?.len();
        let (source, survivor) = if size_a < size_b {
            (swarm_a, swarm_b)
        } else if size_b < size_a {
            (swarm_b, swarm_a)
        } else if swarm_a < swarm_b {
            (swarm_b, swarm_a)
        } else {
            (swarm_a, swarm_b)
        };
        let mut movers = self.swarms[source].members.clone();
        movers.sort_by_key(|mover| arena.index_of(*mover));
        for mover in movers {
            self.transfer(arena, mover, source, survivor);
        }
        Some(survivor)
    }

    /// Drop a body from its swarm, terminating the swarm if it empties.
    pub(crate) fn expel(&mut self, body: BodyId) {
        let Some(swarm) = self.membership.remove(body) else {
            return;
        };
        let Some(group) = self.swarms.get_mut(swarm) else {
            return;
        };
        group.members.retain(|member| *member != body);
        if group.is_empty() {
            self.swarms.remove(swarm);
        }
    }
}
