use crate::simulation::id::Id;
use crate::simulation::network::Link;
use nohash_hasher::IntMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalGroupState {
    Green,
    Yellow,
    Red,
    RedYellow,
    Off,
}

impl SignalGroupState {
    /// Vehicles may cross the stop line. A switched off signal does not stop anyone.
    pub fn is_green(&self) -> bool {
        matches!(self, SignalGroupState::Green | SignalGroupState::Off)
    }
}

/// Signal states per turning move of a signalized link. Turning moves are identified by the
/// link they lead to. All turning moves start green.
#[derive(Debug, Clone)]
pub struct SignalGate {
    states: IntMap<Id<Link>, SignalGroupState>,
}

impl SignalGate {
    pub fn new(to_links: &[Id<Link>]) -> Self {
        SignalGate {
            states: to_links
                .iter()
                .map(|id| (id.clone(), SignalGroupState::Green))
                .collect(),
        }
    }

    pub fn set_state_all_turning_moves(&mut self, state: SignalGroupState) {
        for s in self.states.values_mut() {
            *s = state;
        }
    }

    /// Panics if `to_link` can't be reached from the signalized link.
    pub fn set_state_for_turning_move(&mut self, state: SignalGroupState, to_link: &Id<Link>) {
        let current = self
            .states
            .get_mut(to_link)
            .unwrap_or_else(|| panic!("To link {to_link} is not reachable from this link."));
        *current = state;
    }

    /// At least one turning move is green.
    pub fn is_link_green(&self) -> bool {
        self.states.values().any(SignalGroupState::is_green)
    }

    pub fn is_green_for_to_link(&self, to_link: &Id<Link>) -> bool {
        self.states
            .get(to_link)
            .is_some_and(SignalGroupState::is_green)
    }

    pub fn state(&self, to_link: &Id<Link>) -> Option<SignalGroupState> {
        self.states.get(to_link).copied()
    }
}
