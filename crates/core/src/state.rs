use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Lifecycle state of an edge (and of a source's metadata row).
///
/// The derived ordering is the precedence order used to break ties between
/// writes carrying the same `updated_at`: the greater state wins. The
/// discriminants are the stable wire/schema ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum State {
    Normal = 0,
    Removed = 1,
    Archived = 2,
    Negative = 3,
}

impl State {
    pub const ALL: [State; 4] = [State::Normal, State::Removed, State::Archived, State::Negative];

    /// The numeric id stored in the `state` column.
    pub fn id(self) -> i64 {
        self as i64
    }

    pub fn from_id(id: i64) -> Result<Self, CoreError> {
        match id {
            0 => Ok(State::Normal),
            1 => Ok(State::Removed),
            2 => Ok(State::Archived),
            3 => Ok(State::Negative),
            other => Err(CoreError::UnknownState(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_roundtrip() {
        for state in State::ALL {
            assert_eq!(State::from_id(state.id()).unwrap(), state);
        }
        assert!(State::from_id(4).is_err());
        assert!(State::from_id(-1).is_err());
    }

    #[test]
    fn precedence_order() {
        assert!(State::Normal < State::Removed);
        assert!(State::Removed < State::Archived);
        assert!(State::Archived < State::Negative);
        assert_eq!(State::Normal.max(State::Archived), State::Archived);
        assert_eq!(State::Negative.max(State::Removed), State::Negative);
    }
}
