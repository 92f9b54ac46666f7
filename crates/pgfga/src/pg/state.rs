//! Lifecycle marker shared by every reconcilable object kind.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Desired lifecycle of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Must exist and match the declared attributes.
    #[default]
    Present,
    /// Must not exist. Only acted on when strict mode is enabled for the kind.
    Absent,
    /// May or may not exist. Never created nor dropped.
    Allowed,
}

impl State {
    pub fn is_present(&self) -> bool {
        matches!(self, State::Present)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, State::Absent)
    }

    /// True for a Present/Absent pair. Allowed never conflicts.
    pub fn conflicts_with(&self, other: State) -> bool {
        matches!(
            (self, other),
            (State::Present, State::Absent) | (State::Absent, State::Present)
        )
    }

    /// Combines two declarations of the same object that do not conflict.
    ///
    /// Allowed yields to the other state. Callers decide what a conflicting
    /// pair means before calling this.
    pub fn combine(&self, other: State) -> State {
        match (self, other) {
            (State::Allowed, other) => other,
            (this, _) => *this,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Present => write!(f, "Present"),
            State::Absent => write!(f, "Absent"),
            State::Allowed => write!(f, "Allowed"),
        }
    }
}

impl std::str::FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "present" | "" => Ok(State::Present),
            "absent" => Ok(State::Absent),
            "allowed" => Ok(State::Allowed),
            other => Err(format!(
                "invalid state '{}' (should be present, absent or allowed)",
                other
            )),
        }
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(State::Present),
            Some(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
