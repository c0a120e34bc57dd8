use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline state of a media item
///
/// Never stored authoritatively: it is recomputed from the item's fields
/// (see `MediaItem::state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Unknown,
    Requested,
    Indexed,
    Scraped,
    Downloaded,
    Symlinked,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl State {
    pub const ALL: [State; 9] = [
        State::Unknown,
        State::Requested,
        State::Indexed,
        State::Scraped,
        State::Downloaded,
        State::Symlinked,
        State::Completed,
        State::PartiallyCompleted,
        State::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Unknown => "Unknown",
            State::Requested => "Requested",
            State::Indexed => "Indexed",
            State::Scraped => "Scraped",
            State::Downloaded => "Downloaded",
            State::Symlinked => "Symlinked",
            State::Completed => "Completed",
            State::PartiallyCompleted => "PartiallyCompleted",
            State::Failed => "Failed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    /// Case-insensitive, so query strings like `?state=completed` work
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid state: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("completed".parse::<State>().unwrap(), State::Completed);
        assert_eq!(
            "PARTIALLYCOMPLETED".parse::<State>().unwrap(),
            State::PartiallyCompleted
        );
        assert!("done".parse::<State>().is_err());
    }

    #[test]
    fn test_display_matches_serde_name() {
        for state in State::ALL {
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, state.to_string());
        }
    }
}
