use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Interest keys a profile may carry. Seeded into the `interests` table at startup.
pub const INTERESTS: &[&str] = &[
    "music", "sports", "coding", "movies", "travel", "art", "football", "reading",
];

pub fn is_known_interest(key: &str) -> bool {
    INTERESTS.contains(&key)
}

/// Error returned when a stored or submitted enum value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Left,
    Right,
}

impl SwipeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl FromStr for SwipeDirection {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(UnknownVariant { kind: "direction", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            other => Err(UnknownVariant { kind: "gender", value: other.to_string() }),
        }
    }
}

/// Author of a support transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportRole {
    User,
    Assistant,
}

impl SupportRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for SupportRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(UnknownVariant { kind: "support role", value: other.to_string() }),
        }
    }
}

/// Orders an unordered pair of users into the `(user_a, user_b)` key a chat is
/// stored under. The smaller id by its hyphenated string form comes first, so
/// both swipe orders resolve to the same row.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a.to_string() < b.to_string() { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_is_order_independent() {
        let a: Uuid = "11111111-1111-4111-8111-111111111111".parse().unwrap();
        let b: Uuid = "22222222-2222-4222-8222-222222222222".parse().unwrap();

        assert_eq!(canonical_pair(a, b), (a, b));
        assert_eq!(canonical_pair(b, a), (a, b));
    }

    #[test]
    fn canonical_pair_compares_full_string_form() {
        let low: Uuid = "0fffffff-ffff-4fff-bfff-ffffffffffff".parse().unwrap();
        let high: Uuid = "a0000000-0000-4000-8000-000000000000".parse().unwrap();

        assert_eq!(canonical_pair(high, low), (low, high));
    }

    #[test]
    fn direction_parsing_rejects_unknown_values() {
        assert_eq!("right".parse::<SwipeDirection>(), Ok(SwipeDirection::Right));
        assert_eq!("left".parse::<SwipeDirection>(), Ok(SwipeDirection::Left));

        let err = "up".parse::<SwipeDirection>().unwrap_err();
        assert_eq!(err.to_string(), "unknown direction 'up'");
    }

    #[test]
    fn interest_catalogue_lookup() {
        assert!(is_known_interest("coding"));
        assert!(!is_known_interest("knitting"));
    }
}
