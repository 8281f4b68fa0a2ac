use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Polling preference stored on an entry. Persisted as the integers
/// `Auto=0, High=1, Low=2, None=-1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Frequency {
    #[default]
    Auto,
    High,
    Low,
    None,
}

impl TryFrom<i8> for Frequency {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Auto),
            1 => Ok(Self::High),
            2 => Ok(Self::Low),
            -1 => Ok(Self::None),
            other => Err(format!("Invalid frequency: {}", other)),
        }
    }
}

impl From<Frequency> for i8 {
    fn from(value: Frequency) -> Self {
        match value {
            Frequency::Auto => 0,
            Frequency::High => 1,
            Frequency::Low => 2,
            Frequency::None => -1,
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            "none" | "never" => Ok(Self::None),
            other => Err(format!(
                "Invalid frequency: {}. Use auto, high, low or none",
                other
            )),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::High => "high",
            Self::Low => "low",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Scheduler tier an entry is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    High,
    Low,
    /// Never polled on a timer; only reachable through an explicit update.
    None,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::High, Tier::Low, Tier::None];

    pub fn is_polling(self) -> bool {
        !matches!(self, Tier::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_integer_encoding() {
        assert_eq!(serde_json::to_string(&Frequency::None).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&Frequency::Low).unwrap(), "2");
        let parsed: Frequency = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, Frequency::High);
        assert!(serde_json::from_str::<Frequency>("7").is_err());
    }

    #[test]
    fn test_frequency_from_str() {
        assert_eq!("Auto".parse::<Frequency>().unwrap(), Frequency::Auto);
        assert_eq!("never".parse::<Frequency>().unwrap(), Frequency::None);
        assert!("weekly".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_only_none_tier_is_dormant() {
        assert!(Tier::High.is_polling());
        assert!(Tier::Low.is_polling());
        assert!(!Tier::None.is_polling());
    }
}
