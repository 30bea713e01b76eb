//! Priority tiers for queued requests

use serde::{Deserialize, Serialize};

/// Priority tier of a queued request
///
/// Ordering follows urgency: `Low < Normal < High < Critical`. Dispatch takes
/// the most urgent tier first and preserves submission order within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Number of priority tiers
    pub const TIERS: usize = 4;

    /// All tiers in dispatch order (most urgent first)
    pub const DISPATCH_ORDER: [Priority; Priority::TIERS] =
        [Priority::Critical, Priority::High, Priority::Normal, Priority::Low];

    /// Position of this tier in dispatch order
    pub fn tier_index(self) -> usize {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }

    /// Whether the admission policy may shed this tier under overload
    pub fn is_droppable(self) -> bool {
        self == Self::Low
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}
