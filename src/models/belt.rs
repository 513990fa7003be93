use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const WHITE_GROUP_SIZE: u32 = 40;
pub const COLOURED_GROUP_SIZE: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeltColor {
    #[default]
    White,
    Blue,
    Purple,
    Brown,
    Black,
}

impl BeltColor {
    pub fn all() -> Vec<BeltColor> {
        vec![
            BeltColor::White,
            BeltColor::Blue,
            BeltColor::Purple,
            BeltColor::Brown,
            BeltColor::Black,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BeltColor::White => "white",
            BeltColor::Blue => "blue",
            BeltColor::Purple => "purple",
            BeltColor::Brown => "brown",
            BeltColor::Black => "black",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BeltColor::White => "White",
            BeltColor::Blue => "Blue",
            BeltColor::Purple => "Purple",
            BeltColor::Brown => "Brown",
            BeltColor::Black => "Black",
        }
    }

    /// Check-ins needed to advance one Dan on this belt.
    pub fn group_size(&self) -> u32 {
        match self {
            BeltColor::White => WHITE_GROUP_SIZE,
            _ => COLOURED_GROUP_SIZE,
        }
    }

    /// Lenient parse for stored or user-supplied values: empty or unknown
    /// input falls back to white.
    pub fn normalize(s: &str) -> BeltColor {
        BeltColor::from_str(s).unwrap_or_default()
    }
}

impl std::fmt::Display for BeltColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for BeltColor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "white" => Ok(BeltColor::White),
            "blue" => Ok(BeltColor::Blue),
            "purple" => Ok(BeltColor::Purple),
            "brown" => Ok(BeltColor::Brown),
            "black" => Ok(BeltColor::Black),
            _ => Err(anyhow::anyhow!("Unknown belt color: {}", s)),
        }
    }
}
