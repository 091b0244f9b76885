use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::BookingError;

/// Seat identifier: row label followed by the seat number, e.g. `A1` or `C12`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SeatId {
    row: String,
    number: u32,
}

impl SeatId {
    pub fn new(row: impl Into<String>, number: u32) -> Self {
        Self { row: row.into(), number }
    }

    pub fn row(&self) -> &str {
        &self.row
    }

    pub fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.number)
    }
}

impl FromStr for SeatId {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| BookingError::NotFound(format!("seat {s}")))?;
        let (row, number) = s.split_at(split);
        if row.is_empty() || !row.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(BookingError::NotFound(format!("seat {s}")));
        }
        let number = number
            .parse::<u32>()
            .map_err(|_| BookingError::NotFound(format!("seat {s}")))?;
        Ok(SeatId::new(row.to_ascii_uppercase(), number))
    }
}

impl From<SeatId> for String {
    fn from(id: SeatId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SeatId {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Seat category. Determines the unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Regular,
    Premium,
    Vip,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Regular => write!(f, "regular"),
            Tier::Premium => write!(f, "premium"),
            Tier::Vip => write!(f, "vip"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Selected,
    Booked,
}

/// Read-only view of a seat as seen by callers of the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub tier: Tier,
    pub price: u64,
    pub status: SeatStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_id_parses_row_and_number() {
        let id: SeatId = "c12".parse().unwrap();
        assert_eq!(id.row(), "C");
        assert_eq!(id.number(), 12);
        assert_eq!(id.to_string(), "C12");
    }

    #[test]
    fn seat_id_rejects_garbage() {
        assert!("12".parse::<SeatId>().is_err());
        assert!("A".parse::<SeatId>().is_err());
        assert!("A-1".parse::<SeatId>().is_err());
    }

    #[test]
    fn seat_id_serializes_as_string() {
        let id = SeatId::new("B", 7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"B7\"");
        let back: SeatId = serde_json::from_str("\"B7\"").unwrap();
        assert_eq!(back, id);
    }
}
