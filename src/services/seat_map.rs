//! Seat inventory generation.
//!
//! The inventory for a showtime is a pure function of the layout, the price
//! table, the showtime id and the seed: the pre-sold share is picked with a
//! SHA-256 digest per seat instead of a random draw, so regenerating a
//! showtime always yields the same map.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::config::{split_list, SeatMapConfig};
use crate::models::{SeatId, ShowtimeId, Tier, TierPriceTable};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("layout has no rows")]
    NoRows,
    #[error("row label '{0}' must be uppercase letters")]
    InvalidRowLabel(String),
    #[error("row {0} appears twice")]
    DuplicateRow(String),
    #[error("invalid row range '{0}'")]
    InvalidRange(String),
    #[error("invalid aisle position '{0}'")]
    InvalidAisle(String),
    #[error("pre-booked ratio {0} is outside 0..=1")]
    InvalidRatio(f64),
}

/// Contiguous block of rows sharing a tier (inclusive, by position).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRange {
    pub tier: Tier,
    pub first: usize,
    pub last: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    rows: Vec<String>,
    seats_per_row: u32,
    aisles: HashSet<u32>,
    tiers: Vec<TierRange>,
}

impl RowLayout {
    pub fn new(rows: Vec<String>, seats_per_row: u32, aisles: HashSet<u32>) -> Result<Self, LayoutError> {
        if rows.is_empty() {
            return Err(LayoutError::NoRows);
        }
        let mut seen = HashSet::new();
        for row in &rows {
            if row.is_empty() || !row.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(LayoutError::InvalidRowLabel(row.clone()));
            }
            if !seen.insert(row.as_str()) {
                return Err(LayoutError::DuplicateRow(row.clone()));
            }
        }
        Ok(Self { rows, seats_per_row, aisles, tiers: Vec::new() })
    }

    /// Assigns `tier` to the rows between `first` and `last` (labels, inclusive).
    pub fn with_tier(mut self, tier: Tier, first: &str, last: &str) -> Result<Self, LayoutError> {
        let range = format!("{first}-{last}");
        let first = self.position(first).ok_or_else(|| LayoutError::InvalidRange(range.clone()))?;
        let last = self.position(last).ok_or_else(|| LayoutError::InvalidRange(range.clone()))?;
        if first > last {
            return Err(LayoutError::InvalidRange(range));
        }
        self.tiers.push(TierRange { tier, first, last });
        Ok(self)
    }

    pub fn from_config(config: &SeatMapConfig) -> Result<Self, LayoutError> {
        let aisles = split_list(&config.aisles)
            .into_iter()
            .map(|a| a.parse::<u32>().map_err(|_| LayoutError::InvalidAisle(a.clone())))
            .collect::<Result<HashSet<_>, _>>()?;

        let mut layout = RowLayout::new(split_list(&config.rows), config.seats_per_row, aisles)?;
        for (tier, raw) in [(Tier::Premium, &config.premium_rows), (Tier::Vip, &config.vip_rows)] {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (first, last) = raw.split_once('-').unwrap_or((raw, raw));
            layout = layout.with_tier(tier, first.trim(), last.trim())?;
        }
        Ok(layout)
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.rows.iter().position(|r| r == label)
    }

    /// Later ranges win when they overlap.
    pub fn tier_of(&self, row_index: usize) -> Tier {
        self.tiers
            .iter()
            .rev()
            .find(|r| (r.first..=r.last).contains(&row_index))
            .map(|r| r.tier)
            .unwrap_or(Tier::Regular)
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }
}

/// One seat as produced by the generator, before any session touches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSeat {
    pub id: SeatId,
    pub tier: Tier,
    pub price: u64,
    pub prebooked: bool,
}

#[derive(Debug, Clone)]
pub struct SeatMapGenerator {
    layout: RowLayout,
    prices: TierPriceTable,
    seed: u64,
    prebooked_ratio: f64,
}

impl SeatMapGenerator {
    pub fn new(layout: RowLayout, prices: TierPriceTable, seed: u64, prebooked_ratio: f64) -> Result<Self, LayoutError> {
        if !(0.0..=1.0).contains(&prebooked_ratio) {
            return Err(LayoutError::InvalidRatio(prebooked_ratio));
        }
        Ok(Self { layout, prices, seed, prebooked_ratio })
    }

    pub fn prices(&self) -> &TierPriceTable {
        &self.prices
    }

    /// Seats in row order, then by number. Aisle positions produce no seat.
    pub fn generate(&self, showtime: &ShowtimeId) -> Vec<GeneratedSeat> {
        let mut seats = Vec::new();
        for (index, row) in self.layout.rows.iter().enumerate() {
            let tier = self.layout.tier_of(index);
            let price = self.prices.price(tier);
            for number in 1..=self.layout.seats_per_row {
                if self.layout.aisles.contains(&number) {
                    continue;
                }
                let id = SeatId::new(row.clone(), number);
                let prebooked = self.is_prebooked(showtime, &id);
                seats.push(GeneratedSeat { id, tier, price, prebooked });
            }
        }
        seats
    }

    fn is_prebooked(&self, showtime: &ShowtimeId, seat: &SeatId) -> bool {
        if self.prebooked_ratio <= 0.0 {
            return false;
        }
        if self.prebooked_ratio >= 1.0 {
            return true;
        }
        let mut hasher = Sha256::new();
        hasher.update(showtime.as_str().as_bytes());
        hasher.update(self.seed.to_be_bytes());
        hasher.update(seat.to_string().as_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let roll = u64::from_be_bytes(head) as f64 / u64::MAX as f64;
        roll < self.prebooked_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RowLayout {
        let rows = ["A", "B", "C", "D"].iter().map(|r| r.to_string()).collect();
        RowLayout::new(rows, 10, HashSet::from([5]))
            .unwrap()
            .with_tier(Tier::Premium, "C", "C")
            .unwrap()
            .with_tier(Tier::Vip, "D", "D")
            .unwrap()
    }

    fn generator(ratio: f64) -> SeatMapGenerator {
        SeatMapGenerator::new(layout(), TierPriceTable::default(), 7, ratio).unwrap()
    }

    #[test]
    fn aisles_are_skipped_not_blocked() {
        let seats = generator(0.0).generate(&ShowtimeId::new("s1"));
        assert_eq!(seats.len(), 4 * 9);
        assert!(seats.iter().all(|s| s.id.number() != 5));
        assert!(seats.iter().all(|s| !s.prebooked));
    }

    #[test]
    fn tiers_follow_row_ranges() {
        let seats = generator(0.0).generate(&ShowtimeId::new("s1"));
        let tier = |id: &str| seats.iter().find(|s| s.id.to_string() == id).unwrap().tier;
        assert_eq!(tier("A1"), Tier::Regular);
        assert_eq!(tier("B10"), Tier::Regular);
        assert_eq!(tier("C3"), Tier::Premium);
        assert_eq!(tier("D4"), Tier::Vip);
        let c3 = seats.iter().find(|s| s.id.to_string() == "C3").unwrap();
        assert_eq!(c3.price, 250);
    }

    #[test]
    fn generation_is_deterministic_per_showtime() {
        let gen = generator(0.5);
        let first = gen.generate(&ShowtimeId::new("s1"));
        let second = gen.generate(&ShowtimeId::new("s1"));
        assert_eq!(first, second);
        assert!(first.iter().any(|s| s.prebooked));
        assert!(first.iter().any(|s| !s.prebooked));
    }

    #[test]
    fn different_showtimes_get_different_sold_seats() {
        let gen = generator(0.5);
        let a: Vec<bool> = gen.generate(&ShowtimeId::new("s1")).iter().map(|s| s.prebooked).collect();
        let b: Vec<bool> = gen.generate(&ShowtimeId::new("s2")).iter().map(|s| s.prebooked).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn full_ratio_books_everything() {
        let seats = generator(1.0).generate(&ShowtimeId::new("s1"));
        assert!(seats.iter().all(|s| s.prebooked));
    }

    #[test]
    fn bad_layouts_are_rejected() {
        assert_eq!(RowLayout::new(vec![], 10, HashSet::new()), Err(LayoutError::NoRows));
        let dup = RowLayout::new(vec!["A".into(), "A".into()], 10, HashSet::new());
        assert_eq!(dup, Err(LayoutError::DuplicateRow("A".into())));
        let range = layout().with_tier(Tier::Vip, "D", "A");
        assert!(matches!(range, Err(LayoutError::InvalidRange(_))));
        assert!(SeatMapGenerator::new(layout(), TierPriceTable::default(), 1, 1.5).is_err());
    }

    #[test]
    fn row_labels_must_be_uppercase_letters() {
        for label in ["a", "A1", "", "B-"] {
            let result = RowLayout::new(vec!["A".into(), label.into()], 10, HashSet::new());
            assert_eq!(result, Err(LayoutError::InvalidRowLabel(label.into())));
        }
        assert!(RowLayout::new(vec!["AA".into(), "AB".into()], 10, HashSet::new()).is_ok());
    }

    #[test]
    fn invalid_ratio_is_reported() {
        let err = SeatMapGenerator::new(layout(), TierPriceTable::default(), 1, -0.5).unwrap_err();
        assert_eq!(err, LayoutError::InvalidRatio(-0.5));
    }
}
