use crate::models::{PriceBreakdown, Seat};
use crate::services::selection::SeatSelectionStore;

const BASIS_POINTS: u64 = 10_000;

/// Turns a selection into a price breakdown. Holds no state besides the fee rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingCalculator {
    fee_basis_points: u32,
}

impl PricingCalculator {
    pub fn new(fee_basis_points: u32) -> Self {
        Self { fee_basis_points }
    }

    pub fn fee_basis_points(&self) -> u32 {
        self.fee_basis_points
    }

    /// Fee rounded half-up to the nearest whole currency unit.
    pub fn fee(&self, base: u64) -> u64 {
        (base * u64::from(self.fee_basis_points) + BASIS_POINTS / 2) / BASIS_POINTS
    }

    pub fn from_base(&self, base: u64) -> PriceBreakdown {
        let fee = self.fee(base);
        PriceBreakdown { base, fee, total: base + fee }
    }

    pub fn price<'a>(&self, seats: impl IntoIterator<Item = &'a Seat>) -> PriceBreakdown {
        self.from_base(seats.into_iter().map(|s| s.price).sum())
    }

    /// Live price of a selection, from its running subtotal.
    pub fn quote(&self, selection: &SeatSelectionStore) -> PriceBreakdown {
        self.from_base(selection.subtotal())
    }
}

impl Default for PricingCalculator {
    fn default() -> Self {
        Self::new(1000)
    }
}
