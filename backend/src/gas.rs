//! EIP-1559 fee policy. Pure: the same attempt and fee inputs always price the same.

use ethers::types::U256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasParams {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Multipliers are kept in tenths so the math stays in integers.
#[derive(Clone, Copy, Debug)]
pub struct GasPolicy {
    pub priority_base_tenths: u64,
    pub priority_step_tenths: u64,
    pub base_fee_base_tenths: u64,
    pub base_fee_step_tenths: u64,
    pub gas_limit_multiplier: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            // priority = suggested * (2 + 0.5 * attempt)
            priority_base_tenths: 20,
            priority_step_tenths: 5,
            // maxFee = baseFee * (5 + 0.8 * attempt) + priority
            base_fee_base_tenths: 50,
            base_fee_step_tenths: 8,
            gas_limit_multiplier: 3,
        }
    }
}

fn scale_tenths(value: U256, tenths: u64) -> U256 {
    value.saturating_mul(U256::from(tenths)) / U256::from(10u64)
}

impl GasPolicy {
    pub fn with_gas_limit_multiplier(mut self, multiplier: u64) -> Self {
        self.gas_limit_multiplier = multiplier;
        self
    }

    /// Fees for the zero-based `attempt`.
    pub fn params(&self, attempt: u32, base_fee: U256, suggested_priority: U256) -> GasParams {
        let attempt = attempt as u64;
        let priority_tenths = self.priority_base_tenths + self.priority_step_tenths * attempt;
        let base_tenths = self.base_fee_base_tenths + self.base_fee_step_tenths * attempt;

        let priority = scale_tenths(suggested_priority, priority_tenths);
        let max_fee = scale_tenths(base_fee, base_tenths).saturating_add(priority);

        GasParams { max_fee_per_gas: max_fee, max_priority_fee_per_gas: priority }
    }

    pub fn gas_limit(&self, estimate: U256) -> U256 {
        estimate.saturating_mul(U256::from(self.gas_limit_multiplier))
    }
}
