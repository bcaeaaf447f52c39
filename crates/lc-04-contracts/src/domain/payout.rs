//! Payout math for validated deliveries.

use super::errors::ContractError;
use shared_types::{Address, Amount, Contract, CoreError, RewardSplit};

/// Where the released value goes when a contract reaches VALIDATED.
#[derive(Clone, Debug, PartialEq)]
pub struct PayoutPlan {
    pub contract_id: shared_types::Hash,
    pub driver: Address,
    pub driver_amount: Amount,
    /// Split equally among the block's attesting validators.
    pub validator_pool: Amount,
    /// Credited to the network reserve account.
    pub reserve: Amount,
    /// driver + validators + reserve, exactly.
    pub total: Amount,
}

/// Compute the split of (base reward + escrow).
///
/// Rounding dust from the proportional shares lands in the reserve so the
/// plan always sums exactly to the released total.
pub fn payout_plan(
    contract: &Contract,
    base_reward: Amount,
    split: &RewardSplit,
) -> Result<PayoutPlan, ContractError> {
    let driver = contract.driver.ok_or(ContractError::NotTheDriver)?;
    let total = base_reward
        .checked_add(contract.escrow)
        .map_err(overflow)?;

    let driver_amount = total.share_ppm(split.driver_ppm).map_err(overflow)?;
    let validator_pool = total.share_ppm(split.validators_ppm).map_err(overflow)?;
    let reserve = total
        .checked_sub(driver_amount)
        .and_then(|rest| rest.checked_sub(validator_pool))
        .map_err(overflow)?;

    Ok(PayoutPlan {
        contract_id: contract.id,
        driver,
        driver_amount,
        validator_pool,
        reserve,
        total,
    })
}

fn overflow(_: CoreError) -> ContractError {
    ContractError::MalformedPayload {
        detail: "payout arithmetic overflow".into(),
    }
}
