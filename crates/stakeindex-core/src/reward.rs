//! Staking reward calculation.
//!
//! The three `calculate_*` functions are pure and deterministic so that a
//! height finalized twice (for instance after a reorg) yields the same rows.
//! [`Distribution`] combines them for one block and one delegator set.

use crate::amount::{Amount, Percentage};
use crate::error::IndexerError;

/// A delegator's share of its validator's total staked balance.
pub fn calculate_weight(balance: Amount, total_staked: Amount) -> Result<Percentage, IndexerError> {
    if total_staked.is_zero() {
        return Err(IndexerError::InvalidStakeTotal);
    }
    balance.div_amount(total_staked)
}

/// Net reward of a delegator: `block_reward × weight × (100% − fee)`.
///
/// The product is computed at full precision and truncated once.
pub fn calculate_delegator_reward(
    weight: Percentage,
    block_reward: Amount,
    validator_fee: Percentage,
) -> Result<Amount, IndexerError> {
    let net = validator_fee.complement()?;
    let fraction = weight
        .as_fraction()
        .checked_mul(net.as_fraction())
        .ok_or_else(|| IndexerError::Other(format!("weight overflow: {weight} × {net}")))?;
    block_reward.mul_percentage(Percentage::from_fraction(fraction)?)
}

/// The validator's fee cut of the raw block reward.
pub fn calculate_validator_reward(
    block_reward: Amount,
    validator_fee: Percentage,
) -> Result<Amount, IndexerError> {
    if !validator_fee.is_valid_fee() {
        return Err(IndexerError::Validation(format!(
            "validator fee out of range: {validator_fee}"
        )));
    }
    block_reward.mul_percentage(validator_fee)
}

/// One account's stake delegated to the block producer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delegation {
    pub account: String,
    pub balance: Amount,
}

/// A delegator's computed share of a block reward.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegatorShare {
    pub account: String,
    pub weight: Percentage,
    pub amount: Amount,
}

/// How a single block reward splits between a validator and its delegators.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub block_reward: Amount,
    /// Validator total: fee cut plus the net share of its self-stake.
    pub validator: Amount,
    /// Shares of every delegator other than the validator itself.
    pub delegators: Vec<DelegatorShare>,
    /// Truncation remainder that nobody receives.
    pub dust: Amount,
}

impl Distribution {
    /// Split `block_reward` produced by `validator` across `delegations`.
    ///
    /// The validator's own account may appear in `delegations`; its weight is
    /// then its self-stake. An empty delegator set leaves the whole reward to
    /// the validator. A non-empty set whose balances sum to zero fails with
    /// `InvalidStakeTotal`.
    pub fn compute(
        block_reward: Amount,
        validator: &str,
        validator_fee: Percentage,
        delegations: &[Delegation],
    ) -> Result<Self, IndexerError> {
        if delegations.is_empty() {
            return Ok(Self {
                block_reward,
                validator: block_reward,
                delegators: Vec::new(),
                dust: Amount::ZERO,
            });
        }

        let total = Amount::checked_sum(delegations.iter().map(|d| d.balance))?;
        let mut validator_total = calculate_validator_reward(block_reward, validator_fee)?;
        let mut delegators = Vec::with_capacity(delegations.len());

        for delegation in delegations {
            let weight = calculate_weight(delegation.balance, total)?;
            let amount = calculate_delegator_reward(weight, block_reward, validator_fee)?;
            if delegation.account == validator {
                validator_total = validator_total.checked_add(amount)?;
            } else {
                delegators.push(DelegatorShare {
                    account: delegation.account.clone(),
                    weight,
                    amount,
                });
            }
        }

        let distributed =
            Amount::checked_sum(delegators.iter().map(|d| d.amount))?.checked_add(validator_total)?;
        let dust = block_reward.checked_sub(distributed).map_err(|_| {
            IndexerError::Other(format!(
                "reward over-distributed: {distributed} > {block_reward}"
            ))
        })?;

        Ok(Self {
            block_reward,
            validator: validator_total,
            delegators,
            dust,
        })
    }

    /// Sum of every share, validator included.
    pub fn distributed(&self) -> Result<Amount, IndexerError> {
        Amount::checked_sum(self.delegators.iter().map(|d| d.amount))?.checked_add(self.validator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pct(s: &str) -> Percentage {
        s.parse().unwrap()
    }

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn delegation(account: &str, balance: &str) -> Delegation {
        Delegation {
            account: account.into(),
            balance: amt(balance),
        }
    }

    #[test]
    fn weight_is_balance_over_total() {
        let w = calculate_weight(amt("10"), amt("10000")).unwrap();
        assert_eq!(w.as_fraction(), dec!(0.001));
    }

    #[test]
    fn weight_fails_on_zero_total() {
        assert!(matches!(
            calculate_weight(amt("10"), Amount::ZERO),
            Err(IndexerError::InvalidStakeTotal)
        ));
    }

    #[test]
    fn delegator_reward() {
        let w = Percentage::from_fraction(dec!(0.3)).unwrap();
        let r = calculate_delegator_reward(w, amt("100"), pct("5")).unwrap();
        assert_eq!(r, amt("28.5"));
    }

    #[test]
    fn validator_reward() {
        let r = calculate_validator_reward(amt("100"), pct("5")).unwrap();
        assert_eq!(r, amt("5"));
    }

    #[test]
    fn same_inputs_same_outputs() {
        let w = calculate_weight(amt("1"), amt("3")).unwrap();
        let a = calculate_delegator_reward(w, amt("720"), pct("7.5")).unwrap();
        let b = calculate_delegator_reward(w, amt("720"), pct("7.5")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distribution_includes_self_stake() {
        let dist = Distribution::compute(
            amt("100"),
            "B62qval",
            pct("5"),
            &[
                delegation("B62qval", "300"),
                delegation("B62qalice", "500"),
                delegation("B62qbob", "200"),
            ],
        )
        .unwrap();

        // fee cut 5 + self share 100 × 0.3 × 0.95 = 28.5
        assert_eq!(dist.validator, amt("33.5"));
        assert_eq!(dist.delegators.len(), 2);
        assert_eq!(dist.delegators[0].amount, amt("47.5"));
        assert_eq!(dist.delegators[1].amount, amt("19"));
        assert_eq!(dist.dust, Amount::ZERO);
        assert_eq!(dist.distributed().unwrap(), amt("100"));
    }

    #[test]
    fn distribution_never_exceeds_reward() {
        let delegations: Vec<_> = (1..=7)
            .map(|i| delegation(&format!("B62q{i}"), &format!("{}.333333333", i * 13)))
            .collect();
        let dist = Distribution::compute(amt("720"), "B62qval", pct("3.3"), &delegations).unwrap();

        assert!(dist.distributed().unwrap() <= dist.block_reward);
        // at most one nanomina lost per computed share
        let tolerance = Amount::from_nanos(delegations.len() as u64 + 1);
        assert!(dist.dust <= tolerance, "dust {} too large", dist.dust);
        assert_eq!(
            dist.distributed().unwrap().checked_add(dist.dust).unwrap(),
            dist.block_reward
        );
    }

    #[test]
    fn distribution_without_delegators_goes_to_validator() {
        let dist = Distribution::compute(amt("720"), "B62qval", pct("5"), &[]).unwrap();
        assert_eq!(dist.validator, amt("720"));
        assert!(dist.delegators.is_empty());
    }

    #[test]
    fn distribution_with_zero_stake_fails() {
        let err = Distribution::compute(
            amt("720"),
            "B62qval",
            pct("5"),
            &[delegation("B62qalice", "0")],
        )
        .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidStakeTotal));
    }
}
