//! On-chain settlement adapter
//!
//! Reads payout ratios from the conditional-token settlement contract and
//! executes redemptions for resolved markets. Collateral quantities are
//! 6-decimal fixed point at the contract boundary.

use ethers::contract::abigen;
use ethers::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Gas limit for redemption transactions.
const GAS_LIMIT: u64 = 500_000;

/// Submit at 120% of the current network gas price so redemptions don't
/// stall during congestion.
const GAS_PRICE_BUMP_NUM: u64 = 120;
const GAS_PRICE_BUMP_DEN: u64 = 100;

/// Receipt wait ceiling.
const RECEIPT_TIMEOUT_SECS: u64 = 60;

/// Collateral (USDC) has 6 decimal places.
pub const USDC_DECIMALS: u8 = 6;

abigen!(
    ConditionalTokens,
    r#"[
        function payoutDenominator(bytes32 conditionId) external view returns (uint256)
        function payoutNumerators(bytes32 conditionId, uint256 index) external view returns (uint256)
        function getOutcomeSlotCount(bytes32 conditionId) external view returns (uint256)
        function redeemPositions(address collateralToken, bytes32 parentCollectionId, bytes32 conditionId, uint256[] calldata indexSets) external
    ]"#
);

abigen!(
    ERC20,
    r#"[
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Invalid condition ID: {0}")]
    InvalidConditionId(String),

    #[error("Invalid outcome index {index} (slot count {slot_count})")]
    InvalidOutcomeIndex { index: i32, slot_count: u64 },

    #[error("Invalid signer key: {0}")]
    InvalidKey(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

pub type Result<T> = std::result::Result<T, SettlementError>;

/// Resolution state of a `(condition, outcome)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayoutStatus {
    /// The denominator is reported only after resolution.
    pub settled: bool,
    /// Quote units paid per token for the outcome; 0 while unsettled.
    pub payout: f64,
}

impl PayoutStatus {
    pub fn unsettled() -> Self {
        Self {
            settled: false,
            payout: 0.0,
        }
    }
}

/// Successful on-chain redemption.
#[derive(Debug, Clone)]
pub struct RedemptionOutcome {
    pub tx_hash: String,
    pub gas_used: Option<u64>,
}

pub struct SettlementClient {
    rpc_url: String,
    chain_id: u64,
    ctf_address: Address,
    collateral: Address,
    provider: Arc<Provider<Http>>,
}

impl SettlementClient {
    pub fn new(
        rpc_url: &str,
        chain_id: u64,
        settlement_contract: &str,
        collateral: &str,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| SettlementError::ProviderError(e.to_string()))?;
        let ctf_address: Address = settlement_contract
            .parse()
            .map_err(|_| SettlementError::ContractError("bad settlement address".to_string()))?;
        let collateral: Address = collateral
            .parse()
            .map_err(|_| SettlementError::ContractError("bad collateral address".to_string()))?;

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            chain_id,
            ctf_address,
            collateral,
            provider: Arc::new(provider),
        })
    }

    fn ctf(&self) -> ConditionalTokens<Provider<Http>> {
        ConditionalTokens::new(self.ctf_address, Arc::clone(&self.provider))
    }

    /// Read the payout ratio for one outcome of a condition.
    ///
    /// `settled` ⇔ the payout denominator is non-zero. The outcome index
    /// must lie in `[0, outcomeSlotCount)`.
    pub async fn payout_ratio(&self, condition_id: &str, outcome_index: i32) -> Result<PayoutStatus> {
        let condition = parse_condition_id(condition_id)?;
        let ctf = self.ctf();

        let denominator = ctf
            .payout_denominator(condition)
            .call()
            .await
            .map_err(|e| SettlementError::ContractError(e.to_string()))?;

        if denominator.is_zero() {
            return Ok(PayoutStatus::unsettled());
        }

        let slot_count = ctf
            .get_outcome_slot_count(condition)
            .call()
            .await
            .map_err(|e| SettlementError::ContractError(e.to_string()))?
            .as_u64();

        if outcome_index < 0 || (outcome_index as u64) >= slot_count {
            return Err(SettlementError::InvalidOutcomeIndex {
                index: outcome_index,
                slot_count,
            });
        }

        let numerator = ctf
            .payout_numerators(condition, U256::from(outcome_index as u64))
            .call()
            .await
            .map_err(|e| SettlementError::ContractError(e.to_string()))?;

        Ok(PayoutStatus {
            settled: true,
            payout: numerator.as_u128() as f64 / denominator.as_u128() as f64,
        })
    }

    /// Collateral balance of a wallet, in quote units.
    pub async fn quote_balance(&self, wallet: &str) -> Result<f64> {
        let account: Address = wallet
            .parse()
            .map_err(|_| SettlementError::ProviderError(format!("invalid wallet '{}'", wallet)))?;
        let usdc = ERC20::new(self.collateral, Arc::clone(&self.provider));
        let raw = usdc
            .balance_of(account)
            .call()
            .await
            .map_err(|e| SettlementError::ContractError(e.to_string()))?;
        Ok(usdc_from_raw(raw))
    }

    /// Redeem all index sets of a resolved condition for the signer.
    pub async fn redeem_on_chain(
        &self,
        private_key: &str,
        condition_id: &str,
    ) -> Result<RedemptionOutcome> {
        let condition = parse_condition_id(condition_id)?;
        let wallet = parse_wallet(private_key, self.chain_id)?;

        let provider = Provider::<Http>::try_from(self.rpc_url.as_str())
            .map_err(|e| SettlementError::ProviderError(e.to_string()))?;
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let ctf = ConditionalTokens::new(self.ctf_address, Arc::clone(&client));

        let slot_count = ctf
            .get_outcome_slot_count(condition)
            .call()
            .await
            .map_err(|e| SettlementError::ContractError(e.to_string()))?
            .as_u64();
        if slot_count == 0 {
            return Err(SettlementError::ContractError(
                "condition has no outcome slots".to_string(),
            ));
        }

        // One index set per outcome slot: 1<<0, 1<<1, ...
        let index_sets: Vec<U256> = (0..slot_count).map(|i| U256::one() << i).collect();

        let gas_price = client
            .get_gas_price()
            .await
            .map_err(|e| SettlementError::ProviderError(e.to_string()))?;
        let bumped = gas_price * U256::from(GAS_PRICE_BUMP_NUM) / U256::from(GAS_PRICE_BUMP_DEN);

        let call = ctf
            .redeem_positions(self.collateral, [0u8; 32], condition, index_sets)
            .gas_price(bumped)
            .gas(GAS_LIMIT);

        let pending_tx = call
            .send()
            .await
            .map_err(|e| SettlementError::ContractError(e.to_string()))?;
        let tx_hash = pending_tx.tx_hash();
        info!("Redemption submitted: {:?}", tx_hash);

        let receipt = tokio::time::timeout(
            std::time::Duration::from_secs(RECEIPT_TIMEOUT_SECS),
            pending_tx,
        )
        .await
        .map_err(|_| SettlementError::TransactionFailed(format!("Timeout. TX: {:?}", tx_hash)))?
        .map_err(|e| SettlementError::TransactionFailed(e.to_string()))?
        .ok_or_else(|| SettlementError::TransactionFailed("No receipt".to_string()))?;

        if receipt.status == Some(U64::from(1)) {
            Ok(RedemptionOutcome {
                tx_hash: format!("{:?}", tx_hash),
                gas_used: receipt.gas_used.map(|g| g.as_u64()),
            })
        } else {
            warn!("Redemption reverted: {:?}", tx_hash);
            Err(SettlementError::TransactionFailed(
                "Transaction reverted".to_string(),
            ))
        }
    }
}

/// Address controlled by a private key.
pub fn derive_address(private_key: &str) -> Result<Address> {
    Ok(parse_wallet(private_key, 1)?.address())
}

/// Whether `private_key` controls `wallet`.
pub fn key_controls_wallet(private_key: &str, wallet: &str) -> Result<bool> {
    let expected: Address = wallet
        .parse()
        .map_err(|_| SettlementError::ProviderError(format!("invalid wallet '{}'", wallet)))?;
    Ok(derive_address(private_key)? == expected)
}

fn parse_wallet(private_key: &str, chain_id: u64) -> Result<LocalWallet> {
    let wallet: LocalWallet = private_key
        .trim_start_matches("0x")
        .parse()
        .map_err(|e: WalletError| SettlementError::InvalidKey(e.to_string()))?;
    Ok(wallet.with_chain_id(chain_id))
}

fn parse_condition_id(condition_id: &str) -> Result<[u8; 32]> {
    let hex_str = condition_id.trim_start_matches("0x");
    if hex_str.len() != 64 {
        return Err(SettlementError::InvalidConditionId(format!(
            "Expected 64 hex chars, got {}",
            hex_str.len()
        )));
    }
    let bytes = hex::decode(hex_str)
        .map_err(|e| SettlementError::InvalidConditionId(e.to_string()))?;
    let mut result = [0u8; 32];
    result.copy_from_slice(&bytes);
    Ok(result)
}

/// Example: `usdc_to_raw(100.0)` returns 100_000_000 (6 decimals).
pub fn usdc_to_raw(amount: f64) -> U256 {
    let raw = (amount * 10f64.powi(USDC_DECIMALS as i32)) as u64;
    U256::from(raw)
}

/// Example: `usdc_from_raw(100_000_000)` returns 100.0.
pub fn usdc_from_raw(raw: U256) -> f64 {
    let raw_u64 = raw.min(U256::from(u64::MAX)).as_u64();
    raw_u64 as f64 / 10f64.powi(USDC_DECIMALS as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_condition_id() {
        let valid = "0xabcd1234abcd1234abcd1234abcd1234abcd1234abcd1234abcd1234abcd1234";
        assert!(parse_condition_id(valid).is_ok());
        assert!(parse_condition_id(&valid[2..]).is_ok());
        assert!(parse_condition_id("invalid").is_err());
    }

    #[test]
    fn test_usdc_conversions() {
        assert_eq!(usdc_to_raw(100.0), U256::from(100_000_000u64));
        assert_eq!(usdc_to_raw(0.5), U256::from(500_000u64));
        assert!((usdc_from_raw(U256::from(100_000_000u64)) - 100.0).abs() < 1e-9);
        assert!((usdc_from_raw(U256::from(1_500_000u64)) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_index_sets_are_bit_flags() {
        let sets: Vec<U256> = (0..3u64).map(|i| U256::one() << i).collect();
        assert_eq!(sets, vec![U256::from(1u64), U256::from(2u64), U256::from(4u64)]);
    }

    #[test]
    fn test_key_controls_wallet() {
        // Well-known test vector: key 0x...01 controls
        // 0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf.
        let key = "0x0000000000000000000000000000000000000000000000000000000000000001";
        assert!(key_controls_wallet(key, "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf").unwrap());
        assert!(!key_controls_wallet(key, "0x0000000000000000000000000000000000000dead")
            .unwrap_or(false));
    }

    #[test]
    fn test_payout_status_unsettled() {
        let status = PayoutStatus::unsettled();
        assert!(!status.settled);
        assert_eq!(status.payout, 0.0);
    }
}
