use bitcoin::{Network, SignedAmount};

use crate::error::AppError;
use crate::types::FeeRate;

pub const COIN: i64 = 100_000_000;
pub const CENT: i64 = 1_000_000;

/// ネットワーク全体で共通の手数料・中継に関する定数。
#[derive(Debug, Clone, PartialEq)]
pub struct ChainParams {
    pub network: Network,
    pub min_relay_tx_fee: FeeRate,
    pub min_tx_fee: FeeRate,
    pub max_tx_fee: SignedAmount,
    pub allow_free_threshold: f64,
    pub max_free_tx_size: u64,
    pub min_change: SignedAmount,
    pub default_confirm_target: u32,
    pub shielded_miners_fee: SignedAmount,
}

impl ChainParams {
    pub fn for_network(network: Network) -> Self {
        let default_confirm_target = match network {
            Network::Regtest => 1,
            _ => 2,
        };
        ChainParams {
            network,
            min_relay_tx_fee: FeeRate::from_sat_per_kb(1000),
            min_tx_fee: FeeRate::from_sat_per_kb(1000),
            max_tx_fee: SignedAmount::from_sat(COIN / 10),
            allow_free_threshold: (COIN * 144) as f64 / 250.0,
            max_free_tx_size: 1000,
            min_change: SignedAmount::from_sat(CENT),
            default_confirm_target,
            shielded_miners_fee: SignedAmount::from_sat(1000),
        }
    }

    /// 中継と受け入れに必要な最低手数料。
    pub fn required_fee(&self, bytes: u64) -> Result<SignedAmount, AppError> {
        Ok(self.min_tx_fee.fee(bytes)?.max(self.min_relay_tx_fee.fee(bytes)?))
    }

    /// 最低手数料以上、上限以下に収める。
    pub fn clamp_fee(&self, fee: SignedAmount, bytes: u64) -> Result<SignedAmount, AppError> {
        Ok(fee.max(self.required_fee(bytes)?).min(self.max_tx_fee))
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        ChainParams::for_network(Network::Bitcoin)
    }
}
