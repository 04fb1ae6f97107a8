use std::collections::BTreeMap;

use bitcoin::{consensus::encode, Amount, ScriptBuf, SignedAmount, TxOut};

use crate::error::AppError;
use crate::params::ChainParams;
use crate::types::{FeeRate, SpendKind};

/// 履歴データに基づく手数料見積もり。
pub trait FeeEstimator {
    /// `confirm_target` ブロック以内の承認に必要なレート。データ不足なら 0 以下を返す。
    fn estimate_fee_rate(&self, confirm_target: u32) -> FeeRate;

    /// ネットワークの優先度推定値。データ不足なら負の値。
    fn estimate_priority(&self, _confirm_target: u32) -> f64 {
        -1.0
    }

    /// 自動設定時の最低手数料。
    fn minimum_fee(&self, tx_bytes: u64, confirm_target: u32) -> Result<SignedAmount, AppError>;

    /// ユーザー指定レートでの手数料。
    fn fee_at_rate(&self, rate: FeeRate, tx_bytes: u64) -> Result<SignedAmount, AppError>;

    /// 優先度が十分なとき手数料 0 で送れるか。
    fn allows_free(&self) -> bool {
        true
    }
}

/// ダスト判定の方針。
pub trait DustPolicy {
    fn dust_threshold(&self, relay_fee: FeeRate) -> Result<SignedAmount, AppError>;

    fn is_dust(&self, value: SignedAmount, relay_fee: FeeRate) -> Result<bool, AppError> {
        Ok(value < self.dust_threshold(relay_fee)?)
    }
}

/// mempool の統計から得た確認目標ごとのレートで見積もる。
#[derive(Debug, Clone)]
pub struct MempoolFeeEstimator {
    params: ChainParams,
    fee_rates: BTreeMap<u32, FeeRate>,
    priorities: BTreeMap<u32, f64>,
}

impl MempoolFeeEstimator {
    pub fn new(params: ChainParams) -> Self {
        MempoolFeeEstimator {
            params,
            fee_rates: BTreeMap::new(),
            priorities: BTreeMap::new(),
        }
    }

    pub fn with_fee_rate(mut self, confirm_target: u32, rate: FeeRate) -> Self {
        self.fee_rates.insert(confirm_target, rate);
        self
    }

    pub fn with_priority(mut self, confirm_target: u32, priority: f64) -> Self {
        self.priorities.insert(confirm_target, priority);
        self
    }

    // 指定の目標でデータがなければ、より遅い目標の推定値を使う
    fn smart_fee_rate(&self, confirm_target: u32) -> Option<(u32, FeeRate)> {
        self.fee_rates
            .range(confirm_target..)
            .find(|(_, rate)| rate.is_positive())
            .map(|(target, rate)| (*target, *rate))
    }
}

impl FeeEstimator for MempoolFeeEstimator {
    fn estimate_fee_rate(&self, confirm_target: u32) -> FeeRate {
        self.fee_rates.get(&confirm_target).copied().unwrap_or(FeeRate::ZERO)
    }

    fn estimate_priority(&self, confirm_target: u32) -> f64 {
        self.priorities.get(&confirm_target).copied().unwrap_or(-1.0)
    }

    fn minimum_fee(&self, tx_bytes: u64, confirm_target: u32) -> Result<SignedAmount, AppError> {
        let rate = match self.smart_fee_rate(confirm_target) {
            Some((found_target, rate)) => {
                log::debug!("確認目標 {} の推定レート {} を使用 (要求 {})", found_target, rate, confirm_target);
                rate
            }
            None => {
                log::debug!("手数料推定のデータ不足。最低中継手数料 {} を使用します。", self.params.min_relay_tx_fee);
                self.params.min_relay_tx_fee
            }
        };
        self.params.clamp_fee(rate.fee(tx_bytes)?, tx_bytes)
    }

    fn fee_at_rate(&self, rate: FeeRate, tx_bytes: u64) -> Result<SignedAmount, AppError> {
        self.params.clamp_fee(rate.fee(tx_bytes)?, tx_bytes)
    }
}

/// サイズに関係なく固定額を払う。シールドノートの送金で使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFeeEstimator {
    fee: SignedAmount,
}

impl FixedFeeEstimator {
    pub fn new(fee: SignedAmount) -> Self {
        FixedFeeEstimator { fee }
    }

    pub fn shielded(params: &ChainParams) -> Self {
        FixedFeeEstimator::new(params.shielded_miners_fee)
    }
}

impl FeeEstimator for FixedFeeEstimator {
    fn estimate_fee_rate(&self, _confirm_target: u32) -> FeeRate {
        FeeRate::ZERO
    }

    fn minimum_fee(&self, _tx_bytes: u64, _confirm_target: u32) -> Result<SignedAmount, AppError> {
        Ok(self.fee)
    }

    fn fee_at_rate(&self, _rate: FeeRate, _tx_bytes: u64) -> Result<SignedAmount, AppError> {
        Ok(self.fee)
    }

    // シールド送金は無料送金の対象外
    fn allows_free(&self) -> bool {
        false
    }
}

/// 標準サイズのダミー出力を基準にしたダスト閾値。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardDustPolicy {
    script_len: usize,
}

impl StandardDustPolicy {
    pub const DUMMY_SCRIPT_LEN: usize = 24;

    pub fn new(script_len: usize) -> Self {
        StandardDustPolicy { script_len }
    }

    fn dummy_output_size(&self) -> u64 {
        let dummy = TxOut {
            value: Amount::ZERO,
            script_pubkey: ScriptBuf::from_bytes(vec![0u8; self.script_len]),
        };
        encode::serialize(&dummy).len() as u64
    }
}

impl Default for StandardDustPolicy {
    fn default() -> Self {
        StandardDustPolicy::new(Self::DUMMY_SCRIPT_LEN)
    }
}

impl DustPolicy for StandardDustPolicy {
    fn dust_threshold(&self, relay_fee: FeeRate) -> Result<SignedAmount, AppError> {
        // 出力を後で使うための入力サイズも含めて、その3倍の手数料未満はダスト
        let spend_size = self.dummy_output_size() + SpendKind::COMPRESSED_INPUT_BYTES;
        relay_fee
            .fee(spend_size)?
            .to_sat()
            .checked_mul(3)
            .map(SignedAmount::from_sat)
            .ok_or_else(|| AppError::overflow("ダスト閾値"))
    }
}
