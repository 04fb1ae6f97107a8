use std::fmt;

use bitcoin::{Amount, OutPoint, PublicKey, Script, SignedAmount};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 1kBあたりの手数料レート (最小単位)。
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FeeRate {
    sat_per_kb: i64,
}

impl FeeRate {
    pub const ZERO: FeeRate = FeeRate { sat_per_kb: 0 };

    pub const fn from_sat_per_kb(sat_per_kb: i64) -> Self {
        FeeRate { sat_per_kb }
    }

    pub const fn sat_per_kb(self) -> i64 {
        self.sat_per_kb
    }

    pub fn is_positive(self) -> bool {
        self.sat_per_kb > 0
    }

    /// `bytes` バイトのトランザクションに対する手数料。
    ///
    /// 切り捨てで 0 になる場合でもレートが正なら最低 1kB 分を返す。
    pub fn fee(self, bytes: u64) -> Result<SignedAmount, AppError> {
        let mut fee = i64::try_from(bytes)
            .ok()
            .and_then(|bytes| self.sat_per_kb.checked_mul(bytes))
            .ok_or_else(|| AppError::overflow(format!("手数料: {} x {} バイト", self, bytes)))?
            / 1000;
        if fee == 0 && self.sat_per_kb > 0 {
            fee = self.sat_per_kb;
        }
        Ok(SignedAmount::from_sat(fee))
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/kB", self.sat_per_kb)
    }
}

/// 入力を消費する際の scriptSig の種類。サイズ見積もりに使う。
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpendKind {
    CompressedKey,
    UncompressedKey,
    Witness,
    Unknown,
}

impl SpendKind {
    pub const COMPRESSED_INPUT_BYTES: u64 = 148;
    pub const UNCOMPRESSED_INPUT_BYTES: u64 = 180;
    // outpoint(32) + index(4) + scriptSig長(1) + witness(107 / 4) + sequence(4)
    pub const WITNESS_INPUT_BYTES: u64 = 32 + 4 + 1 + 107 / 4 + 4;

    pub fn input_bytes(self) -> u64 {
        match self {
            SpendKind::CompressedKey => Self::COMPRESSED_INPUT_BYTES,
            SpendKind::UncompressedKey => Self::UNCOMPRESSED_INPUT_BYTES,
            SpendKind::Witness => Self::WITNESS_INPUT_BYTES,
            SpendKind::Unknown => Self::COMPRESSED_INPUT_BYTES,
        }
    }

    /// scriptPubKey と (分かっていれば) 公開鍵から消費の種類を推定する。
    pub fn from_script(script: &Script, public_key: Option<&PublicKey>) -> Self {
        if script.is_witness_program() {
            SpendKind::Witness
        } else if script.is_p2pkh() {
            match public_key {
                Some(pk) if pk.compressed => SpendKind::CompressedKey,
                Some(_) => SpendKind::UncompressedKey,
                None => SpendKind::Unknown,
            }
        } else {
            SpendKind::Unknown
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputPool {
    #[default]
    Transparent,
    Shielded,
}

/// 選択可能な未使用アウトプット1件。スナップショット更新ごとに作り直す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateInput {
    pub out_point: OutPoint,
    pub value: Amount,
    pub confirmations: u32,
    pub is_spendable: bool,
    pub is_coinbase: bool,
    pub spend_kind: SpendKind,
    pub pool: InputPool,
}

impl CandidateInput {
    pub fn new(out_point: OutPoint, value: Amount, confirmations: u32, spend_kind: SpendKind) -> Self {
        CandidateInput {
            out_point,
            value,
            confirmations,
            is_spendable: true,
            is_coinbase: false,
            spend_kind,
            pool: InputPool::Transparent,
        }
    }
}

/// コインベースと消費不可のアウトプットを除いたスナップショットを返す。
pub fn spendable_candidates(snapshot: &[CandidateInput]) -> Vec<CandidateInput> {
    snapshot
        .iter()
        .filter(|c| {
            let keep = c.is_spendable && !c.is_coinbase;
            if !keep {
                log::debug!("選択候補から除外: {} (spendable={}, coinbase={})", c.out_point, c.is_spendable, c.is_coinbase);
            }
            keep
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedPayment {
    pub amount: Amount,
    pub subtract_fee_from_amount: bool,
}

impl RequestedPayment {
    pub fn new(amount: Amount) -> Self {
        RequestedPayment { amount, subtract_fee_from_amount: false }
    }

    pub fn subtracting_fee(amount: Amount) -> Self {
        RequestedPayment { amount, subtract_fee_from_amount: true }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomFeeKind {
    PerKilobyte,
    AtLeast,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FeeMode {
    Automatic,
    Custom { fee: Amount, kind: CustomFeeKind },
}

/// 手数料の設定。ダイアログ間で共有されていたグローバル値の代わりに毎回渡す。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FeePolicy {
    pub mode: FeeMode,
    pub confirm_target: u32,
    pub pay_only_minimum: bool,
    pub send_free_transactions: bool,
}

impl FeePolicy {
    pub fn automatic(confirm_target: u32) -> Self {
        FeePolicy {
            mode: FeeMode::Automatic,
            confirm_target,
            pay_only_minimum: false,
            send_free_transactions: false,
        }
    }

    pub fn custom(fee: Amount, kind: CustomFeeKind, confirm_target: u32) -> Self {
        FeePolicy {
            mode: FeeMode::Custom { fee, kind },
            confirm_target,
            pay_only_minimum: false,
            send_free_transactions: false,
        }
    }
}

/// 優先度の段階。ネットワークの推定値との比で決まる。
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityLabel {
    Lowest,
    Lower,
    Low,
    LowMedium,
    Medium,
    High,
    Higher,
    VeryHigh,
    Highest,
}

impl fmt::Display for PriorityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriorityLabel::Lowest => "lowest",
            PriorityLabel::Lower => "lower",
            PriorityLabel::Low => "low",
            PriorityLabel::LowMedium => "low-medium",
            PriorityLabel::Medium => "medium",
            PriorityLabel::High => "high",
            PriorityLabel::Higher => "higher",
            PriorityLabel::VeryHigh => "very-high",
            PriorityLabel::Highest => "highest",
        };
        f.write_str(s)
    }
}

/// 選択中の入力と支払いから計算した手数料・おつりの見積もり。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePlan {
    pub quantity: usize,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub total_input: SignedAmount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub total_requested: SignedAmount,
    /// 受取人に実際に届く合計 (手数料差し引き・ダスト引き上げ後)。
    ///
    /// 手数料差し引き時に手数料が入力を上回ると負になる。
    /// `insufficient_funds` はおつりしか見ないので、呼び出し側で確認すること。
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub delivered_amount: SignedAmount,
    pub estimated_byte_size: u64,
    pub priority_score: f64,
    pub priority_label: Option<PriorityLabel>,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub fee: SignedAmount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub after_fee: SignedAmount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub change: SignedAmount,
    pub is_dust: bool,
    pub insufficient_funds: bool,
    pub allow_free: bool,
    pub fee_is_estimate: bool,
    pub fee_vary_per_byte: f64,
}

impl FeePlan {
    /// 入力未選択時の「未計算」状態。
    pub fn empty() -> Self {
        FeePlan {
            quantity: 0,
            total_input: SignedAmount::ZERO,
            total_requested: SignedAmount::ZERO,
            delivered_amount: SignedAmount::ZERO,
            estimated_byte_size: 0,
            priority_score: 0.0,
            priority_label: None,
            fee: SignedAmount::ZERO,
            after_fee: SignedAmount::ZERO,
            change: SignedAmount::ZERO,
            is_dust: false,
            insufficient_funds: false,
            allow_free: false,
            fee_is_estimate: false,
            fee_vary_per_byte: 0.0,
        }
    }
}
