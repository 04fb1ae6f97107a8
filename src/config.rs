use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use bitcoin::{Amount, OutPoint, PublicKey, ScriptBuf, Txid};
use serde::Deserialize;

use crate::{
    error::AppError,
    estimator::MempoolFeeEstimator,
    params::ChainParams,
    types::{CandidateInput, CustomFeeKind, FeeMode, FeePolicy, FeeRate, InputPool, RequestedPayment, SpendKind},
};

/// 送金ドラフトの JSON ファイル。
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DraftConfig {
    pub inputs: Vec<InputDef>,
    #[serde(default)]
    pub payments: Vec<PaymentDef>,
    #[serde(default)]
    pub fee_policy: FeePolicyDef,
    #[serde(default)]
    pub fee_estimates: BTreeMap<u32, i64>, // 確認目標 -> sat/kB
    #[serde(default)]
    pub priority_estimates: BTreeMap<u32, f64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InputDef {
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default = "default_true")]
    pub spendable: bool,
    #[serde(default)]
    pub coinbase: bool,
    #[serde(default)]
    pub script_pubkey_hex: Option<String>,
    #[serde(default)]
    pub public_key_hex: Option<String>,
    #[serde(default)]
    pub spend_kind: Option<SpendKind>,
    #[serde(default)]
    pub pool: InputPool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDef {
    pub amount_sats: u64,
    #[serde(default)]
    pub subtract_fee_from_amount: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FeeModeDef {
    #[default]
    Automatic,
    Custom,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeePolicyDef {
    #[serde(default)]
    pub mode: FeeModeDef,
    #[serde(default)]
    pub confirm_target: Option<u32>,
    #[serde(default)]
    pub custom_fee_sats: u64,
    #[serde(default)]
    pub custom_fee_kind: Option<CustomFeeKind>,
    #[serde(default)]
    pub pay_only_minimum_fee: bool,
    #[serde(default)]
    pub send_free_transactions: bool,
}

fn default_true() -> bool {
    true
}

/// 検証済みのドラフト。
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub selection: Vec<CandidateInput>,
    pub payments: Vec<RequestedPayment>,
    pub policy: FeePolicy,
    pub pool: InputPool,
}

pub fn load_draft_config(path: &Path) -> Result<DraftConfig, AppError> {
    let content = fs::read_to_string(path).map_err(|e| {
        log::error!("入力ファイルの読み込みに失敗しました: {:?}", path);
        AppError::Io(e)
    })?;
    serde_json::from_str(&content).map_err(|e| {
        log::error!("入力JSONのパースに失敗しました。");
        AppError::JsonParse { file_path: path.to_path_buf(), source: e }
    })
}

impl InputDef {
    fn to_candidate(&self) -> Result<CandidateInput, AppError> {
        let txid = Txid::from_str(&self.txid)
            .map_err(|e| AppError::InputValidation(format!("無効なTXID形式 ({}): {}", self.txid, e)))?;

        let public_key = self
            .public_key_hex
            .as_deref()
            .map(|hex_str| {
                PublicKey::from_str(hex_str)
                    .map_err(|e| AppError::InputValidation(format!("公開鍵のデコード失敗 ({}): {}", hex_str, e)))
            })
            .transpose()?;

        let spend_kind = match (self.spend_kind, &self.script_pubkey_hex) {
            (Some(kind), _) => kind,
            (None, Some(script_hex)) => {
                let bytes = hex::decode(script_hex)
                    .map_err(|e| AppError::InputValidation(format!("scriptPubKeyHexのデコード失敗: {}", e)))?;
                SpendKind::from_script(&ScriptBuf::from_bytes(bytes), public_key.as_ref())
            }
            (None, None) => match public_key {
                Some(pk) if !pk.compressed => SpendKind::UncompressedKey,
                Some(_) => SpendKind::CompressedKey,
                None => SpendKind::Unknown,
            },
        };

        Ok(CandidateInput {
            out_point: OutPoint::new(txid, self.vout),
            value: Amount::from_sat(self.value_sats),
            confirmations: self.confirmations,
            is_spendable: self.spendable,
            is_coinbase: self.coinbase,
            spend_kind,
            pool: self.pool,
        })
    }
}

impl FeePolicyDef {
    fn to_policy(&self, params: &ChainParams) -> Result<FeePolicy, AppError> {
        let confirm_target = self.confirm_target.unwrap_or(params.default_confirm_target);
        if confirm_target == 0 {
            return Err(AppError::InputValidation("確認目標は1以上である必要があります".to_string()));
        }
        let mode = match self.mode {
            FeeModeDef::Automatic => FeeMode::Automatic,
            FeeModeDef::Custom => FeeMode::Custom {
                fee: Amount::from_sat(self.custom_fee_sats),
                kind: self.custom_fee_kind.unwrap_or(CustomFeeKind::PerKilobyte),
            },
        };
        Ok(FeePolicy {
            mode,
            confirm_target,
            pay_only_minimum: self.pay_only_minimum_fee,
            send_free_transactions: self.send_free_transactions,
        })
    }
}

impl DraftConfig {
    /// 入力・支払いを検証してドメインの型に変換する。
    pub fn into_draft(&self, params: &ChainParams) -> Result<TransactionDraft, AppError> {
        let selection = self
            .inputs
            .iter()
            .map(InputDef::to_candidate)
            .collect::<Result<Vec<_>, _>>()?;

        let pool = match selection.first() {
            Some(first) => {
                if selection.iter().any(|c| c.pool != first.pool) {
                    return Err(AppError::MixedInputPools);
                }
                first.pool
            }
            None => InputPool::Transparent,
        };

        let mut payments = Vec::with_capacity(self.payments.len());
        for (index, def) in self.payments.iter().enumerate() {
            if def.amount_sats == 0 {
                return Err(AppError::InputValidation(format!("支払い {} の金額は0より大きい必要があります", index)));
            }
            payments.push(RequestedPayment {
                amount: Amount::from_sat(def.amount_sats),
                subtract_fee_from_amount: def.subtract_fee_from_amount,
            });
        }

        Ok(TransactionDraft {
            selection,
            payments,
            policy: self.fee_policy.to_policy(params)?,
            pool,
        })
    }

    pub fn mempool_estimator(&self, params: &ChainParams) -> MempoolFeeEstimator {
        let estimator = self
            .fee_estimates
            .iter()
            .fold(MempoolFeeEstimator::new(params.clone()), |est, (target, rate)| {
                est.with_fee_rate(*target, FeeRate::from_sat_per_kb(*rate))
            });
        self.priority_estimates
            .iter()
            .fold(estimator, |est, (target, priority)| est.with_priority(*target, *priority))
    }
}
