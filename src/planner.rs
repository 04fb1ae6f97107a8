use bitcoin::{Amount, SignedAmount};

use crate::{
    error::AppError,
    estimator::{DustPolicy, FeeEstimator},
    params::ChainParams,
    types::{CandidateInput, CustomFeeKind, FeeMode, FeePlan, FeePolicy, FeeRate, PriorityLabel, RequestedPayment, SpendKind},
};

// 出力1つあたりの推定サイズ
const OUTPUT_BYTES: u64 = 34;
// version, locktime, 入出力数
const TX_OVERHEAD_BYTES: u64 = 10;
// 非圧縮公開鍵の入力は 151 バイトを超える分が優先度計算から除外される
const UNCOMPRESSED_PRIORITY_PENALTY: i64 = (SpendKind::UNCOMPRESSED_INPUT_BYTES - 151) as i64;

/// ポリシーから導いた実際の手数料設定
#[derive(Debug, Clone, Copy)]
struct ResolvedFee {
    pay_tx_fee: FeeRate,
    minimum_total_fee: i64,
}

fn resolve_policy(policy: &FeePolicy, params: &ChainParams) -> Result<ResolvedFee, AppError> {
    let resolved = match policy.mode {
        FeeMode::Automatic => ResolvedFee { pay_tx_fee: FeeRate::ZERO, minimum_total_fee: 0 },
        FeeMode::Custom { .. } if policy.pay_only_minimum => ResolvedFee {
            pay_tx_fee: params.min_tx_fee,
            minimum_total_fee: 0,
        },
        FeeMode::Custom { fee, kind } => {
            let sat = to_sat(fee, "カスタム手数料")?;
            ResolvedFee {
                pay_tx_fee: FeeRate::from_sat_per_kb(sat),
                minimum_total_fee: if kind == CustomFeeKind::AtLeast { sat } else { 0 },
            }
        }
    };
    Ok(resolved)
}

fn to_sat(amount: Amount, context: &str) -> Result<i64, AppError> {
    i64::try_from(amount.to_sat()).map_err(|_| AppError::overflow(format!("{}: {} sats", context, amount.to_sat())))
}

fn checked_add(a: i64, b: i64, context: &str) -> Result<i64, AppError> {
    a.checked_add(b).ok_or_else(|| AppError::overflow(context.to_string()))
}

fn checked_sub(a: i64, b: i64, context: &str) -> Result<i64, AppError> {
    a.checked_sub(b).ok_or_else(|| AppError::overflow(context.to_string()))
}

/// 優先度をネットワークの推定値と比べて段階に分ける。
///
/// 推定値がない (0 以下) 場合は無料送金の閾値を基準にする。
/// 境界は推定値の 1000, 100, 10, 1, 0.1, 0.01, 0.001, 0.000001 倍で、
/// 推定値を上回れば少なくとも `High` になる。各境界ちょうどの値は下の段階に入る。
pub fn priority_label(priority: f64, network_priority: f64, allow_free_threshold: f64) -> PriorityLabel {
    let medium = if network_priority <= 0.0 { allow_free_threshold } else { network_priority };

    if priority / 1000.0 > medium {
        PriorityLabel::Highest
    } else if priority / 100.0 > medium {
        PriorityLabel::VeryHigh
    } else if priority / 10.0 > medium {
        PriorityLabel::Higher
    } else if priority > medium {
        PriorityLabel::High
    } else if priority * 10.0 > medium {
        PriorityLabel::Medium
    } else if priority * 100.0 > medium {
        PriorityLabel::LowMedium
    } else if priority * 1000.0 > medium {
        PriorityLabel::Low
    } else if priority * 1_000_000.0 > medium {
        PriorityLabel::Lower
    } else {
        PriorityLabel::Lowest
    }
}

/// 選択中の入力と支払い先から手数料・おつりを計算する。
///
/// 状態は持たず、呼び出しごとに入力のスナップショットから作り直す。
pub struct FeePlanner<'a> {
    params: &'a ChainParams,
    estimator: &'a dyn FeeEstimator,
    dust: &'a dyn DustPolicy,
}

impl<'a> FeePlanner<'a> {
    pub fn new(params: &'a ChainParams, estimator: &'a dyn FeeEstimator, dust: &'a dyn DustPolicy) -> Self {
        FeePlanner { params, estimator, dust }
    }

    pub fn compute_plan(
        &self,
        selection: &[CandidateInput],
        payments: &[RequestedPayment],
        policy: &FeePolicy,
    ) -> Result<FeePlan, AppError> {
        let resolved = resolve_policy(policy, self.params)?;
        let relay_fee = self.params.min_relay_tx_fee;

        // 1. 選択された入力の集計
        let mut quantity: usize = 0;
        let mut total_input: i64 = 0;
        let mut priority_inputs: f64 = 0.0;
        let mut input_bytes: u64 = 0;
        let mut uncompressed: i64 = 0;
        let mut witness = false;

        for input in selection {
            if !input.is_spendable {
                log::warn!("消費できない入力 {} を無視します。", input.out_point);
                continue;
            }
            quantity += 1;
            total_input = checked_add(total_input, to_sat(input.value, "入力額")?, "入力額の合計")?;
            priority_inputs += input.value.to_sat() as f64 * (f64::from(input.confirmations) + 1.0);
            input_bytes += input.spend_kind.input_bytes();
            match input.spend_kind {
                SpendKind::UncompressedKey => uncompressed += 1,
                SpendKind::Witness => witness = true,
                SpendKind::CompressedKey | SpendKind::Unknown => {}
            }
        }

        if quantity == 0 {
            log::debug!("入力が選択されていないため計算をスキップします。");
            return Ok(FeePlan::empty());
        }

        let mut total_requested: i64 = 0;
        let mut subtract_fee = false;
        let mut is_dust = false;
        for payment in payments {
            let amount = to_sat(payment.amount, "支払額")?;
            total_requested = checked_add(total_requested, amount, "支払額の合計")?;
            subtract_fee |= payment.subtract_fee_from_amount;
            if amount > 0 && self.dust.is_dust(SignedAmount::from_sat(amount), relay_fee)? {
                log::debug!("支払額 {} sats はダスト閾値未満です。", amount);
                is_dust = true;
            }
        }

        // 2. サイズの見積もり (おつり出力を1つ含める)
        let output_count = if payments.is_empty() { 2 } else { payments.len() as u64 + 1 };
        let mut bytes = input_bytes + output_count * OUTPUT_BYTES + TX_OVERHEAD_BYTES;
        if witness {
            // マーカーとフラグ、入力ごとのスタック要素数
            bytes += 2 + quantity as u64;
        }

        // 3. 優先度
        let denominator = bytes as i64 - input_bytes as i64 + uncompressed * UNCOMPRESSED_PRIORITY_PENALTY;
        let priority = if denominator > 0 { priority_inputs / denominator as f64 } else { 0.0 };
        let network_priority = self.estimator.estimate_priority(policy.confirm_target);
        let label = priority_label(priority, network_priority, self.params.allow_free_threshold);
        log::debug!("入力 {} 件, 合計 {} sats, 推定 {} バイト, 優先度 {} ({})", quantity, total_input, bytes, priority, label);

        // 4. 手数料差し引きでおつりが出ないと分かっている場合は出力1つ分を引く
        if subtract_fee && total_input == total_requested {
            bytes = bytes.saturating_sub(OUTPUT_BYTES);
        }

        // 5. 手数料
        let mut fee = if resolved.pay_tx_fee.is_positive() {
            self.estimator.fee_at_rate(resolved.pay_tx_fee, bytes)?.to_sat()
        } else {
            self.estimator.minimum_fee(bytes, policy.confirm_target)?.to_sat()
        };
        if fee > 0 && resolved.minimum_total_fee > fee {
            fee = resolved.minimum_total_fee;
        }

        let priority_needed = network_priority.max(self.params.allow_free_threshold);
        let allow_free = self.estimator.allows_free() && priority >= priority_needed;
        if policy.send_free_transactions && allow_free && bytes <= self.params.max_free_tx_size {
            log::info!("優先度が十分なため手数料なしで送信できます。");
            fee = 0;
        }

        // 6. おつりとダストの吸収
        let mut change: i64 = 0;
        if total_requested > 0 {
            change = checked_sub(total_input, total_requested, "おつり")?;
            if !subtract_fee {
                change = checked_sub(change, fee, "おつり")?;
            }

            if change > 0 && change < self.params.min_change.to_sat() {
                let change_amount = SignedAmount::from_sat(change);
                if self.dust.is_dust(change_amount, relay_fee)? {
                    if subtract_fee {
                        // 受取額から差し引いてダストでなくなるまで引き上げる
                        change = self.dust.dust_threshold(relay_fee)?.to_sat();
                    } else {
                        log::warn!("おつり {} sats はダストのため手数料に含めます。", change);
                        fee = checked_add(fee, change, "手数料")?;
                        change = 0;
                    }
                }
            }

            // おつり出力なし。手順4の減算とは条件が排他
            if change == 0 && !subtract_fee {
                bytes = bytes.saturating_sub(OUTPUT_BYTES);
            }
        }

        // 7. 手数料差し引き後
        let after_fee = checked_sub(total_input, fee, "手数料差し引き後")?.max(0);

        let delivered = if total_requested == 0 {
            0
        } else if subtract_fee {
            checked_sub(checked_sub(total_input, fee, "受取額")?, change, "受取額")?
        } else {
            total_requested
        };

        // 9. 資金不足
        let insufficient_funds = change < 0;
        if insufficient_funds {
            log::warn!("資金不足: 入力 {} sats, 支払 {} sats, 手数料 {} sats", total_input, total_requested, fee);
        }

        let vary_rate = if resolved.pay_tx_fee.is_positive() {
            resolved.pay_tx_fee
        } else {
            self.estimator.estimate_fee_rate(policy.confirm_target)
        };
        let fee_vary_per_byte = self.params.min_tx_fee.max(vary_rate).sat_per_kb() as f64 / 1000.0;

        Ok(FeePlan {
            quantity,
            total_input: SignedAmount::from_sat(total_input),
            total_requested: SignedAmount::from_sat(total_requested),
            delivered_amount: SignedAmount::from_sat(delivered),
            estimated_byte_size: bytes,
            priority_score: priority,
            priority_label: Some(label),
            fee: SignedAmount::from_sat(fee),
            after_fee: SignedAmount::from_sat(after_fee),
            change: SignedAmount::from_sat(change),
            is_dust,
            insufficient_funds,
            allow_free,
            fee_is_estimate: fee > 0 && resolved.minimum_total_fee < fee,
            fee_vary_per_byte,
        })
    }
}
