use std::str::FromStr;

use bitcoin::{Amount, OutPoint, SignedAmount, Txid};
use coin_fee_planner::{
    priority_label, CandidateInput, ChainParams, CustomFeeKind, FeeEstimator, FeePlan, FeePlanner, FeePolicy, FeeRate,
    FixedFeeEstimator, MempoolFeeEstimator, PriorityLabel, RequestedPayment, SpendKind, StandardDustPolicy,
};

fn outpoint(vout: u32) -> OutPoint {
    let txid = Txid::from_str("7967a5185e907a25225574544c31f7b059c1a191d65b53dcc1554d339c4f9efc").unwrap();
    OutPoint::new(txid, vout)
}

fn coin(vout: u32, sats: u64, confirmations: u32, kind: SpendKind) -> CandidateInput {
    CandidateInput::new(outpoint(vout), Amount::from_sat(sats), confirmations, kind)
}

fn pay(sats: u64) -> RequestedPayment {
    RequestedPayment::new(Amount::from_sat(sats))
}

fn compute_with(
    estimator: &dyn FeeEstimator,
    selection: &[CandidateInput],
    payments: &[RequestedPayment],
    policy: &FeePolicy,
) -> FeePlan {
    let params = ChainParams::default();
    let dust = StandardDustPolicy::default();
    FeePlanner::new(&params, estimator, &dust)
        .compute_plan(selection, payments, policy)
        .expect("計算は失敗しないはず")
}

fn compute(selection: &[CandidateInput], payments: &[RequestedPayment], policy: &FeePolicy) -> FeePlan {
    let estimator = MempoolFeeEstimator::new(ChainParams::default()).with_fee_rate(2, FeeRate::from_sat_per_kb(4_000));
    compute_with(&estimator, selection, payments, policy)
}

#[test]
fn conservation_holds_whenever_funds_are_sufficient() {
    let policies = [
        FeePolicy::automatic(2),
        FeePolicy::custom(Amount::from_sat(20_000), CustomFeeKind::PerKilobyte, 2),
        FeePolicy::custom(Amount::from_sat(20_000), CustomFeeKind::AtLeast, 2),
    ];
    let selections = [
        vec![coin(0, 2_000_000, 3, SpendKind::CompressedKey)],
        vec![coin(0, 150_000, 1, SpendKind::UncompressedKey), coin(1, 60_000, 12, SpendKind::Unknown)],
        vec![coin(0, 100_000, 0, SpendKind::Witness)],
    ];
    let payment_sets = [vec![pay(50_000)], vec![pay(30_000), pay(45_000)], vec![pay(99_000)], vec![pay(98_500)]];

    let mut checked = 0;
    for policy in &policies {
        for selection in &selections {
            for payments in &payment_sets {
                let plan = compute(selection, payments, policy);
                assert!(plan.fee >= SignedAmount::ZERO);
                if plan.insufficient_funds {
                    continue;
                }
                assert_eq!(plan.total_input, plan.total_requested + plan.fee + plan.change, "{:?}", plan);
                checked += 1;
            }
        }
    }
    assert!(checked > 10);
}

#[test]
fn subtract_fee_plans_balance_against_delivered_amount() {
    let selection = [coin(0, 300_000, 4, SpendKind::CompressedKey)];
    for payments in [vec![RequestedPayment::subtracting_fee(Amount::from_sat(300_000))],
                     vec![RequestedPayment::subtracting_fee(Amount::from_sat(299_900))],
                     vec![RequestedPayment::subtracting_fee(Amount::from_sat(100_000)), pay(50_000)]] {
        let plan = compute(&selection, &payments, &FeePolicy::automatic(2));
        assert!(!plan.insufficient_funds);
        assert_eq!(plan.total_input, plan.delivered_amount + plan.fee + plan.change);
    }
}

#[test]
fn empty_selection_yields_zero_plan() {
    let mut free = FeePolicy::automatic(6);
    free.send_free_transactions = true;
    let policies = [
        FeePolicy::automatic(2),
        FeePolicy::custom(Amount::from_sat(10_000), CustomFeeKind::AtLeast, 2),
        free,
    ];
    for policy in &policies {
        assert_eq!(compute(&[], &[], policy), FeePlan::empty());
        assert_eq!(compute(&[], &[pay(1)], policy), FeePlan::empty());
    }
    let zero = FeePlan::empty();
    assert_eq!(zero.fee, SignedAmount::ZERO);
    assert!(!zero.is_dust && !zero.insufficient_funds);
}

#[test]
fn minimum_total_fee_floor_is_respected() {
    let selection = [coin(0, 5_000_000, 2, SpendKind::CompressedKey)];
    let policy = FeePolicy::custom(Amount::from_sat(7_500), CustomFeeKind::AtLeast, 2);
    let plan = compute(&selection, &[pay(1_000_000)], &policy);
    assert!(plan.fee >= SignedAmount::from_sat(7_500));

    // 計算値の方が大きければそのまま
    let policy = FeePolicy::custom(Amount::from_sat(100), CustomFeeKind::AtLeast, 2);
    let plan = compute(&selection, &[pay(1_000_000)], &policy);
    assert_eq!(plan.fee, SignedAmount::from_sat(226));
}

#[test]
fn shortfall_is_reported_as_insufficient_funds() {
    let fixed = FixedFeeEstimator::new(SignedAmount::from_sat(1_000));
    let plan = compute_with(
        &fixed,
        &[coin(0, 100_000, 6, SpendKind::CompressedKey)],
        &[pay(99_999)],
        &FeePolicy::automatic(2),
    );
    assert!(plan.insufficient_funds);
    assert_eq!(plan.fee, SignedAmount::from_sat(1_000));
    assert_eq!(plan.change, SignedAmount::from_sat(-999));
    assert_eq!(plan.after_fee, SignedAmount::from_sat(99_000));
}

#[test]
fn five_times_medium_priority_is_high() {
    assert_eq!(priority_label(5.0, 1.0, ChainParams::default().allow_free_threshold), PriorityLabel::High);
}

#[test]
fn uncompressed_key_changes_size_and_priority_denominator() {
    let payments = [pay(50_000)];
    let compressed = [coin(0, 100_000, 9, SpendKind::CompressedKey), coin(1, 100_000, 9, SpendKind::CompressedKey)];
    let mixed = [coin(0, 100_000, 9, SpendKind::CompressedKey), coin(1, 100_000, 9, SpendKind::UncompressedKey)];

    let a = compute(&compressed, &payments, &FeePolicy::automatic(2));
    let b = compute(&mixed, &payments, &FeePolicy::automatic(2));

    assert_eq!(b.estimated_byte_size - a.estimated_byte_size, 180 - 148);

    let numerator = 2.0 * 100_000.0 * 10.0;
    // 出力 (1 + 1) * 34 + 10 バイト
    assert!((a.priority_score - numerator / 78.0).abs() < 1e-9);
    assert!((b.priority_score - numerator / (78.0 + 29.0)).abs() < 1e-9);
}

#[test]
fn dust_payment_is_flagged() {
    let selection = [coin(0, 1_000_000, 1, SpendKind::CompressedKey)];
    let plan = compute(&selection, &[pay(542), pay(10_000)], &FeePolicy::automatic(2));
    assert!(plan.is_dust);
    let plan = compute(&selection, &[pay(543)], &FeePolicy::automatic(2));
    assert!(!plan.is_dust);
}

#[test]
fn identical_inputs_give_identical_plans() {
    let selection = [coin(0, 123_456, 7, SpendKind::Unknown), coin(1, 654_321, 0, SpendKind::UncompressedKey)];
    let payments = [pay(200_000), RequestedPayment::subtracting_fee(Amount::from_sat(100_000))];
    let policy = FeePolicy::custom(Amount::from_sat(3_000), CustomFeeKind::PerKilobyte, 3);
    let first = compute(&selection, &payments, &policy);
    let second = compute(&selection, &payments, &policy);
    assert_eq!(first, second);
    assert_eq!(first.priority_score.to_bits(), second.priority_score.to_bits());
}

#[test]
fn shielded_selection_pays_fixed_fee() {
    let params = ChainParams::default();
    let fixed = FixedFeeEstimator::shielded(&params);
    let notes = [coin(0, 10_000_000, 10, SpendKind::Unknown), coin(1, 10_000_000, 10, SpendKind::Unknown)];
    let plan = compute_with(&fixed, &notes, &[pay(5_000_000)], &FeePolicy::automatic(2));
    assert_eq!(plan.fee, SignedAmount::from_sat(1_000));
    assert_eq!(plan.change, SignedAmount::from_sat(15_000_000 - 1_000));
}

#[test]
fn shielded_selection_never_goes_free() {
    let params = ChainParams::default();
    let fixed = FixedFeeEstimator::shielded(&params);
    let policy = FeePolicy { send_free_transactions: true, ..FeePolicy::automatic(2) };
    let notes = [coin(0, 100 * 100_000_000, 100, SpendKind::Unknown)];
    let plan = compute_with(&fixed, &notes, &[pay(1_000_000)], &policy);
    // 優先度は無料送金の閾値を大きく超えている
    assert!(plan.priority_score > params.allow_free_threshold);
    assert!(!plan.allow_free);
    assert_eq!(plan.fee, SignedAmount::from_sat(1_000));
}
