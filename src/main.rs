use std::fs::File;
use std::io::Write;
use clap::Parser;

use coin_fee_planner::{
    cli::{parse_network, CliArgs},
    config::load_draft_config,
    AppError, ChainParams, FeeEstimator, FeePlanner, FixedFeeEstimator, InputPool, StandardDustPolicy,
};

fn main() -> Result<(), AppError> {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("アプリケーションを開始します。引数: {:?}", args);

    let network = parse_network(&args.network)?;
    let params = ChainParams::for_network(network);
    log::info!("指定されたネットワーク: {:?}", network);

    let config = load_draft_config(&args.input_file)?;
    log::debug!("入力設定ファイルのパース成功: {:?}", config);

    let draft = config.into_draft(&params)?;

    // シールドノートは固定の手数料で送る
    let mempool_estimator = config.mempool_estimator(&params);
    let shielded_estimator = FixedFeeEstimator::shielded(&params);
    let estimator: &dyn FeeEstimator = match draft.pool {
        InputPool::Transparent => &mempool_estimator,
        InputPool::Shielded => &shielded_estimator,
    };
    let dust = StandardDustPolicy::default();

    let plan = FeePlanner::new(&params, estimator, &dust).compute_plan(&draft.selection, &draft.payments, &draft.policy)?;
    log::info!("手数料 {} sats, おつり {} sats で計画しました。", plan.fee.to_sat(), plan.change.to_sat());

    let serialized = serde_json::to_string_pretty(&plan).map_err(AppError::JsonSerialize)?;
    println!("{}", serialized);

    if let Some(output_path) = &args.output_file {
        let mut output_file = File::create(output_path).map_err(|e| {
            log::error!("出力ファイルの作成に失敗しました: {:?}", output_path);
            AppError::Io(e)
        })?;
        output_file.write_all(serialized.as_bytes()).map_err(|e| {
            log::error!("出力ファイルへの書き込みに失敗しました。");
            AppError::Io(e)
        })?;
        log::info!("計算結果を {:?} に保存しました。", output_path);
    }

    log::info!("処理が正常に完了しました。");
    Ok(())
}
