use clap::Parser;
use std::path::PathBuf;
use bitcoin::Network;
use crate::error::AppError;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// 選択した入力と支払い先を記述したJSONファイルへのパス
    #[clap(short, long, value_parser)]
    pub input_file: PathBuf,

    /// 計算結果のJSONを保存するファイルへのパス (省略時は標準出力のみ)
    #[clap(short, long, value_parser)]
    pub output_file: Option<PathBuf>,

    /// 使用するネットワーク ("bitcoin", "testnet", "regtest")
    #[clap(short, long, value_parser, default_value = "testnet")]
    pub network: String,
}

pub fn parse_network(network_str: &str) -> Result<Network, AppError> {
    match network_str.to_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
        "testnet" => Ok(Network::Testnet),
        "regtest" => Ok(Network::Regtest),
        s => Err(AppError::UnknownNetwork(s.to_string())),
    }
}
