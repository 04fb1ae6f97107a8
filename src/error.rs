use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSONパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    JsonParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSONシリアライズエラー: {0}")]
    JsonSerialize(#[source] serde_json::Error),

    #[error("入力検証エラー: {0}")]
    InputValidation(String),

    // 金額計算は i64 の範囲で行い、ラップさせずにここで止める
    #[error("金額のオーバーフロー: {context}")]
    AmountOverflow { context: String },

    #[error("透明アウトプットとシールドノートを同じドラフトで混在させることはできません")]
    MixedInputPools,

    #[error("無効なネットワークが指定されました: {0}")]
    UnknownNetwork(String),
}

impl AppError {
    pub(crate) fn overflow(context: impl Into<String>) -> Self {
        AppError::AmountOverflow { context: context.into() }
    }
}
