//! Errors - エラー型と分類
//!
//! - `SpoolError`: エンジンの呼び出し側に返るエラー
//! - `ErrorKind`: 運用上の分類（リトライすべきかどうか）
//!
//! 空の結果（メッセージなし・ack 対象なし）はエラーではありません。

use thiserror::Error;

use crate::ports::StoreError;

/// ErrorKind は失敗の運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 一時的なエラー（ストアに到達できない等、リトライ推奨）
    Transient,
    /// 恒久的なエラー（壊れたデータ・不正な設定、リトライ無意味）
    Permanent,
    /// ストアがコマンドやスクリプトを拒否した
    Infrastructure,
}

/// Errors surfaced by the queue engine.
#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store operation failed: {0}")]
    StoreOperationFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SpoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpoolError::StoreUnavailable(_) => ErrorKind::Transient,
            SpoolError::StoreOperationFailed(_) => ErrorKind::Infrastructure,
            SpoolError::MalformedEnvelope(_) | SpoolError::InvalidConfig(_) => {
                ErrorKind::Permanent
            }
        }
    }
}

impl From<StoreError> for SpoolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => SpoolError::StoreUnavailable(msg),
            StoreError::OperationFailed(msg) => SpoolError::StoreOperationFailed(msg),
            StoreError::Malformed(msg) => SpoolError::MalformedEnvelope(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpoolError>;
