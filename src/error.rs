use thiserror::Error;

use crate::models::MatchStatus;

/// 引擎错误
///
/// 评分过程本身不会失败（缺失字段按 0 分处理），这里只有
/// 数据源、配置、请求和导出相关的错误。
#[derive(Debug, Error)]
pub enum EngineError {
    /// 数据源错误，原样向调用方传播，不重试
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 阈值或权重配置不合法
    #[error("Invalid threshold config: {0}")]
    InvalidConfig(String),

    /// 配置加载失败
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invoice {0} not found")]
    InvoiceNotFound(i64),

    /// 请求参数不合法
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Match result {0} not found")]
    MatchNotFound(i64),

    #[error("Flag {0} not found")]
    FlagNotFound(i64),

    /// 非法状态流转
    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: MatchStatus, to: MatchStatus },

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
