//! Affinity Core 错误类型模块
//!
//! - 统一的错误分类（`ErrorKind`），供各服务判断是否可重试、如何提示用户
//! - `AffinityError` 携带分类与上下文信息，`anyhow::Error` 可直接转换为 `Other`

use std::fmt;

use thiserror::Error;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 未建立调用者身份
    Unauthenticated,
    /// 后端访问控制拒绝
    PermissionDenied,
    /// 网络 / 可用性故障，可重试
    Transient,
    /// 引用的文档不存在
    NotFound,
    /// 条件创建失败（文档已存在）
    AlreadyExists,
    /// 调用方输入不合法
    InvalidArgument,
    /// 文档解码或校验失败
    InvalidDocument,
    /// 相同请求仍在处理中
    Busy,
    /// 配置错误
    Config,
    /// 其他错误
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Transient => "transient",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::InvalidDocument => "invalid_document",
            ErrorKind::Busy => "busy",
            ErrorKind::Config => "config",
            ErrorKind::Other => "other",
        }
    }

    /// 只有瞬时故障允许重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Affinity 错误类型
#[derive(Debug, Error)]
pub enum AffinityError {
    /// 未登录
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// 无权限
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// 瞬时故障
    #[error("Transient failure: {0}")]
    Transient(String),

    /// 未找到
    #[error("Not found: {0}")]
    NotFound(String),

    /// 已存在
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// 无效的参数
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 无效的文档
    #[error("Invalid document {path}: {reason}")]
    InvalidDocument { path: String, reason: String },

    /// 重复提交
    #[error("Operation already in flight: {0}")]
    Busy(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Affinity 结果类型
pub type AffinityResult<T> = Result<T, AffinityError>;

impl AffinityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AffinityError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            AffinityError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            AffinityError::Transient(_) => ErrorKind::Transient,
            AffinityError::NotFound(_) => ErrorKind::NotFound,
            AffinityError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            AffinityError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AffinityError::InvalidDocument { .. } => ErrorKind::InvalidDocument,
            AffinityError::Busy(_) => ErrorKind::Busy,
            AffinityError::Config(_) => ErrorKind::Config,
            AffinityError::Other(_) => ErrorKind::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// 按分类构造错误，主要用于故障注入和测试
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Unauthenticated => AffinityError::Unauthenticated(message),
            ErrorKind::PermissionDenied => AffinityError::PermissionDenied(message),
            ErrorKind::Transient => AffinityError::Transient(message),
            ErrorKind::NotFound => AffinityError::NotFound(message),
            ErrorKind::AlreadyExists => AffinityError::AlreadyExists(message),
            ErrorKind::InvalidArgument => AffinityError::InvalidArgument(message),
            ErrorKind::InvalidDocument => AffinityError::InvalidDocument {
                path: String::new(),
                reason: message,
            },
            ErrorKind::Busy => AffinityError::Busy(message),
            ErrorKind::Config => AffinityError::Config(message),
            ErrorKind::Other => AffinityError::Other(anyhow::anyhow!(message)),
        }
    }

    pub fn invalid_document(path: impl Into<String>, reason: impl Into<String>) -> Self {
        AffinityError::InvalidDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// 便捷宏：参数校验失败时提前返回 `InvalidArgument`
#[macro_export]
macro_rules! ensure_arg {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::AffinityError::InvalidArgument(format!($($arg)+)));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_positive(value: i32) -> AffinityResult<i32> {
        ensure_arg!(value > 0, "value must be positive, got {}", value);
        Ok(value)
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(AffinityError::Transient("offline".into()).is_retryable());
        assert!(!AffinityError::PermissionDenied("rules".into()).is_retryable());
        assert!(!AffinityError::Unauthenticated("no user".into()).is_retryable());
        assert!(!AffinityError::NotFound("chats/x".into()).is_retryable());
    }

    #[test]
    fn test_from_kind_preserves_kind() {
        for kind in [
            ErrorKind::Unauthenticated,
            ErrorKind::PermissionDenied,
            ErrorKind::Transient,
            ErrorKind::NotFound,
            ErrorKind::Busy,
            ErrorKind::Other,
        ] {
            assert_eq!(AffinityError::from_kind(kind, "injected").kind(), kind);
        }
    }

    #[test]
    fn test_anyhow_converts_to_other() {
        let err: AffinityError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_ensure_arg_macro() {
        assert_eq!(check_positive(3).unwrap(), 3);
        let err = check_positive(-1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("got -1"));
    }
}
