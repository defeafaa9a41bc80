//! 结构化的错误信息
//!
//! afterThrowing 通知收到的 `error` 参数绑定的就是这个快照。
//! 原始错误在通知执行完后继续向调用者传播，因此这里只保留
//! 可克隆的描述信息，不夺走错误本身的所有权。

use std::error::Error;
use std::fmt;

/// 传递给异常通知的错误快照
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误类型名称
    pub error_type: String,

    /// 错误源链
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从任意标准错误构建快照
    pub fn from_error<E: Error>(error: &E) -> Self {
        let mut source_chain = Vec::new();
        let mut current = error.source();
        while let Some(source) = current {
            source_chain.push(source.to_string());
            current = source.source();
        }

        Self {
            message: error.to_string(),
            error_type: std::any::type_name::<E>().to_string(),
            source_chain,
        }
    }

    /// 只有消息的简单快照
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: "Unknown".to_string(),
            source_chain: Vec::new(),
        }
    }

    /// 完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AopError;

    #[test]
    fn test_from_error() {
        let err = AopError::Advice("advice blew up".to_string());
        let info = ErrorInfo::from_error(&err);
        assert!(info.message.contains("advice blew up"));
        assert!(info.error_type.contains("AopError"));
        assert!(info.source_chain.is_empty());
    }

    #[test]
    fn test_full_description() {
        let info = ErrorInfo::simple("outer");
        assert_eq!(info.full_description(), "outer");

        let mut info = ErrorInfo::simple("outer");
        info.source_chain.push("inner".to_string());
        info.source_chain.push("root".to_string());
        assert_eq!(
            info.full_description(),
            "outer\nCaused by:\n  inner\n  root"
        );
        // Display 委托给 full_description
        assert_eq!(info.to_string(), info.full_description());
    }
}
