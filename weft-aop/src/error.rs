//! 统一的错误类型
//!
//! 内核中的错误分为五类（解析、引用、策略、发现、通知），
//! 另加代理撤销后的访问错误。错误永远不会被内核静默吞掉，
//! 而是传播给被拦截方法的调用者或 `Weaver::boot` 的调用者。

use thiserror::Error;

/// AOP 内核错误
#[derive(Debug, Error)]
pub enum AopError {
    /// 切点表达式解析错误（未知或格式错误的 token）
    #[error("Pointcut parse error: {0}")]
    Parse(String),

    /// 引用错误（未知的切点引用、原型上缺失的方法、缺失的模块）
    #[error("Reference error: {0}")]
    Reference(String),

    /// 策略违规（例如修改已冻结的 ProxyFactory）
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// 参数名无法解析
    #[error("Parameter name discovery failed: {0}")]
    Discovery(String),

    /// 通知体内抛出的错误
    #[error("Advice error: {0}")]
    Advice(String),

    /// 通过已撤销的代理句柄访问
    #[error("Proxy revoked: {0}")]
    Revoked(String),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// AOP 内核统一返回类型
pub type AopResult<T> = Result<T, AopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AopError::Parse("fooBar(x)".to_string());
        assert!(err.to_string().contains("fooBar(x)"));

        let err = AopError::Reference("pointcut 'p1' not found".to_string());
        assert!(err.to_string().starts_with("Reference error"));
    }

    #[test]
    fn test_other_from_anyhow() {
        let err: AopError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
