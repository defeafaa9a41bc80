//! 连接点（JoinPoint）
//!
//! 一次拦截事件的不可变快照：每次调用创建，调用展开后丢弃，
//! 绝不修改。

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use crate::error::{AopError, AopResult};
use crate::reflect::{AopValue, ClassDescriptor, MethodDescriptor, Target};

/// 连接点：一次方法拦截的上下文
#[derive(Clone)]
pub struct JoinPoint {
    target: Target,
    method_name: Option<String>,
    args: Vec<AopValue>,
}

impl JoinPoint {
    /// 创建连接点
    pub fn new(target: Target, method_name: Option<String>, args: Vec<AopValue>) -> Self {
        Self {
            target,
            method_name,
            args,
        }
    }

    /// 只针对类（无方法）的连接点
    pub fn class_only(target: Target) -> Self {
        Self::new(target, None, Vec::new())
    }

    /// 实际参数
    pub fn args(&self) -> &[AopValue] {
        &self.args
    }

    /// 接收者对象
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// 接收者的类型
    pub fn owner_type(&self) -> &Arc<ClassDescriptor> {
        self.target.class()
    }

    /// 方法签名（方法名）
    pub fn signature(&self) -> Option<&str> {
        self.method_name.as_deref()
    }

    /// 按方法名从接收者解析出的方法描述符
    pub fn method_value(&self) -> Option<Arc<MethodDescriptor>> {
        let name = self.method_name.as_deref()?;
        self.target.class().method(name)
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method_name.as_deref() {
            Some(name) => {
                let args: Vec<&str> = self.args.iter().map(|a| a.display()).collect();
                write!(f, "{}.{}({})", name, name, args.join(","))
            }
            None => write!(f, "{} class", self.target.class().name()),
        }
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("class", &self.target.class().name())
            .field("method", &self.method_name)
            .field("argc", &self.args.len())
            .finish()
    }
}

/// 环绕通知的 proceed 续体
///
/// 框架把它作为最后一个参数追加给环绕通知；通知调用 `call`
/// 继续执行原始方法（携带原始实参）。只能调用一次。
pub struct Proceed {
    inner: Mutex<Option<Box<dyn FnOnce() -> AopResult<AopValue> + Send>>>,
}

impl Proceed {
    pub fn new(f: impl FnOnce() -> AopResult<AopValue> + Send + 'static) -> Self {
        Self {
            inner: Mutex::new(Some(Box::new(f))),
        }
    }

    /// 继续执行被包裹的调用
    pub fn call(&self) -> AopResult<AopValue> {
        let f = self
            .inner
            .lock()
            .map_err(|_| AopError::Advice("proceed continuation poisoned".to_string()))?
            .take();
        match f {
            Some(f) => f(),
            None => Err(AopError::Advice(
                "proceed may only be invoked once".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Proceed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.inner.lock().map(|g| g.is_some()).unwrap_or(false);
        f.debug_struct("Proceed").field("pending", &pending).finish()
    }
}
