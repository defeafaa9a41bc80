//! Advisor：一个通知函数与选中它的谓词的绑定
//!
//! 谓词要么是类过滤器（只看类型），要么是方法匹配器（看方法、
//! 类型与实参）。`last_fired` 标志让拦截流水线能探测本次调用里
//! 该 Advisor 的谓词是否命中过。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::AopResult;
use crate::joinpoint::JoinPoint;
use crate::pointcut::{ClassFilter, MethodMatcher};
use crate::reflect::{AopValue, MethodBody};

/// Advisor 的谓词
pub enum AdvisorMatcher {
    /// 类过滤器
    Class(Arc<dyn ClassFilter>),
    /// 方法匹配器
    Method(Arc<dyn MethodMatcher>),
}

/// 通知 + 谓词
pub struct Advisor {
    name: String,
    advice: MethodBody,
    matcher: AdvisorMatcher,
    last_fired: AtomicBool,
}

impl Advisor {
    pub fn new(name: impl Into<String>, advice: MethodBody, matcher: AdvisorMatcher) -> Self {
        Self {
            name: name.into(),
            advice,
            matcher,
            last_fired: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 上一次 `execute` 的谓词是否命中
    pub fn last_fired(&self) -> bool {
        self.last_fired.load(Ordering::SeqCst)
    }

    /// 先清除 `last_fired`，谓词命中则以连接点的接收者为 this
    /// 调用通知并置位标志；未命中返回 None。
    pub fn execute(&self, join_point: &JoinPoint, args: &[AopValue]) -> AopResult<Option<AopValue>> {
        self.last_fired.store(false, Ordering::SeqCst);

        let hit = match &self.matcher {
            AdvisorMatcher::Class(filter) => filter.filter(join_point.owner_type()),
            AdvisorMatcher::Method(matcher) => match join_point.method_value() {
                Some(method) => {
                    matcher.matches(&method, join_point.owner_type(), Some(join_point.args()))
                }
                None => false,
            },
        };

        if !hit {
            return Ok(None);
        }

        let result = (self.advice)(join_point.target(), args)?;
        self.last_fired.store(true, Ordering::SeqCst);
        Ok(Some(result))
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("name", &self.name)
            .field("last_fired", &self.last_fired())
            .finish()
    }
}
