//! 形式参数名发现
//!
//! 通知的参数绑定需要知道通知方法的形式参数名。策略按固定顺序
//! 链式查询，第一个给出答案的获胜：
//! 1. 注解策略 - 读方法元数据 `argNames`（逗号分隔）
//! 2. 反射策略 - 读方法描述符上声明的参数名/参数类型名

use crate::error::{AopError, AopResult};
use crate::reflect::ClassDescriptor;

/// 方法元数据里存放参数名的键
pub const ARG_NAMES_KEY: &str = "argNames";

/// 参数名发现策略
pub trait ParameterNameDiscoverer: Send + Sync {
    /// 策略名称
    fn name(&self) -> &str;

    /// 返回有序参数名；无法回答时返回 None
    fn discover(&self, class: &ClassDescriptor, method_name: &str) -> Option<Vec<String>>;
}

/// 注解策略：方法元数据键 `argNames` 的文本值，逗号切分后去空白
pub struct AnnotationNameDiscoverer;

impl ParameterNameDiscoverer for AnnotationNameDiscoverer {
    fn name(&self) -> &str {
        "annotation"
    }

    fn discover(&self, class: &ClassDescriptor, method_name: &str) -> Option<Vec<String>> {
        let method = class.method(method_name)?;
        let raw = method.metadata().text(ARG_NAMES_KEY)?;
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }
}

/// 反射策略：描述符上声明的形式参数名，缺失时退回参数类型名
pub struct ReflectiveNameDiscoverer;

impl ParameterNameDiscoverer for ReflectiveNameDiscoverer {
    fn name(&self) -> &str {
        "reflective"
    }

    fn discover(&self, class: &ClassDescriptor, method_name: &str) -> Option<Vec<String>> {
        let method = class.method(method_name)?;
        if !method.param_names().is_empty() {
            return Some(method.param_names().to_vec());
        }
        if !method.param_types().is_empty() {
            return Some(method.param_types().to_vec());
        }
        None
    }
}

/// 策略链
pub struct DiscovererChain {
    discoverers: Vec<Box<dyn ParameterNameDiscoverer>>,
}

impl DiscovererChain {
    /// 内核默认链：注解优先，反射兜底
    pub fn standard() -> Self {
        Self {
            discoverers: vec![
                Box::new(AnnotationNameDiscoverer),
                Box::new(ReflectiveNameDiscoverer),
            ],
        }
    }

    /// 自定义链
    pub fn new(discoverers: Vec<Box<dyn ParameterNameDiscoverer>>) -> Self {
        Self { discoverers }
    }

    /// 按顺序查询，第一个非空答案获胜
    pub fn discover(&self, class: &ClassDescriptor, method_name: &str) -> Option<Vec<String>> {
        for discoverer in &self.discoverers {
            if let Some(names) = discoverer.discover(class, method_name) {
                tracing::trace!(
                    "Parameter names of {}.{} resolved by '{}' strategy",
                    class.name(),
                    method_name,
                    discoverer.name()
                );
                return Some(names);
            }
        }
        None
    }
}

impl Default for DiscovererChain {
    fn default() -> Self {
        Self::standard()
    }
}

/// 解析参数名，全部策略失败时报发现错误
pub fn get_parameter_names(class: &ClassDescriptor, method_name: &str) -> AopResult<Vec<String>> {
    DiscovererChain::standard()
        .discover(class, method_name)
        .ok_or_else(|| {
            AopError::Discovery(format!(
                "unresolvable parameter names for {}.{}",
                class.name(),
                method_name
            ))
        })
}
