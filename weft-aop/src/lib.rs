//! weft-aop - 面向切面编程内核
//!
//! 提供一个可运行的 AOP 内核，支持：
//! - 切点表达式（execution/within/this/target/args/@... 原语与 && || ! 组合）
//! - 五种通知类型（Before、After、AfterReturning、AfterThrowing、Around）
//! - 选择器与正则两种匹配引擎、Advisor 绑定
//! - 代理织入（透明代理 / 原型覆盖）、冻结与暴露标志
//! - 声明式配置的引导与拆除（Weaver）

pub mod advice;
pub mod advisor;
pub mod config;
pub mod error;
pub mod error_info;
pub mod joinpoint;
pub mod param_names;
pub mod pointcut;
pub mod proxy;
pub mod reflect;
pub mod registry;
pub mod regexp;
pub mod selector;
pub mod weaver;

// 重新导出核心类型
pub use advice::{
    after_advice, after_returning_advice, after_throwing_advice, around_advice, before_advice,
    install_advice, run_intercepted, AdviceKind, AdviceOptions,
};
pub use advisor::{Advisor, AdvisorMatcher};
pub use config::{
    AdviceConfig, AdvisorConfig, AopConfig, AspectConfig, MatcherConfig, PointcutConfig,
};
pub use error::{AopError, AopResult};
pub use error_info::ErrorInfo;
pub use joinpoint::{JoinPoint, Proceed};
pub use param_names::{
    get_parameter_names, AnnotationNameDiscoverer, DiscovererChain, ParameterNameDiscoverer,
    ReflectiveNameDiscoverer,
};
pub use pointcut::{
    global_pointcut_registry, ClassFilter, MatchContext, MethodMatcher, PointcutExpression,
    PointcutRegistry,
};
pub use proxy::{current_proxy, AopProxy, ProxyFactory};
pub use reflect::{
    global_module_registry, AopValue, ClassBuilder, ClassDescriptor, FnLoader, MetaMap, MetaValue,
    MethodBody, MethodDescriptor, ModuleLoader, ModuleRegistration, ModuleRegistry, Target,
};
pub use registry::{global_advice_registry, AdviceRecord, AdviceRegistry};
pub use regexp::RegexpMatcher;
pub use selector::SelectorMatcher;
pub use weaver::{global_weaver, Weaver, WeaverFlags};

// 导出 inventory 供模块注册使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{AdviceKind, AdviceOptions};
    pub use crate::config::{AdviceConfig, AopConfig, AspectConfig, PointcutConfig};
    pub use crate::error::{AopError, AopResult};
    pub use crate::error_info::ErrorInfo;
    pub use crate::joinpoint::{JoinPoint, Proceed};
    pub use crate::pointcut::{PointcutExpression, PointcutRegistry};
    pub use crate::proxy::{AopProxy, ProxyFactory};
    pub use crate::reflect::{
        AopValue, ClassDescriptor, MethodDescriptor, ModuleRegistration, Target,
    };
    pub use crate::weaver::{global_weaver, Weaver};
    pub use crate::intercepted;
}

/// 手写目标不经代理时，把一次调用接入拦截流水线
///
/// 使用示例：
/// ```ignore
/// use weft_aop::prelude::*;
///
/// fn greet(target: &Target, who: String) -> AopResult<AopValue> {
///     intercepted!(target, "greet", vec![AopValue::new(who.clone())], move || {
///         Ok(AopValue::new(format!("hello {}", who)))
///     })
/// }
/// ```
#[macro_export]
macro_rules! intercepted {
    ($target:expr, $method:expr, $args:expr, $body:expr) => {{
        $crate::advice::run_intercepted(&$target, $method, $args, Box::new($body))
    }};
}
