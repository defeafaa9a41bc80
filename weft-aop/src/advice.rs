//! 通知装饰器与拦截流水线
//!
//! 五种通知类型各有一个安装操作，作用在目标类的指定方法上：
//! 安装时校验方法与切点，把原型上的方法体作为通知函数追加进
//! 该类对应类型的注册表桶（插入顺序就是触发顺序）。
//!
//! 被拦截调用的协议由 `run_pipeline` 统一实现，代理分发与
//! `intercepted!` 宏都走这一条路径：
//! 1. 构造 JoinPoint(this, methodName, 实参)
//! 2. 读接收者类上各通知类型的注册表桶，按安装时解析好的
//!    切点对 (方法, 所属类型, 实参) 求值筛选
//! 3. 解析参数名并构造绑定参数数组：`joinPoint` 绑定连接点，
//!    返回值名（默认 `result`）绑定返回值（仅 afterReturning /
//!    around），异常名（默认 `error`）绑定异常快照（仅
//!    afterThrowing），其余参数名按位置取实参
//! 4. 以接收者为 this 调用通知函数，按类型时序与原始调用交错

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AopError, AopResult};
use crate::error_info::ErrorInfo;
use crate::joinpoint::{JoinPoint, Proceed};
use crate::param_names::get_parameter_names;
use crate::pointcut::{MatchContext, PointcutExpression, PointcutRegistry};
use crate::reflect::{AopValue, ClassDescriptor, Target};
use crate::registry::{AdviceRecord, AdviceRegistry};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdviceKind {
    /// 前置通知
    Before,
    /// 后置通知（正常与异常路径都执行，且各恰好一次）
    After,
    /// 返回后通知（仅正常返回）
    AfterReturning,
    /// 异常通知（仅异常终止，异常观察后继续传播）
    AfterThrowing,
    /// 环绕通知（取代原始调用，经 proceed 续体可放行）
    Around,
}

impl AdviceKind {
    /// 元数据/配置里使用的键名
    pub fn key(&self) -> &'static str {
        match self {
            AdviceKind::Before => "before",
            AdviceKind::After => "after",
            AdviceKind::AfterReturning => "afterReturning",
            AdviceKind::AfterThrowing => "afterThrowing",
            AdviceKind::Around => "around",
        }
    }

    pub fn all() -> [AdviceKind; 5] {
        [
            AdviceKind::Before,
            AdviceKind::After,
            AdviceKind::AfterReturning,
            AdviceKind::AfterThrowing,
            AdviceKind::Around,
        ]
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// 装饰器安装选项
#[derive(Debug, Clone, Default)]
pub struct AdviceOptions {
    /// 切点文本
    pub pointcut_text: String,

    /// 逗号分隔的参数名（缺省时走参数名发现链）
    pub arg_names: Option<String>,

    /// afterReturning 的返回值参数名
    pub returning: Option<String>,

    /// afterThrowing 的异常参数名
    pub throwing: Option<String>,
}

impl AdviceOptions {
    pub fn new(pointcut_text: impl Into<String>) -> Self {
        Self {
            pointcut_text: pointcut_text.into(),
            ..Self::default()
        }
    }

    pub fn arg_names(mut self, names: impl Into<String>) -> Self {
        self.arg_names = Some(names.into());
        self
    }

    pub fn returning(mut self, name: impl Into<String>) -> Self {
        self.returning = Some(name.into());
        self
    }

    pub fn throwing(mut self, name: impl Into<String>) -> Self {
        self.throwing = Some(name.into());
        self
    }
}

/// 构造通知的绑定参数数组
fn bind_arguments(
    record: &AdviceRecord,
    class: &ClassDescriptor,
    jp: &JoinPoint,
    result: Option<&AopValue>,
    error: Option<&ErrorInfo>,
    proceed: Option<Proceed>,
) -> AopResult<Vec<AopValue>> {
    let names: Vec<String> = match &record.arg_names {
        Some(names) => names.clone(),
        None => get_parameter_names(class, &record.method_name)?,
    };

    let returning_name = record.returning.as_deref().unwrap_or("result");
    let throwing_name = record.throwing.as_deref().unwrap_or("error");

    let mut positional = jp.args().iter();
    let mut bound = Vec::with_capacity(names.len() + 1);

    for name in &names {
        if name == "joinPoint" {
            bound.push(AopValue::named("JoinPoint", jp.clone()));
        } else if result.is_some() && name == returning_name {
            bound.push(result.cloned().unwrap_or_else(AopValue::unit));
        } else if error.is_some() && name == throwing_name {
            bound.push(AopValue::named(
                "ErrorInfo",
                error.cloned().unwrap_or_else(|| ErrorInfo::simple("")),
            ));
        } else {
            bound.push(positional.next().cloned().unwrap_or_else(AopValue::unit));
        }
    }

    if let Some(proceed) = proceed {
        bound.push(AopValue::named("Proceed", proceed));
    }

    Ok(bound)
}

fn split_arg_names(raw: &Option<String>) -> Option<Vec<String>> {
    raw.as_ref().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect()
    })
}

/// 安装一条通知
///
/// 校验方法存在、解析切点，把原型上的方法体作为通知函数追加进
/// 注册表的对应类型桶。分发路径按解析好的切点在调用时筛选记录，
/// 安装本身不改写方法表。
pub fn install_advice(
    kind: AdviceKind,
    class: &Arc<ClassDescriptor>,
    method_name: &str,
    opts: AdviceOptions,
    registry: &Arc<AdviceRegistry>,
    pointcuts: &PointcutRegistry,
) -> AopResult<()> {
    let descriptor = class.method(method_name).ok_or_else(|| {
        AopError::Reference(format!(
            "method '{}' not found on class '{}'",
            method_name,
            class.name()
        ))
    })?;

    let pointcut = PointcutExpression::parse_with(&opts.pointcut_text, pointcuts)?;

    // 切点文本记入方法元数据
    descriptor
        .metadata()
        .set_text("pointcut", opts.pointcut_text.as_str());

    registry.append(
        class.name(),
        kind,
        AdviceRecord {
            pointcut_text: opts.pointcut_text.clone(),
            pointcut,
            method_name: method_name.to_string(),
            advice: descriptor.body(),
            arg_names: split_arg_names(&opts.arg_names),
            returning: opts.returning,
            throwing: opts.throwing,
        },
    );

    Ok(())
}

/// 前置通知装饰器
pub fn before_advice(
    class: &Arc<ClassDescriptor>,
    method_name: &str,
    opts: AdviceOptions,
    registry: &Arc<AdviceRegistry>,
    pointcuts: &PointcutRegistry,
) -> AopResult<()> {
    install_advice(AdviceKind::Before, class, method_name, opts, registry, pointcuts)
}

/// 后置通知装饰器
pub fn after_advice(
    class: &Arc<ClassDescriptor>,
    method_name: &str,
    opts: AdviceOptions,
    registry: &Arc<AdviceRegistry>,
    pointcuts: &PointcutRegistry,
) -> AopResult<()> {
    install_advice(AdviceKind::After, class, method_name, opts, registry, pointcuts)
}

/// 返回后通知装饰器
pub fn after_returning_advice(
    class: &Arc<ClassDescriptor>,
    method_name: &str,
    opts: AdviceOptions,
    registry: &Arc<AdviceRegistry>,
    pointcuts: &PointcutRegistry,
) -> AopResult<()> {
    install_advice(
        AdviceKind::AfterReturning,
        class,
        method_name,
        opts,
        registry,
        pointcuts,
    )
}

/// 异常通知装饰器
pub fn after_throwing_advice(
    class: &Arc<ClassDescriptor>,
    method_name: &str,
    opts: AdviceOptions,
    registry: &Arc<AdviceRegistry>,
    pointcuts: &PointcutRegistry,
) -> AopResult<()> {
    install_advice(
        AdviceKind::AfterThrowing,
        class,
        method_name,
        opts,
        registry,
        pointcuts,
    )
}

/// 环绕通知装饰器
pub fn around_advice(
    class: &Arc<ClassDescriptor>,
    method_name: &str,
    opts: AdviceOptions,
    registry: &Arc<AdviceRegistry>,
    pointcuts: &PointcutRegistry,
) -> AopResult<()> {
    install_advice(AdviceKind::Around, class, method_name, opts, registry, pointcuts)
}

/// 完整的五段拦截流水线
///
/// `select` 决定每条记录是否参与本次调用（代理的标准分发按切点
/// 求值，AspectJ 风格分发按文本包含）。时序：前置通知 → Advisor
/// 短路 → 环绕链或原始调用 → 返回后/异常通知 → 后置通知；
/// 环绕记录逆序折叠，先安装的在最外层。
pub fn run_pipeline(
    registry: &AdviceRegistry,
    target: &Target,
    method_name: &str,
    actuals: &[AopValue],
    select: &dyn Fn(&AdviceRecord) -> bool,
    original: Box<dyn FnOnce() -> AopResult<AopValue> + Send>,
) -> AopResult<AopValue> {
    let class = Arc::clone(target.class());
    let jp = JoinPoint::new(target.clone(), Some(method_name.to_string()), actuals.to_vec());

    let collect = |kind: AdviceKind| -> Vec<Arc<AdviceRecord>> {
        registry
            .records(class.name(), kind)
            .into_iter()
            .filter(|r| select(r))
            .collect()
    };

    for record in collect(AdviceKind::Before) {
        let bound = bind_arguments(&record, &class, &jp, None, None, None)?;
        (record.advice)(target, &bound)?;
    }

    // Advisor 命中时其返回值取代原始调用
    let mut replaced: Option<AopValue> = None;
    for advisor in registry.advisors() {
        if let Some(value) = advisor.execute(&jp, actuals)? {
            tracing::trace!(
                "Advisor '{}' fired on {}, replacing original call",
                advisor.name(),
                jp
            );
            replaced = Some(value);
            break;
        }
    }

    let result = match replaced {
        Some(value) => Ok(value),
        None => {
            let arounds = collect(AdviceKind::Around);
            if arounds.is_empty() {
                original()
            } else {
                let mut call = original;
                for record in arounds.iter().rev() {
                    let record = Arc::clone(record);
                    let target = target.clone();
                    let jp = jp.clone();
                    let class = Arc::clone(&class);
                    let prev = call;
                    call = Box::new(move || {
                        let proceed = Proceed::new(prev);
                        let unit = AopValue::unit();
                        let bound = bind_arguments(
                            &record,
                            &class,
                            &jp,
                            Some(&unit),
                            None,
                            Some(proceed),
                        )?;
                        (record.advice)(&target, &bound)
                    });
                }
                call()
            }
        }
    };

    match &result {
        Ok(value) => {
            for record in collect(AdviceKind::AfterReturning) {
                let bound = bind_arguments(&record, &class, &jp, Some(value), None, None)?;
                (record.advice)(target, &bound)?;
            }
        }
        Err(e) => {
            let info = ErrorInfo::from_error(e);
            for record in collect(AdviceKind::AfterThrowing) {
                let bound = bind_arguments(&record, &class, &jp, None, Some(&info), None)?;
                (record.advice)(target, &bound)?;
            }
        }
    }

    // 释放阶段：两条路径都恰好执行一次
    for record in collect(AdviceKind::After) {
        let bound = bind_arguments(&record, &class, &jp, None, None, None)?;
        (record.advice)(target, &bound)?;
    }

    result
}

/// 用进程级默认注册表把一次调用接入拦截流水线
///
/// 手写目标不经代理时的入口（`intercepted!` 宏展开到这里）。
/// 记录按安装时解析好的切点对本次调用求值筛选。
pub fn run_intercepted(
    target: &Target,
    method_name: &str,
    actuals: Vec<AopValue>,
    body: Box<dyn FnOnce() -> AopResult<AopValue> + Send>,
) -> AopResult<AopValue> {
    let registry = crate::registry::global_advice_registry();
    let class = Arc::clone(target.class());
    let method = class.method(method_name);

    let select = |r: &AdviceRecord| -> bool {
        match &method {
            Some(m) => {
                let mut ctx = MatchContext::for_call(m.as_ref(), class.as_ref(), &actuals)
                    .with_target(target)
                    .with_proxy_type(class.name());
                if let Some(bean) = target.bean_name() {
                    ctx = ctx.with_bean(bean);
                }
                r.pointcut.evaluate(&ctx)
            }
            None => false,
        }
    };

    run_pipeline(&registry, target, method_name, &actuals, &select, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_names::ARG_NAMES_KEY;
    use crate::reflect::MethodDescriptor;
    use std::sync::Mutex;

    type Log = Mutex<Vec<String>>;

    fn log_of(target: &Target) -> Vec<String> {
        target.state::<Log>().unwrap().lock().unwrap().clone()
    }

    fn push(target: &Target, entry: impl Into<String>) {
        target
            .state::<Log>()
            .unwrap()
            .lock()
            .unwrap()
            .push(entry.into());
    }

    /// 业务方法与通知方法同在一个原型上（切面类的常见形态）
    fn service_class() -> Arc<ClassDescriptor> {
        ClassDescriptor::builder("service")
            .method(
                MethodDescriptor::from_fn("greet", |t, _a| {
                    push(t, "hello");
                    Ok(AopValue::new(0_i32))
                })
                .with_param_types(["String"]),
            )
            .method(
                MethodDescriptor::from_fn("add", |_t, args| {
                    let x = args[0].downcast_ref::<i32>().copied().unwrap_or(0);
                    let y = args[1].downcast_ref::<i32>().copied().unwrap_or(0);
                    Ok(AopValue::new(x + y))
                })
                .with_param_types(["i32", "i32"]),
            )
            .method(MethodDescriptor::from_fn("fail", |_t, _a| {
                Err(AopError::Advice("boom".to_string()))
            }))
            .method(
                MethodDescriptor::from_fn("logBefore", |t, args| {
                    let jp = args[0].downcast_ref::<JoinPoint>().unwrap();
                    push(t, format!("before:{}", jp.signature().unwrap_or("?")));
                    Ok(AopValue::unit())
                })
                .with_meta_text(ARG_NAMES_KEY, "joinPoint"),
            )
            .method(
                MethodDescriptor::from_fn("recordResult", |t, args| {
                    let result = args[1].downcast_ref::<i32>().copied().unwrap_or(-1);
                    push(t, format!("result:{}", result));
                    Ok(AopValue::unit())
                })
                .with_meta_text(ARG_NAMES_KEY, "joinPoint,result"),
            )
            .method(
                MethodDescriptor::from_fn("recordError", |t, args| {
                    let info = args[1].downcast_ref::<ErrorInfo>().unwrap();
                    push(t, format!("error:{}", info.message));
                    Ok(AopValue::unit())
                })
                .with_meta_text(ARG_NAMES_KEY, "joinPoint,error"),
            )
            .method(
                MethodDescriptor::from_fn("plusOne", |_t, args| {
                    let proceed = args
                        .last()
                        .and_then(|v| v.downcast_ref::<Proceed>())
                        .expect("proceed is appended as the final argument");
                    let out = proceed.call()?;
                    let n = out.downcast_ref::<i32>().copied().unwrap_or(0);
                    Ok(AopValue::new(n + 1))
                })
                .with_meta_text(ARG_NAMES_KEY, "joinPoint"),
            )
            .method(
                MethodDescriptor::from_fn("release", |t, _a| {
                    push(t, "release");
                    Ok(AopValue::unit())
                })
                .with_meta_text(ARG_NAMES_KEY, ""),
            )
            .build()
    }

    fn fresh() -> (Arc<ClassDescriptor>, Arc<AdviceRegistry>, PointcutRegistry) {
        (
            service_class(),
            Arc::new(AdviceRegistry::new()),
            PointcutRegistry::new(),
        )
    }

    /// 测试用分发：与代理的标准分发一致，按切点求值筛选记录，
    /// 围绕方法体跑流水线
    fn call(
        registry: &Arc<AdviceRegistry>,
        target: &Target,
        method_name: &str,
        actuals: &[AopValue],
    ) -> AopResult<AopValue> {
        let class = Arc::clone(target.class());
        let method = class.method(method_name).unwrap();

        let select = {
            let method = Arc::clone(&method);
            let class = Arc::clone(&class);
            let target = target.clone();
            let actuals = actuals.to_vec();
            move |r: &AdviceRecord| {
                let ctx = MatchContext::for_call(method.as_ref(), class.as_ref(), &actuals)
                    .with_target(&target)
                    .with_proxy_type(class.name());
                r.pointcut.evaluate(&ctx)
            }
        };
        let original = {
            let method = Arc::clone(&method);
            let target = target.clone();
            let actuals = actuals.to_vec();
            Box::new(move || method.invoke(&target, &actuals))
        };

        run_pipeline(registry, target, method_name, actuals, &select, original)
    }

    #[test]
    fn test_install_advice_appends_record() {
        let (class, registry, pointcuts) = fresh();
        install_advice(
            AdviceKind::Before,
            &class,
            "logBefore",
            AdviceOptions::new("execution(* service.greet(..))").arg_names("joinPoint"),
            &registry,
            &pointcuts,
        )
        .unwrap();

        let records = registry.records("service", AdviceKind::Before);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method_name, "logBefore");
        assert_eq!(records[0].pointcut_text, "execution(* service.greet(..))");

        // 安装副作用：切点文本记入方法元数据
        let method = class.method("logBefore").unwrap();
        assert_eq!(
            method.metadata().text("pointcut").as_deref(),
            Some("execution(* service.greet(..))")
        );
    }

    #[test]
    fn test_install_advice_missing_method() {
        let (class, registry, pointcuts) = fresh();
        let err = install_advice(
            AdviceKind::Before,
            &class,
            "nope",
            AdviceOptions::new("execution(* service.greet(..))"),
            &registry,
            &pointcuts,
        )
        .unwrap_err();
        assert!(matches!(err, AopError::Reference(_)));
    }

    #[test]
    fn test_install_advice_bad_pointcut() {
        let (class, registry, pointcuts) = fresh();
        let err = install_advice(
            AdviceKind::Before,
            &class,
            "logBefore",
            AdviceOptions::new("fooBar(x)"),
            &registry,
            &pointcuts,
        )
        .unwrap_err();
        assert!(matches!(err, AopError::Parse(_)));
        assert!(err.to_string().contains("fooBar(x)"));
    }

    #[test]
    fn test_before_advice_runs_first() {
        let (class, registry, pointcuts) = fresh();
        before_advice(
            &class,
            "logBefore",
            AdviceOptions::new("execution(* service.greet(..))"),
            &registry,
            &pointcuts,
        )
        .unwrap();

        let target = Target::new(class, Log::new(Vec::new()));
        let out = call(
            &registry,
            &target,
            "greet",
            &[AopValue::new("world".to_string())],
        )
        .unwrap();

        assert_eq!(out.downcast_ref::<i32>(), Some(&0));
        assert_eq!(log_of(&target), vec!["before:greet", "hello"]);
    }

    #[test]
    fn test_firing_order_is_installation_order() {
        let (class, registry, pointcuts) = fresh();
        let text = "execution(* service.greet(..))";
        before_advice(
            &class,
            "logBefore",
            AdviceOptions::new(text),
            &registry,
            &pointcuts,
        )
        .unwrap();
        before_advice(
            &class,
            "release",
            AdviceOptions::new(text),
            &registry,
            &pointcuts,
        )
        .unwrap();

        let target = Target::new(class, Log::new(Vec::new()));
        call(
            &registry,
            &target,
            "greet",
            &[AopValue::new("world".to_string())],
        )
        .unwrap();

        assert_eq!(log_of(&target), vec!["before:greet", "release", "hello"]);
    }

    #[test]
    fn test_after_returning_binds_result() {
        let (class, registry, pointcuts) = fresh();
        after_returning_advice(
            &class,
            "recordResult",
            AdviceOptions::new("execution(* service.add(..))").arg_names("joinPoint,result"),
            &registry,
            &pointcuts,
        )
        .unwrap();

        let target = Target::new(class, Log::new(Vec::new()));
        let out = call(
            &registry,
            &target,
            "add",
            &[AopValue::new(2_i32), AopValue::new(3_i32)],
        )
        .unwrap();

        assert_eq!(out.downcast_ref::<i32>(), Some(&5));
        assert_eq!(log_of(&target), vec!["result:5"]);
    }

    #[test]
    fn test_after_throwing_observes_then_rethrows() {
        let (class, registry, pointcuts) = fresh();
        after_throwing_advice(
            &class,
            "recordError",
            AdviceOptions::new("execution(* service.fail(..))").arg_names("joinPoint,error"),
            &registry,
            &pointcuts,
        )
        .unwrap();

        let target = Target::new(class, Log::new(Vec::new()));
        let err = call(&registry, &target, "fail", &[]).unwrap_err();

        assert!(matches!(err, AopError::Advice(_)));
        assert_eq!(log_of(&target), vec!["error:Advice error: boom"]);
    }

    #[test]
    fn test_around_proceed_plus_one() {
        let (class, registry, pointcuts) = fresh();
        around_advice(
            &class,
            "plusOne",
            AdviceOptions::new("execution(* service.add(..))"),
            &registry,
            &pointcuts,
        )
        .unwrap();

        let target = Target::new(class, Log::new(Vec::new()));
        let out = call(
            &registry,
            &target,
            "add",
            &[AopValue::new(4_i32), AopValue::new(6_i32)],
        )
        .unwrap();

        // proceed() 返回 10，通知加一
        assert_eq!(out.downcast_ref::<i32>(), Some(&11));
    }

    #[test]
    fn test_after_runs_on_both_paths() {
        let (class, registry, pointcuts) = fresh();
        after_advice(
            &class,
            "release",
            AdviceOptions::new("execution(* service.add(..))"),
            &registry,
            &pointcuts,
        )
        .unwrap();
        after_advice(
            &class,
            "release",
            AdviceOptions::new("execution(* service.fail(..))"),
            &registry,
            &pointcuts,
        )
        .unwrap();

        let target = Target::new(class, Log::new(Vec::new()));
        call(
            &registry,
            &target,
            "add",
            &[AopValue::new(1_i32), AopValue::new(2_i32)],
        )
        .unwrap();
        assert_eq!(log_of(&target), vec!["release"]);

        call(&registry, &target, "fail", &[]).unwrap_err();
        assert_eq!(log_of(&target), vec!["release", "release"]);
    }

    #[test]
    fn test_advisor_replaces_original_in_before() {
        use crate::advisor::{Advisor, AdvisorMatcher};
        use crate::selector::SelectorMatcher;

        let (class, registry, pointcuts) = fresh();
        before_advice(
            &class,
            "logBefore",
            AdviceOptions::new("execution(* service.greet(..))"),
            &registry,
            &pointcuts,
        )
        .unwrap();
        registry.add_advisor(Arc::new(Advisor::new(
            "shortCircuit",
            Arc::new(|_t: &Target, _a: &[AopValue]| Ok(AopValue::new(99_i32))),
            AdvisorMatcher::Class(Arc::new(SelectorMatcher::new("*", true).unwrap())),
        )));

        let target = Target::new(class, Log::new(Vec::new()));
        let out = call(
            &registry,
            &target,
            "greet",
            &[AopValue::new("world".to_string())],
        )
        .unwrap();

        // Advisor 命中：原始方法不执行，返回值被取代
        assert_eq!(out.downcast_ref::<i32>(), Some(&99));
        assert_eq!(log_of(&target), vec!["before:greet"]);
    }

    #[test]
    fn test_intercepted_macro_uses_global_registry() {
        let class = ClassDescriptor::builder("macroSvc")
            .method(MethodDescriptor::from_fn("work", |t, _a| {
                push(t, "work");
                Ok(AopValue::new(7_i32))
            }))
            .method(
                MethodDescriptor::from_fn("note", |t, _a| {
                    push(t, "note");
                    Ok(AopValue::unit())
                })
                .with_meta_text(ARG_NAMES_KEY, ""),
            )
            .build();

        let registry = crate::registry::global_advice_registry();
        let pointcuts = PointcutRegistry::new();
        install_advice(
            AdviceKind::Before,
            &class,
            "note",
            AdviceOptions::new("execution(* macroSvc.work(..))"),
            &registry,
            &pointcuts,
        )
        .unwrap();

        let target = Target::new(Arc::clone(&class), Log::new(Vec::new()));
        let t2 = target.clone();
        let out = crate::intercepted!(target, "work", Vec::new(), move || {
            t2.class().method("work").unwrap().invoke(&t2, &[])
        })
        .unwrap();

        assert_eq!(out.downcast_ref::<i32>(), Some(&7));
        assert_eq!(log_of(&target), vec!["note", "work"]);
    }

    #[test]
    fn test_pipeline_runs_full_sequence() {
        let (class, registry, pointcuts) = fresh();

        for (kind, method) in [
            (AdviceKind::Before, "logBefore"),
            (AdviceKind::AfterReturning, "recordResult"),
            (AdviceKind::After, "release"),
        ] {
            install_advice(
                kind,
                &class,
                method,
                AdviceOptions::new("execution(* service.add(..))"),
                &registry,
                &pointcuts,
            )
            .unwrap();
        }

        let target = Target::new(Arc::clone(&class), Log::new(Vec::new()));
        let t2 = target.clone();
        let out = run_pipeline(
            &registry,
            &target,
            "add",
            &[AopValue::new(2_i32), AopValue::new(3_i32)],
            &|_r| true,
            Box::new(move || {
                t2.class()
                    .method("add")
                    .unwrap()
                    .invoke(&t2, &[AopValue::new(2_i32), AopValue::new(3_i32)])
            }),
        )
        .unwrap();

        assert_eq!(out.downcast_ref::<i32>(), Some(&5));
        assert_eq!(log_of(&target), vec!["before:add", "result:5", "release"]);
    }
}
