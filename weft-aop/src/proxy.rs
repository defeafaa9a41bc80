//! 代理工厂与拦截代理
//!
//! 两种拦截策略：
//! - 透明代理 - 每次调用都从类的方法表现查，可撤销
//! - 原型覆盖（类代理） - 构建期快照方法表
//!
//! `frozen` 与 `exposed` 是与策略正交的标志：冻结后的工厂拒绝
//! 一切修改；暴露标志让代理在调用的同步范围内发布到进程级
//! "当前代理"槽位（协作式单线程假设）。
//!
//! 每次经代理的调用都跑一遍完整的拦截流水线再委托给方法体。
//! 标准分发按安装时解析好的切点选择通知记录；AspectJ 风格分发
//! 用"切点文本包含方法名"的包含测试，`strict` 开关把选择改回
//! 真正的切点求值器。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::advice::run_pipeline;
use crate::config::AdviceConfig;
use crate::error::{AopError, AopResult};
use crate::pointcut::MatchContext;
use crate::reflect::{AopValue, MethodDescriptor, Target};
use crate::registry::{global_advice_registry, AdviceRecord, AdviceRegistry};

/// "当前代理"槽位（栈式，支持代理间的嵌套调用）
static CURRENT_PROXY: Lazy<Mutex<Vec<Weak<AopProxy>>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// 读取当前暴露的代理（无暴露调用在途时为 None）
pub fn current_proxy() -> Option<Arc<AopProxy>> {
    CURRENT_PROXY.lock().last().and_then(Weak::upgrade)
}

/// RAII 守卫：入栈于调用开始，出栈于调用展开
struct ExposeGuard;

impl ExposeGuard {
    fn publish(proxy: Weak<AopProxy>) -> Self {
        CURRENT_PROXY.lock().push(proxy);
        Self
    }
}

impl Drop for ExposeGuard {
    fn drop(&mut self) {
        CURRENT_PROXY.lock().pop();
    }
}

#[derive(Debug, Clone, Copy)]
enum DispatchMode {
    /// 按安装时解析好的切点对本次调用求值
    Standard,
    /// 切点文本包含方法名的包含测试；strict 时改走求值器
    AspectJ { strict: bool },
}

enum ProxyStrategy {
    /// 构建期快照的方法表
    Overlay(HashMap<String, Arc<MethodDescriptor>>),
    /// 每次调用现查
    Transparent,
}

/// 拦截代理
pub struct AopProxy {
    target: Arc<Target>,
    strategy: ProxyStrategy,
    dispatch: DispatchMode,
    exposed: bool,
    revoked: Arc<AtomicBool>,
    registry: Arc<AdviceRegistry>,
    self_ref: Weak<AopProxy>,
}

impl AopProxy {
    /// 代理背后的目标
    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }

    /// 经代理调用方法：选出匹配的通知记录，围绕方法体执行
    /// 完整的拦截流水线
    pub fn invoke(&self, method_name: &str, args: &[AopValue]) -> AopResult<AopValue> {
        if self.is_revoked() {
            return Err(AopError::Revoked(format!(
                "proxy for '{}' has been disposed",
                self.target.class().name()
            )));
        }

        let _guard = self
            .exposed
            .then(|| ExposeGuard::publish(Weak::clone(&self.self_ref)));

        let method = match &self.strategy {
            ProxyStrategy::Overlay(table) => table.get(method_name).cloned(),
            ProxyStrategy::Transparent => self.target.class().method(method_name),
        }
        .ok_or_else(|| {
            AopError::Reference(format!(
                "method '{}' not found on class '{}'",
                method_name,
                self.target.class().name()
            ))
        })?;

        let class = self.target.class();
        let eval_select = |record: &AdviceRecord| -> bool {
            let mut ctx = MatchContext::for_call(method.as_ref(), class.as_ref(), args)
                .with_target(self.target.as_ref())
                .with_proxy_type(class.name());
            if let Some(bean) = self.target.bean_name() {
                ctx = ctx.with_bean(bean);
            }
            record.pointcut.evaluate(&ctx)
        };
        let contains_select =
            |record: &AdviceRecord| -> bool { record.pointcut_text.contains(method_name) };

        let select: &dyn Fn(&AdviceRecord) -> bool = match self.dispatch {
            DispatchMode::AspectJ { strict: false } => &contains_select,
            _ => &eval_select,
        };

        let original = {
            let method = Arc::clone(&method);
            let target = (*self.target).clone();
            let actuals = args.to_vec();
            Box::new(move || method.invoke(&target, &actuals))
        };

        run_pipeline(
            &self.registry,
            &self.target,
            method_name,
            args,
            select,
            original,
        )
    }
}

/// 代理工厂
///
/// 持有目标、已追加的通知绑定与策略标志，每次 `proxy()` 产出
/// 一个新代理并记录其撤销句柄。
pub struct ProxyFactory {
    target: Arc<Target>,
    advices: Vec<AdviceConfig>,
    interfaces: Vec<String>,
    use_class_proxy: bool,
    use_aspectj_style: bool,
    strict: bool,
    frozen: bool,
    exposed: bool,
    revoke_handles: Vec<Arc<AtomicBool>>,
    registry: Arc<AdviceRegistry>,
}

impl ProxyFactory {
    /// 用进程级默认通知注册表创建
    pub fn new(target: Arc<Target>) -> Self {
        Self::with_registry(target, global_advice_registry())
    }

    /// 用指定通知注册表创建（独立织入器用）
    pub fn with_registry(target: Arc<Target>, registry: Arc<AdviceRegistry>) -> Self {
        Self {
            target,
            advices: Vec::new(),
            interfaces: Vec::new(),
            use_class_proxy: false,
            use_aspectj_style: false,
            strict: false,
            frozen: false,
            exposed: false,
            revoke_handles: Vec::new(),
            registry,
        }
    }

    fn guard(&self) -> AopResult<()> {
        if self.frozen {
            return Err(AopError::PolicyViolation(format!(
                "ProxyFactory for '{}' is frozen",
                self.target.class().name()
            )));
        }
        Ok(())
    }

    /// 追加通知绑定
    pub fn add_advice(&mut self, advice: AdviceConfig) -> AopResult<()> {
        self.guard()?;
        self.advices.push(advice);
        Ok(())
    }

    /// 声明接口（有接口声明且未开类代理时走透明策略）
    pub fn add_interface(&mut self, name: impl Into<String>) -> AopResult<()> {
        self.guard()?;
        self.interfaces.push(name.into());
        Ok(())
    }

    pub fn set_use_class_proxy(&mut self, value: bool) -> AopResult<()> {
        self.guard()?;
        self.use_class_proxy = value;
        Ok(())
    }

    pub fn set_use_aspectj_style(&mut self, value: bool) -> AopResult<()> {
        self.guard()?;
        self.use_aspectj_style = value;
        Ok(())
    }

    /// AspectJ 分发改走真正的切点求值器
    pub fn set_strict(&mut self, value: bool) -> AopResult<()> {
        self.guard()?;
        self.strict = value;
        Ok(())
    }

    pub fn set_exposed(&mut self, value: bool) -> AopResult<()> {
        self.guard()?;
        self.exposed = value;
        Ok(())
    }

    /// 冻结工厂（之后的任何修改都是策略违规）
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    pub fn advices(&self) -> &[AdviceConfig] {
        &self.advices
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// 产出一个代理
    pub fn proxy(&mut self) -> Arc<AopProxy> {
        let revoked = Arc::new(AtomicBool::new(false));
        self.revoke_handles.push(Arc::clone(&revoked));

        let strategy = if self.use_class_proxy || self.interfaces.is_empty() {
            ProxyStrategy::Overlay(self.target.class().method_table_snapshot())
        } else {
            ProxyStrategy::Transparent
        };

        let dispatch = if self.use_aspectj_style {
            DispatchMode::AspectJ {
                strict: self.strict,
            }
        } else {
            DispatchMode::Standard
        };

        tracing::debug!(
            "Building proxy for '{}' ({} advice binding(s), dispatch {:?})",
            self.target.class().name(),
            self.advices.len(),
            dispatch
        );

        Arc::new_cyclic(|self_ref| AopProxy {
            target: Arc::clone(&self.target),
            strategy,
            dispatch,
            exposed: self.exposed,
            revoked,
            registry: Arc::clone(&self.registry),
            self_ref: Weak::clone(self_ref),
        })
    }

    /// 撤销所有已产出的代理，清空列表，重置标志
    pub fn dispose(&mut self) {
        tracing::debug!(
            "Disposing ProxyFactory for '{}' ({} proxy handle(s))",
            self.target.class().name(),
            self.revoke_handles.len()
        );
        for handle in self.revoke_handles.drain(..) {
            handle.store(true, Ordering::SeqCst);
        }
        self.advices.clear();
        self.interfaces.clear();
        self.use_class_proxy = false;
        self.use_aspectj_style = false;
        self.strict = false;
        self.frozen = false;
        self.exposed = false;
    }
}
