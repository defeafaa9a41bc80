//! 织入器
//!
//! 顶层协调者：吸收声明式配置，解析切面模块与命名切点，按
//! `order` 升序为每个切面构建代理并安装通知绑定，把活代理记入
//! 存活集；dispose 时统一拆除。任何引用错误（缺失的切点引用、
//! 原型上缺失的方法、缺失的模块）都让 boot 立即失败。
//!
//! 织入器自带一套注册表，可实例化出互不影响的独立织入器；
//! 进程级默认织入器挂在全局注册表上。

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::advice::{install_advice, AdviceOptions};
use crate::advisor::{Advisor, AdvisorMatcher};
use crate::config::{AdvisorConfig, AopConfig, AspectConfig, MatcherConfig};
use crate::error::{AopError, AopResult};
use crate::pointcut::{global_pointcut_registry, PointcutExpression, PointcutRegistry};
use crate::proxy::{AopProxy, ProxyFactory};
use crate::reflect::{global_module_registry, ModuleRegistry, Target};
use crate::registry::{global_advice_registry, AdviceRegistry};
use crate::selector::SelectorMatcher;

/// 织入器策略标志
#[derive(Debug, Clone, Copy, Default)]
pub struct WeaverFlags {
    pub proxy_target_class: bool,
    pub use_aspectj_style: bool,
    pub frozen: bool,
    pub expose_proxy: bool,
}

/// 一个已织入的切面及其代理
struct LiveAspect {
    id: String,
    factory: ProxyFactory,
    proxy: Arc<AopProxy>,
}

/// 织入器
pub struct Weaver {
    pointcuts: Arc<PointcutRegistry>,
    registry: Arc<AdviceRegistry>,
    modules: Arc<ModuleRegistry>,
    live: Mutex<Vec<LiveAspect>>,
    flags: RwLock<WeaverFlags>,
}

impl Weaver {
    /// 自带一套全新注册表的独立织入器
    pub fn new() -> Self {
        Self::with_registries(
            Arc::new(PointcutRegistry::new()),
            Arc::new(AdviceRegistry::new()),
            Arc::new(ModuleRegistry::new()),
        )
    }

    pub fn with_registries(
        pointcuts: Arc<PointcutRegistry>,
        registry: Arc<AdviceRegistry>,
        modules: Arc<ModuleRegistry>,
    ) -> Self {
        Self {
            pointcuts,
            registry,
            modules,
            live: Mutex::new(Vec::new()),
            flags: RwLock::new(WeaverFlags::default()),
        }
    }

    pub fn pointcuts(&self) -> &Arc<PointcutRegistry> {
        &self.pointcuts
    }

    pub fn advice_registry(&self) -> &Arc<AdviceRegistry> {
        &self.registry
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    pub fn flags(&self) -> WeaverFlags {
        *self.flags.read()
    }

    /// 按切面 id 取活代理
    pub fn proxy_of(&self, aspect_id: &str) -> Option<Arc<AopProxy>> {
        self.live
            .lock()
            .iter()
            .find(|a| a.id == aspect_id)
            .map(|a| Arc::clone(&a.proxy))
    }

    /// 存活切面数
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// 引导：吸收配置、注册切点、织入 advisor 与切面
    pub async fn boot(&self, config: AopConfig) -> AopResult<()> {
        tracing::info!(
            "Booting weaver: {} aspect(s), {} advisor(s), {} named pointcut(s)",
            config.aspects.len(),
            config.advisors.len(),
            config.pointcuts.len()
        );

        // 1. 策略标志快照
        {
            let mut flags = self.flags.write();
            flags.proxy_target_class = config.proxy_target_class;
            flags.use_aspectj_style = config.use_aspect_j;
            flags.frozen = config.frozen;
            flags.expose_proxy = config.expose_proxy;
        }

        // 吸收链接期注册的模块
        self.modules.auto_load();

        // 2. 注册全局命名切点
        for pc in &config.pointcuts {
            let expr = PointcutExpression::parse_with(&pc.expression, &self.pointcuts)?;
            self.pointcuts.set(pc.id.as_str(), expr);
        }

        // 3. Advisor 先于切面
        for advisor in &config.advisors {
            self.install_advisor(advisor).await?;
        }

        // 4. order 升序，相同值保持输入顺序
        let mut aspects = config.aspects.clone();
        aspects.sort_by_key(|a| a.order);

        // 5. 逐个织入
        for aspect in &aspects {
            self.install_aspect(aspect).await?;
        }

        tracing::info!("Weaver boot complete: {} live aspect(s)", self.live_count());
        Ok(())
    }

    async fn install_advisor(&self, cfg: &AdvisorConfig) -> AopResult<()> {
        tracing::debug!(
            "Installing advisor '{}' from module '{}'",
            cfg.id,
            cfg.module_ref
        );
        let target = self.modules.resolve(&cfg.module_ref).await?;
        let method = target.class().method(&cfg.advice.method).ok_or_else(|| {
            AopError::Reference(format!(
                "advice method '{}' not found on class '{}'",
                cfg.advice.method,
                target.class().name()
            ))
        })?;

        // advisor 的内联切点挂在其 id 下
        if let Some(text) = &cfg.advice.pointcut {
            let expr = PointcutExpression::parse_with(text, &self.pointcuts)?;
            self.pointcuts.set(cfg.id.as_str(), expr);
        }

        let matcher = match &cfg.expression {
            MatcherConfig::ClassFilter { selector } => {
                AdvisorMatcher::Class(Arc::new(SelectorMatcher::new(selector, true)?))
            }
            MatcherConfig::MethodMatcher { selector, runtime } => {
                AdvisorMatcher::Method(Arc::new(SelectorMatcher::new(selector, *runtime)?))
            }
        };
        self.registry
            .add_advisor(Arc::new(Advisor::new(cfg.id.as_str(), method.body(), matcher)));

        // 合成切面配置走同一个织入步骤
        let synthetic = AspectConfig {
            id: cfg.id.clone(),
            module_ref: cfg.module_ref.clone(),
            order: 0,
            pointcuts: Vec::new(),
            advices: vec![cfg.advice.clone()],
        };
        self.weave(&target, &synthetic)
    }

    async fn install_aspect(&self, aspect: &AspectConfig) -> AopResult<()> {
        tracing::debug!(
            "Installing aspect '{}' (order {}) from module '{}'",
            aspect.id,
            aspect.order,
            aspect.module_ref
        );
        let target = self.modules.resolve(&aspect.module_ref).await?;

        let flags = self.flags();
        let mut factory =
            ProxyFactory::with_registry(Arc::clone(&target), Arc::clone(&self.registry));
        factory.set_use_class_proxy(flags.proxy_target_class)?;
        factory.set_use_aspectj_style(flags.use_aspectj_style)?;
        factory.set_exposed(flags.expose_proxy)?;
        for advice in &aspect.advices {
            factory.add_advice(advice.clone())?;
        }

        // 织入先于代理构建：引用错误在产出代理前就让 boot 失败
        self.weave(&target, aspect)?;

        if flags.frozen {
            factory.freeze();
        }
        let proxy = factory.proxy();
        self.live.lock().push(LiveAspect {
            id: aspect.id.clone(),
            factory,
            proxy,
        });
        Ok(())
    }

    /// 织入步骤：打切面标记、注册局部切点、逐条安装通知
    fn weave(&self, target: &Arc<Target>, cfg: &AspectConfig) -> AopResult<()> {
        let class = target.class();
        class.metadata().set_flag("aspect");
        class.metadata().set_text("id", cfg.id.as_str());
        class.metadata().set_int("order", cfg.order);

        for pc in &cfg.pointcuts {
            let expr = PointcutExpression::parse_with(&pc.expression, &self.pointcuts)?;
            self.pointcuts.set(pc.id.as_str(), expr);
        }

        for advice in &cfg.advices {
            let text = match (&advice.pointcut, &advice.pointcut_ref) {
                (Some(text), _) => text.clone(),
                (None, Some(reference)) => self
                    .pointcuts
                    .get(reference)
                    .ok_or_else(|| {
                        AopError::Reference(format!(
                            "pointcut '{}' not found in registry",
                            reference
                        ))
                    })?
                    .text()
                    .to_string(),
                (None, None) => {
                    return Err(AopError::Reference(format!(
                        "advice '{}' on aspect '{}' declares neither pointcut nor pointcutRef",
                        advice.method, cfg.id
                    )))
                }
            };

            if !class.has_method(&advice.method) {
                return Err(AopError::Reference(format!(
                    "advice method '{}' not found on class '{}'",
                    advice.method,
                    class.name()
                )));
            }

            let opts = AdviceOptions {
                pointcut_text: text,
                arg_names: advice.arg_names.clone(),
                returning: advice.returning.clone(),
                throwing: advice.throwing.clone(),
            };
            install_advice(
                advice.kind,
                class,
                &advice.method,
                opts,
                &self.registry,
                &self.pointcuts,
            )?;
        }
        Ok(())
    }

    /// 拆除：撤销全部活代理、清空存活集与注册表、重置标志
    pub async fn dispose(&self) -> AopResult<()> {
        tracing::info!("Disposing weaver ({} live aspect(s))", self.live_count());
        {
            let mut live = self.live.lock();
            for aspect in live.iter_mut() {
                tracing::debug!("  ├─ Disposing aspect '{}'", aspect.id);
                aspect.factory.dispose();
            }
            live.clear();
        }
        self.registry.clear();
        self.pointcuts.clear();
        *self.flags.write() = WeaverFlags::default();
        Ok(())
    }
}

impl Default for Weaver {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_WEAVER: Lazy<Weaver> = Lazy::new(|| {
    Weaver::with_registries(
        global_pointcut_registry(),
        global_advice_registry(),
        global_module_registry(),
    )
});

/// 进程级默认织入器（挂在全局注册表上）
pub fn global_weaver() -> &'static Weaver {
    &GLOBAL_WEAVER
}
