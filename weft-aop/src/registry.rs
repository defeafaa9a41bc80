//! 通知注册表
//!
//! 按目标类、按通知类型存放有序的通知记录。安装期只追加，
//! 运行期只读（读多写少，不需要移除操作）。

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::advice::AdviceKind;
use crate::advisor::Advisor;
use crate::pointcut::PointcutExpression;
use crate::reflect::MethodBody;

/// 一条已安装的通知记录
pub struct AdviceRecord {
    /// 安装时的切点文本（AspectJ 风格分发的包含测试用）
    pub pointcut_text: String,

    /// 安装时解析好的切点表达式（调用时再求值）
    pub pointcut: PointcutExpression,

    /// 通知方法名（参数名发现用）
    pub method_name: String,

    /// 通知函数（取自目标原型的方法体）
    pub advice: MethodBody,

    /// 显式声明的参数名
    pub arg_names: Option<Vec<String>>,

    /// afterReturning 的返回值参数名（默认 `result`）
    pub returning: Option<String>,

    /// afterThrowing 的异常参数名（默认 `error`）
    pub throwing: Option<String>,
}

/// 通知注册表
pub struct AdviceRegistry {
    buckets: RwLock<HashMap<String, HashMap<AdviceKind, Vec<Arc<AdviceRecord>>>>>,
    advisors: RwLock<Vec<Arc<Advisor>>>,
}

impl AdviceRegistry {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            advisors: RwLock::new(Vec::new()),
        }
    }

    /// 追加一条通知记录（插入顺序就是触发顺序）
    pub fn append(&self, class_name: &str, kind: AdviceKind, record: AdviceRecord) {
        tracing::debug!(
            "Installing {} advice '{}' on class '{}' (pointcut: {})",
            kind,
            record.method_name,
            class_name,
            record.pointcut_text
        );
        self.buckets
            .write()
            .entry(class_name.to_string())
            .or_default()
            .entry(kind)
            .or_default()
            .push(Arc::new(record));
    }

    /// 读取某类某通知类型的全部记录（保持插入顺序）
    pub fn records(&self, class_name: &str, kind: AdviceKind) -> Vec<Arc<AdviceRecord>> {
        self.buckets
            .read()
            .get(class_name)
            .and_then(|kinds| kinds.get(&kind))
            .cloned()
            .unwrap_or_default()
    }

    /// 某类上安装的通知总数
    pub fn count(&self, class_name: &str) -> usize {
        self.buckets
            .read()
            .get(class_name)
            .map(|kinds| kinds.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// 注册一个 Advisor
    pub fn add_advisor(&self, advisor: Arc<Advisor>) {
        tracing::debug!("Registering advisor '{}'", advisor.name());
        self.advisors.write().push(advisor);
    }

    /// 当前全部 Advisor（注册顺序）
    pub fn advisors(&self) -> Vec<Arc<Advisor>> {
        self.advisors.read().clone()
    }

    /// 清空注册表
    pub fn clear(&self) {
        self.buckets.write().clear();
        self.advisors.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty() && self.advisors.read().is_empty()
    }
}

impl Default for AdviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_ADVICE_REGISTRY: Lazy<Arc<AdviceRegistry>> =
    Lazy::new(|| Arc::new(AdviceRegistry::new()));

/// 进程级默认通知注册表
pub fn global_advice_registry() -> Arc<AdviceRegistry> {
    Arc::clone(&GLOBAL_ADVICE_REGISTRY)
}
