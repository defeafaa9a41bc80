//! 声明式配置模型
//!
//! 内核消费的是已经解析好的配置对象；文件加载与模式校验属于
//! 外层装载器的职责。字段名与外部格式保持 camelCase。

use serde::{Deserialize, Serialize};

use crate::advice::AdviceKind;

/// AOP 总配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AopConfig {
    /// 全局注册的命名切点
    #[serde(default)]
    pub pointcuts: Vec<PointcutConfig>,

    /// 切面列表（按 `order` 升序织入）
    pub aspects: Vec<AspectConfig>,

    /// Advisor 列表
    #[serde(default)]
    pub advisors: Vec<AdvisorConfig>,

    /// 使用类代理（原型覆盖策略）
    #[serde(default)]
    pub proxy_target_class: bool,

    /// 使用 AspectJ 风格的按访问分发
    #[serde(default)]
    pub use_aspect_j: bool,

    /// 织入后冻结代理工厂
    #[serde(default)]
    pub frozen: bool,

    /// 在"当前代理"槽位暴露代理
    #[serde(default)]
    pub expose_proxy: bool,
}

/// 命名切点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointcutConfig {
    pub id: String,
    pub expression: String,
}

/// 切面配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectConfig {
    pub id: String,

    /// 模块定位符
    #[serde(rename = "ref")]
    pub module_ref: String,

    /// 织入顺序（缺省 0；相同值保持输入顺序）
    #[serde(default)]
    pub order: i64,

    /// 切面局部的命名切点
    #[serde(default)]
    pub pointcuts: Vec<PointcutConfig>,

    /// 通知绑定
    pub advices: Vec<AdviceConfig>,
}

/// 单条通知绑定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceConfig {
    /// 通知类型
    #[serde(rename = "type")]
    pub kind: AdviceKind,

    /// 通知方法名（在切面原型上查找）
    pub method: String,

    /// 内联切点表达式
    #[serde(default)]
    pub pointcut: Option<String>,

    /// 命名切点引用（与 `pointcut` 二选一）
    #[serde(default)]
    pub pointcut_ref: Option<String>,

    /// afterReturning 的返回值参数名
    #[serde(default)]
    pub returning: Option<String>,

    /// afterThrowing 的异常参数名
    #[serde(default)]
    pub throwing: Option<String>,

    /// 逗号分隔的参数名
    #[serde(default)]
    pub arg_names: Option<String>,
}

/// Advisor 的谓词配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum MatcherConfig {
    /// 类过滤器（选择器表达式）
    ClassFilter { selector: String },

    /// 方法匹配器（选择器表达式 + 动态标志）
    MethodMatcher {
        selector: String,
        #[serde(default)]
        runtime: bool,
    },
}

/// Advisor 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorConfig {
    pub id: String,

    /// 承载通知方法的切面模块
    pub module_ref: String,

    /// 通知绑定
    pub advice: AdviceConfig,

    /// 选中调用点的谓词
    pub expression: MatcherConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let raw = r#"{
            "pointcuts": [{"id": "svcCalls", "expression": "execution(* service.greet(..))"}],
            "aspects": [{
                "id": "logging",
                "ref": "mod.logging",
                "order": 1,
                "advices": [
                    {"type": "before", "method": "logBefore", "pointcutRef": "svcCalls"},
                    {"type": "afterReturning", "method": "logResult",
                     "pointcut": "execution(* service.add(..))",
                     "returning": "result", "argNames": "joinPoint,result"}
                ]
            }],
            "advisors": [{
                "id": "audit",
                "moduleRef": "mod.audit",
                "advice": {"type": "before", "method": "check", "pointcut": "bean(svc)"},
                "expression": {"kind": "classFilter", "selector": "&Service"}
            }],
            "exposeProxy": true
        }"#;

        let config: AopConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.pointcuts.len(), 1);
        assert_eq!(config.aspects[0].module_ref, "mod.logging");
        assert_eq!(config.aspects[0].order, 1);
        assert_eq!(config.aspects[0].advices[0].kind, AdviceKind::Before);
        assert_eq!(
            config.aspects[0].advices[0].pointcut_ref.as_deref(),
            Some("svcCalls")
        );
        assert_eq!(
            config.aspects[0].advices[1].kind,
            AdviceKind::AfterReturning
        );
        assert!(config.expose_proxy);
        assert!(!config.frozen);
        assert!(!config.proxy_target_class);

        match &config.advisors[0].expression {
            MatcherConfig::ClassFilter { selector } => assert_eq!(selector, "&Service"),
            other => panic!("unexpected matcher config: {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let raw = r#"{"aspects": []}"#;
        let config: AopConfig = serde_json::from_str(raw).unwrap();
        assert!(config.pointcuts.is_empty());
        assert!(config.advisors.is_empty());
        assert!(!config.use_aspect_j);
        assert!(!config.expose_proxy);
    }

    #[test]
    fn test_advice_kind_names() {
        let kinds: Vec<AdviceKind> = serde_json::from_str(
            r#"["before", "after", "afterReturning", "afterThrowing", "around"]"#,
        )
        .unwrap();
        assert_eq!(kinds, AdviceKind::all());
    }
}
