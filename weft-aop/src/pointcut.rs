//! 切点表达式
//!
//! 表达式由空白分隔的 token 组成：中缀 `&&` / `||`、前缀 `!`、
//! 形如 `name(body)` 的原语、以及解析为命名引用的裸标识符。
//! 求值是从左到右的栈式折叠，`&&` 与 `||` 之间没有优先级差异
//! （混合表达式按出现顺序折叠）；`!` 只作用于紧随其后的谓词。
//! 解析是确定性的，求值无副作用；未知 token 是致命解析错误。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

use crate::error::{AopError, AopResult};
use crate::reflect::{AopValue, ClassDescriptor, MethodDescriptor, Target};

/// 原语 token 的固定提取正则
static PRIMITIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(@?[A-Za-z_][A-Za-z0-9_]*)\((.*)\)$").unwrap());

/// 裸标识符（命名引用）
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// 求值候选上下文
///
/// 不同原语读取不同的侧面；缺失的侧面一律判不匹配。
#[derive(Default)]
pub struct MatchContext<'a> {
    pub method: Option<&'a MethodDescriptor>,
    pub owner: Option<&'a ClassDescriptor>,
    pub target: Option<&'a Target>,
    pub proxy_type: Option<&'a str>,
    pub args: Option<&'a [AopValue]>,
    pub bean: Option<&'a str>,
}

impl<'a> MatchContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 针对一次方法调用的完整上下文
    pub fn for_call(
        method: &'a MethodDescriptor,
        owner: &'a ClassDescriptor,
        args: &'a [AopValue],
    ) -> Self {
        Self {
            method: Some(method),
            owner: Some(owner),
            args: Some(args),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: &'a MethodDescriptor) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_owner(mut self, owner: &'a ClassDescriptor) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_target(mut self, target: &'a Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_proxy_type(mut self, name: &'a str) -> Self {
        self.proxy_type = Some(name);
        self
    }

    pub fn with_args(mut self, args: &'a [AopValue]) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_bean(mut self, bean: &'a str) -> Self {
        self.bean = Some(bean);
        self
    }
}

type Predicate = Arc<dyn Fn(&MatchContext<'_>) -> bool + Send + Sync>;

/// 把 `*` 与 `..` 都替换为 `.*` 后编译
///
/// 先用哨兵替换 `..`，避免第一步插入的 `*` 被第二步重写。
fn compile_pattern(pattern: &str) -> AopResult<Regex> {
    let converted = pattern
        .replace("..", "\u{1}")
        .replace('*', ".*")
        .replace('\u{1}', ".*");
    Regex::new(&converted)
        .map_err(|e| AopError::Parse(format!("invalid pattern '{}': {}", pattern, e)))
}

/// 逗号切分原语参数
fn split_params(body: &str) -> Vec<String> {
    if body.trim().is_empty() {
        Vec::new()
    } else {
        body.split(',').map(|s| s.trim().to_string()).collect()
    }
}

/// 构建单个原语谓词
fn build_primitive(name: &str, body: &str, token: &str) -> AopResult<Predicate> {
    match name {
        "execution" => {
            let re = compile_pattern(body)?;
            Ok(Arc::new(move |ctx| {
                ctx.method
                    .map(|m| re.is_match(&m.string_form()))
                    .unwrap_or(false)
            }))
        }
        "within" => {
            let re = compile_pattern(body)?;
            Ok(Arc::new(move |ctx| {
                ctx.owner.map(|c| re.is_match(c.name())).unwrap_or(false)
            }))
        }
        "this" => {
            let name = body.trim().to_string();
            Ok(Arc::new(move |ctx| ctx.proxy_type == Some(name.as_str())))
        }
        "target" => {
            let name = body.trim().to_string();
            Ok(Arc::new(move |ctx| {
                ctx.target
                    .map(|t| t.class().name() == name)
                    .unwrap_or(false)
            }))
        }
        "args" => {
            let types = split_params(body);
            Ok(Arc::new(move |ctx| {
                ctx.args
                    .map(|args| {
                        args.len() == types.len()
                            && args
                                .iter()
                                .zip(&types)
                                .all(|(v, t)| t == "*" || v.type_name() == t)
                    })
                    .unwrap_or(false)
            }))
        }
        "@target" => {
            let key = body.trim().to_string();
            Ok(Arc::new(move |ctx| {
                ctx.target.map(|t| t.has_meta(&key)).unwrap_or(false)
            }))
        }
        "@within" => {
            let key = body.trim().to_string();
            Ok(Arc::new(move |ctx| {
                ctx.target
                    .map(|t| t.class().metadata().has(&key))
                    .or_else(|| ctx.owner.map(|c| c.metadata().has(&key)))
                    .unwrap_or(false)
            }))
        }
        "@annotation" => {
            let key = body.trim().to_string();
            Ok(Arc::new(move |ctx| {
                ctx.method.map(|m| m.metadata().has(&key)).unwrap_or(false)
            }))
        }
        "@args" => {
            let keys = split_params(body);
            Ok(Arc::new(move |ctx| {
                ctx.args
                    .map(|args| {
                        args.len() == keys.len()
                            && args.iter().zip(&keys).all(|(v, k)| v.meta().has(k))
                    })
                    .unwrap_or(false)
            }))
        }
        "bean" => {
            let name = body.trim().to_string();
            Ok(Arc::new(move |ctx| ctx.bean == Some(name.as_str())))
        }
        _ => Err(AopError::Parse(format!(
            "unknown pointcut token '{}'",
            token
        ))),
    }
}

/// 解析单个 token 为谓词
fn parse_token(token: &str, registry: &PointcutRegistry) -> AopResult<Predicate> {
    if let Some(caps) = PRIMITIVE_RE.captures(token) {
        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        return build_primitive(name, body, token);
    }
    if IDENT_RE.is_match(token) {
        return match registry.get(token) {
            Some(expr) => Ok(expr.predicate),
            None => Err(AopError::Parse(format!(
                "unknown pointcut token '{}'",
                token
            ))),
        };
    }
    Err(AopError::Parse(format!(
        "unknown pointcut token '{}'",
        token
    )))
}

enum Op {
    And,
    Or,
}

/// 已解析的切点表达式：一个封闭谓词
#[derive(Clone)]
pub struct PointcutExpression {
    text: String,
    predicate: Predicate,
}

impl PointcutExpression {
    /// 用进程级默认注册表解析
    pub fn parse(text: &str) -> AopResult<Self> {
        Self::parse_with(text, &global_pointcut_registry())
    }

    /// 用指定注册表解析（命名引用在解析时立即解析）
    pub fn parse_with(text: &str, registry: &PointcutRegistry) -> AopResult<Self> {
        let mut acc: Option<Predicate> = None;
        let mut pending: Option<Op> = None;
        let mut negate = false;

        for token in text.split_whitespace() {
            match token {
                "&&" | "||" => {
                    if acc.is_none() || pending.is_some() || negate {
                        return Err(AopError::Parse(format!(
                            "misplaced operator '{}' in '{}'",
                            token, text
                        )));
                    }
                    pending = Some(if token == "&&" { Op::And } else { Op::Or });
                }
                "!" => {
                    if negate {
                        return Err(AopError::Parse(format!(
                            "double negation in '{}'",
                            text
                        )));
                    }
                    negate = true;
                }
                _ => {
                    let mut p = parse_token(token, registry)?;
                    if negate {
                        let inner = p;
                        p = Arc::new(move |ctx| !inner(ctx));
                        negate = false;
                    }
                    acc = Some(match (acc.take(), pending.take()) {
                        (None, None) => p,
                        (Some(l), Some(Op::And)) => Arc::new(move |ctx| l(ctx) && p(ctx)),
                        (Some(l), Some(Op::Or)) => Arc::new(move |ctx| l(ctx) || p(ctx)),
                        _ => {
                            return Err(AopError::Parse(format!(
                                "expected operator before '{}' in '{}'",
                                token, text
                            )))
                        }
                    });
                }
            }
        }

        if pending.is_some() || negate {
            return Err(AopError::Parse(format!(
                "dangling operator in '{}'",
                text
            )));
        }

        let predicate = acc.ok_or_else(|| {
            AopError::Parse(format!("empty pointcut expression '{}'", text))
        })?;

        Ok(Self {
            text: text.to_string(),
            predicate,
        })
    }

    /// 原始表达式文本
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 求值
    pub fn evaluate(&self, ctx: &MatchContext<'_>) -> bool {
        (self.predicate)(ctx)
    }

    /// 针对一次方法调用求值
    pub fn matches_call(
        &self,
        method: &MethodDescriptor,
        owner: &ClassDescriptor,
        args: &[AopValue],
    ) -> bool {
        self.evaluate(&MatchContext::for_call(method, owner, args))
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointcutExpression({})", self.text)
    }
}

impl fmt::Display for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// 类过滤器：只看类型
pub trait ClassFilter: Send + Sync {
    fn filter(&self, class: &ClassDescriptor) -> bool;
}

/// 方法匹配器：看方法、所属类型与可选的实参
pub trait MethodMatcher: Send + Sync {
    fn matches(
        &self,
        method: &MethodDescriptor,
        class: &ClassDescriptor,
        args: Option<&[AopValue]>,
    ) -> bool;
}

impl ClassFilter for PointcutExpression {
    fn filter(&self, class: &ClassDescriptor) -> bool {
        self.evaluate(&MatchContext::new().with_owner(class))
    }
}

impl MethodMatcher for PointcutExpression {
    fn matches(
        &self,
        method: &MethodDescriptor,
        class: &ClassDescriptor,
        args: Option<&[AopValue]>,
    ) -> bool {
        let mut ctx = MatchContext::new().with_method(method).with_owner(class);
        if let Some(args) = args {
            ctx = ctx.with_args(args);
        }
        self.evaluate(&ctx)
    }
}

/// 命名切点注册表
pub struct PointcutRegistry {
    entries: RwLock<HashMap<String, PointcutExpression>>,
}

impl PointcutRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, name: impl Into<String>, expr: PointcutExpression) {
        let name = name.into();
        tracing::debug!("Registering pointcut '{}' = {}", name, expr.text());
        self.entries.write().insert(name, expr);
    }

    pub fn get(&self, name: &str) -> Option<PointcutExpression> {
        self.entries.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn delete(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for PointcutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_POINTCUT_REGISTRY: Lazy<Arc<PointcutRegistry>> =
    Lazy::new(|| Arc::new(PointcutRegistry::new()));

/// 进程级默认切点注册表
pub fn global_pointcut_registry() -> Arc<PointcutRegistry> {
    Arc::clone(&GLOBAL_POINTCUT_REGISTRY)
}
