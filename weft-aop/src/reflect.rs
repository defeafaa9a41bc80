//! 运行时反射替代层
//!
//! Rust 没有运行时反射，内核因此自带一个显式的对象模型：
//! - `ClassDescriptor` / `MethodDescriptor` - 类与方法的描述符
//! - `MetaMap` - 元数据侧通道（规范中所有"metadata key"的读写都落在这里）
//! - `AopValue` - 动态类型的参数/返回值
//! - `Target` - 一个活的目标对象（类描述符 + 不透明实例状态）
//! - `ModuleRegistry` - 模块定位符到目标工厂的注册表

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{AopError, AopResult};

/// 元数据值
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    /// 标记（只有存在与否）
    Flag,
    /// 文本值
    Text(String),
    /// 整数值
    Int(i64),
}

impl MetaValue {
    /// 转换为文本
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 真值判断（Flag 恒真，Text 非空为真，Int 非零为真）
    pub fn is_truthy(&self) -> bool {
        match self {
            MetaValue::Flag => true,
            MetaValue::Text(s) => !s.is_empty(),
            MetaValue::Int(i) => *i != 0,
        }
    }
}

/// 元数据表
///
/// 读多写少：写入只发生在类构建与织入阶段。
#[derive(Debug, Default)]
pub struct MetaMap {
    entries: RwLock<HashMap<String, MetaValue>>,
}

impl MetaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入元数据
    pub fn set(&self, key: impl Into<String>, value: MetaValue) {
        self.entries.write().insert(key.into(), value);
    }

    /// 写入标记
    pub fn set_flag(&self, key: impl Into<String>) {
        self.set(key, MetaValue::Flag);
    }

    /// 写入文本
    pub fn set_text(&self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, MetaValue::Text(value.into()));
    }

    /// 写入整数
    pub fn set_int(&self, key: impl Into<String>, value: i64) {
        self.set(key, MetaValue::Int(value));
    }

    /// 读取元数据
    pub fn get(&self, key: &str) -> Option<MetaValue> {
        self.entries.read().get(key).cloned()
    }

    /// 是否存在指定键
    pub fn has(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// 读取文本值
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(MetaValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// 读取整数值
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(MetaValue::Int(i)) => Some(i),
            _ => None,
        }
    }

    /// 键存在且值为真
    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key).map(|v| v.is_truthy()).unwrap_or(false)
    }

    /// 删除指定键
    pub fn remove(&self, key: &str) -> Option<MetaValue> {
        self.entries.write().remove(key)
    }

    /// 所有键
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl Clone for MetaMap {
    fn clone(&self) -> Self {
        Self {
            entries: RwLock::new(self.entries.read().clone()),
        }
    }
}

/// 取类型名的最后一段（`std::string::String` -> `String`）
fn short_type_name(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

/// 动态类型的参数/返回值
///
/// 除了值本身还记录了运行时类型名（`args(..)` 切点匹配用）
/// 和元数据（`@args(..)` 切点匹配用）。
#[derive(Clone)]
pub struct AopValue {
    type_name: String,
    repr: Option<String>,
    meta: Arc<MetaMap>,
    value: Option<Arc<dyn Any + Send + Sync>>,
}

impl AopValue {
    /// 包装一个值，类型名取自 `T`
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: short_type_name(std::any::type_name::<T>()).to_string(),
            repr: None,
            meta: Arc::new(MetaMap::new()),
            value: Some(Arc::new(value)),
        }
    }

    /// 包装一个值并显式指定类型名
    pub fn named<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            repr: None,
            meta: Arc::new(MetaMap::new()),
            value: Some(Arc::new(value)),
        }
    }

    /// "未设置"值
    pub fn unit() -> Self {
        Self {
            type_name: "()".to_string(),
            repr: None,
            meta: Arc::new(MetaMap::new()),
            value: None,
        }
    }

    /// 是否为未设置值
    pub fn is_unit(&self) -> bool {
        self.value.is_none()
    }

    /// 运行时类型名
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 设置显示文本（JoinPoint 的字符串形式会用到）
    pub fn with_repr(mut self, repr: impl Into<String>) -> Self {
        self.repr = Some(repr.into());
        self
    }

    /// 附加元数据标记
    pub fn with_meta_key(self, key: impl Into<String>) -> Self {
        self.meta.set_flag(key);
        self
    }

    /// 值上的元数据
    pub fn meta(&self) -> &MetaMap {
        &self.meta
    }

    /// 按类型取回值的引用
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.as_ref()?.downcast_ref::<T>()
    }

    /// 显示文本（未设置时退回类型名）
    pub fn display(&self) -> &str {
        self.repr.as_deref().unwrap_or(&self.type_name)
    }
}

impl fmt::Debug for AopValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopValue")
            .field("type_name", &self.type_name)
            .field("repr", &self.repr)
            .finish()
    }
}

/// 方法体：以目标对象为接收者的同步调用
pub type MethodBody = Arc<dyn Fn(&Target, &[AopValue]) -> AopResult<AopValue> + Send + Sync>;

/// 方法描述符
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    owner: String,
    param_names: Vec<String>,
    param_types: Vec<String>,
    metadata: MetaMap,
    body: MethodBody,
}

impl MethodDescriptor {
    /// 从闭包创建方法描述符（owner 在类构建时填充）
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Target, &[AopValue]) -> AopResult<AopValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            owner: String::new(),
            param_names: Vec::new(),
            param_types: Vec::new(),
            metadata: MetaMap::new(),
            body: Arc::new(f),
        }
    }

    /// 声明形式参数名
    pub fn with_param_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// 声明形式参数类型名
    pub fn with_param_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// 附加元数据标记（`@annotation(..)` 切点匹配用）
    pub fn with_meta_flag(self, key: impl Into<String>) -> Self {
        self.metadata.set_flag(key);
        self
    }

    /// 附加元数据文本
    pub fn with_meta_text(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.set_text(key, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn param_types(&self) -> &[String] {
        &self.param_types
    }

    pub fn metadata(&self) -> &MetaMap {
        &self.metadata
    }

    pub fn body(&self) -> MethodBody {
        Arc::clone(&self.body)
    }

    /// 方法的字符串形式（`execution(..)` 模式匹配的对象）
    pub fn string_form(&self) -> String {
        format!("* {}.{}({})", self.owner, self.name, self.param_types.join(","))
    }

    /// 调用方法体
    pub fn invoke(&self, target: &Target, args: &[AopValue]) -> AopResult<AopValue> {
        (self.body)(target, args)
    }

    pub(crate) fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = owner.into();
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("param_names", &self.param_names)
            .field("param_types", &self.param_types)
            .finish()
    }
}

/// 类描述符
///
/// 方法表在构建后只读；织入只向通知注册表追加记录。
pub struct ClassDescriptor {
    name: String,
    parents: Vec<String>,
    methods: HashMap<String, Arc<MethodDescriptor>>,
    metadata: MetaMap,
}

impl ClassDescriptor {
    /// 构建器
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// 是否可赋值给指定类型名（自身或任一父类型）
    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        self.name == type_name || self.parents.iter().any(|p| p == type_name)
    }

    pub fn metadata(&self) -> &MetaMap {
        &self.metadata
    }

    /// 按名称查找方法
    pub fn method(&self, name: &str) -> Option<Arc<MethodDescriptor>> {
        self.methods.get(name).cloned()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    /// 方法表的快照（原型覆盖代理在构建期使用）
    pub(crate) fn method_table_snapshot(&self) -> HashMap<String, Arc<MethodDescriptor>> {
        self.methods.clone()
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("parents", &self.parents)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// 类描述符构建器
pub struct ClassBuilder {
    name: String,
    parents: Vec<String>,
    metadata: MetaMap,
    methods: Vec<MethodDescriptor>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            metadata: MetaMap::new(),
            methods: Vec::new(),
        }
    }

    /// 声明父类型（可赋值性检查用）
    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.parents.push(name.into());
        self
    }

    /// 类级元数据标记
    pub fn meta_flag(self, key: impl Into<String>) -> Self {
        self.metadata.set_flag(key);
        self
    }

    /// 类级元数据文本
    pub fn meta_text(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.set_text(key, value);
        self
    }

    /// 添加方法
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Arc<ClassDescriptor> {
        let mut table = HashMap::new();
        for mut m in self.methods {
            m.set_owner(self.name.clone());
            table.insert(m.name().to_string(), Arc::new(m));
        }
        Arc::new(ClassDescriptor {
            name: self.name,
            parents: self.parents,
            methods: table,
            metadata: self.metadata,
        })
    }
}

/// 一个活的目标对象
///
/// 实例状态对内核不透明；方法体自己负责向下转型。
#[derive(Clone)]
pub struct Target {
    class: Arc<ClassDescriptor>,
    state: Arc<dyn Any + Send + Sync>,
    metadata: Arc<MetaMap>,
    bean_name: Option<String>,
}

impl Target {
    pub fn new<S: Any + Send + Sync>(class: Arc<ClassDescriptor>, state: S) -> Self {
        Self {
            class,
            state: Arc::new(state),
            metadata: Arc::new(MetaMap::new()),
            bean_name: None,
        }
    }

    /// 无实例状态的目标
    pub fn stateless(class: Arc<ClassDescriptor>) -> Self {
        Self::new(class, ())
    }

    /// 设置 Bean 名称（`bean(..)` 切点匹配用）
    pub fn with_bean_name(mut self, name: impl Into<String>) -> Self {
        self.bean_name = Some(name.into());
        self
    }

    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    /// 按类型取回实例状态
    pub fn state<S: Any + Send + Sync>(&self) -> Option<&S> {
        self.state.downcast_ref::<S>()
    }

    /// 实例级元数据
    pub fn metadata(&self) -> &MetaMap {
        &self.metadata
    }

    pub fn bean_name(&self) -> Option<&str> {
        self.bean_name.as_deref()
    }

    /// 实例或其类型上是否存在元数据键
    pub fn has_meta(&self, key: &str) -> bool {
        self.metadata.has(key) || self.class.metadata().has(key)
    }

    /// 按名称解析并直接调用方法体（不经拦截流水线）
    pub fn call(&self, method: &str, args: &[AopValue]) -> AopResult<AopValue> {
        let m = self.class.method(method).ok_or_else(|| {
            AopError::Reference(format!(
                "method '{}' not found on class '{}'",
                method,
                self.class.name()
            ))
        })?;
        m.invoke(self, args)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("class", &self.class.name())
            .field("bean_name", &self.bean_name)
            .finish()
    }
}

/// 模块加载器
///
/// 模块定位符解析是宿主异步的，boot 期间可能挂起。
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self) -> AopResult<Arc<Target>>;
}

/// 从异步闭包构建的模块加载器
pub struct FnLoader {
    factory: Box<dyn Fn() -> BoxFuture<'static, AopResult<Arc<Target>>> + Send + Sync>,
}

impl FnLoader {
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AopResult<Arc<Target>>> + Send + 'static,
    {
        Self {
            factory: Box::new(move || Box::pin(factory())),
        }
    }
}

#[async_trait]
impl ModuleLoader for FnLoader {
    async fn load(&self) -> AopResult<Arc<Target>> {
        (self.factory)().await
    }
}

/// 模块注册器
///
/// 通过 inventory 在链接期自动收集，boot 时由
/// `ModuleRegistry::auto_load` 统一吸收。
pub struct ModuleRegistration {
    /// 模块定位符
    pub name: &'static str,

    /// 创建加载器的函数
    pub loader: fn() -> Arc<dyn ModuleLoader>,
}

impl ModuleRegistration {
    pub const fn new(name: &'static str, loader: fn() -> Arc<dyn ModuleLoader>) -> Self {
        Self { name, loader }
    }
}

inventory::collect!(ModuleRegistration);

/// 模块注册表：模块定位符 -> 目标工厂
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<dyn ModuleLoader>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
        }
    }

    /// 注册模块加载器
    pub fn register(&self, name: impl Into<String>, loader: Arc<dyn ModuleLoader>) {
        let name = name.into();
        tracing::debug!("Registering module '{}'", name);
        self.modules.write().insert(name, loader);
    }

    /// 从异步闭包注册模块
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AopResult<Arc<Target>>> + Send + 'static,
    {
        self.register(name, Arc::new(FnLoader::new(factory)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// 吸收所有通过 inventory 注册的模块，返回数量
    pub fn auto_load(&self) -> usize {
        let mut count = 0;
        for registration in inventory::iter::<ModuleRegistration> {
            tracing::debug!("  ├─ Loading registered module: {}", registration.name);
            self.register(registration.name, (registration.loader)());
            count += 1;
        }
        if count > 0 {
            tracing::info!("Auto-loaded {} module(s) from registry", count);
        }
        count
    }

    /// 解析模块定位符
    pub async fn resolve(&self, name: &str) -> AopResult<Arc<Target>> {
        let loader = self.modules.read().get(name).cloned().ok_or_else(|| {
            AopError::Reference(format!("module '{}' not found in module registry", name))
        })?;
        loader.load().await
    }

    pub fn clear(&self) {
        self.modules.write().clear();
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_MODULE_REGISTRY: Lazy<Arc<ModuleRegistry>> =
    Lazy::new(|| Arc::new(ModuleRegistry::new()));

/// 进程级默认模块注册表
pub fn global_module_registry() -> Arc<ModuleRegistry> {
    Arc::clone(&GLOBAL_MODULE_REGISTRY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeter_class() -> Arc<ClassDescriptor> {
        ClassDescriptor::builder("Greeter")
            .parent("Service")
            .meta_text("id", "greeter")
            .method(
                MethodDescriptor::from_fn("greet", |_t, args| {
                    let who = args
                        .first()
                        .and_then(|v| v.downcast_ref::<String>())
                        .cloned()
                        .unwrap_or_default();
                    Ok(AopValue::new(format!("hello {}", who)))
                })
                .with_param_names(["who"])
                .with_param_types(["String"]),
            )
            .build()
    }

    #[test]
    fn test_class_builder_and_call() {
        let class = greeter_class();
        assert_eq!(class.name(), "Greeter");
        assert!(class.is_assignable_to("Service"));
        assert!(!class.is_assignable_to("Repository"));

        let target = Target::stateless(class);
        let out = target
            .call("greet", &[AopValue::new("world".to_string())])
            .unwrap();
        assert_eq!(out.downcast_ref::<String>().unwrap(), "hello world");
    }

    #[test]
    fn test_missing_method_is_reference_error() {
        let target = Target::stateless(greeter_class());
        let err = target.call("nope", &[]).unwrap_err();
        assert!(matches!(err, AopError::Reference(_)));
    }

    #[test]
    fn test_method_string_form() {
        let class = greeter_class();
        let m = class.method("greet").unwrap();
        assert_eq!(m.string_form(), "* Greeter.greet(String)");
    }

    #[test]
    fn test_meta_map() {
        let meta = MetaMap::new();
        meta.set_flag("aspect");
        meta.set_text("id", "logging");
        meta.set_int("order", 3);

        assert!(meta.has("aspect"));
        assert!(meta.is_truthy("aspect"));
        assert_eq!(meta.text("id").as_deref(), Some("logging"));
        assert_eq!(meta.int("order"), Some(3));
        assert!(meta.remove("aspect").is_some());
        assert!(!meta.has("aspect"));
    }

    #[test]
    fn test_aop_value_type_name_and_meta() {
        let v = AopValue::new(42_i32);
        assert_eq!(v.type_name(), "i32");
        assert_eq!(v.downcast_ref::<i32>(), Some(&42));

        let tagged = AopValue::named("User", "u1".to_string()).with_meta_key("Sensitive");
        assert_eq!(tagged.type_name(), "User");
        assert!(tagged.meta().has("Sensitive"));

        assert!(AopValue::unit().is_unit());
    }

    #[tokio::test]
    async fn test_module_registry_resolve() {
        let registry = ModuleRegistry::new();
        registry.register_fn("mod.greeter", || async {
            Ok(Arc::new(Target::stateless(greeter_class())))
        });

        assert!(registry.contains("mod.greeter"));
        let target = registry.resolve("mod.greeter").await.unwrap();
        assert_eq!(target.class().name(), "Greeter");

        let err = registry.resolve("mod.missing").await.unwrap_err();
        assert!(matches!(err, AopError::Reference(_)));
    }
}
