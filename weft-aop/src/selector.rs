//! 选择器匹配引擎
//!
//! 单个选择器字符串被归类为以下子形式之一：
//! - `#id` - 按元数据 `id` 匹配
//! - `&Type` - 可赋值性匹配
//! - `:Type` / `ns|Type` / `|Type` - 类型（带可选命名空间）匹配
//! - `*` - 通配，恒真
//! - `[attr op? value? flag?]` - 属性选择器，候选者的名字与绑定在
//!   `attr` 上的元数据值按操作符比较
//!
//! `runtime` 标志区分静态匹配（只看方法）与动态匹配（方法、
//! 所属类型与实参一起看）。

use std::fmt;

use crate::error::{AopError, AopResult};
use crate::pointcut::{ClassFilter, MethodMatcher};
use crate::reflect::{AopValue, ClassDescriptor, MetaMap, MetaValue, MethodDescriptor};

/// 属性比较操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `=` 相等
    Eq,
    /// `~=` 候选名是属性值按空白切分后的 token 之一
    Includes,
    /// `|=` 相等，或以 `属性值$` 为前缀
    DashMatch,
    /// `^=` 前缀
    Prefix,
    /// `$=` 后缀
    Suffix,
    /// `*=` 包含
    Substring,
}

/// 大小写标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFlag {
    Insensitive,
    Sensitive,
}

#[derive(Debug, Clone, PartialEq)]
enum SelectorForm {
    Wildcard,
    Id(String),
    Instance(String),
    Type {
        namespace: Option<String>,
        name: String,
    },
    Attribute {
        attr: String,
        op: Option<AttrOp>,
        value: Option<String>,
        flag: Option<CaseFlag>,
    },
}

/// HTML 保留属性永远大小写敏感
fn is_reserved_attr(attr: &str) -> bool {
    matches!(attr, "id" | "class" | "role")
        || attr.starts_with("data-")
        || attr.starts_with("aria-")
}

/// 其余属性默认不敏感，除非带 `s` 标志
fn case_insensitive(attr: &str, flag: Option<CaseFlag>) -> bool {
    if is_reserved_attr(attr) {
        return false;
    }
    !matches!(flag, Some(CaseFlag::Sensitive))
}

/// 剥掉值两侧的引号
fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
        {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// 从尾部分离 `i` / `s` 标志
fn split_flag(s: &str) -> (&str, Option<CaseFlag>) {
    let trimmed = s.trim_end();
    if let Some(rest) = trimmed.strip_suffix(" i").or_else(|| trimmed.strip_suffix("\ti")) {
        return (rest.trim_end(), Some(CaseFlag::Insensitive));
    }
    if let Some(rest) = trimmed.strip_suffix(" s").or_else(|| trimmed.strip_suffix("\ts")) {
        return (rest.trim_end(), Some(CaseFlag::Sensitive));
    }
    (trimmed, None)
}

fn parse_attribute(body: &str) -> AopResult<SelectorForm> {
    let body = body.trim();
    // 多字符操作符必须先于 `=` 检查
    const OPS: [(&str, AttrOp); 6] = [
        ("~=", AttrOp::Includes),
        ("|=", AttrOp::DashMatch),
        ("^=", AttrOp::Prefix),
        ("$=", AttrOp::Suffix),
        ("*=", AttrOp::Substring),
        ("=", AttrOp::Eq),
    ];

    for (symbol, op) in OPS {
        if let Some(idx) = body.find(symbol) {
            let attr = body[..idx].trim();
            if attr.is_empty() {
                return Err(AopError::Parse(format!(
                    "attribute selector '[{}]' has no attribute name",
                    body
                )));
            }
            let (raw_value, flag) = split_flag(&body[idx + symbol.len()..]);
            return Ok(SelectorForm::Attribute {
                attr: attr.to_string(),
                op: Some(op),
                value: Some(strip_quotes(raw_value).to_string()),
                flag,
            });
        }
    }

    let (attr, flag) = split_flag(body);
    let attr = attr.trim();
    if attr.is_empty() {
        return Err(AopError::Parse("empty attribute selector".to_string()));
    }
    Ok(SelectorForm::Attribute {
        attr: attr.to_string(),
        op: None,
        value: None,
        flag,
    })
}

/// 实参与声明参数类型的匹配
///
/// 每个实参必须可赋值给对应的声明参数类型（类型名相等、声明为
/// `*`、或值上带有以该类型名为键的元数据标记）。
pub(crate) fn match_arguments(method: &MethodDescriptor, args: &[AopValue]) -> bool {
    let declared = method.param_types();
    args.len() == declared.len()
        && args
            .iter()
            .zip(declared)
            .all(|(v, t)| t == "*" || v.type_name() == t || v.meta().has(t))
}

/// 选择器匹配器
pub struct SelectorMatcher {
    expression: String,
    runtime: bool,
    form: SelectorForm,
}

impl SelectorMatcher {
    pub fn new(expression: &str, runtime: bool) -> AopResult<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(AopError::Parse("empty selector expression".to_string()));
        }

        let form = if trimmed == "*" {
            SelectorForm::Wildcard
        } else if let Some(rest) = trimmed.strip_prefix('#') {
            SelectorForm::Id(rest.to_string())
        } else if let Some(rest) = trimmed.strip_prefix('&') {
            SelectorForm::Instance(rest.to_string())
        } else if let Some(rest) = trimmed.strip_prefix(':') {
            SelectorForm::Type {
                namespace: None,
                name: rest.to_string(),
            }
        } else if trimmed.starts_with('[') {
            let inner = trimmed
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .ok_or_else(|| {
                    AopError::Parse(format!("unterminated attribute selector '{}'", trimmed))
                })?;
            parse_attribute(inner)?
        } else if let Some((ns, name)) = trimmed.split_once('|') {
            SelectorForm::Type {
                namespace: if ns.is_empty() {
                    None
                } else {
                    Some(ns.to_string())
                },
                name: name.to_string(),
            }
        } else {
            // 裸标识符按属性存在性选择器处理
            SelectorForm::Attribute {
                attr: trimmed.to_string(),
                op: None,
                value: None,
                flag: None,
            }
        };

        Ok(Self {
            expression: expression.to_string(),
            runtime,
            form,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn is_runtime(&self) -> bool {
        self.runtime
    }

    /// 属性选择器携带的值部分（求值不使用，仅随解析保留）
    pub fn attr_value(&self) -> Option<&str> {
        match &self.form {
            SelectorForm::Attribute { value, .. } => value.as_deref(),
            _ => None,
        }
    }

    /// 属性选择器求值：候选者的名字对阵 `attr` 上的元数据值
    fn attr_matches(&self, candidate_name: &str, meta: &MetaMap) -> bool {
        let SelectorForm::Attribute { attr, op, flag, .. } = &self.form else {
            return false;
        };

        let Some(op) = op else {
            return meta.is_truthy(attr);
        };

        let Some(raw) = meta.get(attr) else {
            return false;
        };
        let attr_value = match raw {
            MetaValue::Text(s) => s,
            MetaValue::Int(i) => i.to_string(),
            MetaValue::Flag => String::new(),
        };

        let (name, value) = if case_insensitive(attr, *flag) {
            (candidate_name.to_lowercase(), attr_value.to_lowercase())
        } else {
            (candidate_name.to_string(), attr_value)
        };

        match op {
            AttrOp::Eq => name == value,
            AttrOp::Includes => value.split_whitespace().any(|tok| tok == name),
            AttrOp::DashMatch => name == value || name.starts_with(&format!("{}$", value)),
            AttrOp::Prefix => !value.is_empty() && name.starts_with(&value),
            AttrOp::Suffix => !value.is_empty() && name.ends_with(&value),
            AttrOp::Substring => !value.is_empty() && name.contains(&value),
        }
    }

    /// 类侧结构测试（id / 类型 / 可赋值 / 通配）
    fn structural_class_test(&self, class: &ClassDescriptor) -> bool {
        match &self.form {
            SelectorForm::Wildcard => true,
            SelectorForm::Id(id) => class.metadata().text("id").as_deref() == Some(id.as_str()),
            SelectorForm::Instance(name) => class.is_assignable_to(name),
            SelectorForm::Type { namespace, name } => {
                let name_ok = class.name() == name;
                match namespace.as_deref() {
                    None | Some("*") => name_ok,
                    Some(ns) => {
                        name_ok && class.metadata().text("namespace").as_deref() == Some(ns)
                    }
                }
            }
            SelectorForm::Attribute { .. } => self.attr_matches(class.name(), class.metadata()),
        }
    }

    /// 类过滤：选择器针对类时使用
    pub fn filter(&self, class: &ClassDescriptor) -> bool {
        match &self.form {
            SelectorForm::Wildcard => true,
            SelectorForm::Attribute { .. } => self.attr_matches(class.name(), class.metadata()),
            _ => self.runtime && self.structural_class_test(class),
        }
    }

    /// 方法匹配
    pub fn matches(
        &self,
        method: &MethodDescriptor,
        class: &ClassDescriptor,
        args: Option<&[AopValue]>,
    ) -> bool {
        if matches!(self.form, SelectorForm::Wildcard) {
            return true;
        }

        let hit = match &self.form {
            // 方法侧属性测试
            SelectorForm::Attribute { .. } => self.attr_matches(method.name(), method.metadata()),
            // 结构前缀只在动态匹配时参与，用于类侧测试
            _ => self.runtime && self.structural_class_test(class),
        };
        if !hit {
            return false;
        }

        match args {
            Some(args) => match_arguments(method, args),
            None => true,
        }
    }
}

impl ClassFilter for SelectorMatcher {
    fn filter(&self, class: &ClassDescriptor) -> bool {
        SelectorMatcher::filter(self, class)
    }
}

impl MethodMatcher for SelectorMatcher {
    fn matches(
        &self,
        method: &MethodDescriptor,
        class: &ClassDescriptor,
        args: Option<&[AopValue]>,
    ) -> bool {
        SelectorMatcher::matches(self, method, class, args)
    }
}

impl fmt::Debug for SelectorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorMatcher")
            .field("expression", &self.expression)
            .field("runtime", &self.runtime)
            .field("form", &self.form)
            .finish()
    }
}
