//! 正则方法名匹配器
//!
//! 持有一组有序的正则表达式；任意一个命中方法名即算匹配，
//! 字面 `*` 源无条件匹配一切。

use regex::Regex;

use crate::error::{AopError, AopResult};
use crate::pointcut::MethodMatcher;
use crate::reflect::{AopValue, ClassDescriptor, MethodDescriptor};
use crate::selector::match_arguments;

/// 正则匹配器
#[derive(Debug)]
pub struct RegexpMatcher {
    sources: Vec<String>,
    patterns: Vec<Regex>,
    match_all: bool,
}

impl RegexpMatcher {
    pub fn new<I, S>(sources: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        let match_all = sources.iter().any(|s| s == "*");

        let mut patterns = Vec::new();
        for source in &sources {
            if source == "*" {
                continue;
            }
            let re = Regex::new(source).map_err(|e| {
                AopError::Parse(format!("invalid method name regex '{}': {}", source, e))
            })?;
            patterns.push(re);
        }

        Ok(Self {
            sources,
            patterns,
            match_all,
        })
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// 方法匹配，实参存在时还要通过参数类型校验
    pub fn matches(
        &self,
        method: &MethodDescriptor,
        _class: &ClassDescriptor,
        args: Option<&[AopValue]>,
    ) -> bool {
        let name_ok =
            self.match_all || self.patterns.iter().any(|re| re.is_match(method.name()));
        if !name_ok {
            return false;
        }
        match args {
            Some(args) => match_arguments(method, args),
            None => true,
        }
    }
}

impl MethodMatcher for RegexpMatcher {
    fn matches(
        &self,
        method: &MethodDescriptor,
        class: &ClassDescriptor,
        args: Option<&[AopValue]>,
    ) -> bool {
        RegexpMatcher::matches(self, method, class, args)
    }
}
