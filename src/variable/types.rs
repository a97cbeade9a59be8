use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 变量上下文，存储某一次请求可见的全部变量
///
/// 每个请求开始前由 collection < environment < run 三层重新合并得到，
/// 合并结果只属于这一个请求（copy-on-write）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableContext {
    /// 变量映射表
    variables: HashMap<String, String>,
}

impl VariableContext {
    /// 创建新的空变量上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 按优先级从低到高叠加多个变量来源，同名时后者胜出
    pub fn layered<'a, I>(layers: I) -> Self
    where
        I: IntoIterator<Item = &'a HashMap<String, String>>,
    {
        let mut context = Self::new();
        for layer in layers {
            context
                .variables
                .extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        context
    }

    /// 插入变量
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// 获取变量值
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(|s| s.as_str())
    }

    /// 合并脚本产生的环境变更：只应用 Set，Unset 条目被丢弃
    pub fn absorb(&mut self, diff: &EnvDiff) {
        for (name, change) in diff {
            if let EnvChange::Set(value) = change {
                self.variables.insert(name.clone(), value.clone());
            }
        }
    }

    /// 变量数量
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.variables
    }
}

impl From<HashMap<String, String>> for VariableContext {
    fn from(variables: HashMap<String, String>) -> Self {
        Self { variables }
    }
}

/// 脚本对单个环境变量的修改
///
/// 序列化时 `Set` 为字符串、`Unset` 为 `null`，与前端的传输格式一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum EnvChange {
    Set(String),
    Unset,
}

impl EnvChange {
    pub fn value(&self) -> Option<&str> {
        match self {
            EnvChange::Set(value) => Some(value),
            EnvChange::Unset => None,
        }
    }
}

impl From<Option<String>> for EnvChange {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(v) => EnvChange::Set(v),
            None => EnvChange::Unset,
        }
    }
}

impl From<EnvChange> for Option<String> {
    fn from(change: EnvChange) -> Self {
        match change {
            EnvChange::Set(v) => Some(v),
            EnvChange::Unset => None,
        }
    }
}

/// 脚本产生的环境变更集合，保持脚本中的调用顺序
pub type EnvDiff = IndexMap<String, EnvChange>;

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_variable_context_basic() {
        let mut ctx = VariableContext::new();
        assert!(ctx.is_empty());

        ctx.insert("key", "value");
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("key"), Some("value"));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_layered_precedence() {
        let collection = map(&[("host", "collection"), ("only_collection", "c")]);
        let environment = map(&[("host", "environment"), ("token", "env-token")]);
        let run = map(&[("token", "run-token")]);

        let ctx = VariableContext::layered([&collection, &environment, &run]);
        assert_eq!(ctx.get("host"), Some("environment"));
        assert_eq!(ctx.get("token"), Some("run-token"));
        assert_eq!(ctx.get("only_collection"), Some("c"));
    }

    #[test]
    fn test_absorb_drops_unset() {
        let mut ctx = VariableContext::from(map(&[("keep", "1")]));
        let mut diff = EnvDiff::new();
        diff.insert("token".to_string(), EnvChange::Set("abc".to_string()));
        diff.insert("keep".to_string(), EnvChange::Unset);
        diff.insert("empty".to_string(), EnvChange::Set(String::new()));

        ctx.absorb(&diff);
        assert_eq!(ctx.get("token"), Some("abc"));
        assert_eq!(ctx.get("keep"), Some("1"));
        assert_eq!(ctx.get("empty"), Some(""));
    }

    #[test]
    fn test_env_change_wire_format() {
        let mut diff = EnvDiff::new();
        diff.insert("a".to_string(), EnvChange::Set("1".to_string()));
        diff.insert("b".to_string(), EnvChange::Unset);

        let json = serde_json::to_string(&diff).unwrap();
        assert_eq!(json, r#"{"a":"1","b":null}"#);

        let back: EnvDiff = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diff);
    }
}
