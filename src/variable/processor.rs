use crate::variable::dynamic::{DynamicCache, DynamicInvocation};
use crate::variable::types::VariableContext;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER_REGEX.get_or_init(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").unwrap())
}

fn name_regex() -> &'static Regex {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    NAME_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// 占位符的两种形态
enum Placeholder<'a> {
    /// `{{ name }}` 普通变量查找
    Variable(&'a str),
    /// `{{$generator:args}}` 动态生成
    Dynamic(DynamicInvocation<'a>),
    /// `{{}}` / `{{$}}` 之类，原样保留
    Blank,
}

impl<'a> Placeholder<'a> {
    fn classify(inner: &'a str) -> Self {
        let inner = inner.trim();
        if let Some(rest) = inner.strip_prefix('$') {
            return DynamicInvocation::parse(rest)
                .map(Placeholder::Dynamic)
                .unwrap_or(Placeholder::Blank);
        }
        if inner.is_empty() {
            Placeholder::Blank
        } else {
            Placeholder::Variable(inner)
        }
    }
}

/// 模板预览结果（不产生任何动态值）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePreview {
    pub preview: String,
    pub found_variables: Vec<String>,
    pub missing_variables: Vec<String>,
    pub dynamic_variables: Vec<String>,
}

/// 模板替换引擎
///
/// 持有动态值缓存：同一缓存周期内重复出现的 `{{$uuid}}` 得到同一个值，
/// 调用方在相互独立的请求之间显式调用 [`VariableProcessor::clear_dynamic_cache`]。
#[derive(Debug, Default)]
pub struct VariableProcessor {
    cache: DynamicCache,
}

impl VariableProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换字符串中的所有占位符；未解析的变量和未知生成器保持原样
    pub fn process_template(&mut self, template: &str, variables: &VariableContext) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        let cache = &mut self.cache;
        placeholder_regex()
            .replace_all(template, |caps: &Captures| {
                let resolved = match Placeholder::classify(&caps[1]) {
                    Placeholder::Variable(name) => variables.get(name).map(str::to_string),
                    Placeholder::Dynamic(invocation) => cache.resolve(&invocation),
                    Placeholder::Blank => None,
                };
                resolved.unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// 递归替换嵌套结构中的每个字符串（包括对象的 key），其他标量不变
    pub fn process_object(&mut self, value: &Value, variables: &VariableContext) -> Value {
        match value {
            Value::String(s) => Value::String(self.process_template(s, variables)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.process_object(item, variables))
                    .collect(),
            ),
            Value::Object(object) => {
                let mut processed = Map::with_capacity(object.len());
                for (key, item) in object {
                    let key = self.process_template(key, variables);
                    let item = self.process_object(item, variables);
                    processed.insert(key, item);
                }
                Value::Object(processed)
            }
            other => other.clone(),
        }
    }

    /// 提取普通占位符的变量名，按首次出现顺序去重；动态占位符不计入
    pub fn extract_variable_names(template: &str) -> Vec<String> {
        let mut names = Vec::new();
        Self::collect_names(template, &mut names);
        names
    }

    /// [`Self::extract_variable_names`] 的递归版本
    pub fn extract_variable_names_from_object(value: &Value) -> Vec<String> {
        let mut names = Vec::new();
        Self::collect_names_from_value(value, &mut names);
        names
    }

    fn collect_names(template: &str, names: &mut Vec<String>) {
        for caps in placeholder_regex().captures_iter(template) {
            if let Placeholder::Variable(name) = Placeholder::classify(&caps[1])
                && !names.iter().any(|n| n == name)
            {
                names.push(name.to_string());
            }
        }
    }

    fn collect_names_from_value(value: &Value, names: &mut Vec<String>) {
        match value {
            Value::String(s) => Self::collect_names(s, names),
            Value::Array(items) => {
                for item in items {
                    Self::collect_names_from_value(item, names);
                }
            }
            Value::Object(object) => {
                for (key, item) in object {
                    Self::collect_names(key, names);
                    Self::collect_names_from_value(item, names);
                }
            }
            _ => {}
        }
    }

    /// 变量名是否合法：`^[A-Za-z_][A-Za-z0-9_]*$`
    pub fn is_valid_variable_name(name: &str) -> bool {
        name_regex().is_match(name)
    }

    /// 生成预览，不调用生成器也不修改缓存
    pub fn get_preview(&self, template: &str, variables: &VariableContext) -> TemplatePreview {
        let mut found_variables: Vec<String> = Vec::new();
        let mut missing_variables: Vec<String> = Vec::new();
        let mut dynamic_variables: Vec<String> = Vec::new();

        fn remember(list: &mut Vec<String>, item: &str) {
            if !list.iter().any(|existing| existing == item) {
                list.push(item.to_string());
            }
        }

        let preview = placeholder_regex()
            .replace_all(template, |caps: &Captures| match Placeholder::classify(&caps[1]) {
                Placeholder::Variable(name) => match variables.get(name) {
                    Some(value) => {
                        remember(&mut found_variables, name);
                        value.to_string()
                    }
                    None => {
                        remember(&mut missing_variables, name);
                        caps[0].to_string()
                    }
                },
                Placeholder::Dynamic(invocation) => {
                    remember(&mut dynamic_variables, invocation.raw);
                    invocation.bracketed()
                }
                Placeholder::Blank => caps[0].to_string(),
            })
            .into_owned();

        TemplatePreview {
            preview,
            found_variables,
            missing_variables,
            dynamic_variables,
        }
    }

    /// 清空动态值缓存
    pub fn clear_dynamic_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cached_dynamic_values(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, &str)]) -> VariableContext {
        let mut ctx = VariableContext::new();
        for (k, v) in pairs {
            ctx.insert(*k, *v);
        }
        ctx
    }

    #[test]
    fn test_substitute_simple() {
        let mut processor = VariableProcessor::new();
        let vars = ctx(&[("base_url", "http://localhost:8080"), ("token", "secret")]);

        let output = processor.process_template("{{base_url}}/api/users?t={{ token }}", &vars);
        assert_eq!(output, "http://localhost:8080/api/users?t=secret");
    }

    #[test]
    fn test_missing_variable_left_verbatim() {
        let mut processor = VariableProcessor::new();
        let output = processor.process_template("{{ missing }}/path/{{}}", &VariableContext::new());
        assert_eq!(output, "{{ missing }}/path/{{}}");
    }

    #[test]
    fn test_unknown_generator_left_verbatim() {
        let mut processor = VariableProcessor::new();
        let output = processor.process_template("id={{$nope:1}}", &VariableContext::new());
        assert_eq!(output, "id={{$nope:1}}");
    }

    #[test]
    fn test_dynamic_values_memoized_until_cleared() {
        let mut processor = VariableProcessor::new();
        let vars = VariableContext::new();

        let output = processor.process_template("{{$uuid}}-{{ $uuid }}", &vars);
        let (a, b) = output.split_at(36);
        assert_eq!(a, &b[1..]);
        assert!(uuid::Uuid::parse_str(a).is_ok());

        let again = processor.process_template("{{$uuid}}", &vars);
        assert_eq!(again, a);

        processor.clear_dynamic_cache();
        let fresh = processor.process_template("{{$uuid}}", &vars);
        assert_ne!(fresh, a);
    }

    #[test]
    fn test_random_int_bounds() {
        let mut processor = VariableProcessor::new();
        for _ in 0..100 {
            processor.clear_dynamic_cache();
            let n: i64 = processor
                .process_template("{{$randomInt:50:100}}", &VariableContext::new())
                .parse()
                .unwrap();
            assert!((50..=100).contains(&n));
        }
    }

    #[test]
    fn test_dynamic_name_never_looked_up() {
        let mut processor = VariableProcessor::new();
        let vars = ctx(&[("$uuid", "not-used"), ("uuid", "not-used")]);
        let output = processor.process_template("{{$uuid}}", &vars);
        assert_ne!(output, "not-used");
        assert_eq!(output.len(), 36);
    }

    #[test]
    fn test_process_object() {
        let mut processor = VariableProcessor::new();
        let vars = ctx(&[("key", "name"), ("value", "Alice")]);
        let body = json!({
            "{{key}}": "{{value}}",
            "nested": [{"v": "{{value}}"}, 42, true, null],
            "count": 3
        });

        let processed = processor.process_object(&body, &vars);
        assert_eq!(
            processed,
            json!({
                "name": "Alice",
                "nested": [{"v": "Alice"}, 42, true, null],
                "count": 3
            })
        );
    }

    #[test]
    fn test_extract_variable_names() {
        assert_eq!(
            VariableProcessor::extract_variable_names("{{a}} {{a}} {{b}}"),
            vec!["a", "b"]
        );
        assert_eq!(
            VariableProcessor::extract_variable_names("{{ $uuid }} {{ host }}/{{$randomInt:1:2}}"),
            vec!["host"]
        );
    }

    #[test]
    fn test_extract_from_object() {
        let value = json!({"{{k}}": ["{{a}}", {"x": "{{b}} {{a}}"}], "n": 1});
        assert_eq!(
            VariableProcessor::extract_variable_names_from_object(&value),
            vec!["k", "a", "b"]
        );
    }

    #[test]
    fn test_is_valid_variable_name() {
        assert!(VariableProcessor::is_valid_variable_name("token"));
        assert!(VariableProcessor::is_valid_variable_name("_user_1"));
        assert!(!VariableProcessor::is_valid_variable_name("1abc"));
        assert!(!VariableProcessor::is_valid_variable_name("user.id"));
        assert!(!VariableProcessor::is_valid_variable_name(""));
    }

    #[test]
    fn test_preview() {
        let processor = VariableProcessor::new();
        let vars = ctx(&[("host", "example.com")]);
        let preview = processor.get_preview(
            "https://{{host}}/{{id}}?r={{$randomInt:1:5}}&u={{$uuid}}&h={{ host }}",
            &vars,
        );

        assert_eq!(
            preview.preview,
            "https://example.com/{{id}}?r=[randomInt:1:5]&u=[uuid]&h=example.com"
        );
        assert_eq!(preview.found_variables, vec!["host"]);
        assert_eq!(preview.missing_variables, vec!["id"]);
        assert_eq!(preview.dynamic_variables, vec!["randomInt:1:5", "uuid"]);
        assert_eq!(processor.cached_dynamic_values(), 0);
    }
}
