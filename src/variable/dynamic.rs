//! 内置动态变量生成器
//!
//! 模板中的 `{{$name}}` / `{{$name:arg1:arg2}}` 会调用这里的生成器，而不是查找变量：
//! - `timestamp` - Unix 时间戳（秒）
//! - `timestampMs` - Unix 时间戳（毫秒）
//! - `isoTimestamp` - UTC ISO 8601，毫秒精度
//! - `uuid` - UUID v4
//! - `randomInt[:min:max]` - 闭区间随机整数，默认 `0:1000`
//! - `randomString[:length]` - 字母数字随机串，默认长度 8
//! - `randomEmail` - 随机邮箱
//! - `randomName` - 随机姓名

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use uuid::Uuid;

const DEFAULT_INT_RANGE: (i64, i64) = (0, 1000);
const DEFAULT_STRING_LENGTH: usize = 8;
/// randomString 的长度上限，超出时截断到此值
const MAX_STRING_LENGTH: usize = 4096;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "John", "Patricia", "Robert", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Susan", "Richard", "Jessica", "Thomas", "Sarah",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Wilson", "Anderson", "Taylor", "Moore", "Lee", "Walker",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

/// 一次动态占位符调用，例如 `randomInt:50:100`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicInvocation<'a> {
    /// 调用的原始文本（去掉 `$` 和两端空白），同时作为缓存 key
    pub raw: &'a str,
    pub name: &'a str,
    pub args: Vec<&'a str>,
}

impl<'a> DynamicInvocation<'a> {
    /// 解析 `$` 之后的文本；名称为空时返回 None
    pub fn parse(raw: &'a str) -> Option<Self> {
        let raw = raw.trim();
        let mut parts = raw.split(':');
        let name = parts.next()?.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            raw,
            name,
            args: parts.map(str::trim).collect(),
        })
    }

    /// 预览中展示的方括号形式：`[name]` 或 `[name:args]`
    pub fn bracketed(&self) -> String {
        format!("[{}]", self.raw)
    }
}

/// 是否为已知的生成器名称
pub fn is_known(name: &str) -> bool {
    matches!(
        name,
        "timestamp"
            | "timestampMs"
            | "isoTimestamp"
            | "uuid"
            | "randomInt"
            | "randomString"
            | "randomEmail"
            | "randomName"
    )
}

/// 生成一个新值；未知生成器返回 None（模板中保持原样）
pub fn generate(name: &str, args: &[&str]) -> Option<String> {
    let value = match name {
        "timestamp" => Utc::now().timestamp().to_string(),
        "timestampMs" => Utc::now().timestamp_millis().to_string(),
        "isoTimestamp" => Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "uuid" => Uuid::new_v4().to_string(),
        "randomInt" => random_int(args).to_string(),
        "randomString" => random_string(args),
        "randomEmail" => random_email(),
        "randomName" => random_name(),
        _ => return None,
    };
    Some(value)
}

fn random_int(args: &[&str]) -> i64 {
    let (mut min, mut max) = match args {
        [min, max, ..] => (
            min.parse().unwrap_or(DEFAULT_INT_RANGE.0),
            max.parse().unwrap_or(DEFAULT_INT_RANGE.1),
        ),
        [min] => (min.parse().unwrap_or(DEFAULT_INT_RANGE.0), DEFAULT_INT_RANGE.1),
        [] => DEFAULT_INT_RANGE,
    };
    if min > max {
        std::mem::swap(&mut min, &mut max);
    }
    rand::rng().random_range(min..=max)
}

fn random_string(args: &[&str]) -> String {
    let length = args
        .first()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_STRING_LENGTH)
        .min(MAX_STRING_LENGTH);
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn pick(options: &[&'static str]) -> &'static str {
    options.choose(&mut rand::rng()).copied().unwrap_or_default()
}

fn random_name() -> String {
    format!("{} {}", pick(FIRST_NAMES), pick(LAST_NAMES))
}

fn random_email() -> String {
    let suffix: u16 = rand::rng().random_range(1..1000);
    format!(
        "{}.{}{}@{}",
        pick(FIRST_NAMES).to_lowercase(),
        pick(LAST_NAMES).to_lowercase(),
        suffix,
        pick(EMAIL_DOMAINS)
    )
}

/// 动态值缓存：同一缓存生命周期内，相同的调用文本总是得到相同的值
#[derive(Debug, Clone, Default)]
pub struct DynamicCache {
    values: HashMap<String, String>,
}

impl DynamicCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 命中缓存则返回已有值，否则生成并记录；未知生成器不写入缓存
    pub fn resolve(&mut self, invocation: &DynamicInvocation<'_>) -> Option<String> {
        if let Some(value) = self.values.get(invocation.raw) {
            return Some(value.clone());
        }
        let value = generate(invocation.name, &invocation.args)?;
        self.values
            .insert(invocation.raw.to_string(), value.clone());
        Some(value)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
