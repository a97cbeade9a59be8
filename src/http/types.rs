use std::fmt;
use std::str::FromStr;

use crate::{ResonanceError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl FromStr for Method {
    type Err = ResonanceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(ResonanceError::Other(format!("Invalid HTTP method: {}", s))),
        }
    }
}

impl Method {
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 有序的 header 表；查找时忽略大小写
pub type Headers = IndexMap<String, String>;

/// 按名称（忽略大小写）查找 header
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// 设置 header，已存在的同名（忽略大小写）条目会被替换
pub fn set_header(headers: &mut Headers, name: &str, value: impl Into<String>) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.into());
}

/// 把 reqwest 的 HeaderMap 转为有序表，重复的 set-cookie 以换行拼接，其余以逗号拼接
pub(crate) fn collect_headers(map: &reqwest::header::HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        let separator = if name == reqwest::header::SET_COOKIE {
            "\n"
        } else {
            ", "
        };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(separator);
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("get").unwrap(), Method::Get);
        assert_eq!(" PATCH ".parse::<Method>().unwrap(), Method::Patch);
        assert!(Method::parse("BREW").is_err());
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_method_serde() {
        assert_eq!(serde_json::to_string(&Method::Post).unwrap(), r#""POST""#);
        let m: Method = serde_json::from_str(r#""OPTIONS""#).unwrap();
        assert_eq!(m, Method::Options);
    }

    #[test]
    fn test_header_helpers() {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "text/plain".to_string());
        assert_eq!(header_value(&headers, "content-type"), Some("text/plain"));

        set_header(&mut headers, "content-type", "application/json");
        assert_eq!(headers.len(), 1);
        assert_eq!(header_value(&headers, "CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_collect_headers_joins_duplicates() {
        let mut map = reqwest::header::HeaderMap::new();
        map.append("set-cookie", "a=1".parse().unwrap());
        map.append("set-cookie", "b=2".parse().unwrap());
        map.append("vary", "Accept".parse().unwrap());
        map.append("vary", "Origin".parse().unwrap());

        let headers = collect_headers(&map);
        assert_eq!(headers["set-cookie"], "a=1\nb=2");
        assert_eq!(headers["vary"], "Accept, Origin");
    }
}
