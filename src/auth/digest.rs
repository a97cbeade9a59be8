//! HTTP Digest 认证（RFC 2617，兼容 RFC 7616 的 SHA-256）
//!
//! 握手流程：先不带认证发送一次；若返回 401 且带有可解析的 Digest challenge，
//! 计算一次 Authorization 再发送一次，第二次的结果即最终结果。
//! 其他任何失败都原样返回，且只尝试一次。

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::auth::types::DigestCredentials;
use crate::http::{DispatchRequest, DispatchResponse, Transport, TransportError};
use crate::{ResonanceError, Result};

/// 从 WWW-Authenticate header 解析出的 challenge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    pub algorithm: Option<String>,
    /// 扫描到的全部参数（key 小写）
    pub params: IndexMap<String, String>,
}

impl DigestChallenge {
    /// 不包含 "Digest" 标记时返回 None；否则一次扫描提取所有 `key="value"` / `key=value`，
    /// 不做进一步的 RFC 校验
    pub fn parse(header: &str) -> Option<Self> {
        if !header.contains("Digest") {
            return None;
        }

        static PARAM_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = PARAM_REGEX
            .get_or_init(|| Regex::new(r#"([A-Za-z0-9_-]+)=(?:"([^"]*)"|([^\s,"]+))"#).unwrap());

        let mut params = IndexMap::new();
        for cap in re.captures_iter(header) {
            let key = cap[1].to_ascii_lowercase();
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            params.insert(key, value);
        }

        Some(Self {
            realm: params.get("realm").cloned().unwrap_or_default(),
            nonce: params.get("nonce").cloned().unwrap_or_default(),
            opaque: params.get("opaque").cloned(),
            qop: params.get("qop").cloned(),
            algorithm: params.get("algorithm").cloned(),
            params,
        })
    }

    /// 从 qop 列表中选出使用的值：优先 auth，其次 auth-int
    fn selected_qop(&self) -> Option<&'static str> {
        let offered: Vec<&str> = self
            .qop
            .as_deref()?
            .split(',')
            .map(str::trim)
            .collect();
        if offered.iter().any(|q| q.eq_ignore_ascii_case("auth")) {
            Some("auth")
        } else if offered.iter().any(|q| q.eq_ignore_ascii_case("auth-int")) {
            Some("auth-int")
        } else {
            None
        }
    }
}

/// `parse_digest_challenge` 的函数形式
pub fn parse_digest_challenge(header: &str) -> Option<DigestChallenge> {
    DigestChallenge::parse(header)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestAlgorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl DigestAlgorithm {
    fn from_challenge(algorithm: Option<&str>) -> Result<Self> {
        let Some(name) = algorithm else {
            return Ok(DigestAlgorithm::Md5);
        };
        match name.trim().to_ascii_uppercase().as_str() {
            "MD5" => Ok(DigestAlgorithm::Md5),
            "MD5-SESS" => Ok(DigestAlgorithm::Md5Sess),
            "SHA-256" => Ok(DigestAlgorithm::Sha256),
            "SHA-256-SESS" => Ok(DigestAlgorithm::Sha256Sess),
            _ => Err(ResonanceError::UnsupportedAlgorithm(name.to_string())),
        }
    }

    fn is_session(self) -> bool {
        matches!(self, DigestAlgorithm::Md5Sess | DigestAlgorithm::Sha256Sess)
    }

    fn hash(self, data: &str) -> String {
        match self {
            DigestAlgorithm::Md5 | DigestAlgorithm::Md5Sess => {
                hex::encode(md5::compute(data.as_bytes()).0)
            }
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha256Sess => {
                hex::encode(Sha256::digest(data.as_bytes()))
            }
        }
    }
}

/// 构造 Authorization header 所需的参数
#[derive(Debug, Clone)]
pub struct DigestParams<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub method: &'a str,
    pub uri: &'a str,
    pub challenge: &'a DigestChallenge,
    /// nonce count，输出为 8 位十六进制
    pub nc: u32,
    /// 未提供时随机生成
    pub cnonce: Option<&'a str>,
}

impl<'a> DigestParams<'a> {
    pub fn new(
        credentials: &'a DigestCredentials,
        method: &'a str,
        uri: &'a str,
        challenge: &'a DigestChallenge,
    ) -> Self {
        Self {
            username: &credentials.username,
            password: &credentials.password,
            method,
            uri,
            challenge,
            nc: 1,
            cnonce: None,
        }
    }
}

fn generate_cnonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 计算 Digest Authorization header 的值
///
/// 字段顺序固定：username, realm, nonce, uri, response，
/// 然后 algorithm（若有）、opaque（若有）、qop/nc/cnonce（若有 qop）。
pub fn build_authorization_header(params: &DigestParams<'_>) -> Result<String> {
    let challenge = params.challenge;
    let algorithm = DigestAlgorithm::from_challenge(challenge.algorithm.as_deref())?;
    let cnonce = params
        .cnonce
        .map(str::to_string)
        .unwrap_or_else(generate_cnonce);
    let nc = format!("{:08x}", params.nc);
    let qop = challenge.selected_qop();

    let mut ha1 = algorithm.hash(&format!(
        "{}:{}:{}",
        params.username, challenge.realm, params.password
    ));
    if algorithm.is_session() {
        ha1 = algorithm.hash(&format!("{}:{}:{}", ha1, challenge.nonce, cnonce));
    }

    let ha2 = algorithm.hash(&format!("{}:{}", params.method, params.uri));

    let response = match qop {
        Some(qop) => algorithm.hash(&format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, challenge.nonce, nc, cnonce, qop, ha2
        )),
        None => algorithm.hash(&format!("{}:{}:{}", ha1, challenge.nonce, ha2)),
    };

    let mut header = format!(
        r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}""#,
        params.username, challenge.realm, challenge.nonce, params.uri, response
    );

    if let Some(algorithm) = &challenge.algorithm {
        header.push_str(&format!(", algorithm={}", algorithm));
    }

    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(r#", opaque="{}""#, opaque));
    }

    if let Some(qop) = qop {
        header.push_str(&format!(r#", qop={}, nc={}, cnonce="{}""#, qop, nc, cnonce));
    }

    Ok(header)
}

/// 两阶段 Digest 握手
pub async fn handle_digest_auth(
    transport: &dyn Transport,
    request: &DispatchRequest,
    credentials: &DigestCredentials,
) -> std::result::Result<DispatchResponse, TransportError> {
    let err = match transport.dispatch(request).await {
        Ok(response) => return Ok(response),
        Err(err) => err,
    };

    if err.status != Some(401) {
        return Err(err);
    }

    let Some(challenge) = err.header("www-authenticate").and_then(DigestChallenge::parse) else {
        tracing::debug!(url = %request.url, "401 without a Digest challenge");
        return Err(err);
    };

    let uri = request.request_uri();
    let params = DigestParams::new(credentials, request.method.as_str(), &uri, &challenge);
    let authorization = match build_authorization_header(&params) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(url = %request.url, error = %e, "Cannot answer Digest challenge");
            return Err(err);
        }
    };

    tracing::debug!(url = %request.url, realm = %challenge.realm, "Retrying with Digest authorization");
    let mut retry = request.clone();
    retry.set_authorization(authorization);
    transport.dispatch(&retry).await
}
