use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::http::{Headers, set_header};
use crate::variable::{VariableContext, VariableProcessor};

/// API Key 放置的位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

fn default_token_prefix() -> String {
    "Bearer".to_string()
}

/// 端点的认证配置，所有字段都可以包含模板
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    ApiKey {
        key: String,
        value: String,
        #[serde(default)]
        location: ApiKeyLocation,
    },
    Oauth2 {
        access_token: String,
        #[serde(default = "default_token_prefix")]
        token_prefix: String,
    },
    Digest {
        username: String,
        password: String,
    },
}

/// Digest 凭据，交给传输层完成两阶段握手
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub password: String,
}

/// 认证对请求的贡献
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContribution {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub digest: Option<DigestCredentials>,
}

impl AuthContribution {
    /// 把 header 贡献写入请求 header（覆盖同名项）
    pub fn apply_headers(&self, headers: &mut Headers) {
        for (name, value) in &self.headers {
            set_header(headers, name, value.clone());
        }
    }
}

impl AuthConfig {
    pub fn is_none(&self) -> bool {
        matches!(self, AuthConfig::None)
    }

    /// 先解析字段中的模板，返回新的配置
    pub fn resolve(&self, processor: &mut VariableProcessor, variables: &VariableContext) -> Self {
        let mut render = |s: &String| processor.process_template(s, variables);
        match self {
            AuthConfig::None => AuthConfig::None,
            AuthConfig::Bearer { token } => AuthConfig::Bearer {
                token: render(token),
            },
            AuthConfig::Basic { username, password } => AuthConfig::Basic {
                username: render(username),
                password: render(password),
            },
            AuthConfig::ApiKey {
                key,
                value,
                location,
            } => AuthConfig::ApiKey {
                key: render(key),
                value: render(value),
                location: *location,
            },
            AuthConfig::Oauth2 {
                access_token,
                token_prefix,
            } => AuthConfig::Oauth2 {
                access_token: render(access_token),
                token_prefix: token_prefix.clone(),
            },
            AuthConfig::Digest { username, password } => AuthConfig::Digest {
                username: render(username),
                password: render(password),
            },
        }
    }

    /// 计算认证对请求的贡献；Digest 不产生 header，而是把凭据交给传输层
    pub fn contribution(&self) -> AuthContribution {
        let mut contribution = AuthContribution::default();
        match self {
            AuthConfig::None => {}
            AuthConfig::Bearer { token } => {
                if !token.is_empty() {
                    contribution
                        .headers
                        .push(("Authorization".to_string(), format!("Bearer {}", token)));
                }
            }
            AuthConfig::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{}:{}", username, password));
                contribution
                    .headers
                    .push(("Authorization".to_string(), format!("Basic {}", encoded)));
            }
            AuthConfig::ApiKey {
                key,
                value,
                location,
            } => {
                if !key.is_empty() {
                    let pair = (key.clone(), value.clone());
                    match location {
                        ApiKeyLocation::Header => contribution.headers.push(pair),
                        ApiKeyLocation::Query => contribution.query.push(pair),
                    }
                }
            }
            AuthConfig::Oauth2 {
                access_token,
                token_prefix,
            } => {
                if !access_token.is_empty() {
                    let value = if token_prefix.is_empty() {
                        access_token.clone()
                    } else {
                        format!("{} {}", token_prefix, access_token)
                    };
                    contribution
                        .headers
                        .push(("Authorization".to_string(), value));
                }
            }
            AuthConfig::Digest { username, password } => {
                contribution.digest = Some(DigestCredentials {
                    username: username.clone(),
                    password: password.clone(),
                });
            }
        }
        contribution
    }
}
