/// 认证模块 - header 注入式认证与 Digest 握手
pub mod digest;
pub mod types;

pub use digest::{
    DigestChallenge, DigestParams, build_authorization_header, handle_digest_auth,
    parse_digest_challenge,
};
pub use types::{ApiKeyLocation, AuthConfig, AuthContribution, DigestCredentials};
