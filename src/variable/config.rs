use crate::error::{ResonanceError, Result};
use crate::variable::types::VariableContext;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// 代理配置
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProxyConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 逗号分隔的直连主机列表
    #[serde(default)]
    pub no_proxy: Option<String>,
}

/// 运行设置
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// 单个请求超时（毫秒），0 表示不限制
    pub request_timeout_ms: u64,
    /// 脚本执行预算（毫秒）
    pub script_timeout_ms: u64,
    /// 请求之间的固定间隔（毫秒）
    pub delay_ms: u64,
    pub stop_on_error: bool,
    pub user_agent: String,
    pub proxy: Option<ProxyConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            script_timeout_ms: 10_000,
            delay_ms: 0,
            stop_on_error: false,
            user_agent: format!("resonance/{}", env!("CARGO_PKG_VERSION")),
            proxy: None,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_millis(self.script_timeout_ms)
    }
}

/// 环境配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnvironmentConfig {
    /// 变量映射
    #[serde(flatten)]
    pub variables: HashMap<String, String>,
}

/// 完整的配置文件
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResonanceConfig {
    #[serde(default)]
    pub settings: Settings,

    /// 所有环境配置
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentConfig>,
}

impl ResonanceConfig {
    /// 获取指定环境的变量
    pub fn get_environment(&self, env_name: &str) -> Option<&EnvironmentConfig> {
        self.environments.get(env_name)
    }
}

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置文件名
    const CONFIG_FILE: &'static str = "resonance.toml";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ResonanceConfig> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ResonanceError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Ok(toml::from_str(&content)?)
    }

    /// 查找并加载配置文件
    /// 查找顺序：
    /// 1. 当前目录
    /// 2. 父目录递归查找
    /// 3. 用户配置目录 ~/.config/resonance/
    pub fn find_and_load() -> Option<ResonanceConfig> {
        Self::try_load_from_current_dir().or_else(Self::try_load_from_user_dir)
    }

    /// 从当前目录向上逐级查找
    fn try_load_from_current_dir() -> Option<ResonanceConfig> {
        let cwd = std::env::current_dir().ok()?;
        let found = cwd
            .ancestors()
            .map(|dir| dir.join(Self::CONFIG_FILE))
            .find(|candidate| candidate.is_file())?;
        Self::load_logged(&found)
    }

    /// ~/.config/resonance/resonance.toml
    fn try_load_from_user_dir() -> Option<ResonanceConfig> {
        let path = dirs::home_dir()?
            .join(".config")
            .join("resonance")
            .join(Self::CONFIG_FILE);
        path.is_file().then(|| Self::load_logged(&path)).flatten()
    }

    fn load_logged(path: &Path) -> Option<ResonanceConfig> {
        match Self::load_from_path(path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                Some(config)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                None
            }
        }
    }

    /// 构建变量上下文
    /// env_name: 环境名称（如 "dev", "prod"）
    /// cli_vars: CLI 传入的变量覆盖（--var key=value）
    pub fn build_context(
        config: &ResonanceConfig,
        env_name: Option<&str>,
        cli_vars: &[(String, String)],
    ) -> VariableContext {
        let mut context = VariableContext::new();

        // 1. 从配置文件加载环境变量
        if let Some(env) = env_name.and_then(|name| config.get_environment(name)) {
            for (key, value) in &env.variables {
                // 解析系统环境变量 ${VAR}
                context.insert(key.clone(), Self::resolve_env_vars(value));
            }
        }

        // 2. 应用 CLI 覆盖（优先级最高）
        for (key, value) in cli_vars {
            context.insert(key.clone(), value.clone());
        }

        context
    }

    /// 解析并替换系统环境变量 ${VAR}
    pub fn resolve_env_vars(text: &str) -> String {
        static ENV_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = ENV_REGEX.get_or_init(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

        re.replace_all(text, |caps: &Captures| {
            let env_name = &caps[1];
            std::env::var(env_name).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
    }

    /// 解析 CLI 变量参数 "key=value"
    pub fn parse_cli_var(s: &str) -> Option<(String, String)> {
        s.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
    }
}
