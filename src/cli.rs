use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use resonance::http::HttpTransport;
use resonance::runner::{ProgressCallback, RequestResult, RunnerService, TestReporter};
use resonance::store::StoreFile;
use resonance::variable::{ConfigLoader, ResonanceConfig, VariableProcessor};

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 配置文件路径（默认自动查找 resonance.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 输出 debug 日志与响应详情
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 按顺序执行存储文件中的 runner
    Run(RunArgs),
    /// 预览模板的解析结果
    Preview(PreviewArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// JSON 存储文件
    pub store: PathBuf,

    /// runner id
    pub runner_id: String,

    /// 环境名称（存储中的 environment id，或配置文件中的 [environments.NAME]）
    #[arg(short, long)]
    pub env: Option<String>,

    /// 变量覆盖 key=value，可重复
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// 任一请求失败后跳过剩余请求
    #[arg(long)]
    pub stop_on_error: bool,

    /// 请求之间的间隔（毫秒）
    #[arg(long, value_name = "MS")]
    pub delay: Option<u64>,
}

#[derive(Args)]
pub struct PreviewArgs {
    /// 要预览的模板
    pub template: String,

    /// 配置文件中的环境名称
    #[arg(short, long)]
    pub env: Option<String>,

    /// 变量 key=value，可重复
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,
}

fn load_config(path: Option<&PathBuf>) -> Result<ResonanceConfig> {
    match path {
        Some(path) => ConfigLoader::load_from_path(path)
            .with_context(|| format!("加载配置 {} 失败", path.display())),
        None => Ok(ConfigLoader::find_and_load().unwrap_or_default()),
    }
}

fn parse_vars(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|s| {
            ConfigLoader::parse_cli_var(s).ok_or_else(|| anyhow!("无效的变量参数 '{}'，应为 key=value", s))
        })
        .collect()
}

/// 执行 runner，返回是否全部成功
pub async fn run(args: RunArgs, config: Option<&PathBuf>, verbose: bool) -> Result<bool> {
    let config = load_config(config)?;
    let settings = config.settings.clone();
    let cli_vars = parse_vars(&args.vars)?;

    let stores = StoreFile::load(&args.store)?.into_stores();
    let mut definition = stores
        .runners
        .get(&args.runner_id)
        .await?
        .ok_or_else(|| anyhow!("未找到 runner: {}", args.runner_id))?;

    if let Some(env) = &args.env {
        let in_store = stores.environments.get(env).await?.is_some();
        let in_config = config.get_environment(env).is_some();
        if !in_store && !in_config {
            return Err(anyhow!("未找到环境: {}", env));
        }
        if in_store {
            definition.environment_id = Some(env.clone());
        }
    }

    // 配置文件环境与 --var 作为 run 层初始变量
    let overrides = ConfigLoader::build_context(&config, args.env.as_deref(), &cli_vars);
    definition.options.variables.extend(overrides.into_map());
    definition.options.stop_on_error |= args.stop_on_error || settings.stop_on_error;
    if let Some(delay) = args.delay {
        definition.options.delay_ms = delay;
    } else if definition.options.delay_ms == 0 {
        definition.options.delay_ms = settings.delay_ms;
    }

    let transport = HttpTransport::new(settings.user_agent.clone())?;
    let service = Arc::new(RunnerService::new(stores, Arc::new(transport)).with_settings(&settings));

    let reporter = TestReporter::new(verbose);
    reporter.print_header(&definition.name, definition.requests.len());

    let progress_reporter = TestReporter::new(verbose);
    let progress: ProgressCallback = Box::new(move |_: usize, _: usize, result: &RequestResult| {
        progress_reporter.print_result(result)
    });

    // Ctrl-C 只请求停止，正在进行的请求会完成
    let stopper = service.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Stopping after the current request...".yellow());
            stopper.stop_execution();
        }
    });

    let outcome = service.execute_runner_data(definition, Some(progress)).await;
    ctrl_c.abort();

    let record = outcome?;
    reporter.print_summary(&record);
    Ok(!record.has_errors())
}

/// 打印模板预览
pub fn preview(args: PreviewArgs, config: Option<&PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let cli_vars = parse_vars(&args.vars)?;
    let context = ConfigLoader::build_context(&config, args.env.as_deref(), &cli_vars);

    let preview = VariableProcessor::new().get_preview(&args.template, &context);

    println!("{}", preview.preview.bold());
    if !preview.found_variables.is_empty() {
        println!("  {}: {}", "Found".green(), preview.found_variables.join(", "));
    }
    if !preview.missing_variables.is_empty() {
        println!("  {}: {}", "Missing".red(), preview.missing_variables.join(", "));
    }
    if !preview.dynamic_variables.is_empty() {
        println!("  {}: {}", "Dynamic".cyan(), preview.dynamic_variables.join(", "));
    }
    Ok(())
}
