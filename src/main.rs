use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use static_page::config::{Cli, Command, ExportSettings, JobConfig, ReplaceArgs};
use static_page::content_store::JsonContentStore;
use static_page::discovery::{include_assets_matching, Discovery};
use static_page::job::{JobRunner, JobState};
use static_page::orchestrator::Exporter;
use static_page::progress::{FileProgressStore, ProgressTracker};
use static_page::stats::{format_duration, print_export_stats, ExportStats};
use static_page::transformer::ContentTransformer;
use static_page::utils::{absolute_path, init_logging, resolve_page_url};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    init_logging(cli.verbose, cli.quiet);

    let total_start = Instant::now();

    match run(&cli).await {
        Ok(stats) => {
            let total_duration = total_start.elapsed();

            if !cli.quiet {
                info!("✅ 完成！总耗时: {}", format_duration(total_duration));
            }

            if cli.stats {
                print_export_stats(&stats, total_duration);
            }
        }
        Err(e) => {
            error!("❌ 执行失败: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// 执行子命令
async fn run(cli: &Cli) -> Result<ExportStats> {
    let store = load_store(cli)?;
    let settings = build_settings(cli, &store)?;
    let store = Arc::new(store);
    let mut stats = ExportStats::default();

    match &cli.command {
        Command::Urls { job } => {
            let exporter = Exporter::from_settings(&settings, store)?;
            for url in exporter.discover_urls(&job.job_config()) {
                println!("{}", url);
            }
        }

        Command::Assets { job, include } => {
            let source_root = require_assets_root(&settings)?;
            let discovery = asset_discovery(include.as_deref())?;
            for asset in discovery.discover_assets(source_root, &job.job_config())? {
                println!("{}", asset.display());
            }
        }

        Command::Output { job, replace, url } => {
            let config = job.job_config();
            let exporter = build_exporter(&settings, store, Some(replace), None)?;
            let urls = target_urls(&exporter, &settings, url.as_deref(), &config)?;

            for url in urls {
                match exporter.render(&url, &config).await {
                    Ok(content) => println!("{}", content),
                    Err(e) => warn!("⚠️  跳过 {}: {}", url, e),
                }
            }
        }

        Command::Save {
            job,
            replace,
            path,
            page_url,
            concurrency,
        } => {
            let config = job.job_config();
            let exporter = build_exporter(&settings, store, Some(replace), path.as_deref())?;

            let discovery_start = Instant::now();
            let urls = target_urls(&exporter, &settings, page_url.as_deref(), &config)?;
            stats.discovery_time = discovery_start.elapsed();
            stats.urls_discovered = urls.len();

            info!("📂 目标目录: {}", exporter.persister().mapper().resolve_root(&config).display());
            let report = if *concurrency > 1 {
                exporter.run_concurrent(&urls, &config, *concurrency).await?
            } else {
                exporter.run_one_shot(&urls, &config, 1).await
            };

            for failure in &report.failed {
                warn!("❌ {}: {}", failure.url, failure.error);
            }
            stats.record_pages(&report);
        }

        Command::SaveAssets { job, path, include } => {
            let config = job.job_config();
            let source_root = require_assets_root(&settings)?;
            let exporter = build_exporter(&settings, store, None, path.as_deref())?
                .with_discovery(asset_discovery(include.as_deref())?);

            let report = exporter.copy_assets(source_root, &config).await?;
            stats.record_assets(&report);
        }

        Command::Export {
            job,
            replace,
            chunk_size,
            debounce,
        } => {
            let settings = settings
                .clone()
                .with_chunk_size(*chunk_size)
                .with_debounce(Duration::from_secs(*debounce));
            let runner = build_runner(&settings, store, replace)?;

            if !runner.trigger(job.job_config()).await? {
                warn!("⚠️  已有未完成的导出任务，请使用 resume 继续");
                return Ok(stats);
            }
            runner.wait_idle().await;
            report_job_state(&runner).await?;
        }

        Command::Resume { replace, chunk_size } => {
            let settings = settings.clone().with_chunk_size(*chunk_size);
            let runner = build_runner(&settings, store, replace)?;

            if runner.recover_stale(Utc::now()).await? == 0 && runner.resume().await? == 0 {
                info!("没有需要恢复的导出任务");
            }
            runner.wait_idle().await;
            report_job_state(&runner).await?;
        }

        Command::Status => {
            let tracker = progress_tracker(&settings);
            match tracker.load().await? {
                None => println!("没有进行中的导出任务"),
                Some(record) => {
                    println!("开始时间: {}", record.started_at.to_rfc3339());
                    println!("最后更新: {}", record.updated_at.to_rfc3339());
                    println!("任务配置: {}", record.config.token().unwrap_or("-"));
                    println!("完成进度: {}/{}", record.done_urls.len(), record.urls.len());
                    if record.is_stale(Utc::now(), settings.stale_after()) {
                        println!("⚠️  任务已停滞，可使用 resume 重新调度");
                    }
                }
            }
        }

        Command::Remove { job, url } => {
            let config = job.job_config();
            let url = resolve_page_url(url, settings.site_url())?;
            let runner = build_runner(&settings, store, &ReplaceArgs::default())?;
            if runner.on_content_removed(&url, &config).await? {
                info!("🗑️  已删除 {}", url);
            }
        }
    }

    Ok(stats)
}

/// 加载站点清单
fn load_store(cli: &Cli) -> Result<JsonContentStore> {
    let store = JsonContentStore::load(&cli.site)
        .with_context(|| format!("加载站点清单失败: {}", cli.site.display()))?;

    Ok(match &cli.site_url {
        Some(site_url) => store.with_site_url(site_url),
        None => store,
    })
}

/// 根据命令行参数创建导出设置
fn build_settings(cli: &Cli, store: &JsonContentStore) -> Result<ExportSettings> {
    let mut settings = ExportSettings::new(&store.manifest().site_url)?
        .with_state_dir(&cli.state_dir)
        .with_relative_urls(cli.relative_urls)
        .with_request_timeout(Duration::from_secs(cli.timeout));

    if let Some(destination) = &cli.destination {
        settings = settings.with_destination_root(absolute_path(destination)?);
    }
    if let Some(assets_root) = &cli.assets_root {
        settings = settings.with_asset_source_root(absolute_path(assets_root)?);
    }
    if let Some(user_agent) = &cli.user_agent {
        settings = settings.with_user_agent(user_agent);
    }

    Ok(settings)
}

/// 组装导出器，按需追加替换阶段和目标目录覆盖
fn build_exporter(
    settings: &ExportSettings,
    store: Arc<JsonContentStore>,
    replace: Option<&ReplaceArgs>,
    destination: Option<&Path>,
) -> Result<Exporter> {
    let mut exporter = Exporter::from_settings(settings, store)?;

    if let Some(replace) = replace {
        let mut transformer = ContentTransformer::new();
        if let Some(from) = &replace.replace_from {
            transformer = transformer.with_literal_replace(from, &replace.replace_to);
        }
        if settings.relative_urls() {
            transformer = transformer.with_relative_urls(settings.site_url().clone());
        }
        exporter = exporter.with_transformer(transformer);
    }

    if let Some(path) = destination {
        let mapper = exporter
            .persister()
            .mapper()
            .clone()
            .override_root(absolute_path(path)?);
        let persister = exporter.persister().clone().with_mapper(mapper);
        exporter = exporter.with_persister(persister);
    }

    Ok(exporter)
}

fn progress_tracker(settings: &ExportSettings) -> ProgressTracker {
    ProgressTracker::new(Arc::new(FileProgressStore::new(settings.state_dir())))
}

fn build_runner(settings: &ExportSettings, store: Arc<JsonContentStore>, replace: &ReplaceArgs) -> Result<JobRunner> {
    let exporter = build_exporter(settings, store, Some(replace), None)?;
    Ok(JobRunner::from_settings(settings, exporter, progress_tracker(settings)))
}

/// 单页模式或全站发现
fn target_urls(
    exporter: &Exporter,
    settings: &ExportSettings,
    page_url: Option<&str>,
    config: &JobConfig,
) -> Result<Vec<String>> {
    match page_url {
        Some(url) => Ok(vec![resolve_page_url(url, settings.site_url())?]),
        None => Ok(exporter.discover_urls(config)),
    }
}

fn require_assets_root(settings: &ExportSettings) -> Result<&Path> {
    settings
        .asset_source_root()
        .map(|root| root.as_path())
        .context("未配置静态资源目录，请使用 --assets-root 指定")
}

fn asset_discovery(include: Option<&str>) -> Result<Discovery> {
    let discovery = Discovery::new();
    Ok(match include {
        Some(pattern) => discovery.with_asset_stage(include_assets_matching(pattern)?),
        None => discovery,
    })
}

async fn report_job_state(runner: &JobRunner) -> Result<()> {
    match runner.state().await? {
        JobState::Completed => info!("✅ 导出任务已完成"),
        JobState::Running => {
            if let Some(record) = runner.progress().await? {
                warn!(
                    "⚠️  导出任务未完成: {}/{}，失败的URL可使用 resume 重试",
                    record.done_urls.len(),
                    record.urls.len()
                );
            }
        }
        state => info!("任务状态: {:?}", state),
    }
    Ok(())
}
