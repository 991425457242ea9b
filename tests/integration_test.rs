use std::path::Path;

use dou_batch::browser::{BrowserOptions, ChromiumLauncher};
use dou_batch::config::Config;
use dou_batch::infrastructure::{BrowserLauncher, BrowserSession};
use dou_batch::models::job::Job;
use dou_batch::orchestrator::expander::resolve_date;
use dou_batch::orchestrator::{list_options, run_single, WorkerSettings};
use dou_batch::utils::init_tracing;

#[tokio::test]
#[ignore] // 默认忽略，需要本机 Chromium 和网络：cargo test -- --ignored
async fn test_list_first_level_on_live_portal() {
    init_tracing(None).unwrap();

    let config = Config::from_env().expect("读取配置失败");
    let launcher = ChromiumLauncher::new(BrowserOptions::from_config(&config));
    let session = launcher.launch().await.expect("启动浏览器失败");
    let page = session.new_page().await.expect("打开页面失败");

    let settings = WorkerSettings::from_config(&config, Path::new("."));
    let probe = Job {
        date: resolve_date("hoje"),
        section: "do1".into(),
        ..Default::default()
    };
    let options = list_options(
        page.as_ref(),
        &settings.flow.base_url,
        settings.flow.cascade_options(),
        &probe,
        1,
        None,
    )
    .await
    .expect("读取第 1 级选项失败");

    assert!(!options.is_empty(), "第 1 级应该有选项");
    session.close().await.expect("关闭浏览器失败");
}

#[tokio::test]
#[ignore]
async fn test_browser_launch() {
    init_tracing(None).unwrap();

    let config = Config::from_env().expect("读取配置失败");
    let launcher = ChromiumLauncher::new(BrowserOptions::from_config(&config));
    let result = launcher.launch().await;

    assert!(result.is_ok(), "应该能够启动或连接浏览器");
}

#[tokio::test]
#[ignore]
async fn test_run_single_job_on_live_portal() {
    init_tracing(None).unwrap();

    let config = Config::from_env().expect("读取配置失败");
    let dir = tempfile::tempdir().unwrap();
    let launcher = ChromiumLauncher::new(BrowserOptions::from_config(&config));
    let job = Job {
        topic: "live".into(),
        date: resolve_date("hoje"),
        section: "do1".into(),
        key1: Some("Presidência da República".into()),
        key2: Some("Decreto".into()),
        repeat_index: 1,
        ..Default::default()
    };

    let metric = run_single(
        job,
        WorkerSettings::from_config(&config, dir.path()),
        &launcher,
        &dir.path().join("live.json"),
    )
    .await
    .expect("任务应该产生结果");
    println!("结果: ok={} items={} error={:?}", metric.ok, metric.items, metric.error);
}

#[tokio::test]
#[ignore]
async fn test_closing_page_disposes_its_context() {
    init_tracing(None).unwrap();

    let config = Config::from_env().expect("读取配置失败");
    let session = ChromiumLauncher::new(BrowserOptions::from_config(&config))
        .open()
        .await
        .expect("启动浏览器失败");
    let before = session.context_count().await.unwrap();

    for _ in 0..3 {
        let page = session.new_page().await.expect("打开页面失败");
        assert_eq!(session.context_count().await.unwrap(), before + 1);
        page.close().await.expect("关闭页面失败");
        assert_eq!(session.context_count().await.unwrap(), before);
    }

    Box::new(session).close().await.expect("关闭浏览器失败");
}
