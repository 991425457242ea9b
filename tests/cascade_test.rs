mod common;

use std::sync::Mutex;
use std::time::Duration;

use common::{flow_settings, job, FakePortal, PortalTree};
use dou_batch::error::ErrorKind;
use dou_batch::models::job::KeyType;
use dou_batch::models::output::JobOutput;
use dou_batch::workflow::cascade::ClickOpen;
use dou_batch::workflow::{Accumulator, CascadeOptions, CascadeSelector, EditionFlow, JobCtx};

fn quick() -> CascadeOptions {
    CascadeOptions {
        repopulation_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn test_two_levels_reach_ready() {
    let page = FakePortal::new(PortalTree::sample());
    let result = CascadeSelector::new(&page, quick())
        .run(&job(0, "Ministério da Saúde", "Despacho"))
        .await;

    assert!(result.ok);
    assert_eq!(result.level_failed, None);
    assert_eq!(result.selected_keys.len(), 2);
    assert_eq!(result.selected_keys[0].key_type, "text");
    assert_eq!(result.resolved_labels, vec!["Órgão", "Tipo de Ato"]);
}

#[test]
fn test_unknown_key1_fails_at_level_one() {
    let page = FakePortal::new(PortalTree::sample());
    let result = tokio_test::block_on(
        CascadeSelector::new(&page, quick()).run(&job(0, "Ministério da Educação", "Portaria")),
    );

    assert!(!result.ok);
    assert_eq!(result.level_failed, Some(1));
    assert!(result.selected_keys.is_empty());
}

#[tokio::test]
async fn test_unknown_key2_fails_at_level_two() {
    let page = FakePortal::new(PortalTree::sample());
    let result = CascadeSelector::new(&page, quick())
        .run(&job(0, "Ministério da Fazenda", "Despacho"))
        .await;

    assert!(!result.ok);
    assert_eq!(result.level_failed, Some(2));
    assert_eq!(result.selected_keys.len(), 1);
}

#[tokio::test]
async fn test_level_three_only_when_key_given() {
    let page = FakePortal::new(PortalTree::sample());
    let selector = CascadeSelector::new(&page, quick());

    let two = selector.run(&job(0, "Ministério da Saúde", "Portaria")).await;
    assert!(two.ok);
    assert_eq!(two.selected_keys.len(), 2);

    let mut with_n3 = job(1, "Ministério da Saúde", "Portaria");
    with_n3.key3 = Some("Gabinete".into());
    let three = selector.run(&with_n3).await;
    assert!(three.ok);
    assert_eq!(three.selected_keys.len(), 3);
    assert_eq!(three.resolved_labels[2], "Seção");

    with_n3.key3 = Some("Diretoria Inexistente".into());
    let failed = selector.run(&with_n3).await;
    assert_eq!(failed.level_failed, Some(3));
}

#[tokio::test]
async fn test_explicit_key_type() {
    let page = FakePortal::new(PortalTree::sample());
    let selector = CascadeSelector::new(&page, quick());

    // 第 1 级按字母序：Fazenda=v1, Saúde=v2
    let mut by_value = job(0, "v2", "Despacho");
    by_value.key1_type = Some(KeyType::Value);
    let result = selector.run(&by_value).await;
    assert!(result.ok);
    assert_eq!(result.selected_keys[0].key_type, "value");

    let mut by_index = job(1, "2", "Despacho");
    by_index.key1_type = Some(KeyType::DataIndex);
    assert!(selector.run(&by_index).await.ok);

    // 指定为 text 时不会按 value 匹配
    let mut wrong = job(2, "v2", "Despacho");
    wrong.key1_type = Some(KeyType::Text);
    assert_eq!(selector.run(&wrong).await.level_failed, Some(1));
}

#[tokio::test]
async fn test_label_regex_overrides_position() {
    let page = FakePortal::new(PortalTree::sample());
    let selector = CascadeSelector::new(&page, quick());

    let mut labelled = job(0, "Ministério da Saúde", "Despacho");
    labelled.label1 = Some("^órg".into());
    labelled.label2 = Some("tipo\\s+de".into());
    assert!(selector.run(&labelled).await.ok);

    // 第 1 级指向"Seção"控件，其中没有部委选项
    let mut misdirected = job(1, "Ministério da Saúde", "Despacho");
    misdirected.label1 = Some("seç".into());
    assert_eq!(selector.run(&misdirected).await.level_failed, Some(1));
}

#[tokio::test]
async fn test_aria_combobox_opened_by_keyboard_strategy() {
    let page = FakePortal::new(PortalTree {
        aria: true,
        ..PortalTree::sample()
    });
    let target = job(0, "Ministério da Saúde", "Despacho");

    // click 无效，keyboard 生效
    let result = CascadeSelector::new(&page, quick()).run(&target).await;
    assert!(result.ok);
    assert_eq!(result.selected_keys.len(), 2);

    let click_only = CascadeSelector::new(&page, quick())
        .with_strategies(vec![Box::new(ClickOpen)])
        .run(&target)
        .await;
    assert_eq!(click_only.level_failed, Some(1));
}

#[tokio::test]
async fn test_aria_repopulation_does_not_wait_for_timeout() {
    let page = FakePortal::new(PortalTree {
        aria: true,
        ..PortalTree::sample()
    });
    let slow = CascadeOptions {
        repopulation_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(5),
    };

    let mut target = job(0, "Ministério da Saúde", "Portaria");
    target.key3 = Some("Gabinete".into());
    let started = std::time::Instant::now();
    let result = CascadeSelector::new(&page, slow).run(&target).await;

    assert!(result.ok);
    assert_eq!(result.selected_keys.len(), 3);
    assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
}

#[tokio::test]
async fn test_flow_writes_output_and_dedups_shared_items() {
    let dir = tempfile::tempdir().unwrap();
    let page = FakePortal::new(PortalTree::sample());
    let flow = EditionFlow::without_fetcher(flow_settings(dir.path()));
    let acc = Mutex::new(Accumulator::default());

    let first = job(0, "Ministério da Saúde", "Despacho");
    let metric = flow.run(&page, &first, &JobCtx::new(1, &first), &acc).await;
    assert!(metric.ok);
    assert_eq!(metric.items, 3);

    let path = metric.output.clone().unwrap();
    let output: JobOutput = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(output.total, 3);
    assert_eq!(output.selecoes.len(), 2);
    assert_eq!(output.secao, "do1");

    // 公共条目已在账本中
    let second = job(1, "Ministério da Fazenda", "Portaria");
    let metric = flow.run(&page, &second, &JobCtx::new(1, &second), &acc).await;
    assert!(metric.ok);
    assert_eq!(metric.items, 2);

    let report = acc.lock().unwrap().take_report();
    assert_eq!(report.ok, 2);
    assert_eq!(report.items_total, 5);
    assert_eq!(report.outputs.len(), 2);
}

#[tokio::test]
async fn test_flow_submits_query() {
    let dir = tempfile::tempdir().unwrap();
    let page = FakePortal::new(PortalTree::sample());
    let flow = EditionFlow::without_fetcher(flow_settings(dir.path()));
    let acc = Mutex::new(Accumulator::default());

    let mut with_query = job(0, "Ministério da Saúde", "Portaria");
    with_query.query = "licitação".into();
    assert!(flow.run(&page, &with_query, &JobCtx::new(1, &with_query), &acc).await.ok);

    let without_query = job(1, "Ministério da Saúde", "Despacho");
    assert!(flow.run(&page, &without_query, &JobCtx::new(1, &without_query), &acc).await.ok);

    assert_eq!(page.queries(), vec!["licitação"]);
}

#[tokio::test]
async fn test_selection_failure_is_recorded_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let page = FakePortal::new(PortalTree::sample());
    let flow = EditionFlow::without_fetcher(flow_settings(dir.path()));
    let acc = Mutex::new(Accumulator::default());

    let bad = job(0, "Ministério da Saúde", "Decreto");
    let metric = flow.run(&page, &bad, &JobCtx::new(1, &bad), &acc).await;

    assert!(!metric.ok);
    assert_eq!(metric.error_kind, Some(ErrorKind::Selection));
    assert_eq!(metric.level_failed, Some(2));
    assert_eq!(metric.output, None);
    assert_eq!(acc.lock().unwrap().report().fail, 1);
}

#[tokio::test]
async fn test_navigation_retried_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let page = FakePortal::new(PortalTree {
        failing_navigations: 1,
        ..PortalTree::sample()
    });
    let flow = EditionFlow::without_fetcher(flow_settings(dir.path()));
    let acc = Mutex::new(Accumulator::default());

    let j = job(0, "Ministério da Saúde", "Despacho");
    assert!(flow.run(&page, &j, &JobCtx::new(1, &j), &acc).await.ok);
    assert_eq!(page.page_navigations(), 1);
}

#[tokio::test]
async fn test_navigation_exhausted_counts_as_level_zero() {
    let dir = tempfile::tempdir().unwrap();
    let page = FakePortal::new(PortalTree {
        failing_navigations: 10,
        ..PortalTree::sample()
    });
    let mut settings = flow_settings(dir.path());
    settings.nav_retries = 2;
    let flow = EditionFlow::without_fetcher(settings);
    let acc = Mutex::new(Accumulator::default());

    let j = job(0, "Ministério da Saúde", "Despacho");
    let metric = flow.run(&page, &j, &JobCtx::new(1, &j), &acc).await;
    assert!(!metric.ok);
    assert_eq!(metric.error_kind, Some(ErrorKind::Navigation));
    assert_eq!(metric.level_failed, Some(0));
}
