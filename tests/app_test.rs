use std::sync::Arc;
use std::time::Duration;

use prediction_core::{AppConfig, SchedulerResult};
use prediction_domain::ports::ModelServingClient;
use prediction_scheduler::app::{AppMode, Application, Collaborators};
use prediction_scheduler::shutdown::ShutdownManager;
use prediction_testing_utils::{
    descriptor, MockMetadataStorage, MockModelInfoProvider, MockModelServingClient,
    MockPredictionStorage, MockSensorDataProvider,
};

struct Services {
    model_info: Arc<MockModelInfoProvider>,
    storage: Arc<MockPredictionStorage>,
    metadata: Arc<MockMetadataStorage>,
    serving: MockModelServingClient,
}

fn services() -> (Services, Collaborators) {
    let model_info = Arc::new(MockModelInfoProvider::with_models(vec![
        descriptor("p1", "m1"),
        descriptor("p1", "m2"),
    ]));
    model_info.set_revision("p1", "r1");
    let sensor_data = Arc::new(MockSensorDataProvider::with_known_tags(&[
        "p1-m1-tag",
        "p1-m2-tag",
    ]));
    let storage = Arc::new(MockPredictionStorage::new());
    let metadata = Arc::new(MockMetadataStorage::new());
    let serving = MockModelServingClient::new(vec!["anomaly-score".to_string()]);

    let factory_client = serving.clone();
    let collaborators = Collaborators {
        model_info: model_info.clone(),
        sensor_data,
        prediction_storage: storage.clone(),
        metadata_storage: metadata.clone(),
        serving_clients: Arc::new(
            move |_project: &str| -> SchedulerResult<Arc<dyn ModelServingClient>> {
                Ok(Arc::new(factory_client.clone()))
            },
        ),
    };

    (
        Services {
            model_info,
            storage,
            metadata,
            serving,
        },
        collaborators,
    )
}

fn in_memory_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scheduler.projects = vec!["p1".to_string()];
    config.executor.instance_count = 2;
    config.executor.instance_id = Some("executor-test".to_string());
    config.executor.poll_timeout_ms = 50;
    config.task_queue.empty_poll_backoff_ms = 20;
    config
}

#[tokio::test]
async fn test_all_mode_dispatches_and_processes_every_model() {
    let (services, collaborators) = services();
    let app = Arc::new(
        Application::with_collaborators(in_memory_config(), AppMode::All, collaborators).unwrap(),
    );
    let shutdown = ShutdownManager::new();
    let shutdown_rx = shutdown.subscribe().await;

    let runner = Arc::clone(&app);
    let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

    for _ in 0..400 {
        if services.metadata.records().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());

    assert_eq!(services.model_info.get_all_models_calls(), 1);
    assert_eq!(
        services.model_info.last_filter(),
        Some(vec!["p1".to_string()])
    );

    let records = services.metadata.records();
    assert_eq!(records.len(), 2);
    assert!(records.values().all(|record| record.revision == "r1"));

    let tags: Vec<String> = services
        .storage
        .values()
        .keys()
        .map(|(tag, _)| tag.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    assert_eq!(tags, vec!["p1.m1.anomaly-score", "p1.m2.anomaly-score"]);

    // 每个模型各调用一次推理
    assert_eq!(services.serving.calls().len(), 2);
}

#[tokio::test]
async fn test_executor_mode_stops_cleanly_without_tasks() {
    let (services, collaborators) = services();
    let app = Application::with_collaborators(in_memory_config(), AppMode::Executor, collaborators)
        .unwrap();
    let shutdown = ShutdownManager::new();
    let shutdown_rx = shutdown.subscribe().await;

    let run = app.run(shutdown_rx);
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => panic!("executors stopped before shutdown"),
        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
    }
    shutdown.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(services.model_info.get_all_models_calls(), 0);
    assert_eq!(services.storage.write_calls(), 0);
}
