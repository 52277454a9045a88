use std::sync::Arc;
use std::time::Duration;

use prediction_core::{SchedulerError, SchedulerResult, TaskErrorKind};
use prediction_domain::ports::{ModelServingClient, TaskReceiver, TaskSender};
use prediction_executor::{
    ClientPool, Executor, PredictionPipeline, SensorBackedPredictor, TaskOutcome,
};
use prediction_testing_utils::{
    default_training_period, descriptor, MockMetadataStorage, MockModelInfoProvider,
    MockModelServingClient, MockPredictionStorage, MockPredictor, MockSensorDataProvider,
    MockTaskQueue, TaskBuilder,
};
use tokio::sync::broadcast;

struct Harness {
    queue: Arc<MockTaskQueue>,
    model_info: Arc<MockModelInfoProvider>,
    predictor: Arc<MockPredictor>,
    storage: Arc<MockPredictionStorage>,
    metadata: Arc<MockMetadataStorage>,
    executor: Executor,
}

/// 使用模拟预测器的执行器
fn harness() -> Harness {
    let queue = Arc::new(MockTaskQueue::new());
    let model_info = Arc::new(MockModelInfoProvider::new());
    model_info.set_revision("p1", "r1");
    let predictor = Arc::new(MockPredictor::new());
    let sensor_data = Arc::new(MockSensorDataProvider::with_known_tags(&["tag-a", "tag-b"]));
    let storage = Arc::new(MockPredictionStorage::new());
    let metadata = Arc::new(MockMetadataStorage::new());

    let pipeline = Arc::new(PredictionPipeline::new(
        model_info.clone(),
        predictor.clone(),
        sensor_data,
        storage.clone(),
        metadata.clone(),
    ));
    let executor = Executor::builder(queue.clone(), pipeline)
        .executor_id("executor-test")
        .poll_timeout(Duration::from_millis(10))
        .max_consecutive_queue_failures(3)
        .build();

    Harness {
        queue,
        model_info,
        predictor,
        storage,
        metadata,
        executor,
    }
}

#[tokio::test]
async fn test_empty_queue_is_a_no_op() {
    let h = harness();

    let outcome = h.executor.process_one_task().await.unwrap();

    assert_eq!(outcome, TaskOutcome::Idle);
    assert_eq!(h.model_info.revision_calls(), 0);
    assert!(h.predictor.calls().is_empty());
    assert_eq!(h.storage.write_calls(), 0);
    assert_eq!(h.metadata.write_calls(), 0);
    assert_eq!(h.queue.acked_count(), 0);
}

#[tokio::test]
async fn test_failed_task_does_not_block_the_next_one() {
    let h = harness();
    h.predictor.fail_model("m1", TaskErrorKind::DataUnavailable);
    h.queue
        .put_task(&TaskBuilder::new().with_model("m1").build())
        .await
        .unwrap();
    h.queue
        .put_task(&TaskBuilder::new().with_model("m2").build())
        .await
        .unwrap();

    let first = h.executor.process_one_task().await.unwrap();
    let second = h.executor.process_one_task().await.unwrap();

    assert!(matches!(
        first,
        TaskOutcome::Abandoned {
            kind: TaskErrorKind::DataUnavailable,
            ..
        }
    ));
    assert!(matches!(second, TaskOutcome::Completed { ref revision, .. } if revision == "r1"));
    assert_eq!(h.queue.acked_count(), 2);
    assert_eq!(h.queue.in_flight_count(), 0);
    assert_eq!(h.metadata.records().len(), 1);
}

#[tokio::test]
async fn test_every_error_kind_is_abandoned_and_acked() {
    let h = harness();
    let kinds = [
        ("m-data", TaskErrorKind::DataUnavailable),
        ("m-upstream", TaskErrorKind::UpstreamError),
        ("m-tags", TaskErrorKind::TagNotFound),
        ("m-unknown", TaskErrorKind::Unknown),
    ];
    for (model, kind) in kinds {
        h.predictor.fail_model(model, kind);
        h.queue
            .put_task(&TaskBuilder::new().with_model(model).build())
            .await
            .unwrap();
    }

    for (_, expected) in kinds {
        match h.executor.process_one_task().await.unwrap() {
            TaskOutcome::Abandoned { kind, .. } => assert_eq!(kind, expected),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(h.queue.acked_count(), 4);
}

#[tokio::test]
async fn test_reprocessing_same_task_overwrites_results() {
    let h = harness();
    let task = TaskBuilder::new().build();
    h.queue.put_task(&task).await.unwrap();
    h.executor.process_one_task().await.unwrap();
    let values_after_first = h.storage.values();
    let records_after_first = h.metadata.records();

    h.queue.put_task(&task).await.unwrap();
    h.executor.process_one_task().await.unwrap();

    assert_eq!(h.storage.write_calls(), 2);
    assert_eq!(h.storage.values(), values_after_first);
    assert_eq!(h.metadata.write_calls(), 2);
    assert_eq!(h.metadata.records(), records_after_first);
}

#[tokio::test]
async fn test_unacked_task_is_processed_again_after_redelivery() {
    let h = harness();
    h.queue.put_task(&TaskBuilder::new().build()).await.unwrap();

    // 取走但不确认，模拟执行器在确认前崩溃
    let taken = h.queue.get_task(Duration::from_millis(10)).await.unwrap();
    assert!(taken.is_some());
    h.queue.redeliver_unacked();

    let outcome = h.executor.process_one_task().await.unwrap();
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));
    assert_eq!(h.storage.write_calls(), 1);
}

#[tokio::test]
async fn test_end_to_end_prediction_for_p1_m1_r1() {
    let queue = Arc::new(MockTaskQueue::new());
    let model_info = Arc::new(MockModelInfoProvider::with_models(vec![descriptor("p1", "m1")]));
    model_info.set_revision("p1", "r1");
    model_info.set_training_period("p1", "m1", "r1", default_training_period());
    let sensor_data = Arc::new(MockSensorDataProvider::with_known_tags(&["p1-m1-tag"]));
    let serving = MockModelServingClient::new(vec![
        "anomaly-score".to_string(),
        "total-anomaly".to_string(),
    ]);
    let pool = Arc::new(ClientPool::new(Arc::new(
        move |_project: &str| -> SchedulerResult<Arc<dyn ModelServingClient>> {
            Ok(Arc::new(serving.clone()))
        },
    )));
    let predictor = Arc::new(SensorBackedPredictor::new(
        model_info.clone(),
        sensor_data.clone(),
        pool,
        1,
    ));
    let storage = Arc::new(MockPredictionStorage::new());
    let metadata = Arc::new(MockMetadataStorage::new());
    let pipeline = Arc::new(PredictionPipeline::new(
        model_info,
        predictor,
        sensor_data,
        storage.clone(),
        metadata.clone(),
    ));
    let executor = Executor::builder(queue.clone(), pipeline)
        .poll_timeout(Duration::from_millis(10))
        .build();

    let task = TaskBuilder::new().build();
    queue.put_task(&task).await.unwrap();
    let outcome = executor.process_one_task().await.unwrap();

    assert!(matches!(outcome, TaskOutcome::Completed { ref revision, .. } if revision == "r1"));

    let values = storage.values();
    let tags: std::collections::BTreeSet<&str> = values.keys().map(|(tag, _)| tag.as_str()).collect();
    assert_eq!(
        tags.into_iter().collect::<Vec<_>>(),
        vec!["p1.m1.anomaly-score", "p1.m1.total-anomaly"]
    );
    assert_eq!(values.len(), 2 * 6);

    let records = metadata.records();
    let record = &records[&(
        "p1".to_string(),
        "m1".to_string(),
        task.from_time(),
        task.to_time(),
    )];
    assert_eq!(record.revision, "r1");
    assert_eq!(record.input_time_series_ids["p1-m1-tag"], "id-p1-m1-tag");
    assert_eq!(
        record.output_time_series_ids["p1.m1.total-anomaly"],
        "ts-p1.m1.total-anomaly"
    );
}

#[tokio::test]
async fn test_run_processes_tasks_until_shutdown_and_closes_receiver() {
    let h = harness();
    for model in ["m1", "m2", "m3"] {
        h.queue
            .put_task(&TaskBuilder::new().with_model(model).build())
            .await
            .unwrap();
    }
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let queue = h.queue.clone();
    let executor = Arc::new(h.executor);

    let runner = Arc::clone(&executor);
    let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

    for _ in 0..200 {
        if queue.acked_count() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    shutdown_tx.send(()).unwrap();

    handle.await.unwrap().unwrap();
    assert_eq!(queue.acked_count(), 3);
    assert!(queue.is_closed());
}

#[tokio::test]
async fn test_transient_queue_errors_are_tolerated() {
    let h = harness();
    h.queue.fail_next_gets(2);
    h.queue.put_task(&TaskBuilder::new().build()).await.unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let queue = h.queue.clone();
    let executor = Arc::new(h.executor);

    let runner = Arc::clone(&executor);
    let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

    for _ in 0..200 {
        if queue.acked_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    shutdown_tx.send(()).unwrap();

    assert!(handle.await.unwrap().is_ok());
    assert_eq!(queue.acked_count(), 1);
}

#[tokio::test]
async fn test_repeated_queue_errors_stop_the_executor() {
    let h = harness();
    h.queue.fail_next_gets(10);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let result = h.executor.run(shutdown_rx).await;

    assert!(matches!(result, Err(SchedulerError::Queue(_))));
    assert_eq!(h.queue.get_calls(), 3);
    assert!(h.queue.is_closed());
}
