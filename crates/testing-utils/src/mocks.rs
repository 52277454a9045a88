//! In-memory mock implementations of every port
//!
//! Each mock records the calls it receives and can be told to fail with a
//! given error kind, so tests can drive the scheduler and the executor
//! without any external service.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use prediction_core::{QueueError, TaskError, TaskErrorKind};
use prediction_domain::entities::{
    DataPoint, DeliveryTag, ModelDescriptor, ModelSpec, ModelTrainingPeriod, OutputSeries,
    PredictionResult, ReceivedTask, SensorDataSet, StoredPrediction, Task,
};
use prediction_domain::ports::{
    MetadataStorage, ModelInfoProvider, ModelServingClient, PredictionStorage, Predictor,
    SensorDataProvider, TaskReceiver, TaskSender,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::builders::{default_training_period, PredictionResultBuilder};

/// Build an error of the requested kind
pub fn error_for(kind: TaskErrorKind, context: &str) -> TaskError {
    match kind {
        TaskErrorKind::DataUnavailable => TaskError::data_unavailable(context),
        TaskErrorKind::UpstreamError => TaskError::upstream(Some(503), context),
        TaskErrorKind::TagNotFound => TaskError::tag_not_found(vec![context.to_string()]),
        TaskErrorKind::Unknown => TaskError::unknown(context),
    }
}

// ---------------------------------------------------------------------------
// Task queue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<(u64, Task)>,
    in_flight: HashMap<u64, Task>,
    published: Vec<Task>,
    acked: Vec<u64>,
    next_tag: u64,
    fail_put_after: Option<usize>,
    get_failures: usize,
    get_calls: usize,
    closed: bool,
    sender_closed: bool,
}

/// Mock task queue implementing both the sender and the receiver side
#[derive(Debug, Clone, Default)]
pub struct MockTaskQueue {
    state: Arc<Mutex<QueueState>>,
}

impl MockTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `put_task` fail once `successes` tasks were published
    pub fn fail_put_after(&self, successes: usize) {
        self.state.lock().unwrap().fail_put_after = Some(successes);
    }

    /// Make the next `count` calls to `get_task` fail with a connection error
    pub fn fail_next_gets(&self, count: usize) {
        self.state.lock().unwrap().get_failures = count;
    }

    /// Put deliveries that were taken but never acked back on the queue
    pub fn redeliver_unacked(&self) {
        let mut state = self.state.lock().unwrap();
        let mut pending: Vec<(u64, Task)> = state.in_flight.drain().collect();
        pending.sort_by_key(|(tag, _)| *tag);
        for entry in pending.into_iter().rev() {
            state.ready.push_front(entry);
        }
    }

    pub fn published(&self) -> Vec<Task> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn ready_count(&self) -> usize {
        self.state.lock().unwrap().ready.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }

    pub fn acked_count(&self) -> usize {
        self.state.lock().unwrap().acked.len()
    }

    pub fn get_calls(&self) -> usize {
        self.state.lock().unwrap().get_calls
    }

    /// Whether the receiver side was closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn is_sender_closed(&self) -> bool {
        self.state.lock().unwrap().sender_closed
    }
}

#[async_trait]
impl TaskSender for MockTaskQueue {
    async fn put_task(&self, task: &Task) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = state.fail_put_after {
            if state.published.len() >= limit {
                return Err(QueueError::connection_lost("mock queue unavailable"));
            }
        }
        state.next_tag += 1;
        let tag = state.next_tag;
        state.ready.push_back((tag, task.clone()));
        state.published.push(task.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.state.lock().unwrap().sender_closed = true;
        Ok(())
    }
}

#[async_trait]
impl TaskReceiver for MockTaskQueue {
    async fn get_task(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Option<ReceivedTask>, QueueError> {
        let next = {
            let mut state = self.state.lock().unwrap();
            state.get_calls += 1;
            if state.get_failures > 0 {
                state.get_failures -= 1;
                return Err(QueueError::connection_lost("mock queue unavailable"));
            }
            let next = state.ready.pop_front();
            if let Some((tag, task)) = &next {
                state.in_flight.insert(*tag, task.clone());
            }
            next
        };

        match next {
            Some((tag, task)) => Ok(Some(ReceivedTask {
                message_id: format!("mock-{tag}"),
                task,
                delivery_tag: DeliveryTag::Sequence(tag),
            })),
            None => {
                tokio::time::sleep(timeout.min(std::time::Duration::from_millis(5))).await;
                Ok(None)
            }
        }
    }

    async fn ack(&self, received: &ReceivedTask) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if let DeliveryTag::Sequence(tag) = received.delivery_tag {
            state.in_flight.remove(&tag);
            state.acked.push(tag);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Model info
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ModelInfoState {
    models: Vec<ModelDescriptor>,
    revisions: HashMap<String, String>,
    training_periods: HashMap<(String, String, String), ModelTrainingPeriod>,
    specs: HashMap<(String, String), ModelSpec>,
    fail_get_all_models: Option<TaskErrorKind>,
    fail_revision: Option<TaskErrorKind>,
    get_all_models_calls: usize,
    last_filter: Option<Vec<String>>,
    revision_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockModelInfoProvider {
    state: Arc<Mutex<ModelInfoState>>,
}

impl MockModelInfoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(models: Vec<ModelDescriptor>) -> Self {
        let provider = Self::new();
        provider.set_models(models);
        provider
    }

    pub fn set_models(&self, models: Vec<ModelDescriptor>) {
        self.state.lock().unwrap().models = models;
    }

    pub fn set_revision(&self, project_name: &str, revision: &str) {
        self.state
            .lock()
            .unwrap()
            .revisions
            .insert(project_name.to_string(), revision.to_string());
    }

    pub fn set_training_period(
        &self,
        project_name: &str,
        model_name: &str,
        revision: &str,
        period: ModelTrainingPeriod,
    ) {
        self.state.lock().unwrap().training_periods.insert(
            (
                project_name.to_string(),
                model_name.to_string(),
                revision.to_string(),
            ),
            period,
        );
    }

    pub fn set_spec(&self, project_name: &str, model_name: &str, spec: ModelSpec) {
        self.state
            .lock()
            .unwrap()
            .specs
            .insert((project_name.to_string(), model_name.to_string()), spec);
    }

    pub fn fail_get_all_models(&self, kind: Option<TaskErrorKind>) {
        self.state.lock().unwrap().fail_get_all_models = kind;
    }

    pub fn fail_revision(&self, kind: Option<TaskErrorKind>) {
        self.state.lock().unwrap().fail_revision = kind;
    }

    pub fn get_all_models_calls(&self) -> usize {
        self.state.lock().unwrap().get_all_models_calls
    }

    pub fn last_filter(&self) -> Option<Vec<String>> {
        self.state.lock().unwrap().last_filter.clone()
    }

    pub fn revision_calls(&self) -> usize {
        self.state.lock().unwrap().revision_calls
    }
}

#[async_trait]
impl ModelInfoProvider for MockModelInfoProvider {
    async fn get_all_models(&self, projects: &[String]) -> Result<Vec<ModelDescriptor>, TaskError> {
        let mut state = self.state.lock().unwrap();
        state.get_all_models_calls += 1;
        state.last_filter = Some(projects.to_vec());
        if let Some(kind) = state.fail_get_all_models {
            return Err(error_for(kind, "get_all_models"));
        }

        Ok(state
            .models
            .iter()
            .filter(|m| {
                projects.is_empty()
                    || m.project_name
                        .as_ref()
                        .map(|p| projects.contains(p))
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn get_project_latest_revision(&self, project_name: &str) -> Result<String, TaskError> {
        let mut state = self.state.lock().unwrap();
        state.revision_calls += 1;
        if let Some(kind) = state.fail_revision {
            return Err(error_for(kind, project_name));
        }
        state
            .revisions
            .get(project_name)
            .cloned()
            .ok_or_else(|| TaskError::upstream(Some(404), format!("no revision for {project_name}")))
    }

    async fn get_model_training_dates(
        &self,
        project_name: &str,
        model_name: &str,
        revision: &str,
    ) -> Result<ModelTrainingPeriod, TaskError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .training_periods
            .get(&(
                project_name.to_string(),
                model_name.to_string(),
                revision.to_string(),
            ))
            .copied()
            .unwrap_or_else(default_training_period))
    }

    async fn get_spec(&self, project_name: &str, model_name: &str) -> Result<ModelSpec, TaskError> {
        let state = self.state.lock().unwrap();
        if let Some(spec) = state
            .specs
            .get(&(project_name.to_string(), model_name.to_string()))
        {
            return Ok(spec.clone());
        }
        state
            .models
            .iter()
            .find(|m| m.identity() == Some((project_name, model_name)))
            .map(|m| ModelSpec {
                tag_list: m.tag_list.clone(),
                target_tag_list: m.target_tag_list.clone(),
            })
            .ok_or_else(|| {
                TaskError::upstream(Some(404), format!("no spec for {project_name}/{model_name}"))
            })
    }
}

// ---------------------------------------------------------------------------
// Sensor data
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SensorState {
    rows: usize,
    time_series_ids: HashMap<String, String>,
    fail_data: Option<TaskErrorKind>,
    data_calls: Vec<(Vec<String>, DateTime<Utc>, DateTime<Utc>)>,
}

#[derive(Debug, Clone)]
pub struct MockSensorDataProvider {
    state: Arc<Mutex<SensorState>>,
}

impl MockSensorDataProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SensorState {
                rows: 6,
                time_series_ids: HashMap::new(),
                fail_data: None,
                data_calls: Vec::new(),
            })),
        }
    }

    /// Register `id-{tag}` as the time-series id of every given tag
    pub fn with_known_tags(tags: &[&str]) -> Self {
        let provider = Self::new();
        for tag in tags {
            provider.set_time_series_id(tag, &format!("id-{tag}"));
        }
        provider
    }

    pub fn set_time_series_id(&self, tag: &str, id: &str) {
        self.state
            .lock()
            .unwrap()
            .time_series_ids
            .insert(tag.to_string(), id.to_string());
    }

    pub fn set_rows(&self, rows: usize) {
        self.state.lock().unwrap().rows = rows;
    }

    pub fn fail_data(&self, kind: Option<TaskErrorKind>) {
        self.state.lock().unwrap().fail_data = kind;
    }

    pub fn data_calls(&self) -> Vec<(Vec<String>, DateTime<Utc>, DateTime<Utc>)> {
        self.state.lock().unwrap().data_calls.clone()
    }
}

impl Default for MockSensorDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorDataProvider for MockSensorDataProvider {
    async fn get_data_for_range(
        &self,
        tags: &[String],
        from_time: DateTime<Utc>,
        to_time: DateTime<Utc>,
    ) -> Result<SensorDataSet, TaskError> {
        let mut state = self.state.lock().unwrap();
        state.data_calls.push((tags.to_vec(), from_time, to_time));
        if let Some(kind) = state.fail_data {
            return Err(error_for(kind, "get_data_for_range"));
        }

        let index: Vec<DateTime<Utc>> = (0..state.rows)
            .map(|i| from_time + Duration::minutes(5 * i as i64))
            .collect();
        let values = index
            .iter()
            .enumerate()
            .map(|(i, _)| tags.iter().map(|_| i as f64).collect())
            .collect();

        Ok(SensorDataSet {
            tags: tags.to_vec(),
            index,
            values,
        })
    }

    async fn get_time_series_ids(
        &self,
        tags: &[String],
    ) -> Result<BTreeMap<String, String>, TaskError> {
        let state = self.state.lock().unwrap();
        Ok(tags
            .iter()
            .filter_map(|tag| {
                state
                    .time_series_ids
                    .get(tag)
                    .map(|id| (tag.clone(), id.clone()))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Model serving
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockModelServingClient {
    series_names: Vec<String>,
    failure: Arc<Mutex<Option<TaskErrorKind>>>,
    calls: Arc<Mutex<Vec<(String, String, String, usize)>>>,
}

impl MockModelServingClient {
    pub fn new(series_names: Vec<String>) -> Self {
        Self {
            series_names,
            failure: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fail_with(&self, kind: Option<TaskErrorKind>) {
        *self.failure.lock().unwrap() = kind;
    }

    /// (project, model, revision, rows) per call
    pub fn calls(&self) -> Vec<(String, String, String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockModelServingClient {
    fn default() -> Self {
        Self::new(vec!["anomaly-score".to_string()])
    }
}

#[async_trait]
impl ModelServingClient for MockModelServingClient {
    async fn predict(
        &self,
        project_name: &str,
        model_name: &str,
        revision: &str,
        data: &SensorDataSet,
    ) -> Result<Vec<OutputSeries>, TaskError> {
        self.calls.lock().unwrap().push((
            project_name.to_string(),
            model_name.to_string(),
            revision.to_string(),
            data.row_count(),
        ));
        if let Some(kind) = *self.failure.lock().unwrap() {
            return Err(error_for(kind, "predict"));
        }

        Ok(self
            .series_names
            .iter()
            .map(|name| OutputSeries {
                name: name.clone(),
                points: data
                    .index
                    .iter()
                    .map(|ts| DataPoint {
                        timestamp: *ts,
                        value: 0.5,
                    })
                    .collect(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PredictorState {
    failures: HashMap<String, TaskErrorKind>,
    input_tags: Option<Vec<String>>,
    series_names: Option<Vec<String>>,
    calls: Vec<(Task, String, ModelTrainingPeriod)>,
}

/// Predictor producing deterministic results, optionally failing per model
#[derive(Debug, Clone, Default)]
pub struct MockPredictor {
    state: Arc<Mutex<PredictorState>>,
}

impl MockPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_model(&self, model_name: &str, kind: TaskErrorKind) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(model_name.to_string(), kind);
    }

    pub fn set_input_tags(&self, tags: Vec<String>) {
        self.state.lock().unwrap().input_tags = Some(tags);
    }

    pub fn set_series(&self, names: Vec<String>) {
        self.state.lock().unwrap().series_names = Some(names);
    }

    pub fn calls(&self) -> Vec<(Task, String, ModelTrainingPeriod)> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl Predictor for MockPredictor {
    async fn execute_prediction(
        &self,
        task: &Task,
        revision: &str,
        training_period: &ModelTrainingPeriod,
    ) -> Result<PredictionResult, TaskError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push((task.clone(), revision.to_string(), *training_period));
        if let Some(kind) = state.failures.get(task.model_name()) {
            return Err(error_for(*kind, task.model_name()));
        }

        let mut builder = PredictionResultBuilder::for_task(task)
            .with_revision(revision)
            .with_training_period(*training_period);
        if let Some(tags) = &state.input_tags {
            builder = builder.with_input_tags(tags.clone());
        }
        if let Some(names) = &state.series_names {
            builder = builder.with_series(names.clone());
        }
        Ok(builder.build())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PredictionStorageState {
    values: BTreeMap<(String, DateTime<Utc>), f64>,
    write_calls: usize,
    failure: Option<TaskErrorKind>,
}

/// Prediction storage keyed by (output tag, timestamp); rewrites overwrite
#[derive(Debug, Clone, Default)]
pub struct MockPredictionStorage {
    state: Arc<Mutex<PredictionStorageState>>,
}

impl MockPredictionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, kind: Option<TaskErrorKind>) {
        self.state.lock().unwrap().failure = kind;
    }

    pub fn values(&self) -> BTreeMap<(String, DateTime<Utc>), f64> {
        self.state.lock().unwrap().values.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().unwrap().write_calls
    }
}

#[async_trait]
impl PredictionStorage for MockPredictionStorage {
    async fn put_prediction(&self, result: &PredictionResult) -> Result<StoredPrediction, TaskError> {
        let mut state = self.state.lock().unwrap();
        state.write_calls += 1;
        if let Some(kind) = state.failure {
            return Err(error_for(kind, "put_prediction"));
        }

        let output_tag_names = result.output_tag_names();
        let mut output_time_series_ids = BTreeMap::new();
        for series in &result.series {
            let tag = result.output_tag_name(&series.name);
            for point in &series.points {
                state.values.insert((tag.clone(), point.timestamp), point.value);
            }
            output_time_series_ids.insert(tag.clone(), format!("ts-{tag}"));
        }

        Ok(StoredPrediction {
            output_tag_names,
            output_time_series_ids,
        })
    }
}

/// One metadata record as stored by MockMetadataStorage
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub revision: String,
    pub output_tag_names: BTreeMap<String, String>,
    pub output_time_series_ids: BTreeMap<String, String>,
    pub input_time_series_ids: BTreeMap<String, String>,
}

type MetadataKey = (String, String, DateTime<Utc>, DateTime<Utc>);

#[derive(Debug, Default)]
struct MetadataState {
    records: HashMap<MetadataKey, MetadataRecord>,
    write_calls: usize,
    failure: Option<TaskErrorKind>,
}

/// Metadata storage keyed by (project, model, window); rewrites overwrite
#[derive(Debug, Clone, Default)]
pub struct MockMetadataStorage {
    state: Arc<Mutex<MetadataState>>,
}

impl MockMetadataStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, kind: Option<TaskErrorKind>) {
        self.state.lock().unwrap().failure = kind;
    }

    pub fn records(&self) -> HashMap<MetadataKey, MetadataRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().unwrap().write_calls
    }
}

#[async_trait]
impl MetadataStorage for MockMetadataStorage {
    async fn put_prediction_metadata(
        &self,
        result: &PredictionResult,
        output_tag_names: &BTreeMap<String, String>,
        output_time_series_ids: &BTreeMap<String, String>,
        input_time_series_ids: &BTreeMap<String, String>,
    ) -> Result<(), TaskError> {
        let mut state = self.state.lock().unwrap();
        state.write_calls += 1;
        if let Some(kind) = state.failure {
            return Err(error_for(kind, "put_prediction_metadata"));
        }

        state.records.insert(
            (
                result.metadata.project_name.clone(),
                result.metadata.model_name.clone(),
                result.from_time,
                result.to_time,
            ),
            MetadataRecord {
                revision: result.metadata.revision.clone(),
                output_tag_names: output_tag_names.clone(),
                output_time_series_ids: output_time_series_ids.clone(),
                input_time_series_ids: input_time_series_ids.clone(),
            },
        );
        Ok(())
    }
}
