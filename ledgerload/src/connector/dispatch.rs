use super::{Connector, Finished, Request, Telemetry, TxEvent};
use crate::error::ConnectorError;
use ledgerload_core::{now_ms, TxStatus};
use std::sync::Arc;
use std::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Input of [`Dispatcher::send_requests`].
#[derive(Clone, Debug)]
pub enum Requests {
    Single(Request),
    Batch(Vec<Request>),
}

impl From<Request> for Requests {
    fn from(request: Request) -> Self {
        Requests::Single(request)
    }
}

impl From<Vec<Request>> for Requests {
    fn from(requests: Vec<Request>) -> Self {
        Requests::Batch(requests)
    }
}

/// Output of [`Dispatcher::send_requests`], shaped like its input.
#[derive(Clone, Debug, PartialEq)]
pub enum Dispatched {
    Single(TxStatus),
    Batch(Vec<TxStatus>),
}

impl Dispatched {
    pub fn records(&self) -> &[TxStatus] {
        match self {
            Dispatched::Single(record) => std::slice::from_ref(record),
            Dispatched::Batch(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<TxStatus> {
        match self {
            Dispatched::Single(record) => vec![record],
            Dispatched::Batch(records) => records,
        }
    }
}

/// Shared dispatch layer over a [`Connector`].
///
/// Emits [`TxEvent::Submitted`] before every request and exactly one [`TxEvent::Finished`] per
/// call. A failing request never aborts a batch: it is recorded as a failed [`TxStatus`] and the
/// call reports the first failure by index only after the finished event went out.
#[derive(Clone)]
pub struct Dispatcher {
    connector: Arc<dyn Connector>,
    telemetry: Telemetry,
}

impl Dispatcher {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_telemetry(connector, Telemetry::new())
    }

    pub fn with_telemetry(connector: Arc<dyn Connector>, telemetry: Telemetry) -> Self {
        Self {
            connector,
            telemetry,
        }
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub async fn send_requests(
        &self,
        requests: impl Into<Requests>,
    ) -> Result<Dispatched, ConnectorError> {
        match requests.into() {
            Requests::Single(request) => self.send_request(&request).await.map(Dispatched::Single),
            Requests::Batch(requests) => self.send_batch(&requests).await.map(Dispatched::Batch),
        }
    }

    pub async fn send_request(&self, request: &Request) -> Result<TxStatus, ConnectorError> {
        self.telemetry.emit(TxEvent::Submitted(1));

        match self.submit(request).await {
            Ok(record) => {
                self.telemetry
                    .emit(TxEvent::Finished(Finished::Single(&record)));
                Ok(record)
            }
            Err((record, error)) => {
                self.telemetry
                    .emit(TxEvent::Finished(Finished::Single(&record)));
                Err(error)
            }
        }
    }

    pub async fn send_batch(&self, requests: &[Request]) -> Result<Vec<TxStatus>, ConnectorError> {
        let mut records = Vec::with_capacity(requests.len());
        let mut first_error = None;

        for (idx, request) in requests.iter().enumerate() {
            self.telemetry.emit(TxEvent::Submitted(1));

            match self.submit(request).await {
                Ok(record) => records.push(record),
                Err((record, error)) => {
                    records.push(record);
                    if first_error.is_none() {
                        first_error = Some(error);
                    } else {
                        debug!("Additional failure in batch at index {idx}: {error}");
                    }
                }
            }
        }

        self.telemetry
            .emit(TxEvent::Finished(Finished::Batch(&records)));

        match first_error {
            Some(error) => Err(error),
            None => Ok(records),
        }
    }

    async fn submit(&self, request: &Request) -> Result<TxStatus, (TxStatus, ConnectorError)> {
        let time_create = now_ms();
        let start = Instant::now();
        let res = self.connector.send_single_request(request).await;
        let elapsed = start.elapsed();

        #[cfg(feature = "metrics")]
        {
            let connector = self.connector.connector_type().to_string();
            metrics::counter!("ledgerload_tx_submitted", "connector" => connector.clone())
                .increment(1);
            metrics::histogram!("ledgerload_tx_latency", "connector" => connector)
                .record(elapsed.as_secs_f64());
        }

        match res {
            Ok(record) => {
                trace!("Request {} finished in {elapsed:?}", record.id());
                #[cfg(feature = "metrics")]
                {
                    let name = if record.is_committed() {
                        "ledgerload_tx_success"
                    } else {
                        "ledgerload_tx_failed"
                    };
                    metrics::counter!(name).increment(1);
                }
                Ok(record)
            }
            Err(error) => {
                debug!("Request failed after {elapsed:?}: {error}");
                #[cfg(feature = "metrics")]
                metrics::counter!("ledgerload_tx_failed").increment(1);

                let mut record = TxStatus::created_at(uuid::Uuid::new_v4().to_string(), time_create);
                record.set_failed(None);
                record.set_error_message(0, error.to_string());
                Err((record, error))
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("connector", &self.connector.connector_type())
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::TxEventListener;
    use async_trait::async_trait;
    use ledgerload_core::{TxState, TxStatistics};
    use serde_json::json;
    use std::sync::Mutex;

    /// Succeeds with the request's `id`, fails when the request sets `fail`.
    struct Echo;

    #[async_trait]
    impl Connector for Echo {
        fn connector_type(&self) -> &str {
            "echo"
        }

        fn worker_index(&self) -> Option<usize> {
            Some(0)
        }

        async fn send_single_request(&self, request: &Request) -> Result<TxStatus, ConnectorError> {
            let id = request["id"].as_str().unwrap_or_default().to_string();
            if request["fail"].as_bool().unwrap_or(false) {
                return Err(ConnectorError::Request(format!("boom-{id}")));
            }
            let mut record = TxStatus::new(id);
            record.set_success(None);
            Ok(record)
        }
    }

    #[derive(Debug, PartialEq)]
    enum Recorded {
        Submitted(u64),
        Single(TxState, Vec<String>),
        Batch(Vec<(String, TxState)>),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Recorded>>,
    }

    impl TxEventListener for Recorder {
        fn on_event(&self, event: &TxEvent<'_>) {
            let recorded = match event {
                TxEvent::Submitted(count) => Recorded::Submitted(*count),
                TxEvent::Finished(Finished::Single(record)) => {
                    Recorded::Single(record.status(), record.error_messages().to_vec())
                }
                TxEvent::Finished(Finished::Batch(records)) => Recorded::Batch(
                    records
                        .iter()
                        .map(|r| (r.id().to_string(), r.status()))
                        .collect(),
                ),
            };
            self.events.lock().unwrap().push(recorded);
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<Recorder>) {
        let dispatcher = Dispatcher::new(Arc::new(Echo));
        let recorder = Arc::new(Recorder::default());
        dispatcher.telemetry().subscribe(recorder.clone());
        (dispatcher, recorder)
    }

    #[tokio::test]
    async fn single_request_success() {
        let (dispatcher, recorder) = dispatcher();

        let res = dispatcher
            .send_requests(json!({ "id": "a" }))
            .await
            .unwrap();

        let Dispatched::Single(record) = res else {
            panic!("expected a single record");
        };
        assert_eq!(record.id(), "a");
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                Recorded::Submitted(1),
                Recorded::Single(TxState::Success, vec![])
            ]
        );
    }

    #[tokio::test]
    async fn single_request_failure_is_reported_then_returned() {
        let (dispatcher, recorder) = dispatcher();

        let err = dispatcher
            .send_requests(json!({ "id": "a", "fail": true }))
            .await
            .unwrap_err();

        assert!(matches!(&err, ConnectorError::Request(msg) if msg == "boom-a"));
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                Recorded::Submitted(1),
                Recorded::Single(TxState::Failed, vec!["Request failed: boom-a".to_string()])
            ]
        );
    }

    #[tokio::test]
    async fn batch_without_failures() {
        let (dispatcher, recorder) = dispatcher();
        let requests = vec![json!({ "id": "a" }), json!({ "id": "b" }), json!({ "id": "c" })];

        let records = dispatcher
            .send_requests(requests)
            .await
            .unwrap()
            .into_records();

        let ids: Vec<_> = records.iter().map(TxStatus::id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert!(events[..3].iter().all(|e| *e == Recorded::Submitted(1)));
        assert_eq!(
            events[3],
            Recorded::Batch(vec![
                ("a".to_string(), TxState::Success),
                ("b".to_string(), TxState::Success),
                ("c".to_string(), TxState::Success),
            ])
        );
    }

    #[tokio::test]
    async fn batch_with_partial_failures_keeps_order_and_reports_first_error() {
        let (dispatcher, recorder) = dispatcher();
        let requests = vec![
            json!({ "id": "a" }),
            json!({ "id": "b", "fail": true }),
            json!({ "id": "c" }),
            json!({ "id": "d", "fail": true }),
        ];

        let err = dispatcher.send_requests(requests).await.unwrap_err();
        assert!(matches!(&err, ConnectorError::Request(msg) if msg == "boom-b"));

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 5);
        assert!(events[..4].iter().all(|e| *e == Recorded::Submitted(1)));

        let Recorded::Batch(records) = &events[4] else {
            panic!("expected the batch to finish last");
        };
        let states: Vec<_> = records.iter().map(|(_, state)| *state).collect();
        assert_eq!(
            states,
            vec![
                TxState::Success,
                TxState::Failed,
                TxState::Success,
                TxState::Failed
            ]
        );
        assert_eq!(records[0].0, "a");
        assert_eq!(records[2].0, "c");
    }

    #[tokio::test]
    async fn empty_batch_finishes_with_no_records() {
        let (dispatcher, recorder) = dispatcher();
        let records = dispatcher.send_batch(&[]).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(*recorder.events.lock().unwrap(), vec![Recorded::Batch(vec![])]);
    }

    #[tokio::test]
    async fn statistics_follow_the_dispatch_path() {
        let dispatcher = Dispatcher::new(Arc::new(Echo));
        let stats = TxStatistics::new(0, 0);
        stats.activate();
        dispatcher.telemetry().subscribe(Arc::new(stats.clone()));

        let _ = dispatcher
            .send_batch(&[json!({ "id": "a" }), json!({ "id": "b", "fail": true })])
            .await;
        let _ = dispatcher.send_request(&json!({ "id": "c" })).await;

        assert_eq!(stats.total_submitted(), 3);
        assert_eq!(stats.total_finished(), 3);
        assert_eq!(stats.total_successful(), 2);
        assert_eq!(stats.total_failed(), 1);
    }
}
