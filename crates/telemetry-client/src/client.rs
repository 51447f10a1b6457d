// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public entry point for recording metrics.
//!
//! Every recording method renders the observation, appends it to the buffer store and
//! flushes inline once the configured number of lines is buffered. Recording never
//! blocks on I/O and never fails: invalid observations are logged and dropped.
//!
//! ```no_run
//! use telemetry_client::client::Client;
//! use telemetry_client::config::ClientConfig;
//! use telemetry_client::metric::SortedTags;
//!
//! # async fn run() -> Result<(), telemetry_client::errors::Creation> {
//! let client = Client::new(ClientConfig::default()).await?;
//! client.counter("requests", 1.0, SortedTags::from_iter([("route", "/home")]));
//! client.aggregated_timer("latency", 12.5, "p90", 60, SortedTags::new());
//! client.close();
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::buffer::BufferStore;
use crate::config::{ClientConfig, TransportKind};
use crate::constants::{
    BUFFER_TYPE_AGGREGATED, BUFFER_TYPE_NON_AGGREGATED, BUFFER_TYPE_TAG_KEY, EVENT_LOOP_LAG_METRIC,
    FLUSH_LENGTH_METRIC,
};
use crate::errors::Creation;
use crate::flusher::Flusher;
use crate::formatter::LineFormatter;
use crate::metric::{MetricKind, Observation, SortedTags};
use crate::scheduler;
use crate::transport::Transport;

/// Handle to a telemetry client. Clones share the same buffers and transport.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

pub(crate) struct WeakClient(Weak<Inner>);

impl WeakClient {
    pub(crate) fn upgrade(&self) -> Option<Client> {
        self.0.upgrade().map(|inner| Client { inner })
    }
}

struct Inner {
    state: Mutex<State>,
    formatter: LineFormatter,
    flush_size: usize,
    system_stats: bool,
    cancel_token: CancellationToken,
}

struct State {
    store: BufferStore,
    /// `None` once the client is closed.
    flusher: Option<Flusher>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Client {
    /// Builds a client and starts its flush timer on the current Tokio runtime.
    ///
    /// # Errors
    /// Fails when the configuration is invalid (including a missing token for the api
    /// transport), when the UDP socket cannot be opened or when the HTTP client cannot be
    /// built.
    pub async fn new(config: ClientConfig) -> Result<Self, Creation> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| Creation::NoRuntime)?;
        let transport = Transport::from_config(&config).await?;

        let client = Client {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    store: BufferStore::new(config.max_aggregation_buckets),
                    flusher: Some(Flusher::new(transport, config.dry_run, runtime.clone())),
                }),
                formatter: LineFormatter::from_config(&config),
                flush_size: config.flush_size,
                system_stats: config.system_stats,
                cancel_token: CancellationToken::new(),
            }),
        };

        scheduler::spawn_flush_timer(
            client.downgrade(),
            config.flush_interval(),
            config.system_stats,
            client.inner.cancel_token.clone(),
            &runtime,
        );

        debug!(
            "Telemetry client started: transport {:?}, flush every {}ms or {} lines",
            config.transport, config.flush_interval, config.flush_size
        );
        Ok(client)
    }

    pub fn counter(&self, name: &str, value: f64, tags: SortedTags) {
        self.record(MetricKind::Counter, Observation::new(name, value).with_tags(tags));
    }

    pub fn gauge(&self, name: &str, value: f64, tags: SortedTags) {
        self.record(MetricKind::Gauge, Observation::new(name, value).with_tags(tags));
    }

    pub fn timer(&self, name: &str, value: f64, tags: SortedTags) {
        self.record(MetricKind::Timer, Observation::new(name, value).with_tags(tags));
    }

    /// Records a metric without type defaults. Aggregations and frequency are taken from
    /// the observation when present.
    pub fn put(&self, observation: Observation) {
        self.record(MetricKind::Custom, observation);
    }

    /// Records an observation of any kind, applying that kind's defaults.
    pub fn record(&self, kind: MetricKind, observation: Observation) {
        self.insert(kind, &observation, false);
    }

    pub fn aggregated_counter(
        &self,
        name: &str,
        value: f64,
        function: &str,
        frequency: u64,
        tags: SortedTags,
    ) {
        self.aggregated_record(
            MetricKind::Counter,
            pre_aggregated(name, value, function, frequency, tags),
        );
    }

    pub fn aggregated_gauge(
        &self,
        name: &str,
        value: f64,
        function: &str,
        frequency: u64,
        tags: SortedTags,
    ) {
        self.aggregated_record(
            MetricKind::Gauge,
            pre_aggregated(name, value, function, frequency, tags),
        );
    }

    pub fn aggregated_timer(
        &self,
        name: &str,
        value: f64,
        function: &str,
        frequency: u64,
        tags: SortedTags,
    ) {
        self.aggregated_record(
            MetricKind::Timer,
            pre_aggregated(name, value, function, frequency, tags),
        );
    }

    /// Records a value that was already aggregated by the caller. The observation must
    /// carry exactly one aggregation function and a frequency.
    pub fn aggregated_put(&self, observation: Observation) {
        self.aggregated_record(MetricKind::Custom, observation);
    }

    pub fn aggregated_record(&self, kind: MetricKind, observation: Observation) {
        self.insert(kind, &observation, true);
    }

    /// Flushes buffered lines now. Sends happen in the background.
    pub fn flush(&self) {
        self.flush_now();
    }

    /// Number of lines currently buffered, across all buffers.
    pub fn buffered_count(&self) -> usize {
        self.inner.lock_state().store.total_count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock_state().flusher.is_none()
    }

    /// Stops the flush timer, releases the transport and discards buffered lines.
    ///
    /// Metrics recorded afterwards are ignored. Closing twice is harmless.
    pub fn close(&self) {
        let mut state = self.inner.lock_state();
        if state.flusher.take().is_none() {
            return;
        }
        let discarded = state.store.total_count();
        state.store.reset();
        self.inner.cancel_token.cancel();
        debug!("Telemetry client closed, discarded {} buffered lines", discarded);
    }

    pub(crate) fn downgrade(&self) -> WeakClient {
        WeakClient(Arc::downgrade(&self.inner))
    }

    pub(crate) fn record_event_loop_lag(&self, lag: std::time::Duration) {
        self.record(
            MetricKind::Gauge,
            Observation::new(EVENT_LOOP_LAG_METRIC, lag.as_millis() as f64)
                .with_aggregations(["avg", "max"])
                .with_frequency(10),
        );
    }

    pub(crate) fn flush_now(&self) -> Vec<JoinHandle<()>> {
        let mut state = self.inner.lock_state();
        self.inner.flush_locked(&mut state)
    }

    fn insert(&self, kind: MetricKind, observation: &Observation, pre_aggregated: bool) {
        let mut state = self.inner.lock_state();
        if state.flusher.is_none() {
            debug!("Client closed, ignoring {} {}", kind, observation.name);
            return;
        }

        let line = match self.inner.formatter.format(kind, observation, pre_aggregated) {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                warn!("Dropping {} {}: {}", kind, observation.name, e);
                return;
            }
        };

        if let Err(e) = state.store.append(line) {
            warn!("Dropping {} {}: {}", kind, observation.name, e);
            return;
        }

        if state.store.total_count() >= self.inner.flush_size {
            debug!("Flush size of {} lines reached", self.inner.flush_size);
            self.inner.flush_locked(&mut state);
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        #[allow(clippy::expect_used)]
        self.state.lock().expect("lock poisoned")
    }

    /// Takes every buffered line and ships it. Runs with the state lock held, so no
    /// append can land between reading the buffers and resetting them.
    fn flush_locked(&self, state: &mut State) -> Vec<JoinHandle<()>> {
        let Some(flusher) = state.flusher.as_ref() else {
            return Vec::new();
        };
        if state.store.is_empty() {
            return Vec::new();
        }

        let payload = state.store.take();
        let n_non_aggregated = payload.non_aggregated_count();
        let n_aggregated = payload.aggregated_count();
        let transport_kind = flusher.transport_kind();
        let handles = flusher.flush(payload);

        if self.system_stats {
            // Lands in the fresh buffers and ships with the next flush. No threshold
            // check here, so a flush never triggers another one.
            if transport_kind == TransportKind::Api && n_aggregated > 0 {
                self.append_flush_length(state, BUFFER_TYPE_AGGREGATED, n_aggregated);
            }
            if n_non_aggregated > 0 {
                self.append_flush_length(state, BUFFER_TYPE_NON_AGGREGATED, n_non_aggregated);
            }
        }
        handles
    }

    fn append_flush_length(&self, state: &mut State, buffer_type: &str, count: usize) {
        let observation = Observation::new(FLUSH_LENGTH_METRIC, count as f64)
            .with_tag(BUFFER_TYPE_TAG_KEY, buffer_type)
            .with_aggregations(["avg"])
            .with_frequency(10);
        // self-stats are never sampled out
        match self
            .formatter
            .format_unsampled(MetricKind::Custom, &observation)
        {
            Ok(line) => {
                if let Err(e) = state.store.append(line) {
                    warn!("Dropping {}: {}", FLUSH_LENGTH_METRIC, e);
                }
            }
            Err(e) => warn!("Dropping {}: {}", FLUSH_LENGTH_METRIC, e),
        }
    }
}

fn pre_aggregated(
    name: &str,
    value: f64,
    function: &str,
    frequency: u64,
    tags: SortedTags,
) -> Observation {
    Observation::new(name, value)
        .with_tags(tags)
        .with_aggregations([function])
        .with_frequency(frequency)
}

/// Waits for the given send handles, for callers that need delivery to have been attempted.
#[cfg(test)]
pub(crate) async fn join_sends(handles: Vec<JoinHandle<()>>, limit: std::time::Duration) {
    for handle in handles {
        let _ = tokio::time::timeout(limit, handle).await;
    }
}
