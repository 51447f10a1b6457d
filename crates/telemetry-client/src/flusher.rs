// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::buffer::FlushPayload;
use crate::config::TransportKind;
use crate::transport::Transport;

/// Hands flushed buffers to the transport, or logs them in dry-run mode.
pub struct Flusher {
    transport: Transport,
    dry_run: bool,
    runtime: Handle,
}

impl Flusher {
    pub fn new(transport: Transport, dry_run: bool, runtime: Handle) -> Self {
        Flusher {
            transport,
            dry_run,
            runtime,
        }
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Ships a payload already taken out of the buffer store.
    ///
    /// Sends are spawned on the runtime and the returned handles are only useful to
    /// callers that want to wait for them; the flush itself never does.
    pub fn flush(&self, payload: FlushPayload) -> Vec<JoinHandle<()>> {
        let n_non_aggregated = payload.non_aggregated_count();
        let n_aggregated = payload.aggregated_count();

        if self.dry_run {
            log_payload(&payload);
            return Vec::new();
        }

        debug!("Flushing {n_non_aggregated} non-aggregated and {n_aggregated} aggregated lines");
        self.transport.dispatch(payload, &self.runtime)
    }
}

/// Logs one record per line so every line carries the caller's span.
fn log_payload(payload: &FlushPayload) {
    for line in payload.non_aggregated.content().lines() {
        info!("Dry run, non-aggregated metric: {}", line);
    }
    for (key, buffer) in &payload.aggregated {
        for line in buffer.content().lines() {
            info!("Dry run, aggregated metric for {}: {}", key, line);
        }
    }
}
