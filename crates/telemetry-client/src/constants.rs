// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Namespace prepended to every metric name when none is configured.
pub const DEFAULT_NAMESPACE: &str = "application";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_UDP_PORT: u16 = 8125;
pub const DEFAULT_API_PORT: u16 = 443;

/// Request timeout for the HTTP transport, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Period of the flush timer, in milliseconds.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 3_000;

/// Number of buffered lines that triggers an immediate flush.
pub const DEFAULT_FLUSH_SIZE: usize = 1_000;

/// Sample rate that keeps every observation.
pub const MAX_SAMPLE_RATE: f64 = 100.0;

/// Upper bound on distinct (function, frequency) buckets held by one client.
pub const MAX_AGGREGATION_BUCKETS: usize = 1_024;

/// Path under the collector base URL that receives metric lines.
pub const METRICS_PATH: &str = "/metrics";

/// Header carrying the API token on every request.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

pub const USER_AGENT: &str = concat!("telemetry-client/", env!("CARGO_PKG_VERSION"));

/// Tag key used for the configured application name.
pub const APP_TAG_KEY: &str = "app";

// Self-stats
pub const FLUSH_LENGTH_METRIC: &str = "buffer.flush_length";
pub const EVENT_LOOP_LAG_METRIC: &str = "event_loop.lag";
pub const BUFFER_TYPE_TAG_KEY: &str = "buffer_type";
pub const BUFFER_TYPE_AGGREGATED: &str = "aggregated";
pub const BUFFER_TYPE_NON_AGGREGATED: &str = "non_aggregated";
