// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that make a client unusable. These are the only errors a caller ever sees.
#[derive(Debug, thiserror::Error)]
pub enum Creation {
    #[error("the api transport requires a token")]
    MissingToken,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to open UDP socket: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Invalid value for header {0}")]
    InvalidHeader(&'static str),

    #[error("Client must be created inside a Tokio runtime")]
    NoRuntime,
}

/// Reasons an observation is dropped before it reaches a buffer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("metric name is empty")]
    EmptyName,

    #[error("metric name '{0}' contains whitespace, ',' or '='")]
    InvalidName(String),

    #[error("metric value {0} is not finite")]
    NonFiniteValue(f64),

    #[error("timestamp {0} is negative")]
    NegativeTimestamp(i64),

    #[error("invalid tag '{0}': keys and values must be non-empty without whitespace, ',' or '='")]
    InvalidTag(String),

    #[error("invalid aggregation function '{0}'")]
    InvalidAggregation(String),

    #[error("unsupported frequency {0}, expected one of 10, 30, 60, 120, 180, 300")]
    UnsupportedFrequency(u64),

    #[error("pre-aggregated metrics require exactly one aggregation function")]
    MissingAggregation,

    #[error("pre-aggregated metrics require a frequency")]
    MissingFrequency,
}

/// Errors raised by the buffer store.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Insert {
    #[error("aggregation bucket limit of {0} reached")]
    Overflow(usize),
}
