// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered telemetry emission client.
//!
//! Application code records counters, gauges, timers and custom metrics through a
//! [`client::Client`]. Observations are rendered into wire lines, buffered in memory and
//! shipped to a collector either as raw UDP datagrams or as batched HTTP `PUT` requests.
//! A flush happens when the buffered line count reaches the configured size, on every tick
//! of the flush interval, or on demand.
//!
//! Delivery is fire-and-forget: nothing that happens while flushing is ever reported back
//! to the code that recorded the metric.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod client;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flusher;
pub mod formatter;
pub mod metric;
pub mod scheduler;
pub mod transport;
pub mod util;
