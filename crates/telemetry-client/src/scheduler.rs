// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::WeakClient;

/// Flushes the client every `period` until `cancel_token` fires or the client is dropped.
///
/// With `system_stats` on, each tick first records how late it fired as the event loop lag.
pub(crate) fn spawn_flush_timer(
    client: WeakClient,
    period: Duration,
    system_stats: bool,
    cancel_token: CancellationToken,
    runtime: &Handle,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut flush_interval = interval(period);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            let scheduled = tokio::select! {
                _ = cancel_token.cancelled() => break,
                scheduled = flush_interval.tick() => scheduled,
            };
            let Some(client) = client.upgrade() else {
                break;
            };
            if system_stats {
                client.record_event_loop_lag(Instant::now().saturating_duration_since(scheduled));
            }
            client.flush();
        }
        debug!("Flush timer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::config::ClientConfig;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn client_for(port: u16, flush_interval: u64, system_stats: bool) -> Client {
        Client::new(ClientConfig {
            host: "127.0.0.1".to_string(),
            port: Some(port),
            system_stats,
            flush_interval,
            ..Default::default()
        })
        .await
        .expect("client")
    }

    #[tokio::test]
    async fn test_tick_records_event_loop_lag() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.expect("bind receiver");
        let port = receiver.local_addr().expect("local addr").port();
        let client = client_for(port, 50, true).await;

        let mut buf = [0; 1024];
        let amt = timeout(Duration::from_secs(1), receiver.recv(&mut buf))
            .await
            .expect("datagram before timeout")
            .expect("datagram");
        let payload = String::from_utf8(buf[..amt].to_vec()).expect("utf8 payload");

        assert!(payload.starts_with("application.event_loop.lag "));
        assert!(payload.ends_with(" avg,max,10"));
        client.close();
    }

    #[tokio::test]
    async fn test_timer_stops_on_cancel() {
        let client = client_for(9, 600_000, false).await;
        let token = CancellationToken::new();
        let handle = spawn_flush_timer(
            client.downgrade(),
            Duration::from_millis(10),
            false,
            token.clone(),
            &Handle::current(),
        );

        token.cancel();
        assert!(timeout(Duration::from_secs(1), handle).await.is_ok());
    }

    #[tokio::test]
    async fn test_timer_stops_when_client_dropped() {
        let client = client_for(9, 600_000, false).await;
        let handle = spawn_flush_timer(
            client.downgrade(),
            Duration::from_millis(10),
            false,
            CancellationToken::new(),
            &Handle::current(),
        );

        drop(client);
        assert!(timeout(Duration::from_secs(1), handle).await.is_ok());
    }
}
