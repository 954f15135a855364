/*
 *   Copyright (c) 2025 R3BL LLC
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! TCP listener for display clients.
//!
//! Each accepted connection becomes one hub subscription. Outbound: one JSON
//! envelope per line, UTF-8. Inbound: the channel is bidirectional and lines
//! are read and discarded — clients may send pings or acks, nothing acts on
//! them. Either side closing ends the subscription.

use std::{net::SocketAddr, sync::Arc};

use miette::IntoDiagnostic;
use tokio::{io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
            net::{TcpListener, TcpStream},
            sync::broadcast,
            task::JoinHandle};

use super::hub::{BroadcastHub, EnvelopeRx, SubscriberId};

/// Bind the display listener socket.
///
/// # Errors
///
/// Returns an error when the address cannot be bound.
pub async fn try_bind(listen_addr: SocketAddr) -> miette::Result<TcpListener> {
    let listener = TcpListener::bind(listen_addr).await.into_diagnostic()?;
    tracing::info!(
        message = "Display listener bound",
        listen_addr = %listener.local_addr().into_diagnostic()?,
    );
    Ok(listener)
}

/// Accept connections until `shutdown` fires. Each connection runs as its own
/// pair of reader/writer tasks.
pub fn spawn_accept_loop(
    listener: TcpListener,
    hub: Arc<BroadcastHub>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        handle_connection(stream, peer_addr, hub.clone());
                    }
                    Err(error) => {
                        // % is Display, ? is Debug.
                        tracing::warn!(
                            message = "Failed to accept display connection",
                            error = %error,
                        );
                    }
                },
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!(message = "Display listener stopped");
    })
}

fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, hub: Arc<BroadcastHub>) {
    let (subscriber_id, envelope_rx) = hub.subscribe();
    tracing::debug!(
        message = "Display connection open",
        subscriber = %subscriber_id,
        peer_addr = %peer_addr,
    );

    let (read_half, write_half) = stream.into_split();

    tokio::spawn(write_envelopes(
        BufWriter::new(write_half),
        envelope_rx,
        hub.clone(),
        subscriber_id,
    ));
    tokio::spawn(discard_inbound(
        BufReader::new(read_half),
        hub,
        subscriber_id,
    ));
}

/// Forward serialized envelopes to the peer, newline-delimited. A write
/// failure unsubscribes; an unsubscribe (queue closed) ends the task.
async fn write_envelopes<W>(
    mut writer: BufWriter<W>,
    mut envelope_rx: EnvelopeRx,
    hub: Arc<BroadcastHub>,
    subscriber_id: SubscriberId,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(payload) = envelope_rx.recv().await {
        let write_result = async {
            writer.write_all(payload.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(error) = write_result {
            tracing::debug!(
                message = "Display write failed - dropping subscriber",
                subscriber = %subscriber_id,
                error = %error,
            );
            hub.unsubscribe(subscriber_id);
            return;
        }
    }
}

/// Accept and discard whatever the client sends. EOF or error ends the
/// subscription.
async fn discard_inbound<R>(
    mut reader: BufReader<R>,
    hub: Arc<BroadcastHub>,
    subscriber_id: SubscriberId,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                tracing::trace!(
                    message = "Inbound display message ignored",
                    subscriber = %subscriber_id,
                );
            }
        }
    }
    hub.unsubscribe(subscriber_id);
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use givebox_schema::{DisplayEnvelope, MoneyInsertedData};
    use tokio::io::AsyncBufReadExt;

    use super::*;

    #[tokio::test]
    async fn connected_client_receives_line_delimited_json() {
        let hub = Arc::new(BroadcastHub::new());
        let listener = try_bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let listen_addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let accept_task = spawn_accept_loop(listener, hub.clone(), shutdown_rx);

        let client = TcpStream::connect(listen_addr).await.unwrap();
        // Wait for the accept loop to register the subscription.
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while hub.connection_count() == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        hub.broadcast(&DisplayEnvelope::MoneyInserted(MoneyInsertedData {
            amount_cents: 50,
            total_amount_cents: 50,
            timestamp: Utc::now(),
        }))
        .await;

        let mut lines = BufReader::new(client).lines();
        let line = tokio::time::timeout(std::time::Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let parsed: DisplayEnvelope = serde_json::from_str(&line).unwrap();
        assert!(matches!(parsed, DisplayEnvelope::MoneyInserted(data) if data.amount_cents == 50));

        shutdown_tx.send(()).unwrap();
        accept_task.await.unwrap();
    }

    #[tokio::test]
    async fn disconnecting_client_is_unsubscribed() {
        let hub = Arc::new(BroadcastHub::new());
        let listener = try_bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let listen_addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let accept_task = spawn_accept_loop(listener, hub.clone(), shutdown_rx);

        let client = TcpStream::connect(listen_addr).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while hub.connection_count() == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        drop(client);
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while hub.connection_count() > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        accept_task.await.unwrap();
    }
}
