//! Per-connection task: framing, the read loop and the writer task.

use crate::config::ServerConfig;
use crate::directory::ConnectionHandle;
use crate::error::{Result, ServerError};
use crate::lobby::{ConnectionState, Flow, Lobby};
use crate::protocol::Envelope;
use futures::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, instrument, warn};

/// How long the writer may keep flushing after the reader has finished.
const WRITER_DRAIN: Duration = Duration::from_secs(5);

/// Serves one client until it quits, disconnects or idles out.
///
/// Inbound lines are handled strictly one at a time. Outbound envelopes go
/// through a bounded queue drained by a dedicated writer task, which is the
/// only writer to the stream; a failed write ends the connection like a failed
/// read. Disconnect cleanup runs exactly once on exit.
#[instrument(skip_all, fields(connection_id))]
pub async fn handle_connection<S>(stream: S, lobby: Lobby, config: Arc<ServerConfig>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let framed = Framed::new(
        stream,
        LinesCodec::new_with_max_length(*config.max_line_length()),
    );
    let (mut sink, mut lines) = framed.split();

    let (handle, mut outbox) = ConnectionHandle::channel(*config.outbound_capacity());
    let id = handle.id();
    tracing::Span::current().record("connection_id", tracing::field::display(id));
    info!("Connection opened");

    let mut writer = tokio::spawn(async move {
        while let Some(envelope) = outbox.recv().await {
            let line = match envelope.to_line() {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = sink.send(line).await {
                let e = ServerError::from(e);
                warn!(error = %e, "Write failed");
                break;
            }
        }
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Close after write failed");
        }
    });

    let mut state = ConnectionState::new(handle);
    lobby.welcome(&state).await;

    // The writer only finishes early when the peer can no longer be written to.
    let mut writer_done = false;
    loop {
        let next = tokio::select! {
            next = next_line(&mut lines, config.idle_timeout()) => next,
            _ = &mut writer => {
                writer_done = true;
                warn!("Writer stopped, closing connection");
                break;
            }
        };
        match next {
            Ok(Some(line)) => match Envelope::from_line(&line) {
                Ok(envelope) => {
                    debug!(kind = %envelope.kind, "Received");
                    if lobby.dispatch(&mut state, envelope).await == Flow::Close {
                        info!("Client quit");
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Dropping malformed message"),
            },
            Ok(None) => {
                info!("Peer closed connection");
                break;
            }
            // The framed stream ends after a codec error, so an over-long
            // line closes the connection on the next read.
            Err(e) if e.is_recoverable() => warn!(error = %e, "Dropping unreadable input"),
            Err(e) => {
                warn!(error = %e, "Connection failed");
                break;
            }
        }
    }

    if let Some(user) = state.user() {
        lobby.disconnect(user, id).await;
    }
    drop(state);

    if !writer_done && tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        debug!("Writer still busy, detaching");
    }
    info!("Connection closed");
}

/// Reads the next line, treating a silent peer as disconnected once `idle`
/// has elapsed.
async fn next_line<S>(lines: &mut S, idle: Option<Duration>) -> Result<Option<String>>
where
    S: Stream<Item = std::result::Result<String, LinesCodecError>> + Unpin,
{
    let next = match idle {
        Some(limit) => tokio::time::timeout(limit, lines.next())
            .await
            .map_err(|_| ServerError::transport(format!("Idle for {}s", limit.as_secs())))?,
        None => lines.next().await,
    };
    Ok(next.transpose()?)
}
