//! Ingest server: accepts the upstream ingester's TCP connections,
//! decodes frames, stamps arrival time, and publishes onto the bus
//! (spec.md §4.4), grounded in
//! `original_source/services/processor/processor.py::handle_client` and
//! `services/forwarder::status_http`'s accept-loop-then-per-connection-task
//! shape (`tokio::spawn` per connection).

use crate::bus::Bus;
use crate::error::FramingError;
use crate::event::{self, Event};
use crate::framing::read_frame;
use crate::recorder::Recorder;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Bind `addr` and accept connections until the process is told to
/// shut down. Each connection is handled on its own task so one slow
/// or misbehaving ingester never blocks another.
pub async fn serve(addr: SocketAddr, bus: Bus, recorder: Option<Recorder>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ingest server listening");
    serve_on(listener, bus, recorder).await
}

/// Accept loop over an already-bound listener. Split out from [`serve`]
/// so tests can bind an ephemeral port, read back its address, and only
/// then start accepting, without duplicating the per-connection logic.
pub async fn serve_on(
    listener: TcpListener,
    bus: Bus,
    recorder: Option<Recorder>,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let bus = bus.clone();
        let recorder = recorder.clone();
        tokio::spawn(async move {
            tracing::info!(%peer, "client connected");
            handle_connection(stream, &bus, recorder.as_ref()).await;
            tracing::info!(%peer, "client disconnected");
        });
    }
}

/// Service one accepted connection until EOF/reset or a fatal I/O
/// error. Oversized frames and malformed JSON are logged and the loop
/// continues on the same connection (spec.md §4.1/§7); EOF and
/// connection-reset close silently.
async fn handle_connection(mut stream: TcpStream, bus: &Bus, recorder: Option<&Recorder>) {
    loop {
        let payload = match read_frame(&mut stream).await {
            Ok(payload) => payload,
            Err(FramingError::Eof) => return,
            Err(FramingError::TooLarge { len, max }) => {
                tracing::warn!(len, max, "frame too large, continuing on same connection");
                continue;
            }
            Err(FramingError::Io(e)) => {
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
                ) {
                    return;
                }
                tracing::error!(error = %e, "ingest connection error");
                return;
            }
        };

        let Some(mut event) = event::parse(&payload) else {
            tracing::warn!("dropping non-object or malformed JSON payload");
            continue;
        };

        stamp_recv_ts(&mut event);

        if let Some(recorder) = recorder {
            recorder.record(&event);
        }

        bus.publish(event);
    }
}

/// Set `recv_ts_ms` to the current wall-clock time if the event doesn't
/// already carry one (spec.md §4.4 step 3).
fn stamp_recv_ts(event: &mut Event) {
    if !event.contains_key("recv_ts_ms") {
        event.insert("recv_ts_ms".into(), serde_json::json!(now_ms()));
    }
}
