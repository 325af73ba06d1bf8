//! Connection plumbing between WebSocket clients and sessions
//!
//! Clients connect to `/ws`, naming the pool and claim budget in the query
//! string (`/ws?pool=jobs&limit=10`). A connection is then a pair of halves:
//! a [`CommandSource`] yielding raw inbound frames and an [`EventSink`]
//! accepting outbound events. Reads and writes run concurrently so a slow
//! writer never stalls command intake.

use crate::config::BrokerConfiguration;
use crate::errors::{BrokerError, BrokerResult};
use crate::instance::Instance;
use crate::message::{Command, Event, JoinRequest, decode_command, encode_event};
use crate::session::Session;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, debug, info, info_span, warn};

/// Inbound half of a connection
#[async_trait]
pub trait CommandSource: Send {
    /// Next raw frame; `None` once the peer has closed the connection.
    ///
    /// Must be cancel safe: dropping the future loses no frame.
    async fn next_frame(&mut self) -> BrokerResult<Option<Vec<u8>>>;
}

/// Outbound half of a connection
#[async_trait]
pub trait EventSink: Send {
    async fn send_event(&mut self, event: &Event) -> BrokerResult<()>;
}

/// Frames read from the receiving half of a WebSocket
pub struct WebSocketSource {
    stream: SplitStream<WebSocket>,
}

impl WebSocketSource {
    pub fn new(stream: SplitStream<WebSocket>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl CommandSource for WebSocketSource {
    async fn next_frame(&mut self) -> BrokerResult<Option<Vec<u8>>> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(text.into_bytes())),
                Message::Binary(data) => return Ok(Some(data)),
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
        Ok(None)
    }
}

/// Events written as text frames to the sending half of a WebSocket
pub struct WebSocketSink {
    sink: SplitSink<WebSocket, Message>,
}

impl WebSocketSink {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl EventSink for WebSocketSink {
    async fn send_event(&mut self, event: &Event) -> BrokerResult<()> {
        let frame = encode_event(event)?;
        self.sink.send(Message::Text(frame)).await?;
        Ok(())
    }
}

/// Run one connection to completion.
///
/// Returns `Ok` when the peer closes the connection; malformed input and
/// transport failures end it with an error. Either way the session is torn
/// down before this returns, so its claims are back in the pool.
pub async fn serve_connection<S, K>(
    instance: Arc<Instance>,
    join: JoinRequest,
    mut source: S,
    mut sink: K,
    config: &BrokerConfiguration,
) -> BrokerResult<()>
where
    S: CommandSource,
    K: EventSink,
{
    let pool = join.pool.unwrap_or_else(|| config.default_pool.clone());
    let limit = config.effective_limit(join.limit);
    info!(pool = %pool, limit, "connection joined");

    let mut session = Session::start(instance, &pool, limit, config);
    let commands = session.commands.clone();
    let result = tokio::select! {
        result = pump_commands(&mut source, &commands) => result,
        result = pump_events(&mut session.events, &mut sink) => result,
    };
    drop(commands);

    session.cancel();
    session.join().await?;
    result
}

async fn pump_commands<S: CommandSource>(
    source: &mut S,
    commands: &mpsc::Sender<Command>,
) -> BrokerResult<()> {
    while let Some(frame) = source.next_frame().await? {
        let command = decode_command(&frame)?;
        commands
            .send(command)
            .await
            .map_err(|_| BrokerError::SessionEnded)?;
    }
    debug!("peer closed connection");
    Ok(())
}

async fn pump_events<K: EventSink>(
    events: &mut mpsc::Receiver<Event>,
    sink: &mut K,
) -> BrokerResult<()> {
    while let Some(event) = events.recv().await {
        sink.send_event(&event).await?;
    }
    Err(BrokerError::SessionEnded)
}

/// Shared state of the HTTP router
#[derive(Clone)]
struct BrokerState {
    instance: Arc<Instance>,
    config: Arc<BrokerConfiguration>,
}

/// Router exposing the `/ws` endpoint
pub fn router(instance: Arc<Instance>, config: Arc<BrokerConfiguration>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(BrokerState { instance, config })
}

/// Serve the broker on `listener` until it fails.
pub async fn serve(
    instance: Arc<Instance>,
    listener: TcpListener,
    config: Arc<BrokerConfiguration>,
) -> BrokerResult<()> {
    info!(addr = %listener.local_addr()?, "broker listening");
    axum::serve(listener, router(instance, config)).await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(join): Query<JoinRequest>,
    State(state): State<BrokerState>,
) -> impl IntoResponse {
    let span = info_span!("connection", pool = join.pool.as_deref().unwrap_or_default());
    ws.on_upgrade(move |socket| handle_socket(socket, join, state).instrument(span))
}

async fn handle_socket(socket: WebSocket, join: JoinRequest, state: BrokerState) {
    let (sink, stream) = socket.split();
    let source = WebSocketSource::new(stream);
    let sink = WebSocketSink::new(sink);
    match serve_connection(state.instance, join, source, sink, &state.config).await {
        Ok(()) => info!("connection closed"),
        Err(e) => warn!(error = %e, "connection dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;
    use std::time::Duration;
    use tokio::time::timeout;

    /// In-memory connection half fed by the test
    struct ChannelSource(mpsc::Receiver<Vec<u8>>);

    #[async_trait]
    impl CommandSource for ChannelSource {
        async fn next_frame(&mut self) -> BrokerResult<Option<Vec<u8>>> {
            Ok(self.0.recv().await)
        }
    }

    struct ChannelSink(mpsc::Sender<Event>);

    #[async_trait]
    impl EventSink for ChannelSink {
        async fn send_event(&mut self, event: &Event) -> BrokerResult<()> {
            self.0
                .send(event.clone())
                .await
                .map_err(|_| BrokerError::ConnectionClosed)
        }
    }

    struct Client {
        frames: mpsc::Sender<Vec<u8>>,
        events: mpsc::Receiver<Event>,
    }

    impl Client {
        async fn send(&self, frame: &str) {
            self.frames.send(frame.as_bytes().to_vec()).await.unwrap();
        }

        async fn recv(&mut self) -> Event {
            timeout(Duration::from_secs(5), self.events.recv())
                .await
                .unwrap()
                .unwrap()
        }
    }

    fn connect(
        instance: &Arc<Instance>,
        join: JoinRequest,
        config: BrokerConfiguration,
    ) -> (Client, tokio::task::JoinHandle<BrokerResult<()>>) {
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let instance = Arc::clone(instance);
        let task = tokio::spawn(async move {
            serve_connection(
                instance,
                join,
                ChannelSource(frame_rx),
                ChannelSink(event_tx),
                &config,
            )
            .await
        });
        let client = Client {
            frames: frame_tx,
            events: event_rx,
        };
        (client, task)
    }

    fn join(pool: &str, limit: usize) -> JoinRequest {
        JoinRequest {
            pool: Some(pool.to_string()),
            limit: Some(limit),
        }
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_join_from_query_string() {
        let uri: Uri = "/ws?pool=jobs&limit=4".parse().unwrap();
        let Query(join) = Query::<JoinRequest>::try_from_uri(&uri).unwrap();
        assert_eq!(join.pool.as_deref(), Some("jobs"));
        assert_eq!(join.limit, Some(4));

        let uri: Uri = "/ws".parse().unwrap();
        let Query(join) = Query::<JoinRequest>::try_from_uri(&uri).unwrap();
        assert_eq!(join, JoinRequest::default());

        let uri: Uri = "/ws?limit=many".parse().unwrap();
        assert!(Query::<JoinRequest>::try_from_uri(&uri).is_err());
    }

    #[tokio::test]
    async fn test_commands_and_events_round_trip() {
        let instance = Arc::new(Instance::new());
        let (mut client, task) = connect(&instance, join("jobs", 2), BrokerConfiguration::default());

        assert_eq!(client.recv().await, Event::Load { size: 0 });
        client
            .send(r#"{"type":"queue","group":"g","objects":["a","b","c"]}"#)
            .await;
        assert_eq!(
            client.recv().await,
            Event::Claim {
                objects: strings(&["a", "b"]),
            }
        );
        assert_eq!(instance.metrics("jobs").map(|m| m.claimed_objects), Some(2));

        drop(client);
        task.await.unwrap().unwrap();

        assert!(instance.get("jobs").is_none());
    }

    #[tokio::test]
    async fn test_malformed_command_tears_down_session() {
        let instance = Arc::new(Instance::new());
        let keeper = instance.ref_pool("test");
        let (mut client, task) = connect(
            &instance,
            JoinRequest::default(),
            BrokerConfiguration::default(),
        );

        assert_eq!(client.recv().await, Event::Load { size: 0 });
        client
            .send(r#"{"type":"queue","group":"g","objects":["a"]}"#)
            .await;
        assert_eq!(
            client.recv().await,
            Event::Claim {
                objects: strings(&["a"]),
            }
        );

        client.send(r#"{"type":"explode"}"#).await;
        let result = task.await.unwrap();
        assert!(matches!(result, Err(BrokerError::MalformedCommand(_))));

        let state = keeper.lock();
        assert_eq!(state.queued_ids(), vec!["a"]);
        assert_eq!(state.marker(), None);
        drop(state);
        assert_eq!(keeper.references(), 1);
    }

    #[tokio::test]
    async fn test_join_limit_is_clamped() {
        let instance = Arc::new(Instance::new());
        let config = BrokerConfiguration::new().with_max_claim_limit(1);
        let producer = instance.ref_pool("jobs");
        {
            let mut state = producer.lock();
            state.queue("a", "g");
            state.queue("b", "g");
        }
        let (mut client, task) = connect(&instance, join("jobs", 50), config);

        assert_eq!(
            client.recv().await,
            Event::Claim {
                objects: strings(&["a"]),
            }
        );

        drop(client);
        task.await.unwrap().unwrap();
        assert_eq!(producer.lock().queued_ids(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_closed_sink_ends_connection() {
        let instance = Arc::new(Instance::new());
        let producer = instance.ref_pool("jobs");
        producer.lock().queue("a", "g");
        let (client, task) = connect(&instance, join("jobs", 1), BrokerConfiguration::default());

        let Client { frames, events } = client;
        drop(events);
        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(BrokerError::ConnectionClosed | BrokerError::SessionEnded)
        ));
        drop(frames);

        assert_eq!(producer.lock().queued_ids(), vec!["a"]);
        assert_eq!(producer.references(), 1);
    }
}
