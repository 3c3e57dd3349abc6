//! Live tick stream.
//!
//! A background listener reads messages from a [`MessageSource`], parses
//! them into [`Tick`]s, appends them to a bounded [`TickBuffer`] and notifies
//! subscribers in registration order. There are no delivery guarantees:
//! malformed messages are logged and dropped, and the buffer evicts the
//! oldest tick once full.

use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::provider::DataError;

/// One real-time market update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub volume: u64,
    /// Receive time, not exchange time.
    pub timestamp: DateTime<Utc>,
    pub change: f64,
    pub change_percent: f64,
}

impl Tick {
    /// Parse a JSON message. Missing fields default to zero (or
    /// `default_symbol`); numbers may also arrive as strings.
    pub fn parse(message: &str, default_symbol: &str) -> Result<Self, DataError> {
        let value: Value = serde_json::from_str(message)
            .map_err(|e| DataError::ResponseFormatChanged(format!("tick is not JSON: {e}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| DataError::ResponseFormatChanged("tick is not an object".into()))?;

        let symbol = match object.get("symbol") {
            Some(Value::String(s)) => s.clone(),
            _ => default_symbol.to_string(),
        };
        let volume = number(object.get("volume"), "volume")?;
        if volume < 0.0 {
            return Err(DataError::ResponseFormatChanged(format!(
                "negative volume {volume}"
            )));
        }

        Ok(Self {
            symbol,
            price: number(object.get("price"), "price")?,
            volume: volume as u64,
            timestamp: Utc::now(),
            change: number(object.get("change"), "change")?,
            change_percent: number(object.get("change_percent"), "change_percent")?,
        })
    }
}

fn number(value: Option<&Value>, field: &str) -> Result<f64, DataError> {
    let parsed = match value {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("bad tick field '{field}'")))
}

/// Fixed-capacity tick buffer. Pushing into a full buffer evicts the oldest.
#[derive(Debug, Clone)]
pub struct TickBuffer {
    ticks: VecDeque<Tick>,
    capacity: usize,
    evicted: u64,
}

impl TickBuffer {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ticks: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, tick: Tick) {
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
            self.evicted += 1;
        }
        self.ticks.push_back(tick);
    }

    pub fn latest(&self) -> Option<&Tick> {
        self.ticks.back()
    }

    /// Up to `count` most recent ticks, oldest first.
    pub fn recent(&self, count: usize) -> Vec<Tick> {
        let skip = self.ticks.len().saturating_sub(count);
        self.ticks.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ticks dropped by eviction since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type TickHandler = Box<dyn FnMut(&Tick) + Send>;

/// Observers called synchronously, in registration order, for every tick.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, TickHandler)>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: TickHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, handler));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn notify(&mut self, tick: &Tick) {
        for (_, handler) in &mut self.subscribers {
            handler(tick);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// What a source produced on one read.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Message(String),
    /// Nothing arrived before the read timeout.
    Idle,
    Closed,
}

/// A connection that yields raw text messages.
pub trait MessageSource: Send {
    /// Connect and subscribe to `symbol`.
    fn open(&mut self, symbol: &str) -> Result<(), DataError>;

    fn next_event(&mut self) -> Result<SourceEvent, DataError>;

    fn close(&mut self);
}

struct Shared {
    symbol: String,
    buffer: Mutex<TickBuffer>,
    registry: Mutex<SubscriberRegistry>,
    running: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tick buffer plus subscribers for one symbol. Cheap to clone; clones share
/// state.
///
/// Handlers run on the listener thread while the registry lock is held, so
/// they must not subscribe or unsubscribe from inside the callback.
#[derive(Clone)]
pub struct TickStream {
    shared: Arc<Shared>,
}

impl TickStream {
    pub fn new(symbol: impl Into<String>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                symbol: symbol.into(),
                buffer: Mutex::new(TickBuffer::new(capacity)),
                registry: Mutex::new(SubscriberRegistry::new()),
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.shared.symbol
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: FnMut(&Tick) + Send + 'static,
    {
        lock(&self.shared.registry).subscribe(Box::new(handler))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.shared.registry).unsubscribe(id)
    }

    /// Parse one message, buffer it, then notify subscribers.
    pub fn ingest(&self, message: &str) -> Result<Tick, DataError> {
        let tick = Tick::parse(message, &self.shared.symbol)?;
        lock(&self.shared.buffer).push(tick.clone());
        lock(&self.shared.registry).notify(&tick);
        Ok(tick)
    }

    pub fn latest(&self) -> Option<Tick> {
        lock(&self.shared.buffer).latest().cloned()
    }

    pub fn recent(&self, count: usize) -> Vec<Tick> {
        lock(&self.shared.buffer).recent(count)
    }

    pub fn buffered(&self) -> usize {
        lock(&self.shared.buffer).len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Run `source` on a background thread until it closes, fails, or
    /// [`stop`](Self::stop) is called. A source blocked in a read notices
    /// the stop at its next event.
    pub fn spawn_listener<S>(&self, mut source: S) -> Result<JoinHandle<()>, DataError>
    where
        S: MessageSource + 'static,
    {
        self.shared.running.store(true, Ordering::SeqCst);
        let stream = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("ticks-{}", self.shared.symbol))
            .spawn(move || {
                stream.listen(&mut source);
                source.close();
                stream.shared.running.store(false, Ordering::SeqCst);
            });
        spawned.map_err(|e| {
            self.shared.running.store(false, Ordering::SeqCst);
            DataError::Io(e)
        })
    }

    fn listen(&self, source: &mut dyn MessageSource) {
        if let Err(e) = source.open(&self.shared.symbol) {
            warn!(symbol = %self.shared.symbol, error = %e, "stream open failed");
            return;
        }
        info!(symbol = %self.shared.symbol, "stream opened");

        while self.is_running() {
            match source.next_event() {
                Ok(SourceEvent::Message(text)) => {
                    if let Err(e) = self.ingest(&text) {
                        warn!(error = %e, "dropped stream message");
                    }
                }
                Ok(SourceEvent::Idle) => {}
                Ok(SourceEvent::Closed) => {
                    info!(symbol = %self.shared.symbol, "stream closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(symbol = %self.shared.symbol, error = %e, "stream error");
                    break;
                }
            }
        }
    }

    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

/// WebSocket source speaking the `{"action":"subscribe","symbols":..}`
/// protocol.
pub struct WebSocketSource {
    url: String,
    read_timeout: Duration,
    socket: Option<WebSocket<MaybeTlsStream<TcpStream>>>,
}

impl WebSocketSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            read_timeout: Duration::from_millis(500),
            socket: None,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    fn set_read_timeout(socket: &WebSocket<MaybeTlsStream<TcpStream>>, timeout: Duration) {
        let result = match socket.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp.set_read_timeout(Some(timeout)),
            MaybeTlsStream::NativeTls(tls) => tls.get_ref().set_read_timeout(Some(timeout)),
            _ => Ok(()),
        };
        if let Err(e) = result {
            debug!(error = %e, "could not set socket read timeout");
        }
    }
}

impl MessageSource for WebSocketSource {
    fn open(&mut self, symbol: &str) -> Result<(), DataError> {
        let (mut socket, _response) = tungstenite::connect(self.url.as_str())
            .map_err(|e| DataError::WebSocket(e.to_string()))?;
        Self::set_read_timeout(&socket, self.read_timeout);

        let subscribe = serde_json::json!({ "action": "subscribe", "symbols": symbol });
        socket
            .send(Message::Text(subscribe.to_string()))
            .map_err(|e| DataError::WebSocket(e.to_string()))?;
        self.socket = Some(socket);
        Ok(())
    }

    fn next_event(&mut self) -> Result<SourceEvent, DataError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(SourceEvent::Closed);
        };
        match socket.read() {
            Ok(Message::Text(text)) => Ok(SourceEvent::Message(text)),
            Ok(Message::Binary(bytes)) => String::from_utf8(bytes)
                .map(SourceEvent::Message)
                .map_err(|e| DataError::WebSocket(format!("binary frame is not UTF-8: {e}"))),
            Ok(Message::Close(_)) => Ok(SourceEvent::Closed),
            Ok(_) => Ok(SourceEvent::Idle),
            Err(tungstenite::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                Ok(SourceEvent::Idle)
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(SourceEvent::Closed)
            }
            Err(e) => Err(DataError::WebSocket(e.to_string())),
        }
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None) {
                debug!(error = %e, "websocket close");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn tick(price: f64) -> Tick {
        Tick {
            symbol: "AAPL".into(),
            price,
            volume: 1,
            timestamp: Utc::now(),
            change: 0.0,
            change_percent: 0.0,
        }
    }

    struct Scripted {
        events: VecDeque<SourceEvent>,
    }

    impl MessageSource for Scripted {
        fn open(&mut self, _symbol: &str) -> Result<(), DataError> {
            Ok(())
        }

        fn next_event(&mut self) -> Result<SourceEvent, DataError> {
            Ok(self.events.pop_front().unwrap_or(SourceEvent::Closed))
        }

        fn close(&mut self) {}
    }

    #[test]
    fn buffer_evicts_oldest() {
        let mut buffer = TickBuffer::new(3);
        for p in 1..=5 {
            buffer.push(tick(p as f64));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.evicted(), 2);
        assert_eq!(buffer.latest().unwrap().price, 5.0);
        let prices: Vec<f64> = buffer.recent(10).iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![3.0, 4.0, 5.0]);
        assert_eq!(buffer.recent(2)[0].price, 4.0);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut buffer = TickBuffer::new(0);
        buffer.push(tick(1.0));
        buffer.push(tick(2.0));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.recent(5).len(), 1);
    }

    #[test]
    fn parse_is_lenient() {
        let t = Tick::parse(r#"{"price":"101.5","volume":20,"change":-0.5}"#, "MSFT").unwrap();
        assert_eq!(t.symbol, "MSFT");
        assert_eq!(t.price, 101.5);
        assert_eq!(t.volume, 20);
        assert_eq!(t.change, -0.5);
        assert_eq!(t.change_percent, 0.0);

        assert!(Tick::parse("not json", "X").is_err());
        assert!(Tick::parse(r#"{"price":"abc"}"#, "X").is_err());
        assert!(Tick::parse("[1,2]", "X").is_err());
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let (tx, rx) = mpsc::channel();
        let mut registry = SubscriberRegistry::new();
        for name in ["a", "b", "c"] {
            let tx = tx.clone();
            registry.subscribe(Box::new(move |_: &Tick| tx.send(name).unwrap()));
        }
        registry.notify(&tick(1.0));
        let order: Vec<&str> = rx.try_iter().collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let stream = TickStream::new("AAPL", 8);
        let (tx, rx) = mpsc::channel();
        let id = stream.subscribe(move |t| tx.send(t.price).unwrap());
        stream.ingest(r#"{"price":1}"#).unwrap();
        assert!(stream.unsubscribe(id));
        assert!(!stream.unsubscribe(id));
        stream.ingest(r#"{"price":2}"#).unwrap();

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1.0]);
        assert_eq!(stream.buffered(), 2);
        assert_eq!(stream.latest().unwrap().price, 2.0);
    }

    #[test]
    fn listener_drains_source_and_skips_bad_messages() {
        let stream = TickStream::new("AAPL", 2);
        let (tx, rx) = mpsc::channel();
        stream.subscribe(move |t| tx.send(t.price).unwrap());

        let source = Scripted {
            events: VecDeque::from(vec![
                SourceEvent::Message(r#"{"price":10}"#.into()),
                SourceEvent::Idle,
                SourceEvent::Message("garbage".into()),
                SourceEvent::Message(r#"{"price":11}"#.into()),
                SourceEvent::Message(r#"{"price":12}"#.into()),
            ]),
        };
        let handle = stream.spawn_listener(source).unwrap();
        handle.join().unwrap();

        assert!(!stream.is_running());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![10.0, 11.0, 12.0]);
        let prices: Vec<f64> = stream.recent(5).iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![11.0, 12.0]);
    }

    #[test]
    fn stop_before_events_ingests_nothing() {
        struct Endless;
        impl MessageSource for Endless {
            fn open(&mut self, _symbol: &str) -> Result<(), DataError> {
                std::thread::sleep(Duration::from_millis(20));
                Ok(())
            }
            fn next_event(&mut self) -> Result<SourceEvent, DataError> {
                std::thread::sleep(Duration::from_millis(1));
                Ok(SourceEvent::Idle)
            }
            fn close(&mut self) {}
        }

        let stream = TickStream::new("AAPL", 4);
        let handle = stream.spawn_listener(Endless).unwrap();
        stream.stop();
        handle.join().unwrap();
        assert!(!stream.is_running());
        assert_eq!(stream.buffered(), 0);
    }
}
