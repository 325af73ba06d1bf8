//! # Esox WorkBroker
//!
//! Work-distribution broker: producers feed named pools of work items,
//! competing consumer sessions claim them in bounded batches, and a single
//! elected session at a time gates pool growth through a watermark.
//!
//! ## Features
//!
//! - Intrusive multi-list membership: one object can sit in the global
//!   queue, its group's queue and a session's held list at once, with O(1)
//!   insert and removal in each
//! - Group-affine batching: the oldest object fixes a batch's group, the rest
//!   of the batch comes from that group
//! - No double claims; everything a session holds returns to the queue when
//!   it ends
//! - Level-triggered readiness signals re-derived on every unlock
//! - Watermark ("mark") protocol with one marker per pool
//! - Reference-counted pool registry
//! - JSON messages over WebSocket (`/ws?pool=..&limit=..`)
//! - Pool metrics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_workbroker::{Instance, Session};
//! use std::sync::Arc;
//!
//! let instance = Arc::new(Instance::new());
//! let producer = Session::new(Arc::clone(&instance), "jobs", 0);
//! producer.queue("g1", &["x1".to_string(), "x2".to_string()]);
//!
//! let mut consumer = Session::new(Arc::clone(&instance), "jobs", 2);
//! assert_eq!(consumer.dequeue(), vec!["x1", "x2"]);
//!
//! // Claims go back to the pool when the consumer goes away
//! drop(consumer);
//! assert_eq!(producer.pool().lock().queued_len(), 2);
//! ```

mod object;
mod list;
mod set;
mod grouped;
mod pool;
mod instance;
mod session;
mod message;
mod transport;
mod config;
mod metrics;
mod errors;

pub use object::{ListIndex, Object, ObjectAnchor, ObjectKey, ObjectStore};
pub use list::{Iter as ObjectListIter, ObjectList};
pub use set::ObjectSet;
pub use grouped::GroupedObjectList;
pub use pool::{ObjectPool, PoolGuard, PoolState};
pub use instance::Instance;
pub use session::{Session, SessionHandle, SessionId};
pub use message::{Command, Event, JoinRequest, decode_command, encode_event};
pub use transport::{CommandSource, EventSink, WebSocketSink, WebSocketSource, router, serve, serve_connection};
pub use config::BrokerConfiguration;
pub use metrics::PoolMetrics;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use errors::{BrokerError, BrokerResult};
