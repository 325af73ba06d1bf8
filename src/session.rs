//! Consumer sessions
//!
//! A session is bound to one pool for its whole life. It claims objects up
//! to its budget, keeps them in a private held list (anchored in the pool's
//! object store, so only touched under the pool lock) and reacts to client
//! commands. Dropping a session returns everything it still holds to the
//! queue, gives up the marker role and unreferences the pool.

use crate::config::BrokerConfiguration;
use crate::errors::{BrokerError, BrokerResult};
use crate::instance::Instance;
use crate::list::ObjectList;
use crate::message::{Command, Event};
use crate::pool::ObjectPool;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Session {
    id: SessionId,
    instance: Arc<Instance>,
    pool_name: String,
    pool: Arc<ObjectPool>,
    held: ObjectList,
    limit_left: usize,
}

impl Session {
    /// Bind a new session to `pool_name` with a claim budget of `limit`
    pub fn new(instance: Arc<Instance>, pool_name: &str, limit: usize) -> Self {
        let pool = instance.ref_pool(pool_name);
        let id = SessionId::next();
        info!(session = %id, pool = pool_name, limit, "session started");
        Self {
            id,
            instance,
            pool_name: pool_name.to_string(),
            pool,
            held: ObjectList::new(),
            limit_left: limit,
        }
    }

    /// Bind a session and run its control loop on the tokio runtime
    pub fn start(
        instance: Arc<Instance>,
        pool_name: &str,
        limit: usize,
        config: &BrokerConfiguration,
    ) -> SessionHandle {
        let session = Session::new(instance, pool_name, limit);
        let id = session.id;
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let cancel = Arc::new(Notify::new());

        let span = info_span!("session", session = %id, pool = pool_name);
        let task = tokio::spawn(
            session
                .run(command_rx, event_tx, Arc::clone(&cancel))
                .instrument(span),
        );

        SessionHandle {
            id,
            commands: command_tx,
            events: event_rx,
            cancel,
            task,
        }
    }

    /// Control loop; returns on cancellation, when the command channel
    /// closes, or when nobody receives events any more.
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        events: mpsc::Sender<Event>,
        cancel: Arc<Notify>,
    ) {
        let mut queue_ready = self.pool.queue_ready();
        let mut mark_ready = self.pool.mark_ready();

        loop {
            let mut await_queue = false;
            if self.limit_left > 0 {
                let ids = self.dequeue();
                if !ids.is_empty() && events.send(Event::Claim { objects: ids }).await.is_err() {
                    debug!("event receiver gone");
                    break;
                }
                await_queue = self.limit_left > 0;
            }

            if let Some(size) = self.try_claim_marker() {
                if events.send(Event::Load { size }).await.is_err() {
                    debug!("event receiver gone");
                    break;
                }
            }

            tokio::select! {
                _ = cancel.notified() => {
                    debug!("session cancelled");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.dispatch(command),
                    None => {
                        debug!("command channel closed");
                        break;
                    }
                },
                _ = armed(&mut mark_ready) => {}
                _ = armed(&mut queue_ready), if await_queue => {}
            }
        }
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::Queue { group, objects } => {
                let queued = self.queue(&group, &objects);
                debug!(group = %group, requested = objects.len(), queued = queued.len(), "queue");
            }
            Command::Requeue { objects } => {
                let count = self.requeue(&objects);
                debug!(requested = objects.len(), count, "requeue");
            }
            Command::Release { objects } => {
                let count = self.release(&objects);
                debug!(requested = objects.len(), count, "release");
            }
            Command::Mark { size } => {
                let accepted = self.mark(size);
                debug!(size, accepted, "mark");
            }
        }
    }

    /// Queue `ids` under `group`; returns the ids that were newly queued
    pub fn queue(&self, group: &str, ids: &[String]) -> Vec<String> {
        if ids.is_empty() {
            return Vec::new();
        }
        let mut pool = self.pool.lock();
        ids.iter()
            .filter(|id| pool.queue(id, group))
            .cloned()
            .collect()
    }

    /// Claim a batch sized to the remaining budget; returns the claimed ids
    pub fn dequeue(&mut self) -> Vec<String> {
        let mut pool = self.pool.lock();
        let keys = pool.dequeue(self.limit_left);
        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(object) = pool.object(key) {
                ids.push(object.id().to_string());
            }
            self.held.append(pool.store_mut(), key);
        }
        self.limit_left -= ids.len();
        ids
    }

    /// Return held objects to the queue; ids not held here are skipped
    pub fn requeue(&mut self, ids: &[String]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut pool = self.pool.lock();
        let mut count = 0;
        for id in ids {
            let Some(key) = pool.get(id) else {
                continue;
            };
            if !self.held.remove(pool.store_mut(), key) {
                continue;
            }
            pool.requeue(key);
            self.limit_left += 1;
            count += 1;
        }
        count
    }

    /// Retire held objects; ids not held here are skipped
    pub fn release(&mut self, ids: &[String]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut pool = self.pool.lock();
        let mut count = 0;
        for id in ids {
            let Some(key) = pool.get(id) else {
                continue;
            };
            if !self.held.remove(pool.store_mut(), key) {
                continue;
            }
            pool.release(key);
            self.limit_left += 1;
            count += 1;
        }
        count
    }

    /// Set the pool's watermark if this session is the marker
    pub fn mark(&self, size: usize) -> bool {
        self.pool.lock().set_mark(self.id, size)
    }

    /// Try to become the pool's marker; returns the pool size on success
    pub fn try_claim_marker(&self) -> Option<usize> {
        self.pool.lock().try_claim_marker(self.id)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn pool(&self) -> &Arc<ObjectPool> {
        &self.pool
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn limit_left(&self) -> usize {
        self.limit_left
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// Ids currently held, in claim order
    pub fn held_ids(&self) -> Vec<String> {
        let pool = self.pool.lock();
        self.held
            .iter(pool.store())
            .filter_map(|key| pool.object(key))
            .map(|object| object.id().to_string())
            .collect()
    }

    pub fn holds(&self, id: &str) -> bool {
        let pool = self.pool.lock();
        pool.get(id)
            .is_some_and(|key| self.held.contains(pool.store(), key))
    }

    fn end(&mut self) {
        let returned = {
            let mut pool = self.pool.lock();
            let keys = self.held.move_to_vec(pool.store_mut());
            for key in &keys {
                pool.requeue(*key);
            }
            pool.release_marker(self.id);
            keys.len()
        };
        self.limit_left = 0;
        self.instance.unref_pool(&self.pool_name);
        info!(session = %self.id, pool = %self.pool_name, returned, "session ended");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}

/// Resolves once the signal is armed; pends forever if the pool is gone.
async fn armed(signal: &mut watch::Receiver<bool>) {
    let ready = signal.wait_for(|armed| *armed).await.is_ok();
    if !ready {
        std::future::pending::<()>().await;
    }
}

/// Client side of a running session
pub struct SessionHandle {
    id: SessionId,
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) events: mpsc::Receiver<Event>,
    cancel: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Deliver a command to the session
    pub async fn send(&self, command: Command) -> BrokerResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BrokerError::SessionEnded)
    }

    /// Next outbound event; `None` once the session has ended
    pub async fn recv_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Ask the session to end
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to finish its teardown
    ///
    /// Closes both channels first, so undelivered events are discarded and
    /// a session that was not cancelled ends as if its connection closed.
    pub async fn join(self) -> BrokerResult<()> {
        let SessionHandle {
            commands,
            events,
            task,
            ..
        } = self;
        drop(commands);
        drop(events);
        task.await
            .map_err(|e| BrokerError::TaskFailed(e.to_string()))
    }
}
