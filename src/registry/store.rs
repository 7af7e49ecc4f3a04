//! Path registry implementation
//!
//! The central registry that pairs senders with receivers on a path and
//! promotes a rendezvous to an active transfer once both sides are
//! complete.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::entry::{EstablishedPipe, PathEntry, PendingPipe, PendingSender, ReceiverEnd, SenderEnd};
use super::error::RegistryError;
use super::path::RelayPath;

/// Central registry for all rendezvous paths
///
/// Thread-safe via `RwLock`. Registration, withdrawal and promotion are
/// short map operations; streaming happens outside the lock.
pub struct PathRegistry {
    /// Map of path to its pending or established state
    paths: RwLock<HashMap<RelayPath, PathEntry>>,

    /// Participant id generator
    next_participant_id: AtomicU64,
}

impl PathRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self {
            paths: RwLock::new(HashMap::new()),
            next_participant_id: AtomicU64::new(1),
        }
    }

    /// Allocate a participant id
    pub fn next_participant_id(&self) -> u64 {
        self.next_participant_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a sender for a path
    ///
    /// The first arrival on a path fixes the declared receiver count; later
    /// arrivals must match it exactly. On success the sender's status
    /// response carries the waiting line (and the count of receivers
    /// already connected, if any), and the rendezvous is promoted when the
    /// sender completes it.
    pub async fn register_sender(
        self: &Arc<Self>,
        path: RelayPath,
        n_receivers: u32,
        sender: SenderEnd,
    ) -> Result<(), RegistryError> {
        if n_receivers == 0 {
            return Err(RegistryError::InvalidReceiverCount);
        }

        let mut paths = self.paths.write().await;

        match paths.entry(path.clone()) {
            Entry::Occupied(mut occupied) => {
                {
                    let pipe = match occupied.get_mut() {
                        PathEntry::Established => {
                            return Err(RegistryError::PathEstablished(path))
                        }
                        PathEntry::Pending(pipe) => pipe,
                    };

                    if pipe.sender.is_some() {
                        return Err(RegistryError::SenderAlreadyRegistered(path));
                    }
                    if pipe.n_receivers != n_receivers {
                        return Err(RegistryError::ReceiverCountMismatch {
                            expected: pipe.n_receivers,
                            offered: n_receivers,
                        });
                    }

                    greet_sender(&sender, n_receivers, pipe.receivers.len());
                    let abort = self.arm_sender(&path, &sender);

                    tracing::info!(
                        path = %path,
                        id = sender.id,
                        receivers = pipe.receivers.len(),
                        "Sender registered (existing rendezvous)"
                    );

                    pipe.sender = Some(PendingSender { end: sender, abort });
                }

                if let Some(established) = take_established(&path, occupied.get_mut()) {
                    self.spawn_engine(established);
                }
                Ok(())
            }
            Entry::Vacant(vacant) => {
                greet_sender(&sender, n_receivers, 0);
                let abort = self.arm_sender(&path, &sender);

                tracing::info!(
                    path = %path,
                    id = sender.id,
                    n_receivers,
                    "Sender registered (new rendezvous)"
                );

                vacant.insert(PathEntry::Pending(PendingPipe {
                    n_receivers,
                    sender: Some(PendingSender { end: sender, abort }),
                    receivers: Vec::new(),
                }));
                Ok(())
            }
        }
    }

    /// Register a receiver for a path
    ///
    /// Receivers are paired to the sender in arrival order. Returns a
    /// guard that withdraws the receiver if its connection aborts while
    /// the rendezvous is still pending; callers disarm it once the
    /// deferred response resolves.
    pub async fn register_receiver(
        self: &Arc<Self>,
        path: RelayPath,
        n_receivers: u32,
        receiver: ReceiverEnd,
    ) -> Result<AbortGuard, RegistryError> {
        if n_receivers == 0 {
            return Err(RegistryError::InvalidReceiverCount);
        }

        let id = receiver.id;
        let mut paths = self.paths.write().await;

        match paths.entry(path.clone()) {
            Entry::Occupied(mut occupied) => {
                {
                    let pipe = match occupied.get_mut() {
                        PathEntry::Established => {
                            return Err(RegistryError::PathEstablished(path))
                        }
                        PathEntry::Pending(pipe) => pipe,
                    };

                    if pipe.n_receivers != n_receivers {
                        return Err(RegistryError::ReceiverCountMismatch {
                            expected: pipe.n_receivers,
                            offered: n_receivers,
                        });
                    }
                    if pipe.receivers.len() as u32 == pipe.n_receivers {
                        return Err(RegistryError::ReceiverLimitReached(pipe.n_receivers));
                    }

                    if let Some(ref sender) = pipe.sender {
                        sender
                            .end
                            .notices
                            .send_line("[INFO] A receiver was connected.\n");
                    }
                    pipe.receivers.push(receiver);

                    tracing::info!(
                        path = %path,
                        id,
                        receivers = pipe.receivers.len(),
                        target = pipe.n_receivers,
                        "Receiver registered (existing rendezvous)"
                    );
                }

                if let Some(established) = take_established(&path, occupied.get_mut()) {
                    self.spawn_engine(established);
                }
                Ok(AbortGuard::new(Arc::clone(self), path, id))
            }
            Entry::Vacant(vacant) => {
                tracing::info!(
                    path = %path,
                    id,
                    n_receivers,
                    "Receiver registered (new rendezvous)"
                );

                vacant.insert(PathEntry::Pending(PendingPipe {
                    n_receivers,
                    sender: None,
                    receivers: vec![receiver],
                }));
                Ok(AbortGuard::new(Arc::clone(self), path, id))
            }
        }
    }

    /// Withdraw a pending participant after its connection aborted
    ///
    /// A no-op if the path was promoted in the meantime or the participant
    /// is already gone. A pending rendezvous left with no participants is
    /// removed entirely.
    pub async fn withdraw(&self, path: &RelayPath, participant_id: u64) {
        let mut paths = self.paths.write().await;

        let Some(PathEntry::Pending(pipe)) = paths.get_mut(path) else {
            return;
        };

        let removed = if pipe
            .sender
            .as_ref()
            .is_some_and(|s| s.end.id == participant_id)
        {
            pipe.sender = None;
            true
        } else if let Some(index) = pipe.receivers.iter().position(|r| r.id == participant_id) {
            pipe.receivers.remove(index);
            true
        } else {
            false
        };

        if !removed {
            return;
        }

        tracing::info!(path = %path, id = participant_id, "Participant withdrawn");

        if pipe.is_empty() {
            paths.remove(path);
            tracing::debug!(path = %path, "Empty rendezvous removed");
        }
    }

    /// Clear the established marker once a transfer has terminated
    pub async fn clear(&self, path: &RelayPath) {
        let mut paths = self.paths.write().await;
        if matches!(paths.get(path), Some(PathEntry::Established)) {
            paths.remove(path);
            tracing::debug!(path = %path, "Transfer finished, path released");
        }
    }

    /// Whether a transfer is currently in progress on the path
    pub async fn is_established(&self, path: &RelayPath) -> bool {
        matches!(
            self.paths.read().await.get(path),
            Some(PathEntry::Established)
        )
    }

    /// Total number of paths with registry state (pending or established)
    pub async fn path_count(&self) -> usize {
        self.paths.read().await.len()
    }

    /// Arm the sender's abort watcher
    ///
    /// The watcher withdraws the sender when its connection goes away while
    /// the rendezvous is still pending; promotion cancels the token before
    /// the transfer starts so later closes are transfer events.
    fn arm_sender(self: &Arc<Self>, path: &RelayPath, sender: &SenderEnd) -> CancellationToken {
        let token = CancellationToken::new();
        let disarmed = token.clone();
        let notices = sender.notices.clone();
        let registry = Arc::clone(self);
        let path = path.clone();
        let id = sender.id;

        tokio::spawn(async move {
            tokio::select! {
                _ = disarmed.cancelled() => {}
                _ = notices.closed() => {
                    registry.withdraw(&path, id).await;
                }
            }
        });

        token
    }

    fn spawn_engine(self: &Arc<Self>, pipe: EstablishedPipe) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            crate::pipe::engine::run(registry, pipe).await;
        });
    }
}

impl Default for PathRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Promote a complete pending rendezvous in place
///
/// Replaces the pending entry with the established marker, cancels the
/// sender's abort watcher, and hands back the frozen participant set. The
/// swap is the linearisation point: from here on, connection closes are
/// transfer events rather than withdrawals.
fn take_established(path: &RelayPath, entry: &mut PathEntry) -> Option<EstablishedPipe> {
    let complete = matches!(entry, PathEntry::Pending(pipe) if pipe.is_complete());
    if !complete {
        return None;
    }

    let PathEntry::Pending(mut pipe) = std::mem::replace(entry, PathEntry::Established) else {
        return None;
    };
    let PendingSender { end: sender, abort } = pipe.sender.take()?;
    abort.cancel();

    tracing::info!(
        path = %path,
        receivers = pipe.receivers.len(),
        "Rendezvous established"
    );

    Some(EstablishedPipe {
        path: path.clone(),
        sender,
        receivers: pipe.receivers,
    })
}

fn greet_sender(sender: &SenderEnd, n_receivers: u32, connected: usize) {
    sender
        .notices
        .send_line(format!("[INFO] Waiting for {n_receivers} receiver(s)...\n"));
    if connected > 0 {
        sender.notices.send_line(format!(
            "[INFO] {connected} receiver(s) has/have been connected.\n"
        ));
        // One notice per receiver that was already waiting, mirroring the
        // notices a sender sees when receivers arrive after it.
        for _ in 0..connected {
            sender
                .notices
                .send_line("[INFO] A receiver was connected.\n");
        }
    }
}

/// Withdraws a pending receiver when dropped before being disarmed
///
/// Returned by [`PathRegistry::register_receiver`] and held across the
/// wait for the deferred response; dropping the waiting future (the
/// connection aborted) triggers the withdrawal. Withdrawal of a promoted
/// or already-removed participant is a no-op.
pub struct AbortGuard {
    registry: Arc<PathRegistry>,
    path: RelayPath,
    id: u64,
    armed: bool,
}

impl AbortGuard {
    fn new(registry: Arc<PathRegistry>, path: RelayPath, id: u64) -> Self {
        Self {
            registry,
            path,
            id,
            armed: true,
        }
    }

    /// Disarm the guard; the participant is part of an established transfer
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let registry = Arc::clone(&self.registry);
        let path = self.path.clone();
        let id = self.id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                registry.withdraw(&path, id).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::stream::{self, StreamExt};
    use http::{HeaderMap, Response};
    use http_body_util::BodyExt;
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::{sleep, timeout};

    use crate::pipe::{box_byte_stream, BoxError, RelayBody};
    use crate::registry::entry::NoticeChannel;

    use super::*;

    fn sender_end(
        registry: &PathRegistry,
        chunks: &[&'static str],
    ) -> (SenderEnd, mpsc::UnboundedReceiver<Bytes>) {
        let (notices, notice_rx) = NoticeChannel::new();
        let items: Vec<Result<Bytes, BoxError>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        let end = SenderEnd {
            id: registry.next_participant_id(),
            headers: HeaderMap::new(),
            body: box_byte_stream(stream::iter(items)),
            notices,
        };
        (end, notice_rx)
    }

    fn stalled_sender_end(
        registry: &PathRegistry,
    ) -> (SenderEnd, mpsc::UnboundedReceiver<Bytes>) {
        let (notices, notice_rx) = NoticeChannel::new();
        let end = SenderEnd {
            id: registry.next_participant_id(),
            headers: HeaderMap::new(),
            body: box_byte_stream(stream::pending()),
            notices,
        };
        (end, notice_rx)
    }

    fn receiver_end(
        registry: &PathRegistry,
    ) -> (ReceiverEnd, oneshot::Receiver<Response<RelayBody>>) {
        let (reply, reply_rx) = oneshot::channel();
        let end = ReceiverEnd {
            id: registry.next_participant_id(),
            reply,
        };
        (end, reply_rx)
    }

    async fn body_text(response: Response<RelayBody>) -> String {
        let collected = response.into_body().collect().await.unwrap();
        String::from_utf8(collected.to_bytes().to_vec()).unwrap()
    }

    async fn collect_lines(mut rx: mpsc::UnboundedReceiver<Bytes>) -> String {
        let mut out = String::new();
        while let Some(line) = rx.recv().await {
            out.push_str(std::str::from_utf8(&line).unwrap());
        }
        out
    }

    fn path(raw: &str) -> RelayPath {
        RelayPath::normalise(raw)
    }

    #[tokio::test]
    async fn test_single_receiver_round_trip() {
        let registry = Arc::new(PathRegistry::new());
        let (sender, notice_rx) = sender_end(&registry, &["hello"]);

        registry
            .register_sender(path("/foo"), 1, sender)
            .await
            .unwrap();

        let (receiver, reply_rx) = receiver_end(&registry);
        let guard = registry
            .register_receiver(path("/foo"), 1, receiver)
            .await
            .unwrap();

        let response = timeout(Duration::from_secs(5), reply_rx)
            .await
            .unwrap()
            .unwrap();
        guard.disarm();
        assert_eq!(response.status(), 200);
        assert_eq!(body_text(response).await, "hello");

        let lines = timeout(Duration::from_secs(5), collect_lines(notice_rx))
            .await
            .unwrap();
        assert!(lines.contains("[INFO] Waiting for 1 receiver(s)...\n"));
        assert!(lines.contains("[INFO] A receiver was connected.\n"));
        assert!(lines.contains("[INFO] Start sending with 1 receiver(s)!\n"));
        assert!(lines.contains("[INFO] Sending successful!\n"));
    }

    #[tokio::test]
    async fn test_second_sender_rejected() {
        let registry = Arc::new(PathRegistry::new());
        let (first, _first_rx) = stalled_sender_end(&registry);
        registry
            .register_sender(path("/foo"), 1, first)
            .await
            .unwrap();

        let (second, _second_rx) = stalled_sender_end(&registry);
        let result = registry.register_sender(path("/foo"), 1, second).await;
        assert!(matches!(
            result,
            Err(RegistryError::SenderAlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_receiver_count_mismatch() {
        let registry = Arc::new(PathRegistry::new());
        let (receiver, _reply_rx) = receiver_end(&registry);
        let _guard = registry
            .register_receiver(path("/bar"), 2, receiver)
            .await
            .unwrap();

        let (sender, _notice_rx) = stalled_sender_end(&registry);
        let result = registry.register_sender(path("/bar"), 3, sender).await;
        assert!(matches!(
            result,
            Err(RegistryError::ReceiverCountMismatch {
                expected: 2,
                offered: 3
            })
        ));

        let (late, _late_rx) = receiver_end(&registry);
        let result = registry.register_receiver(path("/bar"), 3, late).await;
        assert!(matches!(
            result,
            Err(RegistryError::ReceiverCountMismatch {
                expected: 2,
                offered: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_receiver_limit_reached() {
        let registry = Arc::new(PathRegistry::new());
        let (first, _first_reply) = receiver_end(&registry);
        let _g1 = registry
            .register_receiver(path("/baz"), 1, first)
            .await
            .unwrap();

        let (second, _second_reply) = receiver_end(&registry);
        let result = registry.register_receiver(path("/baz"), 1, second).await;
        assert!(matches!(result, Err(RegistryError::ReceiverLimitReached(1))));
    }

    #[tokio::test]
    async fn test_invalid_receiver_count() {
        let registry = Arc::new(PathRegistry::new());

        let (sender, _notice_rx) = stalled_sender_end(&registry);
        let result = registry.register_sender(path("/foo"), 0, sender).await;
        assert!(matches!(result, Err(RegistryError::InvalidReceiverCount)));

        let (receiver, _reply_rx) = receiver_end(&registry);
        let result = registry.register_receiver(path("/foo"), 0, receiver).await;
        assert!(matches!(result, Err(RegistryError::InvalidReceiverCount)));
    }

    #[tokio::test]
    async fn test_promotion_on_sender_arrival() {
        let registry = Arc::new(PathRegistry::new());

        let (first, first_reply) = receiver_end(&registry);
        let g1 = registry
            .register_receiver(path("/multi"), 2, first)
            .await
            .unwrap();
        let (second, second_reply) = receiver_end(&registry);
        let g2 = registry
            .register_receiver(path("/multi"), 2, second)
            .await
            .unwrap();

        let (sender, notice_rx) = sender_end(&registry, &["abc"]);
        registry
            .register_sender(path("/multi"), 2, sender)
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(5), first_reply)
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(5), second_reply)
            .await
            .unwrap()
            .unwrap();
        g1.disarm();
        g2.disarm();
        assert_eq!(body_text(first).await, "abc");
        assert_eq!(body_text(second).await, "abc");

        let lines = timeout(Duration::from_secs(5), collect_lines(notice_rx))
            .await
            .unwrap();
        assert!(lines.contains("[INFO] 2 receiver(s) has/have been connected.\n"));
        assert_eq!(lines.matches("[INFO] A receiver was connected.\n").count(), 2);
        assert!(lines.contains("[INFO] Start sending with 2 receiver(s)!\n"));
    }

    #[tokio::test]
    async fn test_established_rejects_registrations() {
        let registry = Arc::new(PathRegistry::new());
        let (sender, _notice_rx) = stalled_sender_end(&registry);
        registry
            .register_sender(path("/busy"), 1, sender)
            .await
            .unwrap();

        let (receiver, reply_rx) = receiver_end(&registry);
        let guard = registry
            .register_receiver(path("/busy"), 1, receiver)
            .await
            .unwrap();
        let _response = timeout(Duration::from_secs(5), reply_rx)
            .await
            .unwrap()
            .unwrap();
        guard.disarm();

        assert!(registry.is_established(&path("/busy")).await);

        let (late_sender, _late_rx) = stalled_sender_end(&registry);
        let result = registry.register_sender(path("/busy"), 1, late_sender).await;
        assert!(matches!(result, Err(RegistryError::PathEstablished(_))));

        let (late_receiver, _late_reply) = receiver_end(&registry);
        let result = registry
            .register_receiver(path("/busy"), 1, late_receiver)
            .await;
        assert!(matches!(result, Err(RegistryError::PathEstablished(_))));
    }

    #[tokio::test]
    async fn test_withdraw_removes_empty_rendezvous() {
        let registry = Arc::new(PathRegistry::new());
        let (receiver, _reply_rx) = receiver_end(&registry);
        let id = receiver.id;
        let guard = registry
            .register_receiver(path("/gone"), 1, receiver)
            .await
            .unwrap();
        assert_eq!(registry.path_count().await, 1);

        registry.withdraw(&path("/gone"), id).await;
        assert_eq!(registry.path_count().await, 0);

        // Already removed, so the guard firing later changes nothing.
        drop(guard);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.path_count().await, 0);
    }

    #[tokio::test]
    async fn test_withdraw_is_noop_after_promotion() {
        let registry = Arc::new(PathRegistry::new());
        let (sender, _notice_rx) = stalled_sender_end(&registry);
        registry
            .register_sender(path("/keep"), 1, sender)
            .await
            .unwrap();

        let (receiver, reply_rx) = receiver_end(&registry);
        let id = receiver.id;
        let guard = registry
            .register_receiver(path("/keep"), 1, receiver)
            .await
            .unwrap();
        let _response = timeout(Duration::from_secs(5), reply_rx)
            .await
            .unwrap()
            .unwrap();
        guard.disarm();

        registry.withdraw(&path("/keep"), id).await;
        assert!(registry.is_established(&path("/keep")).await);
    }

    #[tokio::test]
    async fn test_sender_abort_withdraws() {
        let registry = Arc::new(PathRegistry::new());
        let (sender, notice_rx) = stalled_sender_end(&registry);
        registry
            .register_sender(path("/aborted"), 1, sender)
            .await
            .unwrap();
        assert_eq!(registry.path_count().await, 1);

        // The sender's connection goes away before any receiver shows up.
        drop(notice_rx);

        for _ in 0..100 {
            if registry.path_count().await == 0 {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("sender withdrawal did not clean up the registry");
    }

    #[tokio::test]
    async fn test_path_reusable_after_transfer() {
        let registry = Arc::new(PathRegistry::new());

        let (sender, _notice_rx) = sender_end(&registry, &["one"]);
        registry
            .register_sender(path("/again"), 1, sender)
            .await
            .unwrap();
        let (receiver, reply_rx) = receiver_end(&registry);
        let guard = registry
            .register_receiver(path("/again"), 1, receiver)
            .await
            .unwrap();
        let response = timeout(Duration::from_secs(5), reply_rx)
            .await
            .unwrap()
            .unwrap();
        guard.disarm();
        assert_eq!(body_text(response).await, "one");

        for _ in 0..100 {
            if registry.path_count().await == 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.path_count().await, 0);

        let (sender, _notice_rx) = stalled_sender_end(&registry);
        registry
            .register_sender(path("/again"), 1, sender)
            .await
            .unwrap();
    }
}
