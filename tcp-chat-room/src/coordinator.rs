//! Single owner of the active participant set.
//!
//! Connection handlers never touch the set directly. They send `join`,
//! `leave` and `broadcast` events through a [`CoordinatorHandle`], and the
//! [`Coordinator`] task applies them one at a time. Join and leave
//! announcements are delivered from inside the same loop, right after the
//! event that caused them.
//!
//! [`CoordinatorHandle::join`] and [`CoordinatorHandle::flush`] wait for the
//! loop to acknowledge them, which lets a handler know that everything it
//! sent earlier has already been routed.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, info};

use crate::{
    message::ChatMessage,
    participant::{Delivery, Participant},
};

// Capacity 1 keeps each hand-off as close to a rendezvous as tokio allows.
const EVENT_CHANNEL_CAPACITY: usize = 1;

struct JoinRequest {
    participant: Participant,
    registered: oneshot::Sender<()>,
}

enum Relay {
    Message(ChatMessage),
    /// Completed once every relay event queued before it has been routed.
    Barrier(oneshot::Sender<()>),
}

pub struct Coordinator {
    participants: HashMap<String, Participant>,
    joins: mpsc::Receiver<JoinRequest>,
    leaves: mpsc::Receiver<Participant>,
    broadcasts: mpsc::Receiver<Relay>,
}

#[derive(Clone)]
pub struct CoordinatorHandle {
    joins: mpsc::Sender<JoinRequest>,
    leaves: mpsc::Sender<Participant>,
    broadcasts: mpsc::Sender<Relay>,
}

impl Coordinator {
    pub fn new() -> (Self, CoordinatorHandle) {
        let (join_tx, join_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (leave_tx, leave_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let coordinator = Self {
            participants: HashMap::new(),
            joins: join_rx,
            leaves: leave_rx,
            broadcasts: broadcast_rx,
        };
        let handle = CoordinatorHandle {
            joins: join_tx,
            leaves: leave_tx,
            broadcasts: broadcast_tx,
        };
        (coordinator, handle)
    }

    /// Processes events until every [`CoordinatorHandle`] has been dropped.
    ///
    /// When several channels are ready at once the branch taken is random,
    /// so no order is promised between a join, a leave and a broadcast that
    /// arrive together.
    pub async fn run(mut self) {
        loop {
            select! {
                Some(request) = self.joins.recv() => {
                    self.handle_join(request.participant);
                    let _ = request.registered.send(());
                }
                Some(participant) = self.leaves.recv() => self.handle_leave(participant),
                Some(relay) = self.broadcasts.recv() => match relay {
                    Relay::Message(message) => self.handle_broadcast(message),
                    Relay::Barrier(done) => {
                        let _ = done.send(());
                    }
                },
                else => break,
            }
        }
        debug!("all coordinator handles dropped, stopping");
    }

    fn handle_join(&mut self, participant: Participant) {
        let name = participant.name().to_string();
        if self
            .participants
            .insert(name.clone(), participant)
            .is_some()
        {
            info!(name, "name already active, replacing previous participant");
        }
        self.handle_broadcast(ChatMessage::joined(&name));
    }

    fn handle_leave(&mut self, participant: Participant) {
        let name = participant.name();
        if self.participants.remove(name).is_none() {
            debug!(name, "leave for inactive name ignored");
            return;
        }
        self.handle_broadcast(ChatMessage::left(name));
    }

    fn handle_broadcast(&self, message: ChatMessage) {
        for (name, participant) in &self.participants {
            match participant.deliver(message.clone()) {
                Delivery::Delivered => {}
                Delivery::Dropped => debug!(recipient = %name, "inbox full, message dropped"),
                Delivery::Gone => debug!(recipient = %name, "inbox discarded, message skipped"),
            }
        }
    }
}

impl CoordinatorHandle {
    /// Returns once the participant is registered and its join announced.
    pub async fn join(&self, participant: Participant) -> Result<()> {
        let (registered, acknowledged) = oneshot::channel();
        self.joins
            .send(JoinRequest {
                participant,
                registered,
            })
            .await
            .ok()
            .context("coordinator stopped before join")?;
        acknowledged
            .await
            .context("coordinator stopped before registering participant")
    }

    pub async fn leave(&self, participant: Participant) -> Result<()> {
        self.leaves
            .send(participant)
            .await
            .ok()
            .context("coordinator stopped before leave")
    }

    pub async fn broadcast(&self, message: ChatMessage) -> Result<()> {
        self.broadcasts
            .send(Relay::Message(message))
            .await
            .ok()
            .context("coordinator stopped before broadcast")
    }

    /// Returns once every broadcast sent before this call has been routed.
    pub async fn flush(&self) -> Result<()> {
        let (done, routed) = oneshot::channel();
        self.broadcasts
            .send(Relay::Barrier(done))
            .await
            .ok()
            .context("coordinator stopped before flush")?;
        routed
            .await
            .context("coordinator stopped before routing pending broadcasts")
    }
}
