use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::{
    models::{GameMatch, PlayerState},
    websocket::protocol::ServerMessage,
};

pub type ConnectionId = u64;
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Result of applying a `gameState` update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Relayed { recipients: usize },
    /// The sending connection is not registered to the match.
    NotJoined,
    /// The update's sequence number is not newer than the last applied one.
    Stale { last_seq: u64 },
    HubUnavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub connections: usize,
    pub joined: usize,
    pub live_matches: usize,
    pub dashboards: usize,
}

enum HubCommand {
    Connect {
        conn: ConnectionId,
        outbound: Outbound,
    },
    Join {
        conn: ConnectionId,
        match_id: i64,
    },
    ApplyState {
        conn: ConnectionId,
        match_id: i64,
        user_id: i64,
        seq: Option<u64>,
        state: PlayerState,
        reply: oneshot::Sender<RelayOutcome>,
    },
    Broadcast {
        match_id: i64,
        message: ServerMessage,
    },
    FinishMatch {
        match_id: i64,
        message: ServerMessage,
    },
    SubscribeDashboard {
        conn: ConnectionId,
        user_id: i64,
        matches: Vec<GameMatch>,
    },
    PublishMatches {
        matches: Vec<GameMatch>,
    },
    Disconnect {
        conn: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Handle to the task that owns every piece of in-memory relay state:
/// connection queues, connection -> match registrations, per-match state
/// tables and dashboard subscribers.
#[derive(Clone)]
pub struct RelayHub {
    tx: mpsc::Sender<HubCommand>,
    next_id: Arc<AtomicU64>,
}

impl RelayHub {
    pub fn spawn(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        tokio::spawn(HubState::default().run(rx));
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    async fn send(&self, command: HubCommand) {
        if self.tx.send(command).await.is_err() {
            tracing::warn!("Relay hub is gone; dropping command");
        }
    }

    pub async fn connect(&self, outbound: Outbound) -> ConnectionId {
        let conn = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(HubCommand::Connect { conn, outbound }).await;
        conn
    }

    pub async fn join(&self, conn: ConnectionId, match_id: i64) {
        self.send(HubCommand::Join { conn, match_id }).await;
    }

    pub async fn apply_state(
        &self,
        conn: ConnectionId,
        match_id: i64,
        user_id: i64,
        seq: Option<u64>,
        state: PlayerState,
    ) -> RelayOutcome {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ApplyState {
            conn,
            match_id,
            user_id,
            seq,
            state,
            reply,
        })
        .await;
        rx.await.unwrap_or(RelayOutcome::HubUnavailable)
    }

    pub async fn broadcast(&self, match_id: i64, message: ServerMessage) {
        self.send(HubCommand::Broadcast { match_id, message }).await;
    }

    /// Broadcasts `message` and then drops the match's state table.
    pub async fn finish_match(&self, match_id: i64, message: ServerMessage) {
        self.send(HubCommand::FinishMatch { match_id, message }).await;
    }

    /// Subscribes the connection and sends it `matches` right away.
    pub async fn subscribe_dashboard(&self, conn: ConnectionId, user_id: i64, matches: Vec<GameMatch>) {
        self.send(HubCommand::SubscribeDashboard {
            conn,
            user_id,
            matches,
        })
        .await;
    }

    pub async fn publish_matches(&self, matches: Vec<GameMatch>) {
        self.send(HubCommand::PublishMatches { matches }).await;
    }

    pub async fn disconnect(&self, conn: ConnectionId) {
        self.send(HubCommand::Disconnect { conn }).await;
    }

    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply }).await;
        rx.await.unwrap_or_default()
    }
}

#[derive(Default)]
struct MatchTable {
    states: BTreeMap<i64, PlayerState>,
    last_seq: HashMap<i64, u64>,
}

#[derive(Default)]
struct HubState {
    outbound: HashMap<ConnectionId, Outbound>,
    membership: HashMap<ConnectionId, i64>,
    members: HashMap<i64, BTreeSet<ConnectionId>>,
    tables: HashMap<i64, MatchTable>,
    dashboards: HashMap<ConnectionId, i64>,
}

impl HubState {
    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        tracing::info!("Relay hub stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect { conn, outbound } => {
                self.outbound.insert(conn, outbound);
            }
            HubCommand::Join { conn, match_id } => self.join(conn, match_id),
            HubCommand::ApplyState {
                conn,
                match_id,
                user_id,
                seq,
                state,
                reply,
            } => {
                let outcome = self.apply_state(conn, match_id, user_id, seq, state);
                let _ = reply.send(outcome);
            }
            HubCommand::Broadcast { match_id, message } => {
                self.broadcast(match_id, &message);
            }
            HubCommand::FinishMatch { match_id, message } => {
                self.broadcast(match_id, &message);
                self.tables.remove(&match_id);
            }
            HubCommand::SubscribeDashboard {
                conn,
                user_id,
                matches,
            } => {
                tracing::debug!("Dashboard subscribed: conn={} user={}", conn, user_id);
                self.dashboards.insert(conn, user_id);
                self.deliver(conn, ServerMessage::ActiveMatches { matches });
            }
            HubCommand::PublishMatches { matches } => {
                let message = ServerMessage::ActiveMatches { matches };
                let subscribers: Vec<ConnectionId> = self.dashboards.keys().copied().collect();
                for conn in subscribers {
                    self.deliver(conn, message.clone());
                }
            }
            HubCommand::Disconnect { conn } => self.disconnect(conn),
            HubCommand::Stats { reply } => {
                let _ = reply.send(HubStats {
                    connections: self.outbound.len(),
                    joined: self.membership.len(),
                    live_matches: self.tables.len(),
                    dashboards: self.dashboards.len(),
                });
            }
        }
    }

    fn join(&mut self, conn: ConnectionId, match_id: i64) {
        if let Some(previous) = self.membership.insert(conn, match_id) {
            if previous != match_id {
                self.leave(conn, previous);
            }
        }
        self.members.entry(match_id).or_default().insert(conn);
    }

    fn leave(&mut self, conn: ConnectionId, match_id: i64) {
        if let Some(set) = self.members.get_mut(&match_id) {
            set.remove(&conn);
            if set.is_empty() {
                self.members.remove(&match_id);
            }
        }
    }

    fn apply_state(
        &mut self,
        conn: ConnectionId,
        match_id: i64,
        user_id: i64,
        seq: Option<u64>,
        state: PlayerState,
    ) -> RelayOutcome {
        if self.membership.get(&conn) != Some(&match_id) {
            return RelayOutcome::NotJoined;
        }

        let table = self.tables.entry(match_id).or_default();
        if let Some(seq) = seq {
            if let Some(&last_seq) = table.last_seq.get(&user_id) {
                if seq <= last_seq {
                    return RelayOutcome::Stale { last_seq };
                }
            }
            table.last_seq.insert(user_id, seq);
        }
        table.states.insert(user_id, state);

        let states: Vec<(i64, PlayerState)> = table
            .states
            .iter()
            .map(|(user, state)| (*user, state.clone()))
            .collect();
        let recipients = self.broadcast(match_id, &ServerMessage::GameState { states });
        RelayOutcome::Relayed { recipients }
    }

    fn broadcast(&self, match_id: i64, message: &ServerMessage) -> usize {
        let Some(conns) = self.members.get(&match_id) else {
            return 0;
        };
        let conns: Vec<ConnectionId> = conns.iter().copied().collect();
        conns
            .into_iter()
            .filter(|conn| self.deliver(*conn, message.clone()))
            .count()
    }

    fn deliver(&self, conn: ConnectionId, message: ServerMessage) -> bool {
        match self.outbound.get(&conn) {
            Some(outbound) => outbound.send(message).is_ok(),
            None => false,
        }
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        self.outbound.remove(&conn);
        self.dashboards.remove(&conn);
        if let Some(match_id) = self.membership.remove(&conn) {
            self.leave(conn, match_id);
        }
    }
}
