use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Duration};

use crate::{
    api::AppState,
    constants::{WS_CLIENT_TIMEOUT_SECS, WS_HEARTBEAT_INTERVAL_SECS},
    models::PlayerState,
    services::{ConnectionId, GameOverOutcome, GameRelay, JoinOutcome, RelayOutcome},
};

use super::protocol::{ClientMessage, ServerMessage};

/// WebSocket handler for live match relay
/// GET /game-ws
pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state.relay))
}

async fn handle_socket(socket: WebSocket, relay: GameRelay) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn = relay.hub.connect(outbound_tx).await;
    tracing::info!("Game socket {} connected", conn);

    // Forward hub pushes and keep the connection alive
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = interval(Duration::from_secs(WS_HEARTBEAT_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                outgoing = outbound_rx.recv() => {
                    let Some(message) = outgoing else { break };
                    let json = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!("Failed to encode server message: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Handle incoming messages one at a time so per-socket order is kept
    let recv_relay = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let next_msg = timeout(Duration::from_secs(WS_CLIENT_TIMEOUT_SECS), receiver.next()).await;
            let msg = match next_msg {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    tracing::debug!("Game socket {} read error: {}", conn, e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::info!("Game socket {} timed out", conn);
                    break;
                }
            };

            match msg {
                Message::Text(text) => dispatch(&recv_relay, conn, text.as_str()).await,
                Message::Close(_) => {
                    tracing::info!("Game socket {} closed by client", conn);
                    break;
                }
                Message::Binary(_) => {
                    tracing::debug!("Game socket {} sent binary frame; ignored", conn);
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    // Cleanup
    relay.hub.disconnect(conn).await;
    tracing::info!("Game socket {} disconnected", conn);
}

/// Parses and applies one client frame. Failures are logged and dropped;
/// the socket stays open.
pub(crate) async fn dispatch(relay: &GameRelay, conn: ConnectionId, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Malformed message on game socket {}: {}", conn, e);
            return;
        }
    };

    match message {
        ClientMessage::Join { match_id, user_id } => {
            handle_join(relay, conn, match_id, user_id).await
        }
        ClientMessage::GameState {
            match_id,
            user_id,
            state,
            seq,
        } => handle_game_state(relay, conn, match_id, user_id, seq, state).await,
        ClientMessage::GameOver {
            match_id,
            user_id,
            final_score,
        } => handle_game_over(relay, match_id, user_id, final_score).await,
        ClientMessage::Dashboard { user_id } => handle_dashboard(relay, conn, user_id).await,
    }
}

/// Registers the socket on the match before looking it up, so its frames are
/// relayed even when the match row is missing or the store is unreachable.
async fn handle_join(relay: &GameRelay, conn: ConnectionId, match_id: i64, user_id: i64) {
    relay.hub.join(conn, match_id).await;

    match relay.lifecycle.join(match_id, user_id).await {
        Ok(JoinOutcome::UnknownMatch) => {
            tracing::debug!("Join for unknown match {} from user {}", match_id, user_id);
        }
        Ok(JoinOutcome::Registered(game_match)) => {
            tracing::debug!(
                "User {} watching match {} ({})",
                user_id,
                match_id,
                game_match.status.as_str()
            );
        }
        Ok(JoinOutcome::Promoted(game_match)) => {
            if let Some(player2_id) = game_match.player2_id {
                relay
                    .hub
                    .broadcast(
                        match_id,
                        ServerMessage::MatchStarted {
                            match_id,
                            player1_id: game_match.player1_id,
                            player2_id,
                        },
                    )
                    .await;
            }
            relay.refresh_dashboards().await;
        }
        Err(e) => {
            tracing::warn!("Match lookup failed on join {}: {}", match_id, e);
        }
    }
}

async fn handle_game_state(
    relay: &GameRelay,
    conn: ConnectionId,
    match_id: i64,
    user_id: i64,
    seq: Option<u64>,
    state: PlayerState,
) {
    match relay.hub.apply_state(conn, match_id, user_id, seq, state).await {
        RelayOutcome::Relayed { recipients } => {
            tracing::trace!(
                "Relayed state of user {} on match {} to {} sockets",
                user_id,
                match_id,
                recipients
            );
        }
        RelayOutcome::NotJoined => {
            tracing::debug!(
                "Dropped state from socket {} not joined to match {}",
                conn,
                match_id
            );
        }
        RelayOutcome::Stale { last_seq } => {
            tracing::debug!(
                "Dropped stale state of user {} on match {} (last seq {})",
                user_id,
                match_id,
                last_seq
            );
        }
        RelayOutcome::HubUnavailable => {
            tracing::warn!("Relay hub unavailable; state for match {} dropped", match_id);
        }
    }
}

async fn handle_game_over(relay: &GameRelay, match_id: i64, user_id: i64, final_score: Option<f64>) {
    match relay.lifecycle.game_over(match_id, user_id, final_score).await {
        Ok(GameOverOutcome::Completed(game_match)) => {
            relay
                .hub
                .finish_match(
                    match_id,
                    ServerMessage::MatchEnded {
                        match_id,
                        winner_id: game_match.winner_id,
                    },
                )
                .await;
            relay.scores_changed().await;
            relay.refresh_dashboards().await;
        }
        Ok(GameOverOutcome::AwaitingOpponent) => {
            tracing::debug!(
                "Match {}: user {} reported, waiting for opponent",
                match_id,
                user_id
            );
        }
        Ok(GameOverOutcome::Ignored(reason)) => {
            tracing::debug!(
                "Ignored gameOver on match {} from user {}: {}",
                match_id,
                user_id,
                reason
            );
        }
        Err(e) => {
            tracing::warn!("gameOver failed for match {}: {}", match_id, e);
        }
    }
}

async fn handle_dashboard(relay: &GameRelay, conn: ConnectionId, user_id: i64) {
    let matches = relay.lifecycle.waiting_matches().await.unwrap_or_else(|e| {
        tracing::warn!("Failed to load waiting matches for dashboard: {}", e);
        Vec::new()
    });
    relay.hub.subscribe_dashboard(conn, user_id, matches).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::models::{game_match::match_fixture, MatchStatus};
    use crate::services::{
        memory_store::MemoryMatchStore, LeaderboardCache, MatchLifecycle, RelayHub,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCache(AtomicUsize);

    #[async_trait::async_trait]
    impl LeaderboardCache for CountingCache {
        async fn invalidate(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn relay(store: &Arc<MemoryMatchStore>) -> GameRelay {
        GameRelay::new(RelayHub::spawn(64), MatchLifecycle::new(store.clone(), 100, false))
    }

    async fn connect(relay: &GameRelay) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (relay.hub.connect(tx).await, rx)
    }

    /// Waits until the hub has processed everything queued so far.
    async fn settle(relay: &GameRelay) {
        relay.hub.stats().await;
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn state_frame(match_id: i64, user_id: i64, score: i64) -> String {
        serde_json::json!({
            "type": "gameState",
            "matchId": match_id,
            "userId": user_id,
            "state": {"board": [[0, 0, 0], [0, 1, 0]], "score": score, "level": 1}
        })
        .to_string()
    }

    #[tokio::test]
    async fn full_match_flow() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, None, MatchStatus::Waiting));
        store.insert(match_fixture(2, 3, Some(4), MatchStatus::InProgress));
        let relay = relay(&store);

        let (p1, mut rx1) = connect(&relay).await;
        let (p2, mut rx2) = connect(&relay).await;
        let (other, mut rx_other) = connect(&relay).await;

        dispatch(&relay, p1, r#"{"type":"join","matchId":1,"userId":1}"#).await;
        assert_eq!(store.get(1).unwrap().status, MatchStatus::Waiting);

        dispatch(&relay, p2, r#"{"type":"join","matchId":1,"userId":2}"#).await;
        dispatch(&relay, other, r#"{"type":"join","matchId":2,"userId":3}"#).await;
        settle(&relay).await;

        let promoted = store.get(1).unwrap();
        assert_eq!(promoted.status, MatchStatus::InProgress);
        assert_eq!(promoted.player2_id, Some(2));
        assert!(promoted.start_time.is_some());

        let started = ServerMessage::MatchStarted {
            match_id: 1,
            player1_id: 1,
            player2_id: 2,
        };
        assert_eq!(drain(&mut rx1), vec![started.clone()]);
        assert_eq!(drain(&mut rx2), vec![started]);

        dispatch(&relay, p2, &state_frame(1, 2, 42)).await;
        let received = drain(&mut rx1);
        let [ServerMessage::GameState { states }] = received.as_slice() else {
            panic!("expected one gameState, got {:?}", received);
        };
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].0, 2);
        assert_eq!(
            serde_json::to_value(&states[0].1).unwrap(),
            serde_json::json!({"board": [[0, 0, 0], [0, 1, 0]], "score": 42, "level": 1})
        );
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(drain(&mut rx_other).is_empty());

        dispatch(&relay, p1, r#"{"type":"gameOver","matchId":1,"userId":1}"#).await;
        settle(&relay).await;
        let finished = store.get(1).unwrap();
        assert_eq!(finished.status, MatchStatus::Completed);
        assert_eq!(finished.winner_id, Some(1));
        assert!(finished.end_time.is_some());
        assert_eq!(store.user_score(1), 100);

        let ended = ServerMessage::MatchEnded {
            match_id: 1,
            winner_id: Some(1),
        };
        assert_eq!(drain(&mut rx1), vec![ended.clone()]);
        assert_eq!(drain(&mut rx2), vec![ended]);

        dispatch(&relay, p1, r#"{"type":"gameOver","matchId":1,"userId":1}"#).await;
        dispatch(&relay, p2, r#"{"type":"gameOver","matchId":1,"userId":2}"#).await;
        settle(&relay).await;
        assert_eq!(store.user_score(1), 100);
        assert_eq!(store.user_score(2), 0);
        assert_eq!(store.get(1).unwrap().winner_id, Some(1));
        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test]
    async fn completed_match_drops_cached_leaderboard() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, Some(2), MatchStatus::InProgress));
        let cache = Arc::new(CountingCache::default());
        let relay = relay(&store).with_leaderboard_cache(cache.clone());
        let (p1, _rx1) = connect(&relay).await;

        dispatch(&relay, p1, r#"{"type":"join","matchId":1,"userId":1}"#).await;
        assert_eq!(cache.0.load(Ordering::SeqCst), 0);

        dispatch(&relay, p1, r#"{"type":"gameOver","matchId":1,"userId":1}"#).await;
        assert_eq!(cache.0.load(Ordering::SeqCst), 1);
        assert_eq!(store.user_score(1), 100);

        dispatch(&relay, p1, r#"{"type":"gameOver","matchId":1,"userId":1}"#).await;
        assert_eq!(cache.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closing_a_peer_leaves_match_untouched() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, Some(2), MatchStatus::InProgress));
        let relay = relay(&store);

        let (p1, mut rx1) = connect(&relay).await;
        let (p2, mut rx2) = connect(&relay).await;
        dispatch(&relay, p1, r#"{"type":"join","matchId":1,"userId":1}"#).await;
        dispatch(&relay, p2, r#"{"type":"join","matchId":1,"userId":2}"#).await;

        relay.hub.disconnect(p2).await;
        settle(&relay).await;
        assert_eq!(store.get(1).unwrap().status, MatchStatus::InProgress);
        assert_eq!(relay.hub.stats().await.joined, 1);

        dispatch(&relay, p1, &state_frame(1, 1, 7)).await;
        assert_eq!(drain(&mut rx1).len(), 1);
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn unknown_match_join_still_registers_socket() {
        let store = Arc::new(MemoryMatchStore::default());
        let relay = relay(&store);
        let (p1, mut rx1) = connect(&relay).await;
        let (p2, mut rx2) = connect(&relay).await;

        dispatch(&relay, p1, r#"{"type":"join","matchId":404,"userId":1}"#).await;
        dispatch(&relay, p2, r#"{"type":"join","matchId":404,"userId":2}"#).await;
        assert_eq!(relay.hub.stats().await.joined, 2);
        assert!(store.get(404).is_none());

        dispatch(&relay, p1, &state_frame(404, 1, 1)).await;
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[tokio::test]
    async fn fractional_scores_are_relayed_and_complete_the_match() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, Some(2), MatchStatus::InProgress));
        let relay = relay(&store);
        let (p1, mut rx1) = connect(&relay).await;
        let (p2, mut rx2) = connect(&relay).await;
        dispatch(&relay, p1, r#"{"type":"join","matchId":1,"userId":1}"#).await;
        dispatch(&relay, p2, r#"{"type":"join","matchId":1,"userId":2}"#).await;

        let frame = r#"{"type":"gameState","matchId":1,"userId":2,
                        "state":{"distance":1234.5,"score":42.5}}"#;
        dispatch(&relay, p2, frame).await;
        let received = drain(&mut rx1);
        let [ServerMessage::GameState { states }] = received.as_slice() else {
            panic!("expected one gameState, got {:?}", received);
        };
        assert_eq!(
            serde_json::to_value(&states[0].1).unwrap(),
            serde_json::json!({"distance": 1234.5, "score": 42.5})
        );

        dispatch(
            &relay,
            p1,
            r#"{"type":"gameOver","matchId":1,"userId":1,"finalScore":1234.5}"#,
        )
        .await;
        settle(&relay).await;
        let finished = store.get(1).unwrap();
        assert_eq!(finished.status, MatchStatus::Completed);
        assert_eq!(finished.player1_score, Some(1234.5));
        assert_eq!(finished.winner_id, Some(1));
        assert!(drain(&mut rx2)
            .iter()
            .any(|msg| matches!(msg, ServerMessage::MatchEnded { match_id: 1, .. })));
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, Some(2), MatchStatus::InProgress));
        let relay = relay(&store);
        let (p1, mut rx1) = connect(&relay).await;

        dispatch(&relay, p1, "not json").await;
        dispatch(&relay, p1, r#"{"type":"join","matchId":"one"}"#).await;
        dispatch(&relay, p1, r#"{"type":"join","matchId":1,"userId":1}"#).await;
        dispatch(&relay, p1, &state_frame(1, 1, 3)).await;
        assert_eq!(drain(&mut rx1).len(), 1);
    }

    #[tokio::test]
    async fn dashboard_receives_snapshot_and_refresh_on_promotion() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, None, MatchStatus::Waiting));
        let relay = relay(&store);
        let (viewer, mut rx_viewer) = connect(&relay).await;
        let (p2, _rx2) = connect(&relay).await;

        dispatch(&relay, viewer, r#"{"type":"dashboard","userId":9}"#).await;
        settle(&relay).await;
        let snapshot = drain(&mut rx_viewer);
        let [ServerMessage::ActiveMatches { matches }] = snapshot.as_slice() else {
            panic!("expected activeMatches, got {:?}", snapshot);
        };
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, 1);

        dispatch(&relay, p2, r#"{"type":"join","matchId":1,"userId":2}"#).await;
        settle(&relay).await;
        assert_eq!(
            drain(&mut rx_viewer),
            vec![ServerMessage::ActiveMatches { matches: Vec::new() }]
        );
    }
}
