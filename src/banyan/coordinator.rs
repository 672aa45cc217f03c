use crate::protocol::{
    BusView, ClientMessage, LatLng, RouteBuses, ServerMessage, ShareAction,
};
use actix::prelude::*;
use ahash::{AHashMap, AHashSet};
use shuttle::aggregation::{self, AggregatedBusState};
use shuttle::chat::ChatRelay;
use shuttle::proximity;
use shuttle::routes_catalog::RouteCatalog;
use shuttle::share_registry::{DEFAULT_MAX_AGE_SECS, ShareRegistry};
use shuttle::unix_epoch_ms;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Aggregation and full-state broadcast cadence.
const FAST_TICK_INTERVAL: Duration = Duration::from_secs(2);
/// Per-user proximity evaluation cadence.
const PROXIMITY_TICK_INTERVAL: Duration = Duration::from_secs(10);
/// Stale share sweep cadence.
const SWEEP_TICK_INTERVAL: Duration = Duration::from_secs(30);

// Messages

/// A pre-serialized outbound frame. Serialized once per broadcast and shared
/// between recipients.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub Arc<String>);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub session_id: String,
    pub addr: Recipient<OutboundFrame>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub session_id: String,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Inbound {
    pub session_id: String,
    pub message: ClientMessage,
}

struct ConnectionInfo {
    addr: Recipient<OutboundFrame>,
    /// Last self-reported coordinate, used only for proximity alerts.
    user_position: Option<(f64, f64)>,
}

/// Single owner of all mutable tracker state. Every registry mutation,
/// snapshot, chat append and periodic cycle runs on this actor's mailbox,
/// which is what keeps snapshots atomic and keeps each cycle from
/// overlapping with itself.
pub struct TrackerCoordinator {
    catalog: Arc<RouteCatalog>,
    registry: ShareRegistry,
    chat: ChatRelay,
    connections: AHashMap<String, ConnectionInfo>,
    chat_rooms: AHashMap<String, AHashSet<String>>,
    /// Last fast-tick output, read by the proximity cycle.
    latest: AHashMap<(String, String), AggregatedBusState>,
}

impl TrackerCoordinator {
    pub fn new(catalog: Arc<RouteCatalog>) -> Self {
        Self {
            catalog,
            registry: ShareRegistry::new(),
            chat: ChatRelay::new(),
            connections: AHashMap::new(),
            chat_rooms: AHashMap::new(),
            latest: AHashMap::new(),
        }
    }

    fn serialize(message: &ServerMessage) -> Option<Arc<String>> {
        match serde_json::to_string(message) {
            Ok(text) => Some(Arc::new(text)),
            Err(e) => {
                log::warn!("failed to serialize outbound frame: {}", e);
                None
            }
        }
    }

    fn broadcast(&self, message: &ServerMessage) {
        let Some(frame) = Self::serialize(message) else {
            return;
        };
        for info in self.connections.values() {
            info.addr.do_send(OutboundFrame(frame.clone()));
        }
    }

    fn send_to(&self, session_id: &str, message: &ServerMessage) {
        let Some(info) = self.connections.get(session_id) else {
            return;
        };
        if let Some(frame) = Self::serialize(message) {
            info.addr.do_send(OutboundFrame(frame));
        }
    }

    fn send_to_room(&self, route_id: &str, message: &ServerMessage) {
        let Some(members) = self.chat_rooms.get(route_id) else {
            return;
        };
        let Some(frame) = Self::serialize(message) else {
            return;
        };
        for session_id in members {
            if let Some(info) = self.connections.get(session_id) {
                info.addr.do_send(OutboundFrame(frame.clone()));
            }
        }
    }

    fn join_room(&mut self, route_id: &str, session_id: &str) {
        self.chat_rooms
            .entry(route_id.to_string())
            .or_default()
            .insert(session_id.to_string());
    }

    /// Fast cycle: snapshot, aggregate, cache, broadcast full state.
    fn fast_tick(&mut self) {
        let snapshot = self.registry.snapshot();
        self.latest = aggregation::aggregate(&snapshot, &self.catalog);

        if self.connections.is_empty() {
            return;
        }

        let mut routes: BTreeMap<String, RouteBuses> = self
            .catalog
            .routes()
            .iter()
            .map(|r| (r.id.clone(), RouteBuses::default()))
            .collect();

        for state in self.latest.values() {
            // Buses tagged with a route missing from the catalog are not
            // broadcast; they still age out through the sweep.
            let Some(slot) = routes.get_mut(&state.route_id) else {
                continue;
            };
            slot.buses.insert(
                state.bus_number.clone(),
                BusView {
                    position: LatLng {
                        lat: state.lat,
                        lng: state.lng,
                    },
                    sharers: state.sharer_count,
                    eta: state.eta_seconds,
                },
            );
        }

        self.broadcast(&ServerMessage::BusesUpdate { routes });
    }

    /// Proximity cycle: evaluate each non-sharing connection that has
    /// reported a coordinate; empty alert lists are not sent.
    fn proximity_tick(&self) {
        for (session_id, info) in &self.connections {
            if self.registry.is_sharing(session_id) {
                continue;
            }
            let Some((lat, lng)) = info.user_position else {
                continue;
            };

            let alerts = proximity::alerts_for_user(lat, lng, &self.catalog, &self.latest);
            if alerts.is_empty() {
                continue;
            }

            if let Some(frame) =
                Self::serialize(&ServerMessage::ProximityMessages { messages: alerts })
            {
                info.addr.do_send(OutboundFrame(frame));
            }
        }
    }

    /// Purge sessions past the staleness window, a backstop for connections
    /// that vanished without a disconnect. Returns the notice to broadcast,
    /// or None when nothing was removed.
    fn sweep(&mut self, now_ms: i64) -> Option<ServerMessage> {
        let removed = self.registry.remove_expired(now_ms, DEFAULT_MAX_AGE_SECS);
        if removed.is_empty() {
            return None;
        }

        let session_ids: Vec<String> = removed.into_iter().map(|s| s.session_id).collect();
        log::info!("sweep removed {} stale share session(s)", session_ids.len());
        Some(ServerMessage::StaleRemoved { session_ids })
    }

    fn sweep_tick(&mut self) {
        if let Some(notice) = self.sweep(unix_epoch_ms()) {
            self.broadcast(&notice);
        }
    }

    fn handle_disconnect(&mut self, session_id: &str) {
        self.connections.remove(session_id);
        for members in self.chat_rooms.values_mut() {
            members.remove(session_id);
        }
        self.chat_rooms.retain(|_, members| !members.is_empty());

        // Synchronous with the disconnect: no share session outlives its
        // connection beyond this handler
        if let Some(session) = self.registry.stop(session_id) {
            self.broadcast(&ServerMessage::SharesChanged {
                action: ShareAction::Disconnect,
                session_id: session.session_id,
                route_id: session.route_id,
                bus_number: session.bus_number,
            });
        }
    }

    fn handle_client_message(&mut self, session_id: &str, message: ClientMessage) {
        match message {
            ClientMessage::ShareStart {
                route_id,
                bus_number,
            } => {
                self.registry
                    .start(session_id, &route_id, &bus_number, unix_epoch_ms());
                // Sharers on a catalog route follow its chat
                if self.catalog.get(&route_id).is_some() {
                    self.join_room(&route_id, session_id);
                }
                self.broadcast(&ServerMessage::SharesChanged {
                    action: ShareAction::Start,
                    session_id: session_id.to_string(),
                    route_id,
                    bus_number,
                });
            }
            ClientMessage::SharePos { lat, lng, speed } => {
                let applied =
                    self.registry
                        .report_position(session_id, lat, lng, speed, unix_epoch_ms());
                if !applied {
                    log::debug!("dropping position report from non-sharing session {}", session_id);
                }
            }
            ClientMessage::ShareStop => {
                if let Some(session) = self.registry.stop(session_id) {
                    self.broadcast(&ServerMessage::SharesChanged {
                        action: ShareAction::Stop,
                        session_id: session.session_id,
                        route_id: session.route_id,
                        bus_number: session.bus_number,
                    });
                }
            }
            ClientMessage::ChatJoin { route_id } => {
                // Rooms only exist for catalog routes, so arbitrary route
                // ids cannot grow the room table
                if self.catalog.get(&route_id).is_none() {
                    log::debug!("ignoring chat join for unknown route {}", route_id);
                    return;
                }
                self.join_room(&route_id, session_id);
                let messages = self.chat.history(&route_id);
                self.send_to(session_id, &ServerMessage::ChatInit { route_id, messages });
            }
            ClientMessage::ChatSend {
                route_id,
                author,
                text,
            } => {
                if self.catalog.get(&route_id).is_none() {
                    log::debug!("dropping chat message for unknown route {}", route_id);
                    return;
                }
                let message =
                    self.chat
                        .append(&route_id, &author, &text, session_id, unix_epoch_ms());
                let room = route_id.clone();
                self.send_to_room(&room, &ServerMessage::ChatUpdate { route_id, message });
            }
            ClientMessage::UserPos { lat, lng } => {
                if let Some(info) = self.connections.get_mut(session_id) {
                    info.user_position = Some((lat, lng));
                }
            }
        }
    }
}

impl Actor for TrackerCoordinator {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!(
            "tracker coordinator started, serving {} route(s)",
            self.catalog.routes().len()
        );
        ctx.run_interval(FAST_TICK_INTERVAL, |act, _| act.fast_tick());
        ctx.run_interval(PROXIMITY_TICK_INTERVAL, |act, _| act.proximity_tick());
        ctx.run_interval(SWEEP_TICK_INTERVAL, |act, _| act.sweep_tick());
    }
}

impl Handler<Connect> for TrackerCoordinator {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Self::Context) {
        self.connections.insert(
            msg.session_id,
            ConnectionInfo {
                addr: msg.addr,
                user_position: None,
            },
        );
    }
}

impl Handler<Disconnect> for TrackerCoordinator {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Self::Context) {
        self.handle_disconnect(&msg.session_id);
    }
}

impl Handler<Inbound> for TrackerCoordinator {
    type Result = ();

    fn handle(&mut self, msg: Inbound, _: &mut Self::Context) {
        self.handle_client_message(&msg.session_id, msg.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> TrackerCoordinator {
        TrackerCoordinator::new(Arc::new(RouteCatalog::builtin()))
    }

    #[test]
    fn test_sweep_notice_lists_only_removed_sessions() {
        let mut coordinator = coordinator();
        let now = 1_000_000;
        // 200s without an update, past the 180s window
        coordinator.registry.start("gone", "kuril", "1", now - 200_000);
        coordinator.registry.start("alive", "kuril", "1", now - 20_000);

        let notice = coordinator.sweep(now).expect("a stale session was removed");
        match notice {
            ServerMessage::StaleRemoved { session_ids } => {
                assert_eq!(session_ids, vec!["gone".to_string()]);
            }
            other => panic!("unexpected notice {:?}", other),
        }
        assert!(coordinator.registry.is_sharing("alive"));

        // Nothing left to remove, so nothing is broadcast
        assert!(coordinator.sweep(now).is_none());
    }

    #[test]
    fn test_unknown_route_chat_creates_no_room() {
        let mut coordinator = coordinator();
        coordinator.handle_client_message(
            "s1",
            ClientMessage::ChatJoin {
                route_id: "not-a-route".to_string(),
            },
        );
        coordinator.handle_client_message(
            "s1",
            ClientMessage::ChatSend {
                route_id: "not-a-route".to_string(),
                author: "alice".to_string(),
                text: "hello".to_string(),
            },
        );

        assert!(coordinator.chat_rooms.is_empty());
        assert!(coordinator.chat.history("not-a-route").is_empty());
    }

    #[test]
    fn test_share_start_joins_chat_only_for_catalog_routes() {
        let mut coordinator = coordinator();
        coordinator.handle_client_message(
            "s1",
            ClientMessage::ShareStart {
                route_id: "kuril".to_string(),
                bus_number: "1".to_string(),
            },
        );
        coordinator.handle_client_message(
            "s2",
            ClientMessage::ShareStart {
                route_id: "mystery".to_string(),
                bus_number: "1".to_string(),
            },
        );

        assert!(coordinator.chat_rooms.get("kuril").unwrap().contains("s1"));
        assert!(coordinator.chat_rooms.get("mystery").is_none());
        // The share itself is still accepted; it just has no chat room
        assert!(coordinator.registry.is_sharing("s2"));
    }

    #[test]
    fn test_disconnect_drops_emptied_rooms() {
        let mut coordinator = coordinator();
        coordinator.handle_client_message(
            "s1",
            ClientMessage::ChatJoin {
                route_id: "kuril".to_string(),
            },
        );
        coordinator.handle_client_message(
            "s2",
            ClientMessage::ChatJoin {
                route_id: "aftab".to_string(),
            },
        );

        coordinator.handle_disconnect("s1");
        assert!(coordinator.chat_rooms.get("kuril").is_none());
        assert!(coordinator.chat_rooms.get("aftab").unwrap().contains("s2"));

        coordinator.handle_disconnect("s2");
        assert!(coordinator.chat_rooms.is_empty());
    }
}
