use serde::{Deserialize, Serialize};
use shuttle::chat::ChatMessage;
use shuttle::proximity::ProximityAlert;
use std::collections::BTreeMap;

/// Inbound frames from a client connection. Tagged json, e.g.
/// `{"type":"share:start","routeId":"kuril","busNumber":"1"}`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "share:start", rename_all = "camelCase")]
    ShareStart { route_id: String, bus_number: String },
    #[serde(rename = "share:pos")]
    SharePos {
        lat: f64,
        lng: f64,
        #[serde(default)]
        speed: Option<f64>,
    },
    #[serde(rename = "share:stop")]
    ShareStop,
    #[serde(rename = "chat:join", rename_all = "camelCase")]
    ChatJoin { route_id: String },
    #[serde(rename = "chat:send", rename_all = "camelCase")]
    ChatSend {
        route_id: String,
        author: String,
        text: String,
    },
    #[serde(rename = "user:pos")]
    UserPos { lat: f64, lng: f64 },
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ShareAction {
    Start,
    Stop,
    Disconnect,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusView {
    pub position: LatLng,
    pub sharers: usize,
    pub eta: Option<u32>,
}

/// Per-route slot in the fast-tick broadcast. Routes with nothing tracked
/// keep an empty `buses` object so clients can clear stale markers.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct RouteBuses {
    pub buses: BTreeMap<String, BusView>,
}

/// Outbound frames, server to client.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "buses:update")]
    BusesUpdate { routes: BTreeMap<String, RouteBuses> },
    #[serde(rename = "user:proximityMessages")]
    ProximityMessages { messages: Vec<ProximityAlert> },
    #[serde(rename = "shares:changed", rename_all = "camelCase")]
    SharesChanged {
        action: ShareAction,
        session_id: String,
        route_id: String,
        bus_number: String,
    },
    #[serde(rename = "shares:staleRemoved", rename_all = "camelCase")]
    StaleRemoved { session_ids: Vec<String> },
    #[serde(rename = "chat:init", rename_all = "camelCase")]
    ChatInit {
        route_id: String,
        messages: Vec<ChatMessage>,
    },
    #[serde(rename = "chat:update", rename_all = "camelCase")]
    ChatUpdate {
        route_id: String,
        message: ChatMessage,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_share_start() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"share:start","routeId":"kuril","busNumber":"1"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::ShareStart {
                route_id: "kuril".to_string(),
                bus_number: "1".to_string()
            }
        );
    }

    #[test]
    fn test_parse_share_pos_speed_optional() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"share:pos","lat":23.8,"lng":90.45}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SharePos {
                lat: 23.8,
                lng: 90.45,
                speed: None
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"share:pos","lat":23.8,"lng":90.45,"speed":6.5}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::SharePos { speed: Some(_), .. }));
    }

    #[test]
    fn test_parse_share_stop_and_rejects_garbage() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"share:stop"}"#).unwrap();
        assert_eq!(msg, ClientMessage::ShareStop);

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"share:warp"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"share:pos","lat":"x"}"#).is_err());
    }

    #[test]
    fn test_shares_changed_wire_shape() {
        let msg = ServerMessage::SharesChanged {
            action: ShareAction::Disconnect,
            session_id: "s1".to_string(),
            route_id: "kuril".to_string(),
            bus_number: "1".to_string(),
        };
        let text = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            text,
            r#"{"type":"shares:changed","action":"disconnect","sessionId":"s1","routeId":"kuril","busNumber":"1"}"#
        );
    }

    #[test]
    fn test_buses_update_wire_shape() {
        let mut routes = BTreeMap::new();
        routes.insert("kuril".to_string(), RouteBuses::default());
        let text = serde_json::to_string(&ServerMessage::BusesUpdate { routes }).unwrap();
        assert_eq!(text, r#"{"type":"buses:update","routes":{"kuril":{"buses":{}}}}"#);
    }
}
