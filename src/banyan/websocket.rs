use crate::coordinator::{Connect, Disconnect, Inbound, OutboundFrame, TrackerCoordinator};
use crate::protocol::ClientMessage;
use actix::prelude::*;
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One websocket connection. Parses inbound frames and hands them to the
/// coordinator; outbound frames arrive pre-serialized as [`OutboundFrame`].
pub struct ShuttleWebSocket {
    pub session_id: String,
    pub coordinator: Addr<TrackerCoordinator>,
    pub hb: Instant,
}

impl ShuttleWebSocket {
    pub fn new(coordinator: Addr<TrackerCoordinator>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            coordinator,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for ShuttleWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        self.coordinator.do_send(Connect {
            session_id: self.session_id.clone(),
            addr: ctx.address().recipient(),
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> actix::Running {
        self.coordinator.do_send(Disconnect {
            session_id: self.session_id.clone(),
        });
        actix::Running::Stop
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ShuttleWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => {
                        self.coordinator.do_send(Inbound {
                            session_id: self.session_id.clone(),
                            message,
                        });
                    }
                    Err(e) => {
                        // Malformed frames are dropped, never fatal
                        log::warn!("dropping malformed frame from {}: {}", self.session_id, e);
                    }
                }
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => (),
        }
    }
}

impl Handler<OutboundFrame> for ShuttleWebSocket {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0.as_str());
    }
}
