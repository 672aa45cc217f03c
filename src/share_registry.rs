use ahash::AHashMap;

/// Sessions with no position report in this window are purged by the sweep.
pub const DEFAULT_MAX_AGE_SECS: i64 = 180;

/// One actively sharing connection. Position stays `None` until the first
/// `share:pos` arrives; such sessions are skipped by aggregation but still
/// age out through the sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct ShareSession {
    pub session_id: String,
    pub route_id: String,
    pub bus_number: String,
    pub position: Option<(f64, f64)>,
    pub speed: Option<f64>,
    pub last_update_ms: i64,
}

/// Mutable table of active share sessions. Owned exclusively by the
/// coordinator actor, so every mutation and snapshot is serialized through
/// its mailbox and aggregation never observes a half-applied update.
#[derive(Debug, Default)]
pub struct ShareRegistry {
    sessions: AHashMap<String, ShareSession>,
}

impl ShareRegistry {
    pub fn new() -> ShareRegistry {
        ShareRegistry {
            sessions: AHashMap::new(),
        }
    }

    /// Insert or replace the session for this connection. Replacing resets
    /// the position to unknown, so a route switch never carries a stale
    /// coordinate from the previous route.
    pub fn start(&mut self, session_id: &str, route_id: &str, bus_number: &str, now_ms: i64) {
        self.sessions.insert(
            session_id.to_string(),
            ShareSession {
                session_id: session_id.to_string(),
                route_id: route_id.to_string(),
                bus_number: bus_number.to_string(),
                position: None,
                speed: None,
                last_update_ms: now_ms,
            },
        );
    }

    /// Update the position of an existing session. Returns false (and does
    /// nothing) when no session exists, so a client cannot inject positions
    /// without a prior start.
    pub fn report_position(
        &mut self,
        session_id: &str,
        lat: f64,
        lng: f64,
        speed: Option<f64>,
        now_ms: i64,
    ) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(session) => {
                session.position = Some((lat, lng));
                session.speed = speed;
                session.last_update_ms = now_ms;
                true
            }
            None => false,
        }
    }

    /// Remove the session, returning it if it existed.
    pub fn stop(&mut self, session_id: &str) -> Option<ShareSession> {
        self.sessions.remove(session_id)
    }

    pub fn is_sharing(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Remove and return every session whose last update is older than
    /// `max_age_secs`. Sessions exactly at the threshold survive.
    pub fn remove_expired(&mut self, now_ms: i64, max_age_secs: i64) -> Vec<ShareSession> {
        let cutoff_ms = now_ms - max_age_secs * 1000;

        let expired_ids: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.last_update_ms < cutoff_ms)
            .map(|s| s.session_id.clone())
            .collect();

        expired_ids
            .iter()
            .filter_map(|id| self.sessions.remove(id))
            .collect()
    }

    /// Point-in-time copy of all sessions, used by the aggregation tick.
    pub fn snapshot(&self) -> Vec<ShareSession> {
        self.sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_then_report_position() {
        let mut registry = ShareRegistry::new();
        registry.start("s1", "kuril", "1", 1_000);

        assert!(registry.is_sharing("s1"));
        assert!(registry.report_position("s1", 23.80, 90.45, Some(7.2), 2_000));

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].position, Some((23.80, 90.45)));
        assert_eq!(snap[0].last_update_ms, 2_000);
    }

    #[test]
    fn test_position_report_without_start_is_ignored() {
        let mut registry = ShareRegistry::new();
        assert!(!registry.report_position("ghost", 23.80, 90.45, None, 1_000));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_restart_resets_position() {
        let mut registry = ShareRegistry::new();
        registry.start("s1", "kuril", "1", 1_000);
        registry.report_position("s1", 23.80, 90.45, None, 1_500);

        // Same connection switches to another route
        registry.start("s1", "aftab", "2", 2_000);

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].route_id, "aftab");
        assert_eq!(snap[0].position, None);
    }

    #[test]
    fn test_stop_is_noop_for_unknown_session() {
        let mut registry = ShareRegistry::new();
        assert!(registry.stop("missing").is_none());

        registry.start("s1", "kuril", "1", 1_000);
        let removed = registry.stop("s1").unwrap();
        assert_eq!(removed.bus_number, "1");
        assert!(!registry.is_sharing("s1"));
    }

    #[test]
    fn test_remove_expired_honours_threshold() {
        let mut registry = ShareRegistry::new();
        let now = 400_000;

        // 200s old: expired with a 180s window
        registry.start("old", "kuril", "1", now - 200_000);
        // 100s old: survives
        registry.start("young", "kuril", "1", now - 100_000);
        // exactly 180s old: survives (strictly-older-than cutoff)
        registry.start("edge", "aftab", "1", now - 180_000);

        let removed = registry.remove_expired(now, DEFAULT_MAX_AGE_SECS);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].session_id, "old");

        assert!(registry.is_sharing("young"));
        assert!(registry.is_sharing("edge"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_position_report_refreshes_age() {
        let mut registry = ShareRegistry::new();
        let now = 1_000_000;
        registry.start("s1", "kuril", "1", now - 200_000);
        registry.report_position("s1", 23.80, 90.45, None, now - 10_000);

        let removed = registry.remove_expired(now, DEFAULT_MAX_AGE_SECS);
        assert!(removed.is_empty());
        assert!(registry.is_sharing("s1"));
    }
}
