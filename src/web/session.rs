//! Per-visitor UI state machine.
//!
//! `Idle → Captured → Analyzing → Result → Idle`, driven only by user actions.

use crate::image::EncodedPayload;
use crate::models::Prediction;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Sessions untouched for this long are dropped.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(15 * 60);

/// Answer to "How accurate was it?". Shown on the result panel, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    WayOff,
    Close,
    PrettyGood,
    SpotOn,
}

impl Rating {
    pub fn label(self) -> &'static str {
        match self {
            Rating::WayOff => "Way off",
            Rating::Close => "Close",
            Rating::PrettyGood => "Pretty good",
            Rating::SpotOn => "Spot on!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiState {
    Idle,
    Captured {
        payload: EncodedPayload,
        dimensions: Dimensions,
    },
    Analyzing {
        dimensions: Dimensions,
    },
    Result {
        prediction: Prediction,
        rating: Option<Rating>,
    },
}

impl UiState {
    pub fn name(&self) -> &'static str {
        match self {
            UiState::Idle => "idle",
            UiState::Captured { .. } => "captured",
            UiState::Analyzing { .. } => "analyzing",
            UiState::Result { .. } => "result",
        }
    }

    fn invalid(&self, action: &'static str) -> Error {
        Error::InvalidTransition {
            action,
            state: self.name(),
        }
    }

    /// Show a new frame. Retaking replaces the previous capture.
    pub fn capture(&mut self, payload: EncodedPayload, dimensions: Dimensions) -> Result<()> {
        match self {
            UiState::Idle | UiState::Captured { .. } => {
                *self = UiState::Captured {
                    payload,
                    dimensions,
                };
                Ok(())
            }
            _ => Err(self.invalid("capture")),
        }
    }

    /// Enter `Analyzing` and hand back the payload to analyze.
    pub fn begin_analysis(&mut self) -> Result<EncodedPayload> {
        match std::mem::replace(self, UiState::Idle) {
            UiState::Captured {
                payload,
                dimensions,
            } => {
                *self = UiState::Analyzing { dimensions };
                Ok(payload)
            }
            other => {
                *self = other;
                Err(self.invalid("analyze"))
            }
        }
    }

    pub fn complete(&mut self, prediction: Prediction) -> Result<()> {
        match self {
            UiState::Analyzing { .. } => {
                *self = UiState::Result {
                    prediction,
                    rating: None,
                };
                Ok(())
            }
            _ => Err(self.invalid("complete analysis")),
        }
    }

    pub fn reset(&mut self) -> Result<()> {
        match self {
            UiState::Analyzing { .. } => Err(self.invalid("reset")),
            _ => {
                *self = UiState::Idle;
                Ok(())
            }
        }
    }

    pub fn rate(&mut self, value: Rating) -> Result<()> {
        match self {
            UiState::Result { rating, .. } => {
                *rating = Some(value);
                Ok(())
            }
            _ => Err(self.invalid("rate")),
        }
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            UiState::Result { prediction, .. } => Some(prediction),
            _ => None,
        }
    }
}

/// What the page renders for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Prediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

impl SessionView {
    fn of(session_id: Uuid, state: &UiState) -> Self {
        let (image, prediction, rating) = match state {
            UiState::Idle => (None, None, None),
            UiState::Captured { dimensions, .. } | UiState::Analyzing { dimensions } => {
                (Some(*dimensions), None, None)
            }
            UiState::Result { prediction, rating } => (None, Some(prediction.clone()), *rating),
        };

        Self {
            session_id,
            state: state.name(),
            image,
            prediction,
            rating,
        }
    }
}

struct Session {
    ui: UiState,
    touched: Instant,
}

impl Session {
    fn is_stale(&self, ttl: Duration) -> bool {
        // an in-flight analysis always lands its result
        !matches!(self.ui, UiState::Analyzing { .. }) && self.touched.elapsed() >= ttl
    }
}

/// In-memory session table shared by all handlers.
///
/// The lock is only held for transitions, never across the inference call.
/// Every access refreshes a session; ones left idle past the TTL are evicted
/// when new sessions are created and by [`SessionStore::spawn_sweeper`].
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_ttl,
        }
    }

    pub fn create(&self) -> SessionView {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.idle_ttl;
        sessions.retain(|_, session| !session.is_stale(ttl));
        sessions.insert(
            id,
            Session {
                ui: UiState::Idle,
                touched: Instant::now(),
            },
        );
        SessionView::of(id, &UiState::Idle)
    }

    pub fn view(&self, id: Uuid) -> Result<SessionView> {
        self.update(id, |_| Ok(()))
    }

    /// Apply a transition and return the resulting view.
    pub fn update<F>(&self, id: Uuid, transition: F) -> Result<SessionView>
    where
        F: FnOnce(&mut UiState) -> Result<()>,
    {
        self.update_with(id, transition).map(|(view, ())| view)
    }

    /// Like [`SessionStore::update`], also returning the transition's output.
    pub fn update_with<F, T>(&self, id: Uuid, transition: F) -> Result<(SessionView, T)>
    where
        F: FnOnce(&mut UiState) -> Result<T>,
    {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        session.touched = Instant::now();
        let output = transition(&mut session.ui)?;
        Ok((SessionView::of(id, &session.ui), output))
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(&id).is_some()
    }

    /// Drop idle sessions, returning how many were removed.
    pub fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        let ttl = self.idle_ttl;
        sessions.retain(|_, session| !session.is_stale(ttl));
        before - sessions.len()
    }

    /// Evict idle sessions periodically on the current runtime.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = self.clone();
        let period = (self.idle_ttl / 2).max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = store.evict_idle();
                if evicted > 0 {
                    tracing::debug!("Evicted {} idle sessions", evicted);
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DIMS: Dimensions = Dimensions {
        width: 640,
        height: 480,
    };

    fn payload() -> EncodedPayload {
        EncodedPayload::from_bytes(b"jpeg")
    }

    #[test]
    fn test_full_cycle() {
        let mut state = UiState::Idle;

        state.capture(payload(), DIMS).unwrap();
        assert_eq!(state.name(), "captured");

        assert_eq!(state.begin_analysis().unwrap(), payload());
        assert_eq!(state, UiState::Analyzing { dimensions: DIMS });

        state
            .complete(Prediction::answer("About 40".to_string()))
            .unwrap();
        assert_eq!(state.prediction().unwrap().text, "About 40");

        state.rate(Rating::SpotOn).unwrap();
        state.reset().unwrap();
        assert_eq!(state, UiState::Idle);
        assert!(state.prediction().is_none());
    }

    #[test]
    fn test_retake_replaces_capture() {
        let mut state = UiState::Idle;
        state.capture(payload(), DIMS).unwrap();

        let other = EncodedPayload::from_bytes(b"second");
        let dims = Dimensions {
            width: 10,
            height: 20,
        };
        state.capture(other.clone(), dims).unwrap();

        assert_eq!(
            state,
            UiState::Captured {
                payload: other,
                dimensions: dims
            }
        );
    }

    #[test]
    fn test_analyze_requires_capture() {
        let mut state = UiState::Idle;
        let err = state.begin_analysis().unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidTransition {
                action: "analyze",
                state: "idle"
            }
        ));
        assert_eq!(state, UiState::Idle);
    }

    #[test]
    fn test_analyzing_blocks_other_actions() {
        let mut state = UiState::Analyzing { dimensions: DIMS };

        assert!(state.capture(payload(), DIMS).is_err());
        assert!(state.begin_analysis().is_err());
        assert!(state.reset().is_err());
        assert!(state.rate(Rating::Close).is_err());
        assert_eq!(state, UiState::Analyzing { dimensions: DIMS });
    }

    #[test]
    fn test_result_requires_reset_before_capture() {
        let mut state = UiState::Result {
            prediction: Prediction::no_result(),
            rating: None,
        };

        assert!(state.capture(payload(), DIMS).is_err());
        assert!(state.complete(Prediction::no_result()).is_err());
    }

    #[test]
    fn test_rating_serialization() {
        assert_eq!(
            serde_json::to_string(&Rating::PrettyGood).unwrap(),
            "\"pretty_good\""
        );
        let parsed: Rating = serde_json::from_str("\"way_off\"").unwrap();
        assert_eq!(parsed, Rating::WayOff);
        assert_eq!(Rating::SpotOn.label(), "Spot on!");
    }

    #[test]
    fn test_store_tracks_sessions() {
        let store = SessionStore::new();
        let view = store.create();
        assert_eq!(view.state, "idle");
        assert_eq!(store.len(), 1);

        let captured = store
            .update(view.session_id, |state| state.capture(payload(), DIMS))
            .unwrap();
        assert_eq!(captured.state, "captured");
        assert_eq!(captured.image, Some(DIMS));

        let (analyzing, taken) = store
            .update_with(view.session_id, |state| state.begin_analysis())
            .unwrap();
        assert_eq!(analyzing.state, "analyzing");
        assert_eq!(taken, payload());

        assert!(store.remove(view.session_id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_unknown_session() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.view(id), Err(Error::SessionNotFound(missing)) if missing == id));
    }

    #[test]
    fn test_view_serialization_for_result() {
        let store = SessionStore::new();
        let id = store.create().session_id;
        store
            .update(id, |state| {
                state.capture(payload(), DIMS)?;
                state.begin_analysis()?;
                state.complete(Prediction::answer("35".to_string()))
            })
            .unwrap();

        let json = serde_json::to_value(store.view(id).unwrap()).unwrap();
        assert_eq!(json["state"], "result");
        assert_eq!(json["prediction"]["text"], "35");
        assert!(json.get("image").is_none());
        assert!(json.get("rating").is_none());
    }

    #[test]
    fn test_idle_session_is_evicted() {
        let store = SessionStore::with_idle_ttl(Duration::from_millis(20));
        let id = store.create().session_id;
        store
            .update(id, |state| state.capture(payload(), DIMS))
            .unwrap();

        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(store.evict_idle(), 1);
        assert!(matches!(store.view(id), Err(Error::SessionNotFound(_))));
    }

    #[test]
    fn test_access_keeps_session_alive() {
        let store = SessionStore::with_idle_ttl(Duration::from_millis(200));
        let id = store.create().session_id;

        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(80));
            store.view(id).unwrap();
        }

        assert_eq!(store.evict_idle(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_analyzing_session_is_never_evicted() {
        let store = SessionStore::with_idle_ttl(Duration::from_millis(10));
        let id = store.create().session_id;
        store
            .update_with(id, |state| {
                state.capture(payload(), DIMS)?;
                state.begin_analysis()
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(store.evict_idle(), 0);
        let view = store
            .update(id, |state| state.complete(Prediction::no_result()))
            .unwrap();
        assert_eq!(view.state, "result");
    }

    #[test]
    fn test_create_evicts_stale_sessions() {
        let store = SessionStore::with_idle_ttl(Duration::from_millis(20));
        let stale = store.create().session_id;

        std::thread::sleep(Duration::from_millis(40));
        let fresh = store.create().session_id;

        assert_eq!(store.len(), 1);
        assert!(store.view(stale).is_err());
        assert!(store.view(fresh).is_ok());
    }

    #[tokio::test]
    async fn test_sweeper_evicts_in_background() {
        let store = SessionStore::with_idle_ttl(Duration::from_millis(30));
        store.create();

        let sweeper = store.spawn_sweeper();
        tokio::time::sleep(Duration::from_millis(200)).await;
        sweeper.abort();

        assert!(store.is_empty());
    }
}
