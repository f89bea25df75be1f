use crate::api::response::{empty_object, unwrap_envelope};
use crate::api::{endpoint, Error, UpstreamRequest};
use crate::model::{LoginSummary, SessionStatus, Snapshot};
use crate::normalize::{normalize, RawSources, Source};
use crate::session::SessionManager;
use crate::settings::Settings;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

/// Result of [`Dashboard::data`]
#[derive(Debug, Clone)]
pub struct DataOutcome {
    pub snapshot: Arc<Snapshot>,
    /// `true` when served from cache without touching upstream
    pub cached: bool,
}

#[derive(Debug)]
struct CachedSnapshot {
    snapshot: Arc<Snapshot>,
    fetched: Instant,
}

#[derive(Debug)]
struct State {
    sessions: SessionManager,
    cache: Option<CachedSnapshot>,
}

impl State {
    fn status(&self) -> SessionStatus {
        let session = self.sessions.session();
        SessionStatus {
            connected: self.sessions.is_connected(),
            plant_name: session.plant_name.clone(),
            device_sn: session.device_sn.clone(),
            last_login: session.last_login,
            last_fetch: self.cache.as_ref().map(|c| c.snapshot.timestamp),
        }
    }
}

/// Session and snapshot cache behind a single lock, so at most one refresh runs at a time
/// and concurrent requests reuse its result. Status is published separately and never waits
/// for a refresh.
#[derive(Debug)]
pub struct Dashboard {
    state: Mutex<State>,
    status: watch::Sender<SessionStatus>,
    status_view: watch::Receiver<SessionStatus>,
    freshness: Duration,
}

impl Dashboard {
    pub fn new(sessions: SessionManager, freshness: Duration) -> Self {
        let state = State {
            sessions,
            cache: None,
        };
        let (status, status_view) = watch::channel(state.status());

        Self {
            state: Mutex::new(state),
            status,
            status_view,
            freshness,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        let sessions = SessionManager::from_settings(settings)?;
        Ok(Self::new(sessions, settings.cache_ttl()))
    }

    fn publish(&self, state: &State) {
        /* the receiver lives in `self`, so sending cannot fail */
        let _ = self.status.send(state.status());
    }

    /// Force a full login.
    pub async fn connect(&self) -> Result<LoginSummary, Error> {
        let mut state = self.state.lock().await;
        let result = state.sessions.login().await;
        self.publish(&state);
        result
    }

    /// Latest snapshot, refreshed from upstream when the cached one is older than the
    /// freshness window.
    pub async fn data(&self) -> Result<DataOutcome, Error> {
        let mut state = self.state.lock().await;

        if let Some(cached) = &state.cache {
            if cached.fetched.elapsed() < self.freshness {
                log::debug!("Snapshot still fresh; returning cached result");
                return Ok(DataOutcome {
                    snapshot: cached.snapshot.clone(),
                    cached: true,
                });
            }
        }

        let raw = match prepare_and_collect(&mut state.sessions).await {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Refresh failed: {}", e);
                if e.is_session_problem() {
                    state.sessions.invalidate();
                }
                self.publish(&state);
                return Err(e);
            }
        };

        let snapshot = Arc::new(normalize(&raw, state.sessions.session(), Utc::now()));
        state.cache = Some(CachedSnapshot {
            snapshot: snapshot.clone(),
            fetched: Instant::now(),
        });
        self.publish(&state);

        Ok(DataOutcome {
            snapshot,
            cached: false,
        })
    }

    /// Raw payload of every source, bypassing the cache.
    pub async fn raw_sources(&self) -> Result<RawSources, Error> {
        let mut state = self.state.lock().await;
        let result = prepare_and_collect(&mut state.sessions).await;
        if let Err(e) = &result {
            if e.is_session_problem() {
                state.sessions.invalidate();
            }
        }
        self.publish(&state);
        result
    }

    /// Session state as of the last finished operation; never calls upstream or waits on a
    /// refresh in progress.
    pub fn status(&self) -> SessionStatus {
        self.status_view.borrow().clone()
    }
}

async fn prepare_and_collect(sessions: &mut SessionManager) -> Result<RawSources, Error> {
    sessions.ensure_session().await?;
    let (plant_id, device_sn) = sessions.require_device()?;
    collect_sources(sessions, &plant_id, &device_sn).await
}

fn source_request(source: Source, plant_id: &str, device_sn: &str) -> UpstreamRequest {
    let label = source.label();
    match source {
        Source::StorageDetail => UpstreamRequest::get(label, endpoint::STORAGE)
            .param("op", endpoint::OP_STORAGE_DETAIL)
            .param("storageId", device_sn),
        Source::EnergyOverview => UpstreamRequest::get(label, endpoint::STORAGE)
            .param("op", endpoint::OP_ENERGY_OVERVIEW)
            .param("plantId", plant_id)
            .param("storageSn", device_sn),
        Source::StorageParams => UpstreamRequest::get(label, endpoint::STORAGE)
            .param("op", endpoint::OP_STORAGE_PARAMS)
            .param("storageId", device_sn),
        Source::PlantDetail => UpstreamRequest::get(label, endpoint::PLANT_DETAIL)
            .param("plantId", plant_id)
            .param("type", "1")
            .param("date", Utc::now().format("%Y-%m-%d").to_string()),
    }
}

/// Object under `key` when there is one, otherwise `value` unchanged
fn nested_or_self(value: Value, key: &str) -> Value {
    if let Some(inner @ Value::Object(_)) = value.get(key) {
        return inner.clone();
    }
    value
}

/// Strip the envelope each source answers with.
fn unwrap_source(source: Source, value: Value) -> Value {
    match source {
        Source::StorageDetail | Source::EnergyOverview => unwrap_envelope(value, "obj"),
        Source::StorageParams => nested_or_self(unwrap_envelope(value, "obj"), "storageDetailBean"),
        Source::PlantDetail => nested_or_self(unwrap_envelope(value, "back"), "plantData"),
    }
}

/// Fetch every source in turn. A failing source is replaced by an empty object and its
/// error recorded, so one bad endpoint does not spoil the whole refresh. A failed re-login
/// aborts the refresh instead.
async fn collect_sources(
    sessions: &mut SessionManager,
    plant_id: &str,
    device_sn: &str,
) -> Result<RawSources, Error> {
    let mut raw = RawSources::default();

    for source in Source::ALL.iter().copied() {
        let request = source_request(source, plant_id, device_sn);
        match sessions.with_session_retry(&request).await {
            Ok(value) => raw.set(source, unwrap_source(source, value)),
            Err(e) if !sessions.is_connected() => {
                log::warn!("{}: session lost, abandoning refresh: {}", source.label(), e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("{}: {}", source.label(), e);
                raw.errors.insert(source.label().to_string(), e.to_string());
                raw.set(source, empty_object());
            }
        }
    }

    Ok(raw)
}
