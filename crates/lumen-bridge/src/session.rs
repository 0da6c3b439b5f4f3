//! Persisted mesh session state
//!
//! A single process-wide record holding the mesh key indices, the wrapping
//! transaction counter, and the last light values successfully sent to the
//! mesh. It mirrors the last commanded values, not necessarily the true
//! device state.
//!
//! The in-memory value sits behind a mutex with short synchronous critical
//! sections; persistence runs after the lock is released, so concurrent
//! event handlers never observe interleaved partial writes.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lumen_state::Storage;

use crate::config::KEY_INDEX_UNUSED;
use crate::error::Result;

/// Storage key of the singleton session record
pub const SESSION_KEY: &str = "session";

/// Mesh session state persisted across restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// NetKey index, set by provisioning
    pub net_idx: u16,
    /// AppKey index, set by the config-bind event
    pub app_idx: u16,
    /// Last commanded on/off state
    pub onoff: bool,
    /// Wrapping 8-bit transaction counter
    pub tid: u8,
    /// Last commanded hue, degrees in [0, 360]
    pub hue: f32,
    /// Last commanded saturation, percent in [0, 100]
    pub saturation: f32,
    /// Last commanded lightness, percent in [0, 100]
    pub lightness: f32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            net_idx: KEY_INDEX_UNUSED,
            app_idx: KEY_INDEX_UNUSED,
            onoff: false,
            tid: 0,
            hue: 0.0,
            saturation: 0.0,
            lightness: 0.0,
        }
    }
}

/// Owner of the session singleton
///
/// All mutation goes through this handle; every persisting mutation writes
/// the full record back to storage (save-on-mutate).
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    state: Mutex<SessionState>,
}

impl SessionStore {
    /// Restore the session from storage, falling back to defaults when no
    /// record exists
    pub async fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let state = match storage.get(SESSION_KEY).await? {
            Some(bytes) => match serde_json::from_slice::<SessionState>(&bytes) {
                Ok(state) => {
                    info!(
                        net_idx = format!("0x{:04X}", state.net_idx),
                        app_idx = format!("0x{:04X}", state.app_idx),
                        onoff = state.onoff,
                        tid = state.tid,
                        lightness = state.lightness,
                        "Restored mesh session"
                    );
                    state
                }
                Err(e) => {
                    debug!(error = %e, "Stored session undeserializable, starting fresh");
                    SessionState::default()
                }
            },
            None => SessionState::default(),
        };

        Ok(Self {
            storage,
            state: Mutex::new(state),
        })
    }

    /// Current value of the session record
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Current NetKey/AppKey indices
    pub fn indices(&self) -> (u16, u16) {
        let state = self.state.lock();
        (state.net_idx, state.app_idx)
    }

    /// Consume the next transaction id, wrapping at 256
    ///
    /// Mutates memory only; the new counter value reaches storage with the
    /// next persisting mutation.
    pub fn next_tid(&self) -> u8 {
        let mut state = self.state.lock();
        let tid = state.tid;
        state.tid = state.tid.wrapping_add(1);
        tid
    }

    /// Record a successfully sent lightness percentage and persist
    pub async fn update_lightness(&self, percent: f32) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.lightness = percent;
        }
        self.persist().await
    }

    /// Record successfully sent HSL values and persist
    pub async fn update_hsl(&self, hue: f32, saturation: f32, lightness: f32) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.hue = hue;
            state.saturation = saturation;
            state.lightness = lightness;
        }
        self.persist().await
    }

    /// Record an on/off state observed in a status response
    ///
    /// Memory only; on/off reaches storage with the next persisting
    /// mutation.
    pub fn set_onoff(&self, on: bool) {
        self.state.lock().onoff = on;
    }

    /// Record the NetKey index from a provisioning-complete event
    ///
    /// Memory only: persisting here would race the session restore that
    /// follows provisioning and write back a stale AppKey index. The value
    /// reaches storage with the app-key bind.
    pub fn set_net_idx(&self, net_idx: u16) {
        self.state.lock().net_idx = net_idx;
    }

    /// Record the AppKey index from a config-bind event and persist
    pub async fn set_app_idx(&self, app_idx: u16) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.app_idx = app_idx;
        }
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = self.snapshot();
        let bytes = serde_json::to_vec(&snapshot)?;
        self.storage.put(SESSION_KEY, &bytes).await?;
        Ok(())
    }
}
