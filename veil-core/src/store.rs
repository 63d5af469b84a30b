//! Typed, self-healing access to the durable key-value store.
//!
//! [`StateStore`] is the only component that touches raw bytes. It owns
//! three rules:
//!
//! 1. A blob that cannot be decoded is treated as absent and falls back to
//!    the zero value. A backend that cannot be read at all is different:
//!    the `try_*` reads report it, so callers never save a zero value over
//!    history they simply failed to see.
//! 2. Writes are total overwrites of one key; there are no partial patches.
//! 3. Legacy standalone keys are folded into the aggregate once and then
//!    deleted.
//!
//! The store itself takes no session lock: two independent read→write
//! cycles against the same key lose one update (last write wins). The host
//! context serializes every such cycle behind a single writer lock.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::migration::{self, legacy};
use crate::state::UserState;
use crate::types::{Identity, Timestamp};

/// Key of the versioned aggregate.
pub const USER_STATE_KEY: &str = "veil.user_state";

/// An independently keyed record stored next to the aggregate.
pub trait Collection: Serialize + DeserializeOwned + Default {
    /// Storage key.
    const KEY: &'static str;
}

impl Collection for Identity {
    const KEY: &'static str = "veil.identity";
}

/// Typed facade over a [`KeyValueStore`].
#[derive(Debug)]
pub struct StateStore<S> {
    kv: S,
}

impl<S: KeyValueStore> StateStore<S> {
    /// Wrap a key-value backend.
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    /// Borrow the backend.
    pub fn backend(&self) -> &S {
        &self.kv
    }

    /// Session-start read: decode (or default), fold in legacy keys, count
    /// the visit, stamp `last_visit`, write back, return.
    ///
    /// A failed write-back is logged and the in-memory state is still
    /// returned.
    ///
    /// # Errors
    ///
    /// Backend read failures. Nothing is written in that case.
    pub fn try_load(&self, now: Timestamp) -> Result<UserState> {
        let mut state = self.try_snapshot()?;
        self.migrate_legacy_keys(&mut state);
        state.begin_visit(now);

        if let Err(e) = self.save(&state) {
            warn!(error = %e, "Could not persist visit; continuing with in-memory state");
        }
        info!(visits = state.visit_count(), "Visitor session loaded");
        Ok(state)
    }

    /// [`try_load`](Self::try_load) that never fails. When the backend
    /// cannot be read the session runs on an unsaved fresh state, and the
    /// stored history is left untouched.
    pub fn load(&self, now: Timestamp) -> UserState {
        self.try_load(now).unwrap_or_else(|e| {
            warn!(error = %e, "User state read failed; session state will not be saved");
            let mut state = UserState::default();
            state.begin_visit(now);
            state
        })
    }

    /// Read the aggregate without visit accounting.
    ///
    /// Absent or corrupt blobs yield the zero value.
    ///
    /// # Errors
    ///
    /// Backend read failures other than corruption.
    pub fn try_snapshot(&self) -> Result<UserState> {
        match self.kv.get(USER_STATE_KEY) {
            Ok(Some(bytes)) => Ok(migration::decode(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "Discarding unreadable user state");
                UserState::default()
            })),
            Ok(None) => Ok(UserState::default()),
            Err(e) if e.is_corruption() => {
                warn!(error = %e, "Discarding corrupt user state");
                Ok(UserState::default())
            }
            Err(e) => Err(e),
        }
    }

    /// [`try_snapshot`](Self::try_snapshot) for read-only callers; a backend
    /// failure yields the zero value. Never save what this returns.
    pub fn snapshot(&self) -> UserState {
        self.try_snapshot().unwrap_or_else(|e| {
            warn!(error = %e, "User state read failed; using defaults");
            UserState::default()
        })
    }

    /// Overwrite the aggregate.
    ///
    /// # Errors
    ///
    /// Encoding or backend failures.
    pub fn save(&self, state: &UserState) -> Result<()> {
        let bytes = migration::encode(state)?;
        self.kv.set(USER_STATE_KEY, &bytes)?;
        debug!(bytes = bytes.len(), "User state saved");
        Ok(())
    }

    /// Read a collection, falling back to its default when absent or corrupt.
    ///
    /// # Errors
    ///
    /// Backend read failures other than corruption.
    pub fn try_load_collection<C: Collection>(&self) -> Result<C> {
        match self.kv.get(C::KEY) {
            Ok(Some(bytes)) => Ok(serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(key = C::KEY, error = %e, "Discarding unreadable collection");
                C::default()
            })),
            Ok(None) => Ok(C::default()),
            Err(e) if e.is_corruption() => {
                warn!(key = C::KEY, error = %e, "Discarding corrupt collection");
                Ok(C::default())
            }
            Err(e) => Err(e),
        }
    }

    /// [`try_load_collection`](Self::try_load_collection) for read-only
    /// callers; a backend failure yields the default.
    pub fn load_collection<C: Collection>(&self) -> C {
        self.try_load_collection().unwrap_or_else(|e| {
            warn!(key = C::KEY, error = %e, "Collection read failed; using defaults");
            C::default()
        })
    }

    /// Overwrite a collection.
    ///
    /// # Errors
    ///
    /// Encoding or backend failures.
    pub fn save_collection<C: Collection>(&self, value: &C) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.kv.set(C::KEY, &bytes)
    }

    /// The persisted identity, minting and storing one on first use.
    ///
    /// # Errors
    ///
    /// Backend read failures; no identity is minted over one that could
    /// not be read.
    pub fn try_identity(&self, now: Timestamp) -> Result<Identity> {
        match self.kv.get(Identity::KEY) {
            Ok(Some(bytes)) => {
                if let Ok(identity) = serde_json::from_slice::<Identity>(&bytes) {
                    return Ok(identity);
                }
            }
            Ok(None) => {}
            Err(e) if e.is_corruption() => {}
            Err(e) => return Err(e),
        }
        let identity = Identity {
            created_at: now,
            ..Identity::default()
        };
        if let Err(e) = self.save_collection(&identity) {
            warn!(error = %e, "Could not persist identity");
        }
        Ok(identity)
    }

    /// [`try_identity`](Self::try_identity) that never fails. On a read
    /// failure the returned identity is transient and nothing is stored.
    pub fn identity(&self, now: Timestamp) -> Identity {
        self.try_identity(now).unwrap_or_else(|e| {
            warn!(error = %e, "Identity read failed; using a transient identity");
            Identity {
                created_at: now,
                ..Identity::default()
            }
        })
    }

    fn migrate_legacy_keys(&self, state: &mut UserState) {
        let found: Vec<(&str, Vec<u8>)> = legacy::ALL
            .iter()
            .filter_map(|key| match self.kv.get(key) {
                Ok(Some(bytes)) => Some((*key, bytes)),
                _ => None,
            })
            .collect();
        if found.is_empty() {
            return;
        }

        state.absorb(&migration::state_from_legacy(&found));
        for (key, _) in &found {
            if let Err(e) = self.kv.remove(key) {
                warn!(key, error = %e, "Could not remove migrated legacy key");
            }
        }
        info!(keys = found.len(), "Migrated legacy keys into user state");
    }
}
