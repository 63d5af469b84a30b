//! Masks: unlockable personas, at most one worn at a time.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, VeilError};
use crate::store::Collection;
use crate::types::Timestamp;

/// One unlocked mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mask {
    /// Stable id.
    pub mask_id: String,
    /// Display name.
    pub mask_name: String,
    /// When it was unlocked.
    pub unlocked_at: Timestamp,
    /// What unlocked it.
    pub unlock_trigger: String,
    /// Currently worn.
    #[serde(default)]
    pub is_active: bool,
}

/// All masks this visitor has unlocked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskWardrobe {
    masks: Vec<Mask>,
}

impl Collection for MaskWardrobe {
    const KEY: &'static str = "veil.masks";
}

impl MaskWardrobe {
    /// Unlock a mask. Unlocking one that is already held changes nothing and
    /// returns `false`.
    pub fn unlock(
        &mut self,
        mask_id: &str,
        mask_name: &str,
        unlock_trigger: &str,
        now: Timestamp,
    ) -> bool {
        if self.masks.iter().any(|m| m.mask_id == mask_id) {
            return false;
        }
        self.masks.push(Mask {
            mask_id: mask_id.to_string(),
            mask_name: mask_name.to_string(),
            unlocked_at: now,
            unlock_trigger: unlock_trigger.to_string(),
            is_active: false,
        });
        info!(mask = mask_id, trigger = unlock_trigger, "Mask unlocked");
        true
    }

    /// Make `mask_id` the only active mask.
    ///
    /// The lookup happens before anything is touched, so an unknown id
    /// leaves the current selection as it was.
    ///
    /// # Errors
    ///
    /// [`VeilError::NotFound`] if the mask was never unlocked.
    pub fn activate(&mut self, mask_id: &str) -> Result<()> {
        let target = self
            .masks
            .iter()
            .position(|m| m.mask_id == mask_id)
            .ok_or_else(|| VeilError::not_found("mask", mask_id))?;
        for (i, mask) in self.masks.iter_mut().enumerate() {
            mask.is_active = i == target;
        }
        info!(mask = mask_id, "Mask activated");
        Ok(())
    }

    /// Take off whatever mask is worn.
    pub fn deactivate_all(&mut self) {
        for mask in &mut self.masks {
            mask.is_active = false;
        }
    }

    /// The mask currently worn.
    #[must_use]
    pub fn active(&self) -> Option<&Mask> {
        self.masks.iter().find(|m| m.is_active)
    }

    /// All unlocked masks, in unlock order.
    #[must_use]
    pub fn list(&self) -> &[Mask] {
        &self.masks
    }
}
