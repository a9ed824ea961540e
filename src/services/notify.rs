//! Cross-member workout notifications and the permission capability that
//! gates their delivery.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::group::GroupMember;
use crate::services::feed::{ChangeKind, LogChange};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutNotice {
    pub user_id: Uuid,
    pub username: String,
    pub log_date: NaiveDate,
    pub message: String,
}

/// Returns a notice for `viewer` when another member's workout flag just
/// flipped to true. Re-saving an already-true workout stays silent.
pub fn workout_notice(
    change: &LogChange,
    viewer: Uuid,
    members: &[GroupMember],
) -> Option<WorkoutNotice> {
    let new = change.new.as_ref()?;
    if !new.worked_out || new.user_id == viewer {
        return None;
    }

    match change.kind {
        ChangeKind::Insert => {}
        ChangeKind::Update => {
            if change.old.as_ref().is_some_and(|old| old.worked_out) {
                return None;
            }
        }
        ChangeKind::Delete => return None,
    }

    let actor = members.iter().find(|m| m.user_id == new.user_id)?;
    Some(WorkoutNotice {
        user_id: actor.user_id,
        username: actor.username.clone(),
        log_date: new.log_date,
        message: format!("{} just crushed a workout! 💪", actor.username),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    #[default]
    Default,
    Unsupported,
}

/// Whatever the platform offers for notification permission and for
/// remembering that the user was already asked.
pub trait NotificationCapability {
    fn permission(&self) -> PermissionState;

    /// Asks for permission and returns the state known afterwards.
    fn request_permission(&mut self) -> PermissionState;

    fn prompt_shown(&self) -> bool;

    fn mark_prompt_shown(&mut self);

    fn has_permission(&self) -> bool {
        self.permission() == PermissionState::Granted
    }
}

/// Prompt only users who have neither answered nor seen the prompt.
pub fn should_prompt<C: NotificationCapability + ?Sized>(cap: &C) -> bool {
    cap.permission() == PermissionState::Default && !cap.prompt_shown()
}

/// Permission state reported by a connected client. Requests are forwarded
/// to the client, so the answer arrives later via `set_permission`.
#[derive(Debug, Default)]
pub struct SessionPermissions {
    permission: PermissionState,
    prompt_shown: bool,
    request_pending: bool,
}

impl SessionPermissions {
    pub fn new(prompt_shown: bool) -> Self {
        Self {
            prompt_shown,
            ..Self::default()
        }
    }

    pub fn set_permission(&mut self, state: PermissionState) {
        self.permission = state;
        self.request_pending = false;
    }

    pub fn request_pending(&self) -> bool {
        self.request_pending
    }
}

impl NotificationCapability for SessionPermissions {
    fn permission(&self) -> PermissionState {
        self.permission
    }

    fn request_permission(&mut self) -> PermissionState {
        if self.permission == PermissionState::Default {
            self.request_pending = true;
        }
        self.permission
    }

    fn prompt_shown(&self) -> bool {
        self.prompt_shown
    }

    fn mark_prompt_shown(&mut self) {
        self.prompt_shown = true;
    }
}
