use std::path::PathBuf;

use anyhow::Result;
use pact_core::{
    accountability_score, clamp_progress, fallback_reframe_suggestions, format_duration,
    initial_progress, parse_duration, promise_fingerprint, reminder_at, CommentId,
    FriendRequestId, NotificationId, NotificationKind, PromiseId, PromiseKind, PromiseStatus,
    Recurrence, ReframeSuggestion, ReminderUnit, UserId, Visibility, DEFAULT_CATEGORIES,
};
use pact_store_sqlite::{ParticipantRow, PromiseRow, SqliteStore};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePromiseRequest {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: String,
    pub deadline: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub target_value: Option<i64>,
    #[serde(default)]
    pub current_value: Option<i64>,
    #[serde(default)]
    pub reminder_value: Option<i64>,
    #[serde(default)]
    pub reminder_unit: Option<String>,
    #[serde(default)]
    pub reminder_hours: Option<i64>,
    #[serde(default)]
    pub participant_user_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UpdatePromiseRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReframeRequest {
    pub name: String,
    #[serde(default)]
    pub content: String,
    pub deadline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddCommentRequest {
    pub body: String,
    #[serde(default)]
    pub parent_comment_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantView {
    pub user_id: UserId,
    pub name: String,
    pub display_name: String,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromiseSummary {
    pub id: PromiseId,
    pub name: String,
    pub content: String,
    pub kind: PromiseKind,
    pub status: PromiseStatus,
    pub deadline_at: i64,
    pub time_left: String,
    pub shared: bool,
    pub participants: Vec<ParticipantView>,
    pub category: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub target_value: Option<i64>,
    pub current_value: Option<i64>,
    pub visibility: Visibility,
    pub reminder_at: Option<i64>,
    pub streak_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissedPromise {
    pub id: PromiseId,
    pub name: String,
    pub content: String,
    pub kind: PromiseKind,
    pub status: PromiseStatus,
    pub deadline_at: i64,
    pub shared: bool,
    pub participants: Vec<ParticipantView>,
    pub category: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub target_value: Option<i64>,
    pub current_value: Option<i64>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardResponse {
    pub promises: Vec<PromiseSummary>,
    pub missed: Option<MissedPromise>,
    pub accountability_score: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentView {
    pub id: CommentId,
    pub user_id: UserId,
    pub author_name: String,
    pub body: String,
    pub parent_comment_id: Option<CommentId>,
    pub like_count: i64,
    pub liked_by_me: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromiseDetail {
    pub id: PromiseId,
    pub name: String,
    pub content: String,
    pub kind: PromiseKind,
    pub status: PromiseStatus,
    pub deadline_at: i64,
    pub shared: bool,
    pub participants: Vec<ParticipantView>,
    pub category: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub target_value: Option<i64>,
    pub current_value: Option<i64>,
    pub visibility: Visibility,
    pub reminder_at: Option<i64>,
    pub streak_count: i64,
    pub integrity_ok: bool,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    MarkedComplete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompleteOutcome {
    pub status: CompletionStatus,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusOutcome {
    pub status: PromiseStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Active,
    MarkedComplete,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressOutcome {
    pub current_value: i64,
    pub target_value: i64,
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeOutcome {
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Completed,
    Created,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityItem {
    pub kind: ActivityKind,
    pub promise_id: PromiseId,
    pub promise_name: String,
    pub at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub display_name: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendView {
    pub id: UserId,
    pub name: String,
    pub display_name: Option<String>,
    pub email: String,
    pub mutual_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendRequestView {
    pub id: FriendRequestId,
    pub user_id: UserId,
    pub name: String,
    pub display_name: Option<String>,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentRequest {
    pub id: FriendRequestId,
    pub to_user_id: UserId,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationView {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub from_user_id: Option<UserId>,
    pub from_name: Option<String>,
    pub related_id: Option<i64>,
    pub message: Option<String>,
    pub read_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct PactApi {
    db_path: PathBuf,
}

impl PactApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> ApiResult<SqliteStore> {
        let mut store = SqliteStore::open(&self.db_path)?;
        store.migrate()?;
        Ok(store)
    }

    // ---- users ----

    /// Register a user row. Sign-in itself lives with the external auth
    /// collaborator; this is the seam it calls on first login.
    ///
    /// # Errors
    /// `InvalidInput` on a blank name or email; `Internal` on store failure.
    pub fn register_user(
        &self,
        name: &str,
        display_name: Option<&str>,
        email: &str,
    ) -> ApiResult<UserSummary> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(ApiError::InvalidInput("user name is required".to_string()));
        }
        if email.is_empty() {
            return Err(ApiError::InvalidInput("user email is required".to_string()));
        }

        let store = self.open_store()?;
        let id = store.create_user(name, display_name, email)?;
        Ok(UserSummary {
            id,
            name: name.to_string(),
            display_name: display_name.map(ToString::to_string),
            email: email.to_string(),
        })
    }

    /// # Errors
    /// `NotFound` for an unknown user; `Internal` on store failure.
    pub fn get_user(&self, id: UserId) -> ApiResult<UserSummary> {
        let store = self.open_store()?;
        let user = store
            .get_user(id)?
            .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
        Ok(UserSummary {
            id: user.id,
            name: user.name,
            display_name: user.display_name,
            email: user.email,
        })
    }

    /// # Errors
    /// `Internal` on store failure.
    pub fn search_users(&self, query: &str, caller: UserId) -> ApiResult<Vec<UserSummary>> {
        let store = self.open_store()?;
        let rows = store.search_users(query, caller)?;
        Ok(rows
            .into_iter()
            .map(|user| UserSummary {
                id: user.id,
                name: user.name,
                display_name: user.display_name,
                email: user.email,
            })
            .collect())
    }

    // ---- promise lifecycle ----

    /// The dashboard read: sweeps expired ACTIVE promises to MISSED, fires
    /// due reminders once, and returns the active list plus at most one
    /// missed promise for the reframe flow.
    ///
    /// # Errors
    /// `Internal` on store failure.
    pub fn dashboard(&self, user: UserId) -> ApiResult<DashboardResponse> {
        let store = self.open_store()?;
        let now = now_epoch();

        store.sweep_missed(user, now)?;

        for (promise_id, name) in store.due_reminders(user, now)? {
            store.insert_notification(
                user,
                NotificationKind::Reminder,
                None,
                Some(promise_id.0),
                Some(&name),
                now,
            )?;
            store.mark_reminder_sent(promise_id)?;
        }

        let (completed, missed_count) = store.status_counts(user)?;
        let score = accountability_score(completed, missed_count);

        let mut promises = Vec::new();
        for row in store.active_promises(user)? {
            let participants = store.participants(row.id)?;
            let streak_count = store.streak_count(row.id, user)?;
            let comment_count = store.comment_count(row.id)?;
            let remaining = u64::try_from((row.deadline_at - now).max(0)).unwrap_or(0);
            promises.push(PromiseSummary {
                id: row.id,
                name: row.name,
                content: row.content,
                kind: row.kind,
                status: row.status,
                deadline_at: row.deadline_at,
                time_left: format_duration(remaining),
                shared: !participants.is_empty(),
                participants: participants.iter().map(participant_view).collect(),
                category: row.category,
                recurrence: row.recurrence,
                target_value: row.target_value,
                current_value: row.current_value,
                visibility: row.visibility,
                reminder_at: row.reminder_at,
                streak_count,
                comment_count,
            });
        }

        let missed = match store.earliest_missed(user)? {
            Some(row) => {
                let participants = store.participants(row.id)?;
                Some(MissedPromise {
                    id: row.id,
                    name: row.name,
                    content: row.content,
                    kind: row.kind,
                    status: row.status,
                    deadline_at: row.deadline_at,
                    shared: !participants.is_empty(),
                    participants: participants.iter().map(participant_view).collect(),
                    category: row.category,
                    recurrence: row.recurrence,
                    target_value: row.target_value,
                    current_value: row.current_value,
                    visibility: row.visibility,
                })
            }
            None => None,
        };

        Ok(DashboardResponse { promises, missed, accountability_score: score })
    }

    /// Single-promise read with roster, comments, streak, and the
    /// fingerprint verdict. A mismatch never fails the read; it surfaces as
    /// a `system_corrupt_promise` notification to the owner instead.
    ///
    /// # Errors
    /// `NotFound` for an unknown promise; `Internal` on store failure.
    pub fn promise_detail(&self, id: PromiseId, caller: UserId) -> ApiResult<PromiseDetail> {
        let store = self.open_store()?;
        let now = now_epoch();
        let row = store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;

        let expected =
            promise_fingerprint(row.id.0, row.created_at, &row.name, row.kind, &row.content);
        let integrity_ok = expected == row.hash_value;
        if !integrity_ok
            && !store.has_unread_notification(
                row.user_id,
                NotificationKind::SystemCorruptPromise,
                row.id.0,
            )?
        {
            store.insert_notification(
                row.user_id,
                NotificationKind::SystemCorruptPromise,
                None,
                Some(row.id.0),
                Some(&row.name),
                now,
            )?;
        }

        let participants = store.participants(row.id)?;
        let comments = store
            .comments(row.id, caller)?
            .into_iter()
            .map(|comment| CommentView {
                id: comment.id,
                user_id: comment.user_id,
                author_name: comment
                    .author_display_name
                    .unwrap_or(comment.author_name),
                body: comment.body,
                parent_comment_id: comment.parent_comment_id,
                like_count: comment.like_count,
                liked_by_me: comment.liked_by_me,
                created_at: comment.created_at,
            })
            .collect();
        let streak_count = store.streak_count(row.id, caller)?;

        Ok(PromiseDetail {
            id: row.id,
            name: row.name,
            content: row.content,
            kind: row.kind,
            status: row.status,
            deadline_at: row.deadline_at,
            shared: !participants.is_empty(),
            participants: participants.iter().map(participant_view).collect(),
            category: row.category,
            recurrence: row.recurrence,
            target_value: row.target_value,
            current_value: row.current_value,
            visibility: row.visibility,
            reminder_at: row.reminder_at,
            streak_count,
            integrity_ok,
            comments,
        })
    }

    /// Create a promise. Participant ids are honored only for kind
    /// "others", must each be a friend of the owner, and the whole create
    /// fails before any write when one is not.
    ///
    /// # Errors
    /// `InvalidInput` on a blank name, unparseable deadline, non-positive
    /// target, or a non-friend participant; `Internal` on store failure.
    pub fn create_promise(
        &self,
        owner: UserId,
        request: &CreatePromiseRequest,
    ) -> ApiResult<PromiseId> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ApiError::InvalidInput("promise name is required".to_string()));
        }
        let kind = request
            .kind
            .as_deref()
            .map_or(PromiseKind::Personal, PromiseKind::parse_or_default);

        let now = now_epoch();
        let deadline_at = resolve_deadline(&request.deadline, now)?;

        if let Some(target) = request.target_value {
            if target <= 0 {
                return Err(ApiError::InvalidInput(
                    "target_value must be a positive integer".to_string(),
                ));
            }
        }
        let current_value = initial_progress(request.target_value, request.current_value);

        let value_unit = match (request.reminder_value, request.reminder_unit.as_deref()) {
            (Some(value), Some(unit)) => Some((value, ReminderUnit::parse(unit))),
            _ => None,
        };
        let reminder = reminder_at(deadline_at, value_unit, request.reminder_hours);

        let visibility = request
            .visibility
            .as_deref()
            .map_or(Visibility::Private, Visibility::parse_or_default);
        let recurrence = request.recurrence.as_deref().and_then(Recurrence::parse);

        let mut store = self.open_store()?;

        // All-or-nothing friend check before any write.
        let mut participants = Vec::new();
        if kind == PromiseKind::Others && !request.participant_user_ids.is_empty() {
            let mut candidates: Vec<UserId> = request
                .participant_user_ids
                .iter()
                .copied()
                .map(UserId)
                .filter(|candidate| *candidate != owner)
                .collect();
            candidates.sort_unstable();
            candidates.dedup();
            for candidate in &candidates {
                if !store.is_friend(owner, *candidate)? {
                    return Err(ApiError::InvalidInput(
                        "can only add friends as participants".to_string(),
                    ));
                }
            }
            participants.push(owner);
            participants.extend(candidates);
        }

        let id = store.insert_promise(&pact_store_sqlite::NewPromise {
            owner,
            name: name.to_string(),
            kind,
            content: request.content.clone(),
            created_at: now,
            deadline_at,
            category: request.category.clone().filter(|c| !c.trim().is_empty()),
            recurrence,
            visibility,
            target_value: request.target_value,
            current_value,
            reminder_at: reminder,
            participants,
        })?;
        Ok(id)
    }

    /// Replace a missed promise with a fresh ACTIVE one carrying its shape
    /// and roster; the old promise stops resolving in the same operation.
    ///
    /// # Errors
    /// `NotFound` for an unknown promise; `InvalidInput` on an unparseable
    /// deadline; `Internal` on store failure.
    pub fn apply_reframe(
        &self,
        id: PromiseId,
        _caller: UserId,
        request: &ReframeRequest,
    ) -> ApiResult<PromiseId> {
        let now = now_epoch();
        let deadline_at = resolve_deadline(&request.deadline, now)?;

        let mut store = self.open_store()?;
        store
            .replace_promise(id, request.name.trim(), &request.content, now, deadline_at)?
            .ok_or_else(|| promise_not_found(id))
    }

    /// Owner-only partial update. An unparseable deadline in the patch is
    /// ignored rather than rejected; the new deadline is anchored to the
    /// promise's original creation time.
    ///
    /// # Errors
    /// `NotFound`, `Forbidden`, or `InvalidInput` when the patch has no
    /// effective field; `Internal` on store failure.
    pub fn update_promise(
        &self,
        id: PromiseId,
        caller: UserId,
        request: &UpdatePromiseRequest,
    ) -> ApiResult<()> {
        let mut store = self.open_store()?;
        let row = store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;
        if row.user_id != caller {
            return Err(ApiError::Forbidden("only the owner can update a promise".to_string()));
        }

        let name = request.name.as_deref().map(str::trim).filter(|value| !value.is_empty());
        let content = request.content.as_deref();
        let deadline_at = request
            .deadline
            .as_deref()
            .and_then(|deadline| parse_duration(deadline).ok())
            .and_then(|seconds| i64::try_from(seconds).ok())
            .map(|seconds| row.created_at + seconds);

        if name.is_none() && content.is_none() && deadline_at.is_none() {
            return Err(ApiError::InvalidInput("no fields to update".to_string()));
        }

        store.update_promise_fields(id, name, content, deadline_at)?;
        Ok(())
    }

    /// Manual give-up: force ACTIVE -> MISSED regardless of the deadline.
    /// Idempotent on an already missed promise.
    ///
    /// # Errors
    /// `NotFound` for an unknown promise; `Conflict` on a completed one;
    /// `Internal` on store failure.
    pub fn forfeit(&self, id: PromiseId, _caller: UserId) -> ApiResult<StatusOutcome> {
        let store = self.open_store()?;
        let row = store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;
        if row.status == PromiseStatus::Completed {
            return Err(ApiError::Conflict(
                "a completed promise cannot be forfeited".to_string(),
            ));
        }
        store.set_status(id, PromiseStatus::Missed)?;
        Ok(StatusOutcome { status: PromiseStatus::Missed })
    }

    // ---- completion consensus ----

    /// Record a completion. Solo promises complete unconditionally; shared
    /// promises complete only when every participant has completed, and the
    /// fan-out pings the participants who still owe theirs.
    ///
    /// # Errors
    /// `NotFound` for an unknown promise; `Conflict` on a missed one;
    /// `Internal` on store failure.
    pub fn complete(&self, id: PromiseId, actor: UserId) -> ApiResult<CompleteOutcome> {
        let store = self.open_store()?;
        let now = now_epoch();
        let row = store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;
        if row.status == PromiseStatus::Missed {
            return Err(ApiError::Conflict(
                "a missed promise can only be reframed".to_string(),
            ));
        }

        if store.is_shared(id)? {
            return shared_completion(&store, &row, actor, now);
        }

        store.log_completion(id, actor, now)?;
        store.set_status(id, PromiseStatus::Completed)?;
        Ok(CompleteOutcome { status: CompletionStatus::Completed, participants: Vec::new() })
    }

    /// Undo a completion. One reneging participant re-opens the whole shared
    /// promise; a solo undo deletes exactly the newest completion-log entry.
    /// A MISSED promise can never be re-opened this way.
    ///
    /// # Errors
    /// `NotFound`, `Forbidden` for a non-participant/non-owner, `Conflict`
    /// on a missed promise; `Internal` on store failure.
    pub fn undo_complete(&self, id: PromiseId, actor: UserId) -> ApiResult<StatusOutcome> {
        let store = self.open_store()?;
        let now = now_epoch();
        let row = store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;
        if row.status == PromiseStatus::Missed {
            return Err(ApiError::Conflict("a missed promise cannot be re-opened".to_string()));
        }

        if store.is_shared(id)? {
            let Some(marker) = store.participant_completed_at(id, actor)? else {
                return Err(ApiError::Forbidden(
                    "only participants can undo a shared completion".to_string(),
                ));
            };
            let had_completed = marker.is_some();
            store.clear_participant_completed(id, actor)?;
            store.set_status(id, PromiseStatus::Active)?;
            if had_completed {
                for participant in store.participants(id)? {
                    if participant.user_id != actor {
                        store.insert_notification(
                            participant.user_id,
                            NotificationKind::SharedPromiseReneged,
                            Some(actor),
                            Some(id.0),
                            Some(&row.name),
                            now,
                        )?;
                    }
                }
            }
            return Ok(StatusOutcome { status: PromiseStatus::Active });
        }

        if row.user_id != actor {
            return Err(ApiError::Forbidden(
                "only the owner can undo a completion".to_string(),
            ));
        }
        store.set_status(id, PromiseStatus::Active)?;
        store.remove_latest_completion(id, actor)?;
        Ok(StatusOutcome { status: PromiseStatus::Active })
    }

    /// Owner-only progress write. The value is capped at the target; when
    /// the cap reaches a positive target on an ACTIVE promise this runs the
    /// same completion path as [`Self::complete`].
    ///
    /// # Errors
    /// `NotFound`, `Forbidden` for a non-owner, `InvalidInput` on a negative
    /// value; `Internal` on store failure.
    pub fn update_progress(
        &self,
        id: PromiseId,
        caller: UserId,
        current_value: i64,
    ) -> ApiResult<ProgressOutcome> {
        if current_value < 0 {
            return Err(ApiError::InvalidInput("invalid current_value".to_string()));
        }

        let store = self.open_store()?;
        let now = now_epoch();
        let row = store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;
        if row.user_id != caller {
            return Err(ApiError::Forbidden(
                "only the owner can update progress".to_string(),
            ));
        }

        let capped = clamp_progress(current_value, row.target_value);
        let target_value = row.target_value.unwrap_or(current_value);
        store.set_current_value(id, capped)?;

        let reaches_target =
            row.target_value.is_some_and(|target| target > 0 && capped >= target);
        if reaches_target && row.status == PromiseStatus::Active {
            if store.is_shared(id)? {
                let outcome = shared_completion(&store, &row, caller, now)?;
                let status = match outcome.status {
                    CompletionStatus::Completed => ProgressStatus::Completed,
                    CompletionStatus::MarkedComplete => ProgressStatus::MarkedComplete,
                };
                return Ok(ProgressOutcome { current_value: capped, target_value, status });
            }
            store.log_completion(id, caller, now)?;
            store.set_status(id, PromiseStatus::Completed)?;
            return Ok(ProgressOutcome {
                current_value: capped,
                target_value,
                status: ProgressStatus::Completed,
            });
        }

        Ok(ProgressOutcome { current_value: capped, target_value, status: ProgressStatus::Active })
    }

    // ---- comments ----

    /// # Errors
    /// `NotFound` for an unknown promise; `Internal` on store failure.
    pub fn comments(&self, id: PromiseId, caller: UserId) -> ApiResult<Vec<CommentView>> {
        let store = self.open_store()?;
        store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;
        Ok(store
            .comments(id, caller)?
            .into_iter()
            .map(|comment| CommentView {
                id: comment.id,
                user_id: comment.user_id,
                author_name: comment.author_display_name.unwrap_or(comment.author_name),
                body: comment.body,
                parent_comment_id: comment.parent_comment_id,
                like_count: comment.like_count,
                liked_by_me: comment.liked_by_me,
                created_at: comment.created_at,
            })
            .collect())
    }

    /// # Errors
    /// `NotFound` for an unknown promise or parent comment; `InvalidInput`
    /// on a blank body; `Internal` on store failure.
    pub fn add_comment(
        &self,
        id: PromiseId,
        caller: UserId,
        request: &AddCommentRequest,
    ) -> ApiResult<CommentView> {
        let body = request.body.trim();
        if body.is_empty() {
            return Err(ApiError::InvalidInput("comment body is required".to_string()));
        }

        let store = self.open_store()?;
        let now = now_epoch();
        store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;

        let parent = request.parent_comment_id.map(CommentId);
        if let Some(parent) = parent {
            if !store.comment_exists(parent, id)? {
                return Err(ApiError::NotFound("parent comment not found".to_string()));
            }
        }

        let author = store
            .get_user(caller)?
            .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
        let comment_id = store.add_comment(id, caller, body, parent, now)?;
        Ok(CommentView {
            id: comment_id,
            user_id: caller,
            author_name: author.display_name.unwrap_or(author.name),
            body: body.to_string(),
            parent_comment_id: parent,
            like_count: 0,
            liked_by_me: false,
            created_at: now,
        })
    }

    /// # Errors
    /// `NotFound` for an unknown promise or comment; `Internal` on store
    /// failure.
    pub fn toggle_comment_like(
        &self,
        id: PromiseId,
        comment: CommentId,
        caller: UserId,
    ) -> ApiResult<LikeOutcome> {
        let store = self.open_store()?;
        let now = now_epoch();
        store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;
        if !store.comment_exists(comment, id)? {
            return Err(ApiError::NotFound("comment not found".to_string()));
        }
        let liked = store.toggle_comment_like(comment, caller, now)?;
        Ok(LikeOutcome { liked })
    }

    // ---- activity, categories, reframe assistant fallback ----

    /// # Errors
    /// `Internal` on store failure.
    pub fn activity(&self, user: UserId, limit: Option<i64>) -> ApiResult<Vec<ActivityItem>> {
        let limit = limit.map_or(25, |value| value.clamp(1, 50));
        let store = self.open_store()?;

        let mut items = Vec::new();
        for (promise_id, promise_name, at) in store.completion_activity(user, limit)? {
            items.push(ActivityItem { kind: ActivityKind::Completed, promise_id, promise_name, at });
        }
        for (promise_id, promise_name, at) in store.creation_activity(user, limit)? {
            items.push(ActivityItem { kind: ActivityKind::Created, promise_id, promise_name, at });
        }
        items.sort_by(|a, b| b.at.cmp(&a.at).then_with(|| a.promise_id.cmp(&b.promise_id)));
        items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(items)
    }

    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        DEFAULT_CATEGORIES.iter().map(ToString::to_string).collect()
    }

    /// Deterministic templated suggestions for the reframe flow. The client
    /// calls the external text generator with a bounded wait and falls back
    /// to these on expiry or error.
    ///
    /// # Errors
    /// `NotFound` for an unknown promise; `Internal` on store failure.
    pub fn reframe_suggestions(
        &self,
        id: PromiseId,
        reason: &str,
        category: &str,
    ) -> ApiResult<Vec<ReframeSuggestion>> {
        let store = self.open_store()?;
        let row = store.get_promise(id)?.ok_or_else(|| promise_not_found(id))?;
        let original = if row.content.trim().is_empty() { &row.name } else { &row.content };
        Ok(fallback_reframe_suggestions(original, reason, category))
    }

    // ---- social graph ----

    /// # Errors
    /// `Conflict` on self-request, duplicate/reverse-pending request, or an
    /// existing friendship; `NotFound` for an unknown recipient; `Internal`
    /// on store failure.
    pub fn send_friend_request(&self, from: UserId, to: UserId) -> ApiResult<SentRequest> {
        if from == to {
            return Err(ApiError::Conflict(
                "cannot send a friend request to yourself".to_string(),
            ));
        }

        let store = self.open_store()?;
        let now = now_epoch();
        if !store.user_exists(to)? {
            return Err(ApiError::NotFound("user not found".to_string()));
        }
        if store.friend_request_exists(from, to)? {
            return Err(ApiError::Conflict("friend request already sent".to_string()));
        }
        if store.friend_request_exists(to, from)? {
            return Err(ApiError::Conflict(
                "they already sent you a request; accept it instead".to_string(),
            ));
        }
        if store.is_friend(from, to)? {
            return Err(ApiError::Conflict("already friends".to_string()));
        }

        let id = store.insert_friend_request(from, to)?;
        store.insert_notification(
            to,
            NotificationKind::FriendRequest,
            Some(from),
            Some(id.0),
            None,
            now,
        )?;
        let request = store
            .get_friend_request(id)?
            .ok_or_else(|| ApiError::NotFound("friend request not found".to_string()))?;
        Ok(SentRequest { id, to_user_id: to, created_at: request.created_at })
    }

    /// Accept inserts both friendship directions and removes the request as
    /// one indivisible step, then notifies the original sender.
    ///
    /// # Errors
    /// `NotFound` for an unknown request; `Forbidden` when the caller is not
    /// the recipient; `Internal` on store failure.
    pub fn accept_friend_request(&self, id: FriendRequestId, caller: UserId) -> ApiResult<()> {
        let mut store = self.open_store()?;
        let now = now_epoch();
        let request = store
            .get_friend_request(id)?
            .ok_or_else(|| ApiError::NotFound("friend request not found".to_string()))?;
        if request.to_user_id != caller {
            return Err(ApiError::Forbidden(
                "you can only accept requests sent to you".to_string(),
            ));
        }

        let accepted = store
            .accept_friend_request(id)?
            .ok_or_else(|| ApiError::NotFound("friend request not found".to_string()))?;
        store.insert_notification(
            accepted.from_user_id,
            NotificationKind::FriendAccepted,
            Some(caller),
            None,
            None,
            now,
        )?;
        Ok(())
    }

    /// # Errors
    /// `NotFound` for an unknown request; `Forbidden` when the caller is not
    /// the recipient; `Internal` on store failure.
    pub fn decline_friend_request(&self, id: FriendRequestId, caller: UserId) -> ApiResult<()> {
        let store = self.open_store()?;
        let request = store
            .get_friend_request(id)?
            .ok_or_else(|| ApiError::NotFound("friend request not found".to_string()))?;
        if request.to_user_id != caller {
            return Err(ApiError::Forbidden(
                "you can only decline requests sent to you".to_string(),
            ));
        }
        store.delete_friend_request(id)?;
        Ok(())
    }

    /// # Errors
    /// `NotFound` for an unknown request; `Forbidden` when the caller is not
    /// the sender; `Internal` on store failure.
    pub fn cancel_friend_request(&self, id: FriendRequestId, caller: UserId) -> ApiResult<()> {
        let store = self.open_store()?;
        let request = store
            .get_friend_request(id)?
            .ok_or_else(|| ApiError::NotFound("friend request not found".to_string()))?;
        if request.from_user_id != caller {
            return Err(ApiError::Forbidden(
                "you can only cancel your own requests".to_string(),
            ));
        }
        store.delete_friend_request(id)?;
        Ok(())
    }

    /// # Errors
    /// `Internal` on store failure.
    pub fn list_friends(&self, user: UserId) -> ApiResult<Vec<FriendView>> {
        let store = self.open_store()?;
        let mut friends = Vec::new();
        for friend in store.friends_of(user)? {
            let mutual_count = store.mutual_friend_count(user, friend.id)?;
            friends.push(FriendView {
                id: friend.id,
                name: friend.name,
                display_name: friend.display_name,
                email: friend.email,
                mutual_count,
            });
        }
        Ok(friends)
    }

    /// # Errors
    /// `Internal` on store failure.
    pub fn incoming_requests(&self, user: UserId) -> ApiResult<Vec<FriendRequestView>> {
        let store = self.open_store()?;
        Ok(store.incoming_requests(user)?.into_iter().map(request_view).collect())
    }

    /// # Errors
    /// `Internal` on store failure.
    pub fn outgoing_requests(&self, user: UserId) -> ApiResult<Vec<FriendRequestView>> {
        let store = self.open_store()?;
        Ok(store.outgoing_requests(user)?.into_iter().map(request_view).collect())
    }

    /// Deletes both directional rows; does not notify.
    ///
    /// # Errors
    /// `InvalidInput` on a self-remove; `Internal` on store failure.
    pub fn remove_friend(&self, user: UserId, friend: UserId) -> ApiResult<()> {
        if user == friend {
            return Err(ApiError::InvalidInput("invalid friend id".to_string()));
        }
        let store = self.open_store()?;
        store.remove_friendship(user, friend)?;
        Ok(())
    }

    // ---- notifications ----

    /// # Errors
    /// `Internal` on store failure.
    pub fn notifications(
        &self,
        user: UserId,
        limit: Option<i64>,
    ) -> ApiResult<Vec<NotificationView>> {
        let limit = limit.map_or(50, |value| value.clamp(1, 100));
        let store = self.open_store()?;
        Ok(store
            .notifications(user, limit)?
            .into_iter()
            .map(|row| NotificationView {
                id: row.id,
                kind: row.kind,
                from_user_id: row.from_user_id,
                from_name: row.from_name,
                related_id: row.related_id,
                message: row.message,
                read_at: row.read_at,
                created_at: row.created_at,
            })
            .collect())
    }

    /// # Errors
    /// `Internal` on store failure.
    pub fn unread_count(&self, user: UserId) -> ApiResult<i64> {
        let store = self.open_store()?;
        Ok(store.unread_notification_count(user)?)
    }

    /// # Errors
    /// `NotFound` when the notification does not exist or belongs to another
    /// user; `Internal` on store failure.
    pub fn mark_notification_read(&self, id: NotificationId, caller: UserId) -> ApiResult<()> {
        let store = self.open_store()?;
        let now = now_epoch();
        if !store.mark_notification_read(id, caller, now)? {
            return Err(ApiError::NotFound("notification not found".to_string()));
        }
        Ok(())
    }

    /// Idempotent; safe to call repeatedly.
    ///
    /// # Errors
    /// `Internal` on store failure.
    pub fn mark_all_notifications_read(&self, caller: UserId) -> ApiResult<()> {
        let store = self.open_store()?;
        let now = now_epoch();
        store.mark_all_notifications_read(caller, now)?;
        Ok(())
    }
}

fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn promise_not_found(id: PromiseId) -> ApiError {
    ApiError::NotFound(format!("promise not found: {id}"))
}

fn resolve_deadline(deadline: &str, now: i64) -> ApiResult<i64> {
    let seconds = parse_duration(deadline)
        .map_err(|err| ApiError::InvalidInput(format!("{err}; expected e.g. 1h 30m")))?;
    i64::try_from(seconds)
        .ok()
        .and_then(|seconds| now.checked_add(seconds))
        .ok_or_else(|| ApiError::InvalidInput(format!("invalid duration: {deadline}")))
}

fn participant_view(row: &ParticipantRow) -> ParticipantView {
    ParticipantView {
        user_id: row.user_id,
        name: row.name.clone(),
        display_name: row.display_name.clone().unwrap_or_else(|| row.name.clone()),
        completed_at: row.completed_at,
    }
}

fn request_view(
    (request, other): (pact_store_sqlite::FriendRequestRow, pact_store_sqlite::UserRow),
) -> FriendRequestView {
    FriendRequestView {
        id: request.id,
        user_id: other.id,
        name: other.name,
        display_name: other.display_name,
        email: other.email,
        created_at: request.created_at,
    }
}

/// Shared-promise completion: mark the actor, re-read the roster, and decide
/// all-done from the latest persisted state.
fn shared_completion(
    store: &SqliteStore,
    row: &PromiseRow,
    actor: UserId,
    now: i64,
) -> ApiResult<CompleteOutcome> {
    store.set_participant_completed(row.id, actor, now)?;
    let roster = store.participants(row.id)?;
    let all_done = !roster.is_empty()
        && roster.iter().all(|participant| participant.completed_at.is_some());

    if all_done {
        store.set_status(row.id, PromiseStatus::Completed)?;
        for participant in &roster {
            if participant.user_id != actor {
                store.insert_notification(
                    participant.user_id,
                    NotificationKind::SharedPromiseComplete,
                    Some(actor),
                    Some(row.id.0),
                    Some(&row.name),
                    now,
                )?;
            }
        }
        return Ok(CompleteOutcome {
            status: CompletionStatus::Completed,
            participants: roster.iter().map(participant_view).collect(),
        });
    }

    for participant in &roster {
        if participant.user_id != actor && participant.completed_at.is_none() {
            store.insert_notification(
                participant.user_id,
                NotificationKind::SharedPromisePending,
                Some(actor),
                Some(row.id.0),
                Some(&row.name),
                now,
            )?;
        }
    }
    Ok(CompleteOutcome {
        status: CompletionStatus::MarkedComplete,
        participants: roster.iter().map(participant_view).collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    struct TempDb {
        api: PactApi,
        path: PathBuf,
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn temp_api() -> TempDb {
        let path = std::env::temp_dir().join(format!("pact-api-{}.sqlite3", ulid::Ulid::new()));
        TempDb { api: PactApi::new(path.clone()), path }
    }

    fn register(api: &PactApi, name: &str) -> ApiResult<UserId> {
        Ok(api.register_user(name, None, &format!("{name}@example.com"))?.id)
    }

    fn befriend(api: &PactApi, a: UserId, b: UserId) -> ApiResult<()> {
        let request = api.send_friend_request(a, b)?;
        api.accept_friend_request(request.id, b)
    }

    fn solo_request(deadline: &str) -> CreatePromiseRequest {
        CreatePromiseRequest {
            name: "run".to_string(),
            kind: None,
            content: "run 5k".to_string(),
            deadline: deadline.to_string(),
            category: None,
            recurrence: None,
            visibility: None,
            target_value: None,
            current_value: None,
            reminder_value: None,
            reminder_unit: None,
            reminder_hours: None,
            participant_user_ids: Vec::new(),
        }
    }

    fn shared_request(deadline: &str, participants: Vec<i64>) -> CreatePromiseRequest {
        CreatePromiseRequest {
            name: "gym".to_string(),
            kind: Some("others".to_string()),
            content: "gym together".to_string(),
            deadline: deadline.to_string(),
            category: Some("Health".to_string()),
            recurrence: Some("weekly".to_string()),
            visibility: Some("friends".to_string()),
            target_value: None,
            current_value: None,
            reminder_value: None,
            reminder_unit: None,
            reminder_hours: None,
            participant_user_ids: participants,
        }
    }

    fn kinds_for(api: &PactApi, user: UserId) -> ApiResult<Vec<NotificationKind>> {
        Ok(api.notifications(user, None)?.into_iter().map(|n| n.kind).collect())
    }

    #[test]
    fn create_round_trips_the_deadline_duration() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;

        let id = db.api.create_promise(ada, &solo_request("1h 30m"))?;
        let detail = db.api.promise_detail(id, ada)?;
        assert_eq!(detail.status, PromiseStatus::Active);
        assert!(detail.integrity_ok);

        let dashboard = db.api.dashboard(ada)?;
        let summary = &dashboard.promises[0];
        // created_at is not exposed; the deadline offset shows through the db
        // row instead.
        assert_eq!(summary.deadline_at, detail.deadline_at);

        let store = SqliteStore::open(&db.path).map_err(ApiError::Internal)?;
        let row = store
            .get_promise(id)?
            .ok_or_else(|| ApiError::NotFound("promise missing".to_string()))?;
        assert_eq!(row.deadline_at - row.created_at, 5_400);
        Ok(())
    }

    #[test]
    fn create_rejects_bad_deadline_and_target() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;

        let mut request = solo_request("whenever");
        assert!(matches!(
            db.api.create_promise(ada, &request),
            Err(ApiError::InvalidInput(_))
        ));

        request.deadline = "1h".to_string();
        request.target_value = Some(0);
        assert!(matches!(
            db.api.create_promise(ada, &request),
            Err(ApiError::InvalidInput(_))
        ));

        request.target_value = None;
        request.name = "   ".to_string();
        assert!(matches!(
            db.api.create_promise(ada, &request),
            Err(ApiError::InvalidInput(_))
        ));
        Ok(())
    }

    #[test]
    fn create_requires_participants_to_be_friends() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;

        let request = shared_request("1h", vec![bob.0]);
        assert!(matches!(
            db.api.create_promise(ada, &request),
            Err(ApiError::InvalidInput(_))
        ));
        // Nothing was written by the failed create.
        assert!(db.api.dashboard(ada)?.promises.is_empty());

        befriend(&db.api, ada, bob)?;
        let id = db.api.create_promise(ada, &request)?;
        let detail = db.api.promise_detail(id, ada)?;
        assert!(detail.shared);
        let roster: Vec<UserId> = detail.participants.iter().map(|p| p.user_id).collect();
        assert!(roster.contains(&ada), "owner is always part of the roster");
        assert!(roster.contains(&bob));
        Ok(())
    }

    #[test]
    fn participants_are_ignored_for_personal_promises() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;
        befriend(&db.api, ada, bob)?;

        let mut request = solo_request("1h");
        request.participant_user_ids = vec![bob.0];
        let id = db.api.create_promise(ada, &request)?;
        assert!(!db.api.promise_detail(id, ada)?.shared);

        // An "others" promise with no named participants stays solo too.
        let id = db.api.create_promise(ada, &shared_request("1h", Vec::new()))?;
        assert!(!db.api.promise_detail(id, ada)?.shared);
        Ok(())
    }

    #[test]
    fn dashboard_shows_at_most_one_missed_promise() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;

        let first = db.api.create_promise(ada, &solo_request("1h"))?;
        let second = db.api.create_promise(ada, &solo_request("2h"))?;
        let third = db.api.create_promise(ada, &solo_request("3h"))?;
        db.api.forfeit(first, ada)?;
        db.api.forfeit(second, ada)?;

        let dashboard = db.api.dashboard(ada)?;
        let missed = dashboard
            .missed
            .ok_or_else(|| ApiError::NotFound("expected a missed promise".to_string()))?;
        // Earliest deadline wins the single reframe slot.
        assert_eq!(missed.id, first);
        assert_eq!(dashboard.promises.len(), 1);
        assert_eq!(dashboard.promises[0].id, third);
        assert!(!dashboard.promises[0].time_left.is_empty());
        assert_eq!(dashboard.accountability_score, Some(0));
        Ok(())
    }

    #[test]
    fn accountability_score_tracks_resolved_promises() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        assert_eq!(db.api.dashboard(ada)?.accountability_score, None);

        let done = db.api.create_promise(ada, &solo_request("1h"))?;
        db.api.complete(done, ada)?;
        let missed = db.api.create_promise(ada, &solo_request("1h"))?;
        db.api.forfeit(missed, ada)?;

        assert_eq!(db.api.dashboard(ada)?.accountability_score, Some(50));
        Ok(())
    }

    #[test]
    fn solo_complete_and_undo_round_trip() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let id = db.api.create_promise(ada, &solo_request("1h"))?;

        let outcome = db.api.complete(id, ada)?;
        assert_eq!(outcome.status, CompletionStatus::Completed);
        let detail = db.api.promise_detail(id, ada)?;
        assert_eq!(detail.status, PromiseStatus::Completed);
        assert_eq!(detail.streak_count, 1);

        let undo = db.api.undo_complete(id, ada)?;
        assert_eq!(undo.status, PromiseStatus::Active);
        let detail = db.api.promise_detail(id, ada)?;
        assert_eq!(detail.status, PromiseStatus::Active);
        assert_eq!(detail.streak_count, 0);
        Ok(())
    }

    #[test]
    fn solo_undo_is_owner_only() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;
        let id = db.api.create_promise(ada, &solo_request("1h"))?;
        db.api.complete(id, ada)?;

        assert!(matches!(db.api.undo_complete(id, bob), Err(ApiError::Forbidden(_))));
        Ok(())
    }

    #[test]
    fn missed_promises_cannot_be_reopened_by_undo() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let id = db.api.create_promise(ada, &solo_request("1h"))?;
        db.api.forfeit(id, ada)?;
        db.api.forfeit(id, ada)?; // idempotent

        assert!(matches!(db.api.undo_complete(id, ada), Err(ApiError::Conflict(_))));
        assert_eq!(db.api.promise_detail(id, ada)?.status, PromiseStatus::Missed);
        Ok(())
    }

    #[test]
    fn status_transitions_stay_on_the_legal_graph() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;

        let missed = db.api.create_promise(ada, &solo_request("1h"))?;
        db.api.forfeit(missed, ada)?;
        assert!(matches!(db.api.complete(missed, ada), Err(ApiError::Conflict(_))));

        let completed = db.api.create_promise(ada, &solo_request("1h"))?;
        db.api.complete(completed, ada)?;
        assert!(matches!(db.api.forfeit(completed, ada), Err(ApiError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn shared_completion_reaches_consensus_and_notifies() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;
        befriend(&db.api, ada, bob)?;
        let id = db.api.create_promise(ada, &shared_request("1h", vec![bob.0]))?;

        let outcome = db.api.complete(id, ada)?;
        assert_eq!(outcome.status, CompletionStatus::MarkedComplete);
        assert_eq!(db.api.promise_detail(id, ada)?.status, PromiseStatus::Active);
        assert!(kinds_for(&db.api, bob)?.contains(&NotificationKind::SharedPromisePending));
        // The actor is never notified about their own action.
        assert!(!kinds_for(&db.api, ada)?.contains(&NotificationKind::SharedPromisePending));

        let outcome = db.api.complete(id, bob)?;
        assert_eq!(outcome.status, CompletionStatus::Completed);
        assert!(outcome.participants.iter().all(|p| p.completed_at.is_some()));
        assert_eq!(db.api.promise_detail(id, ada)?.status, PromiseStatus::Completed);
        assert!(kinds_for(&db.api, ada)?.contains(&NotificationKind::SharedPromiseComplete));
        assert!(!kinds_for(&db.api, bob)?.contains(&NotificationKind::SharedPromiseComplete));
        Ok(())
    }

    #[test]
    fn reneging_participant_reopens_the_group_promise() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;
        befriend(&db.api, ada, bob)?;
        let id = db.api.create_promise(ada, &shared_request("1h", vec![bob.0]))?;
        db.api.complete(id, ada)?;
        db.api.complete(id, bob)?;

        let undo = db.api.undo_complete(id, ada)?;
        assert_eq!(undo.status, PromiseStatus::Active);
        let detail = db.api.promise_detail(id, ada)?;
        assert_eq!(detail.status, PromiseStatus::Active);
        assert!(kinds_for(&db.api, bob)?.contains(&NotificationKind::SharedPromiseReneged));

        // Bob's own marker survived the renege.
        let bob_marker = detail
            .participants
            .iter()
            .find(|p| p.user_id == bob)
            .ok_or_else(|| ApiError::NotFound("bob missing from roster".to_string()))?;
        assert!(bob_marker.completed_at.is_some());
        Ok(())
    }

    #[test]
    fn undo_without_prior_completion_does_not_notify() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;
        let eve = register(&db.api, "eve")?;
        befriend(&db.api, ada, bob)?;
        let id = db.api.create_promise(ada, &shared_request("1h", vec![bob.0]))?;

        assert!(matches!(db.api.undo_complete(id, eve), Err(ApiError::Forbidden(_))));

        db.api.undo_complete(id, ada)?;
        assert!(!kinds_for(&db.api, bob)?.contains(&NotificationKind::SharedPromiseReneged));
        Ok(())
    }

    #[test]
    fn progress_reaching_target_completes_exactly_once() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let mut request = solo_request("1h");
        request.target_value = Some(3);
        request.current_value = Some(0);
        let id = db.api.create_promise(ada, &request)?;

        let outcome = db.api.update_progress(id, ada, 1)?;
        assert_eq!(outcome.status, ProgressStatus::Active);
        assert_eq!(outcome.current_value, 1);

        let outcome = db.api.update_progress(id, ada, 3)?;
        assert_eq!(outcome.status, ProgressStatus::Completed);
        let detail = db.api.promise_detail(id, ada)?;
        assert_eq!(detail.status, PromiseStatus::Completed);
        assert_eq!(detail.streak_count, 1);

        // Already COMPLETED: the value stays capped and no second log entry
        // appears.
        let outcome = db.api.update_progress(id, ada, 5)?;
        assert_eq!(outcome.status, ProgressStatus::Active);
        assert_eq!(outcome.current_value, 3);
        assert_eq!(db.api.promise_detail(id, ada)?.streak_count, 1);
        Ok(())
    }

    #[test]
    fn progress_is_owner_only_and_validated() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;
        let mut request = solo_request("1h");
        request.target_value = Some(3);
        let id = db.api.create_promise(ada, &request)?;

        assert!(matches!(db.api.update_progress(id, bob, 1), Err(ApiError::Forbidden(_))));
        assert!(matches!(db.api.update_progress(id, ada, -1), Err(ApiError::InvalidInput(_))));
        Ok(())
    }

    #[test]
    fn shared_progress_marks_only_the_owner() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;
        befriend(&db.api, ada, bob)?;
        let mut request = shared_request("1h", vec![bob.0]);
        request.target_value = Some(2);
        let id = db.api.create_promise(ada, &request)?;

        let outcome = db.api.update_progress(id, ada, 2)?;
        assert_eq!(outcome.status, ProgressStatus::MarkedComplete);
        assert_eq!(db.api.promise_detail(id, ada)?.status, PromiseStatus::Active);
        assert!(kinds_for(&db.api, bob)?.contains(&NotificationKind::SharedPromisePending));
        Ok(())
    }

    #[test]
    fn reframe_carries_shape_and_roster_and_drops_the_old_id() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;
        befriend(&db.api, ada, bob)?;
        let old = db.api.create_promise(ada, &shared_request("1h", vec![bob.0]))?;
        db.api.forfeit(old, ada)?;

        let new_id = db.api.apply_reframe(
            old,
            ada,
            &ReframeRequest {
                name: "gym, but smaller".to_string(),
                content: "one session".to_string(),
                deadline: "2d".to_string(),
            },
        )?;

        assert!(matches!(db.api.promise_detail(old, ada), Err(ApiError::NotFound(_))));
        let detail = db.api.promise_detail(new_id, ada)?;
        assert_eq!(detail.status, PromiseStatus::Active);
        assert_eq!(detail.kind, PromiseKind::Others);
        assert_eq!(detail.category.as_deref(), Some("Health"));
        let roster: Vec<UserId> = detail.participants.iter().map(|p| p.user_id).collect();
        assert!(roster.contains(&ada) && roster.contains(&bob));
        assert!(db.api.dashboard(ada)?.missed.is_none());
        Ok(())
    }

    #[test]
    fn reframe_validates_deadline_and_target() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let id = db.api.create_promise(ada, &solo_request("1h"))?;

        let request = ReframeRequest {
            name: "again".to_string(),
            content: String::new(),
            deadline: "eventually".to_string(),
        };
        assert!(matches!(db.api.apply_reframe(id, ada, &request), Err(ApiError::InvalidInput(_))));
        assert!(matches!(
            db.api.apply_reframe(PromiseId(999), ada, &ReframeRequest {
                name: "again".to_string(),
                content: String::new(),
                deadline: "1h".to_string(),
            }),
            Err(ApiError::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn update_is_owner_only_and_anchors_deadline_to_creation() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;
        let id = db.api.create_promise(ada, &solo_request("1h"))?;

        assert!(matches!(
            db.api.update_promise(id, bob, &UpdatePromiseRequest::default()),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            db.api.update_promise(id, ada, &UpdatePromiseRequest::default()),
            Err(ApiError::InvalidInput(_))
        ));

        db.api.update_promise(
            id,
            ada,
            &UpdatePromiseRequest {
                name: Some("run far".to_string()),
                content: None,
                deadline: Some("2h".to_string()),
            },
        )?;

        let store = SqliteStore::open(&db.path).map_err(ApiError::Internal)?;
        let row = store
            .get_promise(id)?
            .ok_or_else(|| ApiError::NotFound("promise missing".to_string()))?;
        assert_eq!(row.name, "run far");
        assert_eq!(row.deadline_at - row.created_at, 7_200);

        // The detail read still verifies the fingerprint after an update.
        assert!(db.api.promise_detail(id, ada)?.integrity_ok);
        Ok(())
    }

    #[test]
    fn corrupt_rows_render_with_a_warning_and_notify_the_owner_once() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let id = db.api.create_promise(ada, &solo_request("1h"))?;

        // Tamper behind the store's back.
        let conn = rusqlite::Connection::open(&db.path)
            .map_err(|err| ApiError::Internal(err.into()))?;
        conn.execute("UPDATE promises SET content = 'marathon' WHERE id = ?1", [id.0])
            .map_err(|err| ApiError::Internal(err.into()))?;
        drop(conn);

        let detail = db.api.promise_detail(id, ada)?;
        assert!(!detail.integrity_ok);
        assert_eq!(detail.content, "marathon");

        db.api.promise_detail(id, ada)?;
        let corrupt: Vec<NotificationKind> = kinds_for(&db.api, ada)?
            .into_iter()
            .filter(|kind| *kind == NotificationKind::SystemCorruptPromise)
            .collect();
        assert_eq!(corrupt.len(), 1, "repeat reads do not re-notify while unread");
        Ok(())
    }

    #[test]
    fn friend_request_conflicts_are_reported() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;

        assert!(matches!(db.api.send_friend_request(ada, ada), Err(ApiError::Conflict(_))));
        assert!(matches!(
            db.api.send_friend_request(ada, UserId(999)),
            Err(ApiError::NotFound(_))
        ));

        db.api.send_friend_request(ada, bob)?;
        assert!(matches!(db.api.send_friend_request(ada, bob), Err(ApiError::Conflict(_))));
        // Reverse-pending conflict before the first is resolved.
        assert!(matches!(db.api.send_friend_request(bob, ada), Err(ApiError::Conflict(_))));

        assert!(kinds_for(&db.api, bob)?.contains(&NotificationKind::FriendRequest));
        Ok(())
    }

    #[test]
    fn accept_makes_both_directions_friends_and_notifies_the_sender() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;

        let request = db.api.send_friend_request(ada, bob)?;
        assert!(matches!(
            db.api.accept_friend_request(request.id, ada),
            Err(ApiError::Forbidden(_))
        ));
        db.api.accept_friend_request(request.id, bob)?;

        assert!(db.api.incoming_requests(bob)?.is_empty());
        assert!(db.api.outgoing_requests(ada)?.is_empty());
        let ada_friends = db.api.list_friends(ada)?;
        assert_eq!(ada_friends.len(), 1);
        assert_eq!(ada_friends[0].id, bob);
        assert_eq!(db.api.list_friends(bob)?.len(), 1);
        assert!(kinds_for(&db.api, ada)?.contains(&NotificationKind::FriendAccepted));

        assert!(matches!(db.api.send_friend_request(ada, bob), Err(ApiError::Conflict(_))));

        db.api.remove_friend(ada, bob)?;
        assert!(db.api.list_friends(ada)?.is_empty());
        assert!(db.api.list_friends(bob)?.is_empty());
        Ok(())
    }

    #[test]
    fn decline_and_cancel_enforce_their_side_of_the_request() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;

        let request = db.api.send_friend_request(ada, bob)?;
        assert!(matches!(
            db.api.decline_friend_request(request.id, ada),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            db.api.cancel_friend_request(request.id, bob),
            Err(ApiError::Forbidden(_))
        ));

        db.api.decline_friend_request(request.id, bob)?;
        assert!(matches!(
            db.api.decline_friend_request(request.id, bob),
            Err(ApiError::NotFound(_))
        ));
        assert!(db.api.list_friends(ada)?.is_empty());
        Ok(())
    }

    #[test]
    fn comments_validate_body_and_support_one_level_of_replies() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let id = db.api.create_promise(ada, &solo_request("1h"))?;

        assert!(matches!(
            db.api.add_comment(
                id,
                ada,
                &AddCommentRequest { body: "   ".to_string(), parent_comment_id: None }
            ),
            Err(ApiError::InvalidInput(_))
        ));

        let root = db.api.add_comment(
            id,
            ada,
            &AddCommentRequest { body: "first!".to_string(), parent_comment_id: None },
        )?;
        let reply = db.api.add_comment(
            id,
            ada,
            &AddCommentRequest {
                body: "replying to myself".to_string(),
                parent_comment_id: Some(root.id.0),
            },
        )?;
        assert_eq!(reply.parent_comment_id, Some(root.id));

        assert!(matches!(
            db.api.add_comment(
                id,
                ada,
                &AddCommentRequest { body: "orphan".to_string(), parent_comment_id: Some(999) }
            ),
            Err(ApiError::NotFound(_))
        ));

        let liked = db.api.toggle_comment_like(id, root.id, ada)?;
        assert!(liked.liked);
        let comments = db.api.comments(id, ada)?;
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].like_count, 1);
        assert!(comments[0].liked_by_me);
        Ok(())
    }

    #[test]
    fn activity_merges_completions_and_creations_newest_first() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let first = db.api.create_promise(ada, &solo_request("1h"))?;
        let second = db.api.create_promise(ada, &solo_request("2h"))?;
        db.api.complete(second, ada)?;

        let items = db.api.activity(ada, None)?;
        assert_eq!(items.len(), 3);
        assert!(items.iter().any(|item| item.kind == ActivityKind::Completed
            && item.promise_id == second));
        assert!(items.iter().any(|item| item.kind == ActivityKind::Created
            && item.promise_id == first));
        for window in items.windows(2) {
            assert!(window[0].at >= window[1].at);
        }

        let capped = db.api.activity(ada, Some(1))?;
        assert_eq!(capped.len(), 1);
        Ok(())
    }

    #[test]
    fn reframe_suggestions_fall_back_to_the_template() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let id = db.api.create_promise(ada, &solo_request("1h"))?;

        let suggestions = db.api.reframe_suggestions(id, "too busy", "Time")?;
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions.iter().all(|s| s.promise.starts_with("I promise I will")));
        assert!(matches!(
            db.api.reframe_suggestions(PromiseId(999), "x", "y"),
            Err(ApiError::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn notifications_surface_limits_and_read_state() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        let bob = register(&db.api, "bob")?;

        let request = db.api.send_friend_request(ada, bob)?;
        db.api.accept_friend_request(request.id, bob)?;

        assert_eq!(db.api.unread_count(bob)?, 1);
        let rows = db.api.notifications(bob, None)?;
        assert_eq!(rows[0].kind, NotificationKind::FriendRequest);
        assert_eq!(rows[0].from_name.as_deref(), Some("ada"));

        // Only the owner can mark a notification read.
        assert!(matches!(
            db.api.mark_notification_read(rows[0].id, ada),
            Err(ApiError::NotFound(_))
        ));
        db.api.mark_notification_read(rows[0].id, bob)?;
        assert_eq!(db.api.unread_count(bob)?, 0);

        db.api.mark_all_notifications_read(ada)?;
        db.api.mark_all_notifications_read(ada)?;
        assert_eq!(db.api.unread_count(ada)?, 0);
        Ok(())
    }

    #[test]
    fn user_search_excludes_the_caller() -> ApiResult<()> {
        let db = temp_api();
        let ada = register(&db.api, "ada")?;
        db.api.register_user("adam", Some("Adam A."), "adam@example.com")?;

        let hits = db.api.search_users("ada", ada)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "adam");
        assert!(matches!(
            db.api.register_user("  ", None, "x@example.com"),
            Err(ApiError::InvalidInput(_))
        ));

        let profile = db.api.get_user(ada)?;
        assert_eq!(profile.name, "ada");
        assert!(matches!(db.api.get_user(UserId(999)), Err(ApiError::NotFound(_))));
        Ok(())
    }
}
