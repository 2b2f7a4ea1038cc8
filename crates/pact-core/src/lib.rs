use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum DomainError {
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct PromiseId(pub i64);

impl Display for PromiseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct CommentId(pub i64);

impl Display for CommentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct FriendRequestId(pub i64);

impl Display for FriendRequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct NotificationId(pub i64);

impl Display for NotificationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PromiseKind {
    #[serde(rename = "self")]
    Personal,
    Others,
    World,
}

impl PromiseKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "self",
            Self::Others => "others",
            Self::World => "world",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "self" => Some(Self::Personal),
            // "other" is a legacy client alias
            "others" | "other" => Some(Self::Others),
            "world" => Some(Self::World),
            _ => None,
        }
    }

    /// Unknown kinds fall back to a personal promise.
    #[must_use]
    pub fn parse_or_default(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Personal)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromiseStatus {
    Active,
    Missed,
    Completed,
}

impl PromiseStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Missed => "MISSED",
            Self::Completed => "COMPLETED",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "MISSED" => Some(Self::Missed),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Friends,
    Public,
}

impl Visibility {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Friends => "friends",
            Self::Public => "public",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Self::Private),
            "friends" => Some(Self::Friends),
            "public" => Some(Self::Public),
            _ => None,
        }
    }

    #[must_use]
    pub fn parse_or_default(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Private)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    #[must_use]
    pub fn period_seconds(self) -> i64 {
        match self {
            Self::Daily => 86_400,
            Self::Weekly => 604_800,
            Self::Monthly => 2_592_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccepted,
    SharedPromiseComplete,
    SharedPromisePending,
    SharedPromiseReneged,
    SystemCorruptPromise,
    Reminder,
}

impl NotificationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FriendRequest => "friend_request",
            Self::FriendAccepted => "friend_accepted",
            Self::SharedPromiseComplete => "shared_promise_complete",
            Self::SharedPromisePending => "shared_promise_pending",
            Self::SharedPromiseReneged => "shared_promise_reneged",
            Self::SystemCorruptPromise => "system_corrupt_promise",
            Self::Reminder => "reminder",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "friend_request" => Some(Self::FriendRequest),
            "friend_accepted" => Some(Self::FriendAccepted),
            "shared_promise_complete" => Some(Self::SharedPromiseComplete),
            "shared_promise_pending" => Some(Self::SharedPromisePending),
            "shared_promise_reneged" => Some(Self::SharedPromiseReneged),
            "system_corrupt_promise" => Some(Self::SystemCorruptPromise),
            "reminder" => Some(Self::Reminder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReminderUnit {
    Minutes,
    Hours,
    Days,
}

impl ReminderUnit {
    #[must_use]
    pub fn seconds(self) -> i64 {
        match self {
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
        }
    }

    /// Lenient prefix match; anything unrecognized reads as days.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let lower = value.to_ascii_lowercase();
        if lower.starts_with("min") {
            Self::Minutes
        } else if lower.starts_with("hour") {
            Self::Hours
        } else {
            Self::Days
        }
    }
}

pub const DEFAULT_CATEGORIES: [&str; 6] =
    ["Health", "Work", "Personal", "Social", "Learning", "Other"];

/// Parse a deadline duration string into total seconds.
///
/// The grammar is a free-form sequence of `<positive integer><unit>` tokens
/// with unit one of `d`, `h`, `m`, `s` (case-insensitive); whitespace between
/// tokens or between an integer and its unit is allowed, and values are
/// summed ("1h 30m" == "1h30m" == 5400). Digit runs without a trailing unit
/// are skipped, mirroring the wire format's tolerant matcher.
///
/// # Errors
/// Returns [`DomainError::InvalidDuration`] when no token matches, the sum is
/// zero, or the sum overflows.
pub fn parse_duration(value: &str) -> Result<u64, DomainError> {
    let text = value.trim().to_ascii_lowercase();
    let mut chars = text.chars().peekable();
    let mut total: u64 = 0;

    while let Some(ch) = chars.next() {
        let Some(first) = ch.to_digit(10) else { continue };
        let mut amount = u64::from(first);
        while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
            chars.next();
            amount = amount
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit)))
                .ok_or_else(|| DomainError::InvalidDuration(value.to_string()))?;
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let multiplier = match chars.peek() {
            Some('d') => Some(86_400),
            Some('h') => Some(3_600),
            Some('m') => Some(60),
            Some('s') => Some(1),
            _ => None,
        };
        if let Some(multiplier) = multiplier {
            chars.next();
            total = amount
                .checked_mul(multiplier)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(|| DomainError::InvalidDuration(value.to_string()))?;
        }
    }

    if total == 0 {
        return Err(DomainError::InvalidDuration(value.to_string()));
    }
    Ok(total)
}

/// Render remaining seconds as "1h 30m", "45s", etc. Days roll into hours.
#[must_use]
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3_600;
    let rem = total_seconds % 3_600;
    let minutes = rem / 60;
    let seconds = rem % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

/// Content fingerprint over the identifying promise fields. Detects row
/// tampering or corruption; not a security control.
#[must_use]
pub fn promise_fingerprint(
    promise_id: i64,
    created_at: i64,
    name: &str,
    kind: PromiseKind,
    content: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!("{promise_id}|{created_at}|{name}|{}|{content}", kind.as_str()).as_bytes(),
    );
    format!("{:x}", hasher.finalize())
}

/// round(100 * completed / (completed + missed)); None when nothing has
/// resolved yet.
#[must_use]
pub fn accountability_score(completed: i64, missed: i64) -> Option<u8> {
    let total = completed + missed;
    if total <= 0 {
        return None;
    }
    let rounded = (completed * 100 + total / 2) / total;
    u8::try_from(rounded).ok()
}

/// Cap a submitted progress value at the target, when one is set.
#[must_use]
pub fn clamp_progress(submitted: i64, target: Option<i64>) -> i64 {
    match target {
        Some(target) => submitted.min(target),
        None => submitted,
    }
}

/// Initial progress for a new promise: only meaningful with a positive
/// target; defaults to 0 and is clamped into [0, target].
#[must_use]
pub fn initial_progress(target: Option<i64>, current: Option<i64>) -> Option<i64> {
    let target = target.filter(|t| *t > 0)?;
    let current = current.filter(|c| *c >= 0).unwrap_or(0);
    Some(current.min(target))
}

/// Resolve a reminder timestamp from either wire form. The (value, unit)
/// form wins over plain hours-before-deadline; non-positive values are
/// ignored.
#[must_use]
pub fn reminder_at(
    deadline_at: i64,
    value_unit: Option<(i64, ReminderUnit)>,
    hours_before: Option<i64>,
) -> Option<i64> {
    if let Some((value, unit)) = value_unit {
        if value > 0 {
            return Some(deadline_at - value * unit.seconds());
        }
    }
    match hours_before {
        Some(hours) if hours > 0 => Some(deadline_at - hours * 3_600),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReframeSuggestion {
    pub label: String,
    pub promise: String,
    pub deadline: String,
}

/// Deterministic templated reframe suggestions, used when the external
/// text-generation collaborator times out or fails. The client applies a
/// bounded wait and falls back to these.
#[must_use]
pub fn fallback_reframe_suggestions(
    original: &str,
    reason: &str,
    category: &str,
) -> Vec<ReframeSuggestion> {
    let original = original.trim();
    let reason = reason.trim();
    let category = category.trim();

    vec![
        ReframeSuggestion {
            label: "conservative".to_string(),
            promise: format!(
                "I promise I will restart with a smaller first step toward: {original}"
            ),
            deadline: "2d".to_string(),
        },
        ReframeSuggestion {
            label: "moderate".to_string(),
            promise: format!(
                "I promise I will retry {original}, planning around the {category} issue ({reason})"
            ),
            deadline: "1d".to_string(),
        },
        ReframeSuggestion {
            label: "progressive".to_string(),
            promise: format!("I promise I will push past {reason} and finish: {original}"),
            deadline: "12h".to_string(),
        },
    ]
}
