use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Maximum retained entries per lane. The log only has to remember enough
/// recent history to re-anchor the chain after upstream removals.
pub const LIMIT: usize = 10;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum LogError {
    #[error("submission lookup failed: {0}")]
    LookupFailure(String),
    #[error("index {index} out of range for log of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Live status of a hosted submission as reported by the platform read API.
///
/// `removed` is optional because not every platform (or API scope) exposes
/// the moderator-removal flag; absence means "not removed", never "unknown".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct SubmissionState {
    pub author_present: bool,
    pub banned: bool,
    pub approved: bool,
    pub removed: Option<bool>,
}

impl SubmissionState {
    /// Full freshness predicate used by the head pass: the author is still
    /// there, the submission is not removed, and any ban has been overturned
    /// by an explicit approval.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.author_present && self.removed != Some(true) && (!self.banned || self.approved)
    }

    /// Narrower predicate used by the tail-anchor pass: ban/approval status
    /// is ignored, only author presence and removal count.
    #[must_use]
    pub fn is_settled_alive(&self) -> bool {
        self.author_present && self.removed != Some(true)
    }
}

/// Read access to the hosting platform's view of a submission.
///
/// Implementations MUST collapse every transport or bad-request failure into
/// [`LogError::LookupFailure`]; the platform being unable to answer is
/// indistinguishable from the content being gone.
pub trait ContentAuthority {
    /// Fetch the current state of a submission by canonical identifier or URL.
    ///
    /// # Errors
    /// Returns [`LogError::LookupFailure`] when the identifier cannot be
    /// resolved or the platform rejects the request.
    fn get_state(&self, id_or_url: &str) -> Result<SubmissionState, LogError>;
}

/// One chain position: the comment that announced the step and the submission
/// hosting it. Identity is the `submission_id`; the other fields are display
/// links and thread bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRecord {
    pub thread_id: String,
    pub comment_id: String,
    pub comment_url: String,
    pub submission_url: String,
    pub submission_id: String,
    /// Platform object fetched at insertion time. Never persisted and never
    /// trusted as current after insertion.
    #[serde(skip)]
    pub cached_snapshot: Option<serde_json::Value>,
}

impl ChainRecord {
    #[must_use]
    pub fn new(
        thread_id: String,
        comment_id: String,
        comment_url: String,
        submission_url: String,
        submission_id: String,
    ) -> Self {
        Self {
            thread_id,
            comment_id,
            comment_url,
            submission_url,
            submission_id,
            cached_snapshot: None,
        }
    }

    /// Attach the platform object captured at insertion time.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: serde_json::Value) -> Self {
        self.cached_snapshot = Some(snapshot);
        self
    }
}

impl PartialEq for ChainRecord {
    fn eq(&self, other: &Self) -> bool {
        self.submission_id == other.submission_id
    }
}

impl Eq for ChainRecord {}

impl Display for ChainRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.submission_id)
    }
}

/// Plain persisted form of a [`VerifiedLog`], newest-first in both lanes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct LogSnapshot {
    pub good: Vec<ChainRecord>,
    pub raw: Vec<String>,
}

/// How many entries each verification pass pruned per lane.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct PruneReport {
    pub good_removed: usize,
    pub raw_removed: usize,
}

impl PruneReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.good_removed + self.raw_removed
    }
}

/// Bounded dual-lane history of chain positions.
///
/// `good` holds verified chain steps, `raw` holds every observed submission
/// URL regardless of validity. Both lanes are strictly newest-first; eviction
/// always drops from the tail. Callers consult the head of each lane to
/// decide where to re-anchor the next chain step.
#[derive(Debug, Clone, Default)]
pub struct VerifiedLog {
    good: Vec<ChainRecord>,
    raw: Vec<String>,
}

impl VerifiedLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a verified chain step. Oldest entries beyond [`LIMIT`] are
    /// evicted. No dedup by `submission_id`.
    pub fn add_good(&mut self, record: ChainRecord) {
        self.good.insert(0, record);
        self.good.truncate(LIMIT);
    }

    /// Prepend an observed submission URL with the same eviction discipline.
    pub fn add_last(&mut self, submission_url: String) {
        self.raw.insert(0, submission_url);
        self.raw.truncate(LIMIT);
    }

    /// Entry at `index` from the front of the `good` lane.
    ///
    /// An empty lane is an expected steady state and yields `Ok(None)`.
    ///
    /// # Errors
    /// Returns [`LogError::IndexOutOfRange`] for `index >= len` on a
    /// non-empty lane; that is a caller programming error.
    pub fn last_good(&self, index: usize) -> Result<Option<&ChainRecord>, LogError> {
        if self.good.is_empty() {
            return Ok(None);
        }
        match self.good.get(index) {
            Some(record) => Ok(Some(record)),
            None => Err(LogError::IndexOutOfRange { index, len: self.good.len() }),
        }
    }

    /// Entry at `index` from the front of the `raw` lane.
    ///
    /// # Errors
    /// Returns [`LogError::IndexOutOfRange`] for `index >= len` on a
    /// non-empty lane.
    pub fn last_submitted(&self, index: usize) -> Result<Option<&str>, LogError> {
        if self.raw.is_empty() {
            return Ok(None);
        }
        match self.raw.get(index) {
            Some(url) => Ok(Some(url.as_str())),
            None => Err(LogError::IndexOutOfRange { index, len: self.raw.len() }),
        }
    }

    #[must_use]
    pub fn len_good(&self) -> usize {
        self.good.len()
    }

    #[must_use]
    pub fn len_raw(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.good.is_empty() && self.raw.is_empty()
    }

    /// Head-freshness pass. Each lane is scanned independently from the
    /// newest entry toward the tail; scanning stops at the first entry the
    /// full alive predicate accepts, and everything scanned before it is
    /// pruned. Entries behind the first alive one are left untouched even if
    /// dead: they only need to be fresh once they become the head.
    ///
    /// A failed lookup counts as dead. This pass never propagates
    /// [`LogError::LookupFailure`]: when actively serving the head it is
    /// better to drop a possibly-still-alive entry than to present a dead
    /// link.
    pub fn verify<A>(&mut self, authority: &A) -> PruneReport
    where
        A: ContentAuthority + ?Sized,
    {
        let mut dead_good = Vec::new();
        for (index, record) in self.good.iter().enumerate() {
            match authority.get_state(&record.submission_id) {
                Ok(state) if state.is_alive() => break,
                Ok(_) | Err(_) => dead_good.push(index),
            }
        }
        let good_removed = remove_descending(&mut self.good, dead_good);

        let mut dead_raw = Vec::new();
        for (index, url) in self.raw.iter().enumerate() {
            match authority.get_state(url) {
                Ok(state) if state.is_alive() => break,
                Ok(_) | Err(_) => dead_raw.push(index),
            }
        }
        let raw_removed = remove_descending(&mut self.raw, dead_raw);

        PruneReport { good_removed, raw_removed }
    }

    /// Tail-anchor pass. Both lanes are scanned from the oldest entry toward
    /// the head with the narrower settled-alive predicate (ban/approval
    /// status is ignored); removal stops at the first settled-alive entry.
    /// The pass exists to guarantee a confirmed fallback anchor near the back
    /// of the log after a burst of near-term removals.
    ///
    /// # Errors
    /// Propagates [`LogError::LookupFailure`] instead of treating it as
    /// dead. This asymmetry with [`VerifiedLog::verify`] is deliberate: the
    /// entry being protected here is the fallback of last resort, so the
    /// pass refuses to guess when the platform cannot answer.
    pub fn verify_settled<A>(&mut self, authority: &A) -> Result<PruneReport, LogError>
    where
        A: ContentAuthority + ?Sized,
    {
        let mut dead_good = Vec::new();
        for index in (0..self.good.len()).rev() {
            let state = authority.get_state(&self.good[index].submission_id)?;
            if state.is_settled_alive() {
                break;
            }
            dead_good.push(index);
        }
        let good_removed = remove_descending(&mut self.good, dead_good);

        let mut dead_raw = Vec::new();
        for index in (0..self.raw.len()).rev() {
            let state = authority.get_state(&self.raw[index])?;
            if state.is_settled_alive() {
                break;
            }
            dead_raw.push(index);
        }
        let raw_removed = remove_descending(&mut self.raw, dead_raw);

        Ok(PruneReport { good_removed, raw_removed })
    }

    /// Re-apply the [`LIMIT`] bound to both lanes. [`VerifiedLog::restore`]
    /// trusts its snapshot; callers ingesting externally-edited snapshots
    /// invoke this explicitly afterwards.
    pub fn evict_excess(&mut self) {
        self.good.truncate(LIMIT);
        self.raw.truncate(LIMIT);
    }

    /// Produce the plain persisted form, newest-first. Transient cached
    /// snapshots on records are not part of it.
    #[must_use]
    pub fn save(&self) -> LogSnapshot {
        LogSnapshot { good: self.good.clone(), raw: self.raw.clone() }
    }

    /// Rebuild a log from a snapshot produced by [`VerifiedLog::save`],
    /// preserving order. No bound re-check is performed.
    #[must_use]
    pub fn restore(snapshot: LogSnapshot) -> Self {
        Self { good: snapshot.good, raw: snapshot.raw }
    }
}

fn remove_descending<T>(entries: &mut Vec<T>, mut indices: Vec<usize>) -> usize {
    indices.sort_unstable();
    for index in indices.iter().rev() {
        entries.remove(*index);
    }
    indices.len()
}
