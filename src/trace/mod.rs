//! Resolution diagnostics.
//!
//! Every call to [`bind_by_name`](crate::binder::LoadContextBinder::bind_by_name)
//! is recorded by a [`ResolutionTracker`]: one tracker per attempt, stack-scoped,
//! collecting an ordered sequence of `(stage, outcome)` pairs and exactly one
//! terminal [`BindDisposition`]. When the attempt ends the tracker emits a single
//! [`ResolutionEvent`] to the `tracing` crate and, if one is configured, to a
//! pluggable [`TraceSink`].
//!
//! Fallback to a parent context starts a *fresh* attempt with its own tracker;
//! the nested event carries the outer attempt's id in
//! [`parent_attempt`](ResolutionEvent::parent_attempt) so the two can be
//! correlated without sharing any state.
//!
//! # Key Components
//!
//! - [`BindStage`] - The resolution stages, in the order the binder runs them
//! - [`StageOutcome`] - What one stage produced
//! - [`BindDisposition`] - The terminal state of one attempt
//! - [`ResolutionEvent`] - The completed record of one attempt
//! - [`TraceSink`] - Pluggable receiver for completed events
//! - [`InMemorySink`] - Append-only sink for tests and tooling
//!
//! # Example
//!
//! ```rust
//! use dotbind::prelude::*;
//! use std::sync::Arc;
//!
//! let sink = Arc::new(InMemorySink::new());
//! let binder = BinderBuilder::new("probe-less")
//!     .trace_sink(sink.clone())
//!     .build();
//!
//! let request = AssemblyName::parse("Absent, Version=1.0.0.0")?;
//! assert!(binder.bind_by_name(&request).is_err());
//!
//! let events = sink.events();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].disposition, BindDisposition::AssemblyNotFound);
//! assert_eq!(
//!     events[0].stages,
//!     vec![(BindStage::FindInContext, StageOutcome::Miss)]
//! );
//! # Ok::<(), dotbind::Error>(())
//! ```

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use strum::{Display, EnumIter};

use crate::identity::AssemblyName;

/// Monotonic attempt ids, unique within the process.
static NEXT_ATTEMPT: AtomicU64 = AtomicU64::new(1);

/// One stage of the resolution algorithm.
///
/// The variants are listed in the order
/// [`bind_by_name`](crate::binder::LoadContextBinder::bind_by_name) runs them;
/// a recorded stage sequence is always a prefix-respecting subsequence of this
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum BindStage {
    /// Lookup in the context's identity cache.
    FindInContext,
    /// The user-supplied load override of an isolated context.
    ContextLoad,
    /// TPA and probing-path resolution, bundle tier first.
    PlatformAssemblies,
    /// Delegation of the whole bind to the parent context.
    DefaultContextFallback,
}

/// What a single stage produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StageOutcome {
    /// The stage produced the module that ends the attempt.
    Resolved,
    /// The stage found nothing; resolution advances to the next stage.
    Miss,
    /// The stage found a candidate but could not accept it.
    Failed,
}

/// Terminal state of one resolution attempt.
///
/// Exactly one disposition is reached per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum BindDisposition {
    /// A module was returned to the caller.
    Success,
    /// Every stage was exhausted without locating the name.
    AssemblyNotFound,
    /// A located candidate's name, culture or strong name disagreed with the
    /// request or with an existing cache entry.
    MismatchedAssemblyName,
    /// A located candidate's version was rejected by the version policy.
    IncompatibleVersion,
    /// A collaborator failure outside the stage taxonomy: loader errors,
    /// recursive binds, unloading contexts, failing load overrides.
    Unknown,
}

/// The completed record of one resolution attempt.
#[derive(Debug, Clone)]
pub struct ResolutionEvent {
    /// Process-unique id of this attempt.
    pub attempt: u64,

    /// The attempt that delegated to this one, if this attempt was a
    /// parent-context fallback.
    pub parent_attempt: Option<u64>,

    /// Name of the load context the attempt ran in.
    pub context: String,

    /// Display name of the requested identity.
    pub requested: String,

    /// Stage transitions in the order they were taken.
    pub stages: Vec<(BindStage, StageOutcome)>,

    /// Terminal state of the attempt.
    pub disposition: BindDisposition,

    /// Display name of the resolved identity, present on success.
    pub resolved: Option<String>,

    /// Whether the result was served from the identity cache.
    pub from_cache: bool,
}

/// Receiver for completed resolution events.
///
/// Called once per attempt, after the terminal disposition is known. Sinks are
/// invoked from whichever thread ran the bind and must be thread-safe.
pub trait TraceSink: Send + Sync {
    /// A resolution attempt has reached its terminal state.
    fn resolution_completed(&self, event: &ResolutionEvent);
}

/// Append-only in-memory [`TraceSink`].
///
/// Events can be appended from any number of binding threads without locking;
/// [`events`](Self::events) snapshots what has been recorded so far.
#[derive(Default)]
pub struct InMemorySink {
    events: boxcar::Vec<ResolutionEvent>,
}

impl InMemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, in completion order.
    #[must_use]
    pub fn events(&self) -> Vec<ResolutionEvent> {
        self.events.iter().map(|(_, event)| event.clone()).collect()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Whether no events have been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }
}

impl TraceSink for InMemorySink {
    fn resolution_completed(&self, event: &ResolutionEvent) {
        self.events.push(event.clone());
    }
}

/// Stage-by-stage recorder for one resolution attempt.
///
/// Created at the top of the bind call and consumed by exactly one of
/// [`complete_success`](Self::complete_success) or
/// [`complete_failure`](Self::complete_failure), which emit the event. The
/// tracker never outlives the call that created it.
pub struct ResolutionTracker {
    event: ResolutionEvent,
    sink: Option<Arc<dyn TraceSink>>,
}

impl ResolutionTracker {
    /// Start recording an attempt for `requested` inside `context`.
    ///
    /// `parent_attempt` links a nested fallback attempt to the attempt that
    /// delegated to it; the root attempt passes `None`.
    #[must_use]
    pub fn new(
        requested: &AssemblyName,
        context: &str,
        parent_attempt: Option<u64>,
        sink: Option<Arc<dyn TraceSink>>,
    ) -> Self {
        Self {
            event: ResolutionEvent {
                attempt: NEXT_ATTEMPT.fetch_add(1, Ordering::Relaxed),
                parent_attempt,
                context: context.to_string(),
                requested: requested.display_name(),
                stages: Vec::with_capacity(4),
                disposition: BindDisposition::Unknown,
                resolved: None,
                from_cache: false,
            },
            sink,
        }
    }

    /// Id of this attempt, used to link nested fallback attempts.
    #[must_use]
    pub fn attempt_id(&self) -> u64 {
        self.event.attempt
    }

    /// Record one stage transition.
    pub fn stage(&mut self, stage: BindStage, outcome: StageOutcome) {
        self.event.stages.push((stage, outcome));
    }

    /// End the attempt successfully and emit the event.
    pub fn complete_success(mut self, resolved: &AssemblyName, from_cache: bool) {
        self.event.disposition = BindDisposition::Success;
        self.event.resolved = Some(resolved.display_name());
        self.event.from_cache = from_cache;
        self.emit();
    }

    /// End the attempt with a failure disposition and emit the event.
    pub fn complete_failure(mut self, disposition: BindDisposition) {
        self.event.disposition = disposition;
        self.emit();
    }

    fn emit(self) {
        tracing::debug!(
            target: "dotbind::resolution",
            attempt = self.event.attempt,
            parent_attempt = self.event.parent_attempt,
            context = %self.event.context,
            requested = %self.event.requested,
            stages = ?self.event.stages,
            disposition = %self.event.disposition,
            resolved = self.event.resolved.as_deref(),
            from_cache = self.event.from_cache,
            "assembly resolution completed"
        );

        if let Some(sink) = &self.sink {
            sink.resolution_completed(&self.event);
        }
    }
}
