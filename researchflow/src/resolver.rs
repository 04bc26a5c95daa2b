//! Publish target resolution.
//!
//! Picks the backend a report is published to. Resolution is a pure function
//! of the request, the configured default and the set of backends configured
//! at startup; it never touches the network.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::core::{PublishTargetKind, ResearchRequest};

/// The outcome of target resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The target named in the request, if any.
    pub requested: Option<PublishTargetKind>,
    /// The target the report will be published to.
    pub resolved: PublishTargetKind,
    /// True if the requested target was unavailable and PDF was chosen instead.
    pub fell_back: bool,
}

/// Chooses the publish backend for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetResolver {
    default_target: PublishTargetKind,
}

impl Default for TargetResolver {
    fn default() -> Self {
        Self::new(PublishTargetKind::Pdf)
    }
}

impl TargetResolver {
    /// Creates a resolver that uses `default_target` when a request names none.
    #[must_use]
    pub fn new(default_target: PublishTargetKind) -> Self {
        Self { default_target }
    }

    /// The backend for `request` given the `available` backends.
    #[must_use]
    pub fn resolve(
        &self,
        request: &ResearchRequest,
        available: &BTreeSet<PublishTargetKind>,
    ) -> PublishTargetKind {
        self.resolve_detailed(request, available).resolved
    }

    /// Like [`resolve`](Self::resolve), also reporting whether a fallback happened.
    ///
    /// Order: the request's target if available; otherwise, when the request
    /// named nothing, the configured default if available; otherwise PDF.
    #[must_use]
    pub fn resolve_detailed(
        &self,
        request: &ResearchRequest,
        available: &BTreeSet<PublishTargetKind>,
    ) -> Resolution {
        let requested = request.publish_target();
        let resolution = match requested {
            Some(target) if available.contains(&target) => Resolution {
                requested,
                resolved: target,
                fell_back: false,
            },
            Some(target) => Resolution {
                requested,
                resolved: PublishTargetKind::Pdf,
                fell_back: target != PublishTargetKind::Pdf,
            },
            None if available.contains(&self.default_target) => Resolution {
                requested,
                resolved: self.default_target,
                fell_back: false,
            },
            None => Resolution {
                requested,
                resolved: PublishTargetKind::Pdf,
                fell_back: false,
            },
        };

        debug!(
            requested = ?resolution.requested,
            resolved = %resolution.resolved,
            fell_back = resolution.fell_back,
            "Resolved publish target"
        );
        resolution
    }
}
