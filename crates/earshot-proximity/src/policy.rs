//! Session membership policy: when to (re)join a voice session.
//!
//! Two rules, evaluated after every self update:
//!
//! 1. The self region changed (or this is the first evaluation): join the
//!    region's session, even if nobody is around.
//! 2. Someone is nearby and we are not in the desired session: join it.
//!
//! Otherwise nothing happens. In particular an empty neighbourhood never
//! causes a leave.

use earshot_protocol::{Region, SessionKey};

/// What the coordinator should do after an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipDecision {
    /// Join (or switch to) the given session.
    Join(SessionKey),
    /// Keep the current membership.
    Stay,
}

/// Pure decision function.
///
/// `previous_region` is the region observed at the last evaluation, or
/// `None` before the first. `current` is the session the local participant
/// is in right now, if any.
pub fn decide(
    self_region: &Region,
    previous_region: Option<&Region>,
    has_nearby: bool,
    current: Option<&SessionKey>,
) -> MembershipDecision {
    let desired = SessionKey::for_region(self_region);

    if previous_region != Some(self_region) {
        return MembershipDecision::Join(desired);
    }
    if has_nearby && current != Some(&desired) {
        return MembershipDecision::Join(desired);
    }
    MembershipDecision::Stay
}

/// [`decide`] plus the memory of the last evaluated region.
#[derive(Debug, Default)]
pub struct MembershipPolicy {
    last_region: Option<Region>,
}

impl MembershipPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates the rules and records `self_region` as the last region.
    pub fn evaluate(
        &mut self,
        self_region: &Region,
        has_nearby: bool,
        current: Option<&SessionKey>,
    ) -> MembershipDecision {
        let decision =
            decide(self_region, self.last_region.as_ref(), has_nearby, current);
        if self.last_region.as_ref() != Some(self_region) {
            tracing::debug!(
                from = ?self.last_region.as_ref().map(Region::as_str),
                to = %self_region,
                "self region changed"
            );
            self.last_region = Some(self_region.clone());
        }
        decision
    }

    /// The region seen at the last evaluation.
    pub fn last_region(&self) -> Option<&Region> {
        self.last_region.as_ref()
    }

    /// Forgets the last region, so the next evaluation counts as a change.
    pub fn reset(&mut self) {
        self.last_region = None;
    }
}
