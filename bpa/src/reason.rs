//! Bundle status report reason codes (RFC 9171 §9.4.1).
//!
//! Status reports themselves are not emitted; the codes classify forwarding
//! outcomes and deletion causes inside the node.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u64)]
pub enum ReasonCode {
    NoAdditionalInformation = 0,
    LifetimeExpired = 1,
    ForwardedOverUnidirectionalLink = 2,
    TransmissionCanceled = 3,
    DepletedStorage = 4,
    DestinationUnavailable = 5,
    NoKnownRoute = 6,
    NoTimelyContact = 7,
    BlockUnintelligible = 8,
    HopLimitExceeded = 9,
    TrafficPared = 10,
    BlockUnsupported = 11,
}

impl ReasonCode {
    pub fn code(self) -> u64 {
        self as u64
    }

    /// True for outcomes that are no overall failure: the bundle is kept and
    /// retried later instead of deleted.
    pub fn is_no_failure(self) -> bool {
        matches!(
            self,
            ReasonCode::NoKnownRoute
                | ReasonCode::NoTimelyContact
                | ReasonCode::TrafficPared
                | ReasonCode::ForwardedOverUnidirectionalLink
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_outcomes() {
        assert!(ReasonCode::NoTimelyContact.is_no_failure());
        assert!(ReasonCode::TrafficPared.is_no_failure());
        assert!(ReasonCode::ForwardedOverUnidirectionalLink.is_no_failure());
        assert!(!ReasonCode::DestinationUnavailable.is_no_failure());
        assert!(!ReasonCode::LifetimeExpired.is_no_failure());
    }
}
