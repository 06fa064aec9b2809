//! Bundle processing control flags (RFC 9171 §4.2.3).

/// Field-per-bit view of the 64-bit bundle processing control flags.
/// Unassigned bits are preserved in `unrecognised` so a relayed bundle
/// re-encodes exactly.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct BundleFlags {
    pub is_fragment: bool,
    pub is_admin_record: bool,
    pub must_not_fragment: bool,
    pub app_ack_requested: bool,
    pub report_status_time: bool,
    pub receipt_report_requested: bool,
    pub forward_report_requested: bool,
    pub delivery_report_requested: bool,
    pub delete_report_requested: bool,
    pub unrecognised: u64,
}

const IS_FRAGMENT: u64 = 1 << 0;
const IS_ADMIN_RECORD: u64 = 1 << 1;
const MUST_NOT_FRAGMENT: u64 = 1 << 2;
const APP_ACK_REQUESTED: u64 = 1 << 5;
const REPORT_STATUS_TIME: u64 = 1 << 6;
const RECEIPT_REPORT_REQUESTED: u64 = 1 << 14;
const FORWARD_REPORT_REQUESTED: u64 = 1 << 16;
const DELIVERY_REPORT_REQUESTED: u64 = 1 << 17;
const DELETE_REPORT_REQUESTED: u64 = 1 << 18;

const ASSIGNED: u64 = IS_FRAGMENT
    | IS_ADMIN_RECORD
    | MUST_NOT_FRAGMENT
    | APP_ACK_REQUESTED
    | REPORT_STATUS_TIME
    | RECEIPT_REPORT_REQUESTED
    | FORWARD_REPORT_REQUESTED
    | DELIVERY_REPORT_REQUESTED
    | DELETE_REPORT_REQUESTED;

impl From<u64> for BundleFlags {
    fn from(value: u64) -> Self {
        Self {
            is_fragment: value & IS_FRAGMENT != 0,
            is_admin_record: value & IS_ADMIN_RECORD != 0,
            must_not_fragment: value & MUST_NOT_FRAGMENT != 0,
            app_ack_requested: value & APP_ACK_REQUESTED != 0,
            report_status_time: value & REPORT_STATUS_TIME != 0,
            receipt_report_requested: value & RECEIPT_REPORT_REQUESTED != 0,
            forward_report_requested: value & FORWARD_REPORT_REQUESTED != 0,
            delivery_report_requested: value & DELIVERY_REPORT_REQUESTED != 0,
            delete_report_requested: value & DELETE_REPORT_REQUESTED != 0,
            unrecognised: value & !ASSIGNED,
        }
    }
}

impl From<BundleFlags> for u64 {
    fn from(value: BundleFlags) -> Self {
        let mut flags = value.unrecognised;
        if value.is_fragment {
            flags |= IS_FRAGMENT;
        }
        if value.is_admin_record {
            flags |= IS_ADMIN_RECORD;
        }
        if value.must_not_fragment {
            flags |= MUST_NOT_FRAGMENT;
        }
        if value.app_ack_requested {
            flags |= APP_ACK_REQUESTED;
        }
        if value.report_status_time {
            flags |= REPORT_STATUS_TIME;
        }
        if value.receipt_report_requested {
            flags |= RECEIPT_REPORT_REQUESTED;
        }
        if value.forward_report_requested {
            flags |= FORWARD_REPORT_REQUESTED;
        }
        if value.delivery_report_requested {
            flags |= DELIVERY_REPORT_REQUESTED;
        }
        if value.delete_report_requested {
            flags |= DELETE_REPORT_REQUESTED;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_unassigned_bits() {
        let raw = IS_FRAGMENT | RECEIPT_REPORT_REQUESTED | (1 << 30);
        let flags = BundleFlags::from(raw);
        assert!(flags.is_fragment);
        assert!(flags.receipt_report_requested);
        assert_eq!(flags.unrecognised, 1 << 30);
        assert_eq!(u64::from(flags), raw);
    }
}
