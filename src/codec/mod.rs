//! Option wire codec additions on top of `dhcproto`.
//!
//! `dhcproto` already implements RFC 2131/3315 TLV encode/decode for the
//! base option set; this module adds what it doesn't: option-overload
//! splicing, a small option-space ("universe") descriptor table, and the
//! priority-list/MMS/repeated-option bookkeeping `common/options.c` and
//! `common/tables.c` do in the original server.

pub mod options;
pub mod overload;
pub mod universe;
