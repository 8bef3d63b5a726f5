//! Priority-list assembly, MMS computation, and repeated-option merging.

use dhcproto::v4;

/// Sent whenever the client didn't ask for a Parameter Request List
/// (option 55) — a reasonable minimal default rather than "send
/// everything".
pub const DEFAULT_PRIORITY: &[u8] = &[
    1,  // subnet mask
    3,  // router
    6,  // domain name server
    15, // domain name
    51, // address lease time
    58, // renewal (T1)
    59, // rebinding (T2)
];

/// Mandatory options precede the client's Parameter Request List (or the
/// default list), and a code already present earlier in the list is never
/// duplicated later.
pub fn priority_list(requested: Option<&[u8]>) -> Vec<u8> {
    const MANDATORY: [u8; 2] = [53, 54]; // message type, server identifier
    let mut out = MANDATORY.to_vec();
    for &code in requested.unwrap_or(DEFAULT_PRIORITY) {
        if !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

/// Maximum message size to target when assembling a reply: the client's
/// option 57 if present, else the BOOTP-safe default of 576 minus a fixed
/// header allowance, capped to whatever the caller's actual buffer holds.
pub fn compute_mms(msg: &v4::Message, buf_cap: usize) -> usize {
    const FIXED_HEADER: usize = 236; // op..options, excluding the 4-byte magic cookie
    let requested = msg.opts().iter().find_map(|o| match o {
        v4::DhcpOption::MaxMessageSize(sz) => Some(*sz as usize),
        _ => None,
    });
    let mms = requested.unwrap_or(576).saturating_sub(FIXED_HEADER);
    mms.min(buf_cap)
}

/// Concatenates adjacent same-code entries in a raw decoded option stream
/// (a value split across multiple 255-byte hunks on the wire arrives as
/// repeated same-code TLVs; `dhcproto`'s `DhcpOptions` map only keeps the
/// last one, so this runs on the pre-folded stream).
pub fn merge_repeated(opts: Vec<(u8, Vec<u8>)>) -> Vec<(u8, Vec<u8>)> {
    let mut merged: Vec<(u8, Vec<u8>)> = Vec::new();
    for (code, data) in opts {
        if let Some(last) = merged.last_mut() {
            if last.0 == code {
                last.1.extend(data);
                continue;
            }
        }
        merged.push((code, data));
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_list_puts_mandatory_options_first_and_dedupes() {
        let list = priority_list(Some(&[1, 53, 6]));
        assert_eq!(list[0], 53);
        assert_eq!(list[1], 54);
        assert_eq!(list.iter().filter(|&&c| c == 53).count(), 1);
        assert!(list.contains(&1));
        assert!(list.contains(&6));
    }

    #[test]
    fn priority_list_falls_back_to_default() {
        let list = priority_list(None);
        assert_eq!(&list[..2], &[53, 54]);
        assert!(list.contains(&1));
    }

    #[test]
    fn merge_repeated_concatenates_adjacent_same_code() {
        let opts = vec![
            (12, vec![1, 2]),
            (12, vec![3, 4]),
            (15, vec![9]),
            (12, vec![5]),
        ];
        let merged = merge_repeated(opts);
        assert_eq!(merged, vec![(12, vec![1, 2, 3, 4]), (15, vec![9]), (12, vec![5])]);
    }
}
