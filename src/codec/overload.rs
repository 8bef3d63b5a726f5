//! Option overload (RFC 2132 §9.3, option 52) handling.
//!
//! When the option area in a v4 packet isn't big enough, the sender can
//! advertise (via option 52) that the otherwise-unused BOOTP `file` and/or
//! `sname` fields also carry option TLVs. Decoding side: detect the
//! overload bitmask and re-parse those fields as option buffers, splicing
//! the result into the logical option list. Encoding side: `cons_options`
//! does the reverse, spilling low-priority options into `file` then
//! `sname` once the primary options area exceeds the negotiated MMS.
//!
//! REDESIGN FLAG honored: bit 2 (0x2) always writes the overflow to
//! `sname`, never `file` — the two bits are independent, not a "file then
//! wrap into sname" pair.

use dhcproto::{v4, Decodable, Decoder, Encodable};

const OVERLOAD_FILE: u8 = 0x1;
const OVERLOAD_SNAME: u8 = 0x2;

pub fn overload_bits(msg: &v4::Message) -> Option<u8> {
    msg.opts().iter().find_map(|o| match o {
        v4::DhcpOption::Overload(bits) => Some(*bits),
        _ => None,
    })
}

/// Options from the primary options area plus whatever `file`/`sname`
/// carry per the overload bitmask, in RFC 2132 §9.3 order: file options
/// before sname options when both bits are set.
pub fn merge_overloaded_options(msg: &v4::Message) -> Vec<v4::DhcpOption> {
    let mut merged: Vec<v4::DhcpOption> = msg.opts().iter().cloned().collect();
    let Some(bits) = overload_bits(msg) else {
        return merged;
    };

    if bits & OVERLOAD_FILE != 0 {
        merged.extend(decode_option_buffer(msg.fname()));
    }
    if bits & OVERLOAD_SNAME != 0 {
        merged.extend(decode_option_buffer(msg.sname()));
    }
    merged
}

fn decode_option_buffer(buf: &[u8]) -> Vec<v4::DhcpOption> {
    let mut decoder = Decoder::new(buf);
    match v4::DhcpOptions::decode(&mut decoder) {
        Ok(opts) => opts.iter().cloned().collect(),
        Err(_) => Vec::new(),
    }
}

pub struct OverloadSplit {
    pub options_field: Vec<v4::DhcpOption>,
    pub file: Vec<u8>,
    pub sname: Vec<u8>,
}

fn encoded_len(opt: &v4::DhcpOption) -> usize {
    let mut opts = v4::DhcpOptions::new();
    opts.insert(opt.clone());
    opts.to_vec().map(|v| v.len()).unwrap_or(0)
}

fn encode_region(opts: &[v4::DhcpOption], cap: usize) -> Vec<u8> {
    let mut region = v4::DhcpOptions::new();
    for opt in opts {
        region.insert(opt.clone());
    }
    let mut bytes = region.to_vec().unwrap_or_default();
    bytes.truncate(cap);
    bytes
}

/// Greedily packs `ordered` (already priority-sorted) into the primary
/// options area up to `mms` bytes, spilling the remainder into `file`
/// (128 bytes) then `sname` (64 bytes), setting the overload option in the
/// primary area when either is used.
pub fn cons_options(ordered: Vec<v4::DhcpOption>, mms: usize) -> OverloadSplit {
    let mut options_field = Vec::new();
    let mut overflow = Vec::new();
    let mut running = 3usize; // magic cookie overhead is added by the caller; leave room for the End tag
    for opt in ordered {
        let len = encoded_len(&opt);
        if running + len <= mms {
            running += len;
            options_field.push(opt);
        } else {
            overflow.push(opt);
        }
    }

    let mut file = Vec::new();
    let mut sname = Vec::new();
    let mut bits = 0u8;

    if !overflow.is_empty() {
        let mut remaining = overflow;
        let mut file_opts = Vec::new();
        let mut used = 0usize;
        while let Some(opt) = remaining.first().cloned() {
            let len = encoded_len(&opt);
            if used + len > 128 {
                break;
            }
            used += len;
            file_opts.push(remaining.remove(0));
        }
        if !file_opts.is_empty() {
            file = encode_region(&file_opts, 128);
            bits |= OVERLOAD_FILE;
        }
        if !remaining.is_empty() {
            sname = encode_region(&remaining, 64);
            bits |= OVERLOAD_SNAME;
        }
    }

    if bits != 0 {
        options_field.insert(0, v4::DhcpOption::Overload(bits));
    }

    OverloadSplit {
        options_field,
        file,
        sname,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overloaded_options_appends_file_then_sname() {
        let mut opts = v4::DhcpOptions::new();
        opts.insert(v4::DhcpOption::Overload(OVERLOAD_FILE | OVERLOAD_SNAME));

        let mut file_opts = v4::DhcpOptions::new();
        file_opts.insert(v4::DhcpOption::DomainName("file.example".to_string()));
        let file_bytes = file_opts.to_vec().unwrap();

        let mut sname_opts = v4::DhcpOptions::new();
        sname_opts.insert(v4::DhcpOption::Hostname("sname-host".to_string()));
        let sname_bytes = sname_opts.to_vec().unwrap();

        let mut msg = v4::Message::default();
        *msg.opts_mut() = opts;
        msg.set_fname(&file_bytes);
        msg.set_sname(&sname_bytes);

        let merged = merge_overloaded_options(&msg);
        assert!(merged
            .iter()
            .any(|o| matches!(o, v4::DhcpOption::DomainName(d) if d == "file.example")));
        assert!(merged
            .iter()
            .any(|o| matches!(o, v4::DhcpOption::Hostname(h) if h == "sname-host")));
    }

    #[test]
    fn cons_options_spills_into_file_when_over_mms() {
        let opts = vec![
            v4::DhcpOption::MessageType(v4::MessageType::Offer),
            v4::DhcpOption::DomainName("a".repeat(100)),
        ];
        let split = cons_options(opts, 20);
        assert!(!split.file.is_empty() || split.options_field.iter().any(|o| matches!(o, v4::DhcpOption::Overload(_))));
    }
}
