//! Option-space ("universe") descriptor table, modeling `common/tables.c`'s
//! `struct universe` registrations as a small static table instead of a
//! runtime-registered list — this crate's universe set is fixed at compile
//! time, unlike the original's loadable-option-space design.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeWidth {
    U8,
    U16,
    U32,
}

#[derive(Debug, Clone, Copy)]
pub struct Universe {
    pub name: &'static str,
    pub code_width: CodeWidth,
    pub length_width: CodeWidth,
}

pub const DHCP: Universe = Universe {
    name: "dhcp",
    code_width: CodeWidth::U8,
    length_width: CodeWidth::U8,
};

pub const AGENT: Universe = Universe {
    name: "agent",
    code_width: CodeWidth::U8,
    length_width: CodeWidth::U8,
};

/// Vendor-class / vendor-encapsulated-options space: enterprise-numbered
/// (u32) tag, single-byte length, per RFC 3925.
pub const VENDOR: Universe = Universe {
    name: "vendor",
    code_width: CodeWidth::U32,
    length_width: CodeWidth::U8,
};

pub const ISC: Universe = Universe {
    name: "isc",
    code_width: CodeWidth::U16,
    length_width: CodeWidth::U16,
};

pub const NWIP: Universe = Universe {
    name: "nwip",
    code_width: CodeWidth::U8,
    length_width: CodeWidth::U8,
};

pub const FQDN: Universe = Universe {
    name: "fqdn",
    code_width: CodeWidth::U8,
    length_width: CodeWidth::U8,
};

pub const ALL: &[Universe] = &[DHCP, AGENT, VENDOR, ISC, NWIP, FQDN];

pub fn lookup(name: &str) -> Option<Universe> {
    match name {
        "vendor-class" => Some(VENDOR),
        _ => ALL.iter().find(|u| u.name == name).copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_vendor_class_alias() {
        assert_eq!(lookup("vendor-class").unwrap().name, "vendor");
        assert_eq!(lookup("agent").unwrap().code_width, CodeWidth::U8);
        assert!(lookup("nonexistent").is_none());
    }
}
