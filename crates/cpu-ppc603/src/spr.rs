//! Special-purpose register name ↔ number mapping.
//!
//! Numbers below follow the architectural SPR assignments used by the
//! 603/750: `xer`, `lr`, `ctr` are common to every PowerPC implementation;
//! the BAT pairs and `sprg0..3` are 6xx-family additions.

const NAMED_SPRS: &[(u16, &str)] = &[
    (1, "xer"),
    (8, "lr"),
    (9, "ctr"),
    (18, "dsisr"),
    (19, "dar"),
    (22, "dec"),
    (25, "sdr1"),
    (26, "srr0"),
    (27, "srr1"),
    (272, "sprg0"),
    (273, "sprg1"),
    (274, "sprg2"),
    (275, "sprg3"),
    (282, "ear"),
    (287, "pvr"),
    (528, "ibat0u"),
    (529, "ibat0l"),
    (530, "ibat1u"),
    (531, "ibat1l"),
    (532, "ibat2u"),
    (533, "ibat2l"),
    (534, "ibat3u"),
    (535, "ibat3l"),
    (536, "dbat0u"),
    (537, "dbat0l"),
    (538, "dbat1u"),
    (539, "dbat1l"),
    (540, "dbat2u"),
    (541, "dbat2l"),
    (542, "dbat3u"),
    (543, "dbat3l"),
    (1013, "dabr"),
];

/// Render a numeric SPR as its recognised name, or `sprNNN` when unnamed.
pub fn name_for_spr(spr: u16) -> String {
    for &(n, name) in NAMED_SPRS {
        if n == spr {
            return name.to_string();
        }
    }
    format!("spr{spr}")
}

/// Resolve an `mfXXX`/`mtXXX` mnemonic suffix (e.g. `"lr"`, `"ibat2l"`) to its
/// SPR number, including the generic `sprNNN` fallback.
pub fn spr_for_name(name: &str) -> Option<u16> {
    for &(n, candidate) in NAMED_SPRS {
        if candidate == name {
            return Some(n);
        }
    }
    name.strip_prefix("spr").and_then(|rest| rest.parse().ok())
}

/// TBR numbers for `mftb`/`mftbu`: not part of the general SPR space.
pub fn name_for_tbr(tbr: u16) -> &'static str {
    match tbr {
        268 => "tbl",
        269 => "tbu",
        _ => "tbr",
    }
}

pub fn tbr_for_name(name: &str) -> Option<u16> {
    match name {
        "tbl" | "mftb" => Some(268),
        "tbu" | "mftbu" => Some(269),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_known_sprs() {
        assert_eq!(name_for_spr(8), "lr");
        assert_eq!(name_for_spr(528), "ibat0u");
    }

    #[test]
    fn falls_back_to_numeric_name() {
        assert_eq!(name_for_spr(999), "spr999");
    }

    #[test]
    fn resolves_name_back_to_number() {
        assert_eq!(spr_for_name("ctr"), Some(9));
        assert_eq!(spr_for_name("spr999"), Some(999));
        assert_eq!(spr_for_name("not-a-spr"), None);
    }
}
