//! Mapping opaque feature flags of a run back to the names used in reports.
//!
//! A run is identified by three labels: the system variant (which set of
//! storage features was compiled in), the workload and the concurrency control
//! scheme. Only the workload may depend on the captured text, since the skew
//! parameter is reported at runtime instead of being encoded in a flag.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// label for anything that could not be resolved
pub const UNKNOWN: &str = "Unknown";

/// name of the baseline system variant
pub const BASELINE: &str = "Falcon";
/// label replacing the baseline when it runs against the in-memory index
pub const BASELINE_DRAM: &str = "Falcon(DRAM Index)";

const TPCC: &str = "tpcc";
const TPCC_LABEL: &str = "TPC-C-NP";
const TPCC_CLOCKS: [(&str, &str); 2] = [("new_order_clock", "new_order"), ("payment_clock", "payment")];
const YCSB_WORKLOADS: [&str; 6] = ["ycsb_a", "ycsb_b", "ycsb_c", "ycsb_d", "ycsb_e", "ycsb_f"];

const MULTI_VERSION: &str = "mvcc";
/// base schemes in the order they are checked
const SCHEMES: [(&str, &str); 3] = [
    ("local_cc_cfg_2pl", "2PL"),
    ("local_cc_cfg_to", "TO"),
    ("local_cc_cfg_occ", "OCC"),
];

static THETA_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"theta = (\d+\.?\d*)").expect("theta pattern is valid"));

/// storage backend the engine's index lives on during a batch
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// persistent memory index
    #[default]
    Nvm,
    /// volatile, in-memory index
    Dram,
}

/// unordered set of feature flags of one configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features<'a>(BTreeSet<&'a str>);

impl<'a> Features<'a> {
    pub fn new<I: IntoIterator<Item = &'a str>>(flags: I) -> Self {
        Self(flags.into_iter().filter(|flag| !flag.is_empty()).collect())
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.contains(flag)
    }

    /// true if every token is one of the flags
    pub fn contains_all<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        tokens.iter().all(|token| self.contains(token.as_ref()))
    }
}

impl<'a> FromIterator<&'a str> for Features<'a> {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CatalogEntry {
    pub name: String,
    /// flags that all have to be present for this name to apply
    pub tokens: Vec<String>,
}

impl CatalogEntry {
    pub fn new(name: &str, tokens: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            tokens: tokens.iter().map(|token| token.to_string()).collect(),
        }
    }
}

/// Ordered table of system variants.
///
/// Resolution picks the entry with the most required tokens among all entries
/// contained in the flags. Entries with the same number of tokens are decided
/// by position, the earlier entry wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// the system variants of the engine
    pub fn builtin() -> Self {
        Self::new(vec![
            CatalogEntry::new(BASELINE, &["n2db_local", "ilog", "clwb_tuple", "hot_unflush"]),
            CatalogEntry::new("Falcon(All Flush)", &["n2db_local", "ilog", "clwb_tuple"]),
            CatalogEntry::new("Falcon(No Flush)", &["n2db_local", "ilog"]),
            CatalogEntry::new("Inp", &["n2db_local", "clwb_delta", "clwb_tuple"]),
            CatalogEntry::new("Outp", &["n2db_append", "clwb_tuple"]),
            CatalogEntry::new("ZenS", &["zen_local", "clwb_tuple"]),
            CatalogEntry::new("ZenS(No Flush)", &["zen_local"]),
            // same tokens as Falcon(All Flush), only reachable by explicit reference
            CatalogEntry::new("Inp(Small Log Window)", &["n2db_local", "clwb_tuple", "ilog"]),
            CatalogEntry::new("Inp(No Flush)", &["n2db_local"]),
            CatalogEntry::new(
                "Inp(Hot Tuple Cache)",
                &["n2db_local", "clwb_delta", "clwb_tuple", "hot_unflush"],
            ),
        ])
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// most specific catalog entry contained in `features`
    pub fn best_match(&self, features: &Features) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|entry| features.contains_all(&entry.tokens))
            .fold(None, |best: Option<&CatalogEntry>, entry| match best {
                Some(best) if best.tokens.len() >= entry.tokens.len() => Some(best),
                _ => Some(entry),
            })
    }

    /// resolve the system variant name, the index mode only affects the baseline
    pub fn resolve_system(&self, features: &Features, mode: IndexMode) -> &str {
        match self.best_match(features) {
            Some(entry) if entry.name == BASELINE && mode == IndexMode::Dram => BASELINE_DRAM,
            Some(entry) => &entry.name,
            None => UNKNOWN,
        }
    }
}

/// first skew parameter reported in any of `texts`, searched in order
pub fn skew<'t>(texts: &[&'t str]) -> Option<&'t str> {
    texts.iter().find_map(|text| {
        THETA_PATTERN
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|theta| theta.as_str())
    })
}

/// Resolve the workload name.
///
/// TPC-C runs are named by their clocked transaction, YCSB runs by their
/// workload letter followed by the skew parameter found in `texts`.
pub fn resolve_workload(features: &Features, texts: &[&str]) -> String {
    if features.contains(TPCC) {
        return match TPCC_CLOCKS
            .iter()
            .find(|(clock, _)| features.contains(clock))
        {
            Some((_, transaction)) => format!("{TPCC_LABEL} {transaction}"),
            None => TPCC_LABEL.to_string(),
        };
    }

    match YCSB_WORKLOADS
        .iter()
        .find(|workload| features.contains(workload))
    {
        Some(workload) => match skew(texts) {
            Some(theta) => format!("{workload} zipf_theta = {theta}"),
            None => workload.to_string(),
        },
        None => UNKNOWN.to_string(),
    }
}

/// Resolve the concurrency control label, e.g. `OCC` or `MV2PL`.
///
/// Only one base scheme flag is expected. If several are present the first one
/// in the order 2PL, TO, OCC is used and the conflict is logged.
pub fn resolve_cc(features: &Features) -> String {
    let mut present = SCHEMES
        .iter()
        .filter(|(flag, _)| features.contains(flag))
        .map(|(_, label)| *label);

    let Some(label) = present.next() else {
        return UNKNOWN.to_string();
    };

    let ignored: Vec<&str> = present.collect();
    if !ignored.is_empty() {
        warn!(
            chosen = label,
            ignored = ?ignored,
            "Configuration contains more than one concurrency control scheme"
        );
    }

    if features.contains(MULTI_VERSION) {
        format!("MV{label}")
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features<'a>(flags: &[&'a str]) -> Features<'a> {
        Features::new(flags.iter().copied())
    }

    #[test]
    fn baseline_depends_on_index_mode() {
        let catalog = Catalog::builtin();
        let flags = features(&["n2db_local", "ilog", "clwb_tuple", "hot_unflush"]);

        assert_eq!(catalog.resolve_system(&flags, IndexMode::Dram), "Falcon(DRAM Index)");
        assert_eq!(catalog.resolve_system(&flags, IndexMode::Nvm), "Falcon");
    }

    #[test]
    fn override_only_touches_baseline() {
        let catalog = Catalog::builtin();
        let flags = features(&["basic_dram", "zen_local", "clwb_tuple"]);

        assert_eq!(catalog.resolve_system(&flags, IndexMode::Dram), "ZenS");
    }

    #[test]
    fn most_specific_entry_wins() {
        let catalog = Catalog::builtin();
        let flags = features(&[
            "basic",
            "ycsb_a",
            "n2db_local",
            "clwb_delta",
            "clwb_tuple",
            "hot_unflush",
            "txn_clock",
        ]);
        let name = catalog.resolve_system(&flags, IndexMode::Nvm);

        assert_eq!(name, "Inp(Hot Tuple Cache)");
        assert!(flags.contains_all(&catalog.get(name).unwrap().tokens));
        // repeated resolution is stable
        assert_eq!(catalog.resolve_system(&flags, IndexMode::Nvm), name);
    }

    #[test]
    fn equal_specificity_prefers_earlier_entry() {
        let catalog = Catalog::builtin();
        let flags = features(&["n2db_local", "clwb_tuple", "ilog"]);

        assert_eq!(catalog.resolve_system(&flags, IndexMode::Nvm), "Falcon(All Flush)");

        let reversed = Catalog::new(vec![
            CatalogEntry::new("second", &["b", "a"]),
            CatalogEntry::new("first", &["a", "b"]),
        ]);
        assert_eq!(
            reversed.resolve_system(&features(&["a", "b"]), IndexMode::Nvm),
            "second"
        );
    }

    #[test]
    fn nothing_matches() {
        let catalog = Catalog::builtin();

        assert_eq!(catalog.resolve_system(&features(&["basic"]), IndexMode::Nvm), UNKNOWN);
        assert_eq!(catalog.resolve_system(&features(&[]), IndexMode::Dram), UNKNOWN);
    }

    #[test]
    fn ycsb_workload_carries_skew() {
        let flags = features(&["basic", "ycsb_a"]);

        assert_eq!(
            resolve_workload(&flags, &["theta = 0.99"]),
            "ycsb_a zipf_theta = 0.99"
        );
        assert_eq!(
            resolve_workload(&flags, &["no skew here", "zipf theta = 0"]),
            "ycsb_a zipf_theta = 0"
        );
        assert_eq!(resolve_workload(&flags, &["no skew here"]), "ycsb_a");
    }

    #[test]
    fn tpcc_workload_names_transaction() {
        assert_eq!(
            resolve_workload(&features(&["tpcc", "ycsb_a", "txn_clock", "payment_clock"]), &[]),
            "TPC-C-NP payment"
        );
        assert_eq!(
            resolve_workload(&features(&["tpcc", "new_order_clock"]), &["theta = 0.5"]),
            "TPC-C-NP new_order"
        );
        assert_eq!(resolve_workload(&features(&["tpcc"]), &[]), "TPC-C-NP");
    }

    #[test]
    fn unknown_workload() {
        assert_eq!(resolve_workload(&features(&["basic"]), &["theta = 1"]), UNKNOWN);
    }

    #[test]
    fn concurrency_control_labels() {
        assert_eq!(resolve_cc(&features(&["local_cc_cfg_occ"])), "OCC");
        assert_eq!(resolve_cc(&features(&["mvcc", "local_cc_cfg_to"])), "MVTO");
        assert_eq!(resolve_cc(&features(&["mvcc"])), UNKNOWN);
        assert_eq!(resolve_cc(&features(&[])), UNKNOWN);
    }

    #[test]
    fn conflicting_schemes_follow_priority() {
        assert_eq!(
            resolve_cc(&features(&["local_cc_cfg_occ", "local_cc_cfg_2pl"])),
            "2PL"
        );
        assert_eq!(
            resolve_cc(&features(&["mvcc", "local_cc_cfg_occ", "local_cc_cfg_to"])),
            "MVTO"
        );
    }

    #[test]
    fn empty_flags_are_ignored() {
        assert_eq!(features(&["", "mvcc"]), features(&["mvcc"]));
    }
}
