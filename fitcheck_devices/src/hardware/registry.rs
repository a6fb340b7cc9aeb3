use std::borrow::Cow;

use super::{gib, HardwareError, HardwareSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct HardwareEntry {
    pub name: Cow<'static, str>,
    pub total_gib: f64,
    pub reserved_gib: f64,
    pub aliases: Cow<'static, [&'static str]>,
}

impl HardwareEntry {
    pub const fn builtin(
        name: &'static str,
        total_gib: f64,
        reserved_gib: f64,
        aliases: &'static [&'static str],
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            total_gib,
            reserved_gib,
            aliases: Cow::Borrowed(aliases),
        }
    }

    pub fn spec(&self) -> Result<HardwareSpec, HardwareError> {
        HardwareSpec::new(self.name.clone(), gib(self.total_gib), gib(self.reserved_gib))
    }

    fn matches(&self, key: &str) -> bool {
        normalize(&self.name) == key || self.aliases.iter().any(|a| normalize(a) == key)
    }
}

// Reserved overhead is 5% of physical memory for every builtin entry.
impl HardwareEntry {
    pub const RTX_3060: HardwareEntry =
        HardwareEntry::builtin("NVIDIA RTX 3060", 12.0, 0.6, &["3060", "rtx3060", "geforce rtx 3060"]);
    pub const RTX_3090: HardwareEntry =
        HardwareEntry::builtin("NVIDIA RTX 3090", 24.0, 1.2, &["3090", "rtx3090", "geforce rtx 3090"]);
    pub const RTX_4080: HardwareEntry =
        HardwareEntry::builtin("NVIDIA RTX 4080", 16.0, 0.8, &["4080", "rtx4080", "geforce rtx 4080"]);
    pub const RTX_4090: HardwareEntry =
        HardwareEntry::builtin("NVIDIA RTX 4090", 24.0, 1.2, &["4090", "rtx4090", "geforce rtx 4090"]);
    pub const RTX_5090: HardwareEntry =
        HardwareEntry::builtin("NVIDIA RTX 5090", 32.0, 1.6, &["5090", "rtx5090", "geforce rtx 5090"]);
    pub const T4: HardwareEntry = HardwareEntry::builtin("NVIDIA T4", 16.0, 0.8, &["t4", "tesla t4"]);
    pub const L4: HardwareEntry = HardwareEntry::builtin("NVIDIA L4", 24.0, 1.2, &["l4"]);
    pub const A10G: HardwareEntry = HardwareEntry::builtin("NVIDIA A10G", 24.0, 1.2, &["a10g", "a10"]);
    pub const L40S: HardwareEntry = HardwareEntry::builtin("NVIDIA L40S", 48.0, 2.4, &["l40s"]);
    pub const A100_40GB: HardwareEntry =
        HardwareEntry::builtin("NVIDIA A100 40GB", 40.0, 2.0, &["a100-40gb", "a100-40", "a100 40gb"]);
    pub const A100_80GB: HardwareEntry = HardwareEntry::builtin(
        "NVIDIA A100 80GB",
        80.0,
        4.0,
        &["a100", "a100-80gb", "a100-80", "a100 80gb"],
    );
    pub const H100: HardwareEntry =
        HardwareEntry::builtin("NVIDIA H100 80GB", 80.0, 4.0, &["h100", "h100-80gb", "h100 sxm"]);

    pub const ALL: [HardwareEntry; 12usize] = [
        Self::RTX_3060,
        Self::RTX_3090,
        Self::RTX_4080,
        Self::RTX_4090,
        Self::RTX_5090,
        Self::T4,
        Self::L4,
        Self::A10G,
        Self::L40S,
        Self::A100_40GB,
        Self::A100_80GB,
        Self::H100,
    ];
}

/// Name/alias → [`HardwareSpec`] table.
///
/// Built once and shared read-only. Tests build their own table with
/// [`HardwareRegistry::empty`] and [`HardwareRegistry::with_entry`].
#[derive(Debug, Clone, Default)]
pub struct HardwareRegistry {
    entries: Vec<HardwareEntry>,
}

impl HardwareRegistry {
    pub fn builtin() -> Self {
        Self {
            entries: HardwareEntry::ALL.to_vec(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, entry: HardwareEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.to_string()).collect()
    }

    /// Case, whitespace and punctuation are ignored: `"RTX-3090"`,
    /// `"rtx 3090"` and `"3090"` resolve to the same entry.
    pub fn lookup(&self, name_or_alias: &str) -> Result<HardwareSpec, HardwareError> {
        let key = normalize(name_or_alias);
        match self.entries.iter().find(|e| e.matches(&key)) {
            Some(entry) => {
                crate::trace!("hardware '{}' resolved to {}", name_or_alias, entry.name);
                entry.spec()
            }
            None => Err(HardwareError::NotFound {
                name: name_or_alias.to_string(),
                available: self.names(),
            }),
        }
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
