use std::{collections::HashMap, sync::Arc};

use super::{
    ArchitectureFamily, DenseDecoderFamily, FallbackFamily, GatedDecoderFamily,
    QuadraticAttentionFamily,
};

pub const GATED_DECODER_ARCHITECTURES: &[&str] = &[
    "LlamaForCausalLM",
    "MistralForCausalLM",
    "Qwen2ForCausalLM",
    "Qwen3ForCausalLM",
    "GemmaForCausalLM",
    "Gemma2ForCausalLM",
    "Phi3ForCausalLM",
    "GraniteForCausalLM",
    "Olmo2ForCausalLM",
];

pub const DENSE_DECODER_ARCHITECTURES: &[&str] = &[
    "GPTNeoXForCausalLM",
    "GPTJForCausalLM",
    "GPT2LMHeadModel",
    "PhiForCausalLM",
    "StableLmForCausalLM",
    "Starcoder2ForCausalLM",
];

pub const QUADRATIC_ATTENTION_ARCHITECTURES: &[&str] =
    &["BloomForCausalLM", "MptForCausalLM", "MPTForCausalLM"];

/// Architecture identifier → family.
///
/// Populated once, then shared read-only (usually behind an `Arc`) by every
/// estimator. Lookups are exact string matches; anything else resolves to
/// the fallback, which always exists.
#[derive(Debug, Clone)]
pub struct FamilyRegistry {
    families: HashMap<String, Arc<dyn ArchitectureFamily>>,
    fallback: Arc<dyn ArchitectureFamily>,
}

/// Result of a registry lookup.
#[derive(Debug, Clone)]
pub struct ResolvedFamily {
    pub family: Arc<dyn ArchitectureFamily>,
    /// `false` when the fallback was returned.
    pub exact: bool,
}

impl Default for FamilyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FamilyRegistry {
    /// Only the fallback. Starting point for registries built in tests.
    pub fn empty() -> Self {
        Self {
            families: HashMap::new(),
            fallback: Arc::new(FallbackFamily),
        }
    }

    pub fn builtin() -> Self {
        let gated: Arc<dyn ArchitectureFamily> = Arc::new(GatedDecoderFamily);
        let dense: Arc<dyn ArchitectureFamily> = Arc::new(DenseDecoderFamily);
        let quadratic: Arc<dyn ArchitectureFamily> = Arc::new(QuadraticAttentionFamily);

        let mut registry = Self::empty();
        for (architectures, family) in [
            (GATED_DECODER_ARCHITECTURES, &gated),
            (DENSE_DECODER_ARCHITECTURES, &dense),
            (QUADRATIC_ATTENTION_ARCHITECTURES, &quadratic),
        ] {
            for architecture in architectures {
                registry
                    .families
                    .insert(architecture.to_string(), Arc::clone(family));
            }
        }
        registry
    }

    /// Adds or replaces the family for `architecture`.
    #[must_use]
    pub fn register(
        mut self,
        architecture: impl Into<String>,
        family: Arc<dyn ArchitectureFamily>,
    ) -> Self {
        self.families.insert(architecture.into(), family);
        self
    }

    /// Replaces the fallback family.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn ArchitectureFamily>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn resolve(&self, architecture: &str) -> ResolvedFamily {
        match self.families.get(architecture) {
            Some(family) => {
                crate::trace!("architecture {architecture} resolved to {}", family.name());
                ResolvedFamily {
                    family: Arc::clone(family),
                    exact: true,
                }
            }
            None => {
                crate::warn!(
                    "no family registered for architecture {architecture}; using {}",
                    self.fallback.name()
                );
                ResolvedFamily {
                    family: Arc::clone(&self.fallback),
                    exact: false,
                }
            }
        }
    }

    pub fn contains(&self, architecture: &str) -> bool {
        self.families.contains_key(architecture)
    }

    /// Registered identifiers, sorted.
    pub fn architectures(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.families.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_resolves_known_architectures() {
        let registry = FamilyRegistry::builtin();
        let llama = registry.resolve("LlamaForCausalLM");
        assert!(llama.exact);
        assert_eq!(llama.family.name(), "gated-decoder");
        assert_eq!(registry.resolve("GPT2LMHeadModel").family.name(), "dense-decoder");
        assert_eq!(registry.resolve("BloomForCausalLM").family.name(), "quadratic-attention");
        assert_eq!(registry.architectures().len(), 18);
        assert_eq!(registry.resolve("MPTForCausalLM").family.name(), "quadratic-attention");
    }

    #[test]
    fn unknown_and_near_miss_identifiers_fall_back() {
        let registry = FamilyRegistry::builtin();
        for id in ["MambaForCausalLM", "llamaforcausallm", ""] {
            let resolved = registry.resolve(id);
            assert!(!resolved.exact, "{id}");
            assert!(resolved.family.is_fallback());
        }
    }

    #[test]
    fn registering_a_new_architecture() {
        let registry =
            FamilyRegistry::empty().register("MyDecoderForCausalLM", Arc::new(GatedDecoderFamily));
        assert!(registry.resolve("MyDecoderForCausalLM").exact);
        assert!(!registry.resolve("LlamaForCausalLM").exact);
        assert!(registry.contains("MyDecoderForCausalLM"));
    }
}
