//! Static registries this core reads rather than derives: the Repository
//! Registry (`config/REPOS.json`) and the named LLM profiles
//! (`config/LLM_PROFILES.json`). The project-paths resolver itself
//! (`ops_root`/`knowledge_root`) lives in `lanea_utils::paths` since every
//! crate in the workspace needs it, not just config loading.

pub mod llm_profiles;
pub mod registry;

pub use llm_profiles::{load_llm_profiles, load_llm_profiles_from, BackendKind, LlmProfile, LlmProfiles};
pub use registry::{load_repository_registry, load_repository_registry_from};
