//! Loads `config/LLM_PROFILES.json`: named backend configurations the
//! committee orchestrator and meeting runner pick from by profile id
//! (e.g. `"architect"`, `"skeptic"`, `"qa-strategist"`). Mirrors the shape
//! of the teacher's `LlmConfig`/`ClaudeConfig`/`AnthropicConfig` trio, pared
//! down to the two backends `lanea-llm` actually ships.

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use lanea_utils::error::{InvalidInputError, MissingInputError, Result};
use lanea_utils::paths::llm_profiles_path;

/// Which `lanea-llm` transport a profile resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    ClaudeCli,
    Anthropic,
}

/// One named LLM profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmProfile {
    pub backend: BackendKind,
    /// For `claude_cli`: the binary name/path. Ignored for `anthropic`.
    #[serde(default)]
    pub binary: Option<String>,
    /// For `anthropic`: the model id. For `claude_cli`, an optional hint
    /// passed through as an extra CLI argument.
    #[serde(default)]
    pub model: Option<String>,
    /// For `anthropic`: the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Per-invocation timeout override, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// `profile_id -> LlmProfile`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmProfiles {
    #[serde(flatten)]
    pub profiles: BTreeMap<String, LlmProfile>,
}

impl LlmProfiles {
    #[must_use]
    pub fn get(&self, profile_id: &str) -> Option<&LlmProfile> {
        self.profiles.get(profile_id)
    }
}

/// Read `config/LLM_PROFILES.json`. An unreadable file is §7 Input-missing;
/// a present file that's malformed or names an incomplete profile is §7
/// Input-invalid — callers that need a specific profile should fail loudly
/// rather than silently falling back to a guessed default backend.
pub fn load_llm_profiles() -> Result<LlmProfiles> {
    load_llm_profiles_from(&llm_profiles_path())
}

pub fn load_llm_profiles_from(path: &Utf8Path) -> Result<LlmProfiles> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| MissingInputError::new("llm_profiles", path.to_string(), format!("create it: {e}")))?;
    let profiles: LlmProfiles = serde_json::from_str(&raw)
        .map_err(|e| InvalidInputError::new("llm_profiles", path.to_string(), e.to_string()))?;

    for (id, profile) in &profiles.profiles {
        match profile.backend {
            BackendKind::ClaudeCli if profile.binary.is_none() => {
                return Err(InvalidInputError::new(
                    "llm_profiles",
                    path.to_string(),
                    format!("profile {id} uses claude_cli but has no binary set"),
                )
                .into());
            }
            BackendKind::Anthropic if profile.model.is_none() => {
                return Err(InvalidInputError::new(
                    "llm_profiles",
                    path.to_string(),
                    format!("profile {id} uses anthropic but has no model set"),
                )
                .into());
            }
            _ => {}
        }
    }

    Ok(profiles)
}
