//! Child process environment construction
//!
//! A subagent child never inherits the parent environment. Its environment is
//! assembled from a fixed allowlist of system variables plus exactly the
//! credential variables the chosen provider requires.

use pod_core::error::{PodError, Result};
use pod_core::llm::KeyResolver;

/// System variables forwarded to every child
pub const SYSTEM_ENV_ALLOWLIST: &[&str] = &[
    "PATH", "HOME", "TERM", "SHELL", "LANG", "LC_ALL", "USER", "LOGNAME",
];

/// Credential variables for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCredentials {
    /// Variable that must hold the API key
    pub primary: &'static str,
    /// Variables forwarded verbatim when set in the parent environment
    pub passthrough: &'static [&'static str],
}

/// Fixed table mapping a provider name to its credential variables
pub fn provider_credentials(provider: &str) -> Option<ProviderCredentials> {
    match provider.to_ascii_lowercase().as_str() {
        "anthropic" => Some(ProviderCredentials {
            primary: "ANTHROPIC_API_KEY",
            passthrough: &["ANTHROPIC_BASE_URL"],
        }),
        "openai" => Some(ProviderCredentials {
            primary: "OPENAI_API_KEY",
            passthrough: &["OPENAI_BASE_URL", "OPENAI_ORG_ID"],
        }),
        "google" => Some(ProviderCredentials {
            primary: "GEMINI_API_KEY",
            passthrough: &[],
        }),
        "openrouter" => Some(ProviderCredentials {
            primary: "OPENROUTER_API_KEY",
            passthrough: &[],
        }),
        "xai" => Some(ProviderCredentials {
            primary: "XAI_API_KEY",
            passthrough: &[],
        }),
        _ => None,
    }
}

/// Credential variables resolved for one child
#[derive(Debug, Clone, Default)]
pub struct ResolvedCredentials {
    vars: Vec<(String, String)>,
}

impl ResolvedCredentials {
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }
}

/// Resolve the credential variables for a provider
///
/// The primary key comes from the resolver when supplied, falling back to the
/// parent environment. Failure to produce the primary key is an error so that
/// callers can fail before any child is spawned. Unknown providers resolve to
/// no credential variables.
pub fn resolve_credentials(
    provider: &str,
    resolver: Option<&KeyResolver>,
) -> Result<ResolvedCredentials> {
    let Some(entry) = provider_credentials(provider) else {
        return Ok(ResolvedCredentials::default());
    };

    let primary = resolver
        .and_then(|r| r(provider))
        .or_else(|| std::env::var(entry.primary).ok())
        .ok_or_else(|| {
            PodError::Config(format!(
                "no credential available for provider '{}' ({} unset)",
                provider, entry.primary
            ))
        })?;

    let mut vars = vec![(entry.primary.to_string(), primary)];
    for name in entry.passthrough {
        if let Ok(value) = std::env::var(name) {
            vars.push((name.to_string(), value));
        }
    }
    Ok(ResolvedCredentials { vars })
}

/// Build the full child environment: allowlisted system variables present in
/// the parent plus the resolved credential variables
pub fn build_child_env(credentials: &ResolvedCredentials) -> Vec<(String, String)> {
    let mut env = Vec::new();
    for name in SYSTEM_ENV_ALLOWLIST {
        if let Ok(value) = std::env::var(name) {
            env.push((name.to_string(), value));
        }
    }
    env.extend(credentials.vars().iter().cloned());
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[test]
    fn known_providers_have_primary_vars() {
        assert_eq!(
            provider_credentials("anthropic").unwrap().primary,
            "ANTHROPIC_API_KEY"
        );
        assert_eq!(
            provider_credentials("OpenAI").unwrap().primary,
            "OPENAI_API_KEY"
        );
        assert!(provider_credentials("mystery").is_none());
    }

    #[test]
    fn resolver_takes_precedence() {
        let resolver: pod_core::llm::KeyResolver =
            Arc::new(|_provider| Some("sk-from-resolver".to_string()));
        let resolved = resolve_credentials("anthropic", Some(&resolver)).unwrap();
        assert_eq!(
            resolved.vars()[0],
            ("ANTHROPIC_API_KEY".to_string(), "sk-from-resolver".to_string())
        );
    }

    #[test]
    fn missing_credential_is_an_error() {
        let resolver: pod_core::llm::KeyResolver = Arc::new(|_provider| None);
        std::env::remove_var("XAI_API_KEY");
        assert!(resolve_credentials("xai", Some(&resolver)).is_err());
    }

    #[test]
    fn unknown_provider_resolves_empty() {
        let resolved = resolve_credentials("local", None).unwrap();
        assert!(resolved.vars().is_empty());
    }

    #[test]
    fn child_env_is_subset_of_allowlist_and_credentials() {
        let resolver: pod_core::llm::KeyResolver = Arc::new(|_| Some("sk-test".to_string()));
        let credentials = resolve_credentials("anthropic", Some(&resolver)).unwrap();
        let env = build_child_env(&credentials);

        let allowed: BTreeSet<&str> = SYSTEM_ENV_ALLOWLIST
            .iter()
            .copied()
            .chain(["ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL"])
            .collect();
        for (name, _) in &env {
            assert!(allowed.contains(name.as_str()), "unexpected var {}", name);
        }
    }
}
