//! Enumeration of the logical locations where a `SecretRef` may appear.

use serde_json::Value;

use crate::pointer;

/// A recognized location in the gateway config document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSite {
    ProviderApiKey { provider_id: String },
    SkillApiKey { skill_key: String },
    GoogleChatServiceAccount,
    GoogleChatAccountServiceAccount { account_id: String },
}

impl FieldSite {
    /// Pointer to this site's value within the gateway config document.
    pub fn config_pointer(&self) -> String {
        match self {
            FieldSite::ProviderApiKey { provider_id } => {
                pointer::join(&["models", "providers", provider_id, "apiKey"])
            }
            FieldSite::SkillApiKey { skill_key } => {
                pointer::join(&["skills", "entries", skill_key, "apiKey"])
            }
            FieldSite::GoogleChatServiceAccount => {
                pointer::join(&["channels", "googlechat", "serviceAccount"])
            }
            FieldSite::GoogleChatAccountServiceAccount { account_id } => pointer::join(&[
                "channels",
                "googlechat",
                "accounts",
                account_id,
                "serviceAccount",
            ]),
        }
    }

    /// Pointer to the `<field>Ref` sibling, when the site keeps plaintext and
    /// ref in distinct fields (Google Chat service accounts do; providers and
    /// skills reuse the same field for both and have no distinct ref pointer).
    pub fn ref_pointer(&self) -> Option<String> {
        match self {
            FieldSite::ProviderApiKey { .. } | FieldSite::SkillApiKey { .. } => None,
            FieldSite::GoogleChatServiceAccount => Some(pointer::join(&[
                "channels",
                "googlechat",
                "serviceAccountRef",
            ])),
            FieldSite::GoogleChatAccountServiceAccount { account_id } => Some(pointer::join(&[
                "channels",
                "googlechat",
                "accounts",
                account_id,
                "serviceAccountRef",
            ])),
        }
    }

    /// Pointer this site's plaintext value migrates to under the encrypted
    /// payload. Mirrors `config_pointer` except the `providers` site drops
    /// its `models` prefix.
    pub fn payload_pointer(&self) -> String {
        match self {
            FieldSite::ProviderApiKey { provider_id } => {
                pointer::join(&["providers", provider_id, "apiKey"])
            }
            other => other.config_pointer(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            FieldSite::ProviderApiKey { provider_id } => {
                format!("models.providers.{provider_id}.apiKey")
            }
            FieldSite::SkillApiKey { skill_key } => format!("skills.entries.{skill_key}.apiKey"),
            FieldSite::GoogleChatServiceAccount => "channels.googlechat.serviceAccount".to_string(),
            FieldSite::GoogleChatAccountServiceAccount { account_id } => {
                format!("channels.googlechat.accounts.{account_id}.serviceAccount")
            }
        }
    }

    /// Walks `config` and returns every site class instance present,
    /// regardless of whether the site currently holds a ref or plaintext.
    pub fn discover(config: &Value) -> Vec<FieldSite> {
        let mut sites = Vec::new();

        if let Some(providers) = config.pointer("/models/providers").and_then(Value::as_object) {
            let mut ids: Vec<&String> = providers.keys().collect();
            ids.sort();
            sites.extend(ids.into_iter().map(|id| FieldSite::ProviderApiKey {
                provider_id: id.clone(),
            }));
        }

        if let Some(entries) = config.pointer("/skills/entries").and_then(Value::as_object) {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            sites.extend(keys.into_iter().map(|key| FieldSite::SkillApiKey {
                skill_key: key.clone(),
            }));
        }

        if config.pointer("/channels/googlechat").is_some() {
            sites.push(FieldSite::GoogleChatServiceAccount);
        }

        if let Some(accounts) = config
            .pointer("/channels/googlechat/accounts")
            .and_then(Value::as_object)
        {
            let mut ids: Vec<&String> = accounts.keys().collect();
            ids.sort();
            sites.extend(ids.into_iter().map(|id| FieldSite::GoogleChatAccountServiceAccount {
                account_id: id.clone(),
            }));
        }

        sites
    }
}

/// The kind of an auth-profile secret field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProfileKind {
    ApiKey,
    Token,
}

/// A per-agent auth-profile store location (`profiles.<profileId>.keyRef`
/// for `type = "api_key"`, `profiles.<profileId>.tokenRef` for
/// `type = "token"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProfileSite {
    pub profile_id: String,
    pub kind: AuthProfileKind,
}

impl AuthProfileSite {
    fn field_name(&self) -> &'static str {
        match self.kind {
            AuthProfileKind::ApiKey => "key",
            AuthProfileKind::Token => "token",
        }
    }

    /// Pointer to the plaintext field within the auth store document.
    pub fn plaintext_pointer(&self) -> String {
        pointer::join(&["profiles", &self.profile_id, self.field_name()])
    }

    /// Pointer to the ref field within the auth store document.
    pub fn ref_pointer(&self) -> String {
        pointer::join(&["profiles", &self.profile_id, &format!("{}Ref", self.field_name())])
    }

    /// Pointer this profile's secret migrates to under the encrypted
    /// payload, namespaced by the store's discovery `scope`.
    pub fn payload_pointer(&self, scope: &str) -> String {
        pointer::join(&["auth-profiles", scope, &self.profile_id, self.field_name()])
    }

    /// Walks an auth-store document's `profiles` map and returns every
    /// recognized secret site (api_key profiles yield a key site, token
    /// profiles yield a token site; any other `type` is skipped).
    pub fn discover(store: &Value) -> Vec<AuthProfileSite> {
        let Some(profiles) = store.pointer("/profiles").and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut ids: Vec<&String> = profiles.keys().collect();
        ids.sort();

        ids.into_iter()
            .filter_map(|id| {
                let profile = profiles.get(id)?;
                let kind = match profile.get("type").and_then(Value::as_str) {
                    Some("api_key") => AuthProfileKind::ApiKey,
                    Some("token") => AuthProfileKind::Token,
                    _ => return None,
                };
                Some(AuthProfileSite { profile_id: id.clone(), kind })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_payload_pointer_drops_models_prefix() {
        let site = FieldSite::ProviderApiKey { provider_id: "openai".to_string() };
        assert_eq!(site.config_pointer(), "/models/providers/openai/apiKey");
        assert_eq!(site.payload_pointer(), "/providers/openai/apiKey");
    }

    #[test]
    fn googlechat_account_pointers() {
        let site = FieldSite::GoogleChatAccountServiceAccount { account_id: "acct1".to_string() };
        assert_eq!(
            site.config_pointer(),
            "/channels/googlechat/accounts/acct1/serviceAccount"
        );
        assert_eq!(
            site.ref_pointer().unwrap(),
            "/channels/googlechat/accounts/acct1/serviceAccountRef"
        );
    }

    #[test]
    fn discovers_all_site_classes() {
        let config = json!({
            "models": {"providers": {"openai": {"apiKey": "x"}, "anthropic": {"apiKey": "y"}}},
            "skills": {"entries": {"review-pr": {"apiKey": "z"}}},
            "channels": {"googlechat": {"serviceAccount": {}, "accounts": {"a1": {"serviceAccount": {}}}}},
        });
        let sites = FieldSite::discover(&config);
        assert_eq!(sites.len(), 5);
        assert!(sites.contains(&FieldSite::ProviderApiKey { provider_id: "openai".to_string() }));
        assert!(sites.contains(&FieldSite::GoogleChatServiceAccount));
    }

    #[test]
    fn discovers_auth_profile_sites_by_type() {
        let store = json!({
            "profiles": {
                "p1": {"type": "api_key", "keyRef": {"source": "env", "id": "X"}},
                "p2": {"type": "token", "token": "plain"},
                "p3": {"type": "oauth"},
            }
        });
        let sites = AuthProfileSite::discover(&store);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].profile_id, "p1");
        assert_eq!(sites[0].kind, AuthProfileKind::ApiKey);
        assert_eq!(sites[1].kind, AuthProfileKind::Token);
    }

    #[test]
    fn auth_profile_payload_pointer_includes_scope() {
        let site = AuthProfileSite { profile_id: "p1".to_string(), kind: AuthProfileKind::ApiKey };
        assert_eq!(site.payload_pointer("agent-a"), "/auth-profiles/agent-a/p1/key");
    }
}
