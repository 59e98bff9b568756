use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authenticated session context, as produced by the token layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    pub user_id: Option<String>,
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl Auth {
    pub fn nobody() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            claims: Map::new(),
        }
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.claims.insert(key.into(), value);
        self
    }

    pub fn claim(&self, key: &str) -> Value {
        match key {
            "user_id" => self
                .user_id
                .as_ref()
                .map(|id| Value::String(id.clone()))
                .unwrap_or(Value::Null),
            _ => self.claims.get(key).cloned().unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nobody_has_no_user_id() {
        assert_eq!(Auth::nobody().user_id, None);
        assert_eq!(Auth::nobody().claim("user_id"), Value::Null);
    }

    #[test]
    fn user_id_claim_reflects_user() {
        let auth = Auth::user("alice");

        assert_eq!(auth.claim("user_id"), json!("alice"));
    }

    #[test]
    fn custom_claims_resolve_by_key() {
        let auth = Auth::user("alice").with_claim("org", json!("acme"));

        assert_eq!(auth.claim("org"), json!("acme"));
        assert_eq!(auth.claim("missing"), Value::Null);
    }
}
