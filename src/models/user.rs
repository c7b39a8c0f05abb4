use serde::{Deserialize, Serialize};

/// Subscription tier reported by the server
///
/// Unknown tiers are preserved verbatim so a newer server does not break
/// older clients. A missing or null tier is treated as `Free`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Enterprise,
    Other(String),
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Enterprise => "enterprise",
            SubscriptionTier::Other(name) => name,
        }
    }

    /// Every tier except `Free` carries paid entitlement
    pub fn is_paid(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }
}

impl From<Option<String>> for SubscriptionTier {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("") | Some("free") => SubscriptionTier::Free,
            Some("pro") => SubscriptionTier::Pro,
            Some("enterprise") => SubscriptionTier::Enterprise,
            Some(_) => SubscriptionTier::Other(value.unwrap_or_default()),
        }
    }
}

impl From<SubscriptionTier> for String {
    fn from(tier: SubscriptionTier) -> Self {
        tier.as_str().to_string()
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached copy of the signed-in user
///
/// Replaced wholesale on every login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
}

impl User {
    /// Name shown in greetings: full name, then username, then email
    pub fn display_name(&self) -> String {
        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !full_name.is_empty() {
            return full_name;
        }

        self.username
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.email.clone())
    }
}

/// Fields accepted by `PUT /user/profile`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.first_name.is_none() && self.last_name.is_none()
    }
}
