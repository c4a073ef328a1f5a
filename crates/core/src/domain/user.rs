use serde::{Deserialize, Serialize};

use crate::domain::geo::GeoPoint;

/// Opaque stable recipient identifier (the chat id on the bot transport).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Farmer,
    Consumer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::Consumer => "consumer",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "farmer" => Ok(Self::Farmer),
            "consumer" => Ok(Self::Consumer),
            other => Err(format!("unknown user role `{other}`")),
        }
    }
}

/// Free-form state tag on the user document. Only onboarding exists today;
/// modelled as an enum so a new action is a compile-time-visible gap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    Onboarding,
}

impl UserAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
        }
    }
}

impl std::str::FromStr for UserAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "onboarding" => Ok(Self::Onboarding),
            other => Err(format!("unknown user action `{other}`")),
        }
    }
}

/// One still-missing profile field in the onboarding requirement queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Name,
    Location,
    Role,
}

impl OnboardingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Location => "location",
            Self::Role => "role",
        }
    }

    /// The full queue a freshly created user starts with, consumed
    /// front-to-back.
    pub fn full_queue() -> Vec<Self> {
        vec![Self::Name, Self::Location, Self::Role]
    }
}

impl std::str::FromStr for OnboardingStep {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "name" => Ok(Self::Name),
            "location" => Ok(Self::Location),
            "role" | "type" => Ok(Self::Role),
            other => Err(format!("unknown onboarding step `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: Option<String>,
    pub location: Option<GeoPoint>,
    pub role: Option<UserRole>,
    pub action: Option<UserAction>,
    pub requirements: Vec<OnboardingStep>,
}

impl User {
    /// A brand-new user: onboarding with the full requirement queue.
    pub fn onboarding(id: UserId) -> Self {
        Self {
            id,
            name: None,
            location: None,
            role: None,
            action: Some(UserAction::Onboarding),
            requirements: OnboardingStep::full_queue(),
        }
    }

    pub fn is_onboarding(&self) -> bool {
        matches!(self.action, Some(UserAction::Onboarding))
    }

    /// Display name for replies; falls back to the opaque id before the
    /// name step has completed.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id.0)
    }
}
