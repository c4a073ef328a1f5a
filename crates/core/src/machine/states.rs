use crate::domain::geo::GeoPoint;
use crate::domain::user::{OnboardingStep, User, UserRole};
use crate::intent::{ClassifiedIntent, IntentKind};
use crate::reply;

/// The profile field a satisfied onboarding step persists.
#[derive(Clone, Debug, PartialEq)]
pub enum ProfileUpdate {
    Name(String),
    Location(GeoPoint),
    Role(UserRole),
}

/// Result of evaluating one onboarding step against a classified message.
/// `Retry` is a self-loop: no state changes, the step is re-prompted and
/// retried indefinitely.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Satisfied { update: ProfileUpdate, reply: String },
    Retry { reply: String },
}

/// Pure onboarding transition: no I/O, fully exhaustive over both the step
/// queue variants and the intent enum. The engine applies the effects.
pub fn evaluate_step(user: &User, step: OnboardingStep, intent: &ClassifiedIntent) -> StepOutcome {
    match step {
        OnboardingStep::Name => evaluate_name(intent),
        OnboardingStep::Location => evaluate_location(intent),
        OnboardingStep::Role => evaluate_role(user, intent),
    }
}

fn evaluate_name(intent: &ClassifiedIntent) -> StepOutcome {
    let extracted = match &intent.kind {
        IntentKind::GiveName => intent.slots.name.as_deref().map(str::trim),
        _ => None,
    };

    match extracted {
        Some(name) if !name.is_empty() => StepOutcome::Satisfied {
            update: ProfileUpdate::Name(name.to_string()),
            reply: reply::ask_location(name),
        },
        _ => StepOutcome::Retry { reply: reply::ask_name_again().to_string() },
    }
}

fn evaluate_location(intent: &ClassifiedIntent) -> StepOutcome {
    let extracted = match &intent.kind {
        IntentKind::GiveLocation => intent.slots.location,
        _ => None,
    };

    match extracted {
        Some(point) => StepOutcome::Satisfied {
            update: ProfileUpdate::Location(point),
            reply: reply::ask_role().to_string(),
        },
        None => StepOutcome::Retry { reply: reply::ask_location_again().to_string() },
    }
}

fn evaluate_role(user: &User, intent: &ClassifiedIntent) -> StepOutcome {
    let role = match &intent.kind {
        IntentKind::ChooseFarmer => Some(UserRole::Farmer),
        IntentKind::ChooseConsumer => Some(UserRole::Consumer),
        _ => None,
    };

    match role {
        Some(UserRole::Farmer) => StepOutcome::Satisfied {
            update: ProfileUpdate::Role(UserRole::Farmer),
            reply: reply::welcome_farmer(user.display_name()),
        },
        Some(UserRole::Consumer) => StepOutcome::Satisfied {
            update: ProfileUpdate::Role(UserRole::Consumer),
            reply: reply::welcome_consumer(user.display_name()),
        },
        None => StepOutcome::Retry { reply: reply::ask_role_again().to_string() },
    }
}
