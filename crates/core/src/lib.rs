pub mod config;
pub mod domain;
pub mod errors;
pub mod intent;
pub mod machine;
pub mod market;
pub mod ports;
pub mod reply;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::geo::GeoPoint;
pub use domain::offer::{NewOffer, Offer, OfferId, Quantity, QuantityKind};
pub use domain::product::{Product, ProductId};
pub use domain::user::{OnboardingStep, User, UserAction, UserId, UserRole};
pub use errors::{DomainError, EngineError};
pub use intent::{ClassifiedIntent, IntentKind, IntentSlots};
pub use machine::{ConversationMachine, ProfileUpdate, StepOutcome};
pub use market::{MarketplaceEngine, DEFAULT_SEARCH_RADIUS_M};
pub use ports::{
    ConversationStore, ExtractError, IntentExtractor, MarketStore, NearbyUser, Notifier,
    NotifyError, Reservation, ReservationRequest, StoreError,
};
pub use router::{route, MarketOp, Route};
