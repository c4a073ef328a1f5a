//! Contracts for the four external collaborators the engine consumes:
//! intent extraction, the conversation store, the market store, and the
//! outbound notifier. The engine only ever sees these traits; concrete
//! implementations live in the `sokoni-store`, `sokoni-nlu` and
//! `sokoni-telegram` crates.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::geo::GeoPoint;
use crate::domain::offer::{NewOffer, Offer, QuantityKind};
use crate::domain::product::{Product, ProductId};
use crate::domain::user::{User, UserId, UserRole};
use crate::intent::ClassifiedIntent;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("store decode failure: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("intent extraction failed: {0}")]
pub struct ExtractError(pub String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Turns raw text into a classified intent with typed slots.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn classify(&self, text: &str) -> Result<ClassifiedIntent, ExtractError>;
}

/// A user together with its distance from a query point, in meters.
#[derive(Clone, Debug, PartialEq)]
pub struct NearbyUser {
    pub user: User,
    pub distance_m: f64,
}

/// Durable per-user conversation state. Every mutation is an independent
/// per-document field update; no cross-document transaction is required.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    /// Creates the user in onboarding state with the full requirement queue.
    async fn create_user(&self, id: &UserId) -> Result<User, StoreError>;

    async fn set_name(&self, id: &UserId, name: &str) -> Result<(), StoreError>;
    async fn set_location(&self, id: &UserId, point: GeoPoint) -> Result<(), StoreError>;
    async fn set_role(&self, id: &UserId, role: UserRole) -> Result<(), StoreError>;

    /// Removes the front element of the requirement queue.
    async fn pop_front_requirement(&self, id: &UserId) -> Result<(), StoreError>;

    /// Clears the action tag and the entire requirement queue.
    async fn clear_state(&self, id: &UserId) -> Result<(), StoreError>;

    /// All users with a registered location within `radius_m` of `point`,
    /// ordered by ascending distance. Role filtering happens in the engine.
    async fn find_near(
        &self,
        point: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<NearbyUser>, StoreError>;
}

/// Inputs of the combined search-and-decrement operation.
#[derive(Clone, Debug, PartialEq)]
pub struct ReservationRequest {
    pub product: ProductId,
    pub kind: QuantityKind,
    pub requested: Decimal,
    /// The buyer's implied per-unit bid, `price / requested`. Only offers
    /// with a strictly lower normalized price qualify.
    pub bid_normalized_price: Decimal,
}

/// A successful reservation: the winning offer with its post-decrement
/// remaining quantity, and the seller for notification and display.
#[derive(Clone, Debug, PartialEq)]
pub struct Reservation {
    pub offer: Offer,
    pub seller: User,
}

#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn find_or_create_product(&self, name: &str) -> Result<Product, StoreError>;

    async fn create_offer(&self, offer: NewOffer) -> Result<Offer, StoreError>;

    /// Atomically selects a qualifying offer and decrements its remaining
    /// quantity in one conditional operation. Candidates match the product
    /// and quantity kind, have remaining strictly greater than `requested`
    /// and a normalized price strictly below the bid; the pick is the lowest
    /// normalized price, ties broken by oldest offer. Returns `None` when no
    /// offer qualifies. Two concurrent callers can never jointly oversell
    /// one offer.
    async fn reserve_if_available(
        &self,
        request: ReservationRequest,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Mean normalized price across all offers of a product, or `None` when
    /// the product has no offers at all.
    async fn average_normalized_price(
        &self,
        product: &ProductId,
    ) -> Result<Option<Decimal>, StoreError>;
}

/// Fire-and-forget text delivery to a recipient on the chat transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &UserId, text: &str) -> Result<(), NotifyError>;
}
