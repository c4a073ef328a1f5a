//! In-memory collaborator fakes shared by the engine unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::geo::GeoPoint;
use crate::domain::offer::{NewOffer, Offer, OfferId};
use crate::domain::product::{Product, ProductId};
use crate::domain::user::{User, UserId, UserRole};
use crate::intent::ClassifiedIntent;
use crate::ports::{
    ConversationStore, ExtractError, IntentExtractor, MarketStore, NearbyUser, Notifier,
    NotifyError, Reservation, ReservationRequest, StoreError,
};

/// One in-memory backend implementing both store ports, so reservations can
/// resolve their seller the same way the SQL store does.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, User>>,
    products: Mutex<HashMap<String, Product>>,
    offers: Mutex<Vec<Offer>>,
}

impl MemoryStore {
    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.0.clone(), user);
    }

    pub fn offers(&self) -> Vec<Offer> {
        self.offers.lock().unwrap().clone()
    }

    pub fn user(&self, id: &UserId) -> Option<User> {
        self.users.lock().unwrap().get(&id.0).cloned()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().get(&id.0).cloned())
    }

    async fn create_user(&self, id: &UserId) -> Result<User, StoreError> {
        let user = User::onboarding(id.clone());
        self.users.lock().unwrap().insert(id.0.clone(), user.clone());
        Ok(user)
    }

    async fn set_name(&self, id: &UserId, name: &str) -> Result<(), StoreError> {
        self.update(id, |user| user.name = Some(name.to_string()))
    }

    async fn set_location(&self, id: &UserId, point: GeoPoint) -> Result<(), StoreError> {
        self.update(id, |user| user.location = Some(point))
    }

    async fn set_role(&self, id: &UserId, role: UserRole) -> Result<(), StoreError> {
        self.update(id, |user| user.role = Some(role))
    }

    async fn pop_front_requirement(&self, id: &UserId) -> Result<(), StoreError> {
        self.update(id, |user| {
            if !user.requirements.is_empty() {
                user.requirements.remove(0);
            }
        })
    }

    async fn clear_state(&self, id: &UserId) -> Result<(), StoreError> {
        self.update(id, |user| {
            user.action = None;
            user.requirements.clear();
        })
    }

    async fn find_near(
        &self,
        point: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<NearbyUser>, StoreError> {
        let users = self.users.lock().unwrap();
        let mut nearby: Vec<NearbyUser> = users
            .values()
            .filter_map(|user| {
                let location = user.location?;
                let distance_m = point.distance_m(&location);
                (distance_m <= radius_m)
                    .then(|| NearbyUser { user: user.clone(), distance_m })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        Ok(nearby)
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn find_or_create_product(&self, name: &str) -> Result<Product, StoreError> {
        let mut products = self.products.lock().unwrap();
        let product = products.entry(name.to_string()).or_insert_with(|| Product {
            id: ProductId(Uuid::new_v4().to_string()),
            name: name.to_string(),
        });
        Ok(product.clone())
    }

    async fn create_offer(&self, offer: NewOffer) -> Result<Offer, StoreError> {
        let offer = Offer {
            id: OfferId(Uuid::new_v4().to_string()),
            product: offer.product,
            seller: offer.seller,
            price: offer.price,
            remaining: offer.quantity,
            normalized_price: offer.normalized_price,
            created_at: Utc::now(),
        };
        self.offers.lock().unwrap().push(offer.clone());
        Ok(offer)
    }

    async fn reserve_if_available(
        &self,
        request: ReservationRequest,
    ) -> Result<Option<Reservation>, StoreError> {
        // Find and decrement under one lock; the whole point of the port.
        let mut offers = self.offers.lock().unwrap();

        let winner = offers
            .iter_mut()
            .filter(|offer| {
                offer.product == request.product
                    && offer.remaining.kind() == request.kind
                    && offer.remaining.amount() > request.requested
                    && offer.normalized_price < request.bid_normalized_price
            })
            .min_by(|a, b| {
                a.normalized_price
                    .cmp(&b.normalized_price)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.0.cmp(&b.id.0))
            });

        let Some(offer) = winner else {
            return Ok(None);
        };

        offer.remaining = match offer.remaining {
            crate::domain::offer::Quantity::Mass(grams) => {
                crate::domain::offer::Quantity::Mass(grams - request.requested)
            }
            crate::domain::offer::Quantity::Units(count) => crate::domain::offer::Quantity::Units(
                count.saturating_sub(request.requested.to_u64().unwrap_or(0)),
            ),
        };
        let offer = offer.clone();

        let seller = self
            .users
            .lock()
            .unwrap()
            .get(&offer.seller.0)
            .cloned()
            .ok_or_else(|| StoreError::Decode("offer references a missing seller".to_string()))?;

        Ok(Some(Reservation { offer, seller }))
    }

    async fn average_normalized_price(
        &self,
        product: &ProductId,
    ) -> Result<Option<Decimal>, StoreError> {
        let offers = self.offers.lock().unwrap();
        let prices: Vec<Decimal> = offers
            .iter()
            .filter(|offer| &offer.product == product)
            .map(|offer| offer.normalized_price)
            .collect();

        if prices.is_empty() {
            return Ok(None);
        }
        let total: Decimal = prices.iter().copied().sum();
        Ok(Some(total / Decimal::from(prices.len() as u64)))
    }
}

impl MemoryStore {
    fn update<F>(&self, id: &UserId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut User),
    {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::Decode(format!("unknown user `{id}`")))?;
        apply(user);
        Ok(())
    }
}

/// Records everything it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &UserId, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((recipient.clone(), text.to_string()));
        Ok(())
    }
}

/// Always fails with the given error.
pub struct FlakyNotifier(pub NotifyError);

#[async_trait]
impl Notifier for FlakyNotifier {
    async fn send(&self, _recipient: &UserId, _text: &str) -> Result<(), NotifyError> {
        Err(self.0.clone())
    }
}

/// Maps exact message texts to canned classifications; anything unscripted
/// fails the test loudly.
#[derive(Default)]
pub struct ScriptedExtractor {
    script: Mutex<HashMap<String, ClassifiedIntent>>,
}

impl ScriptedExtractor {
    pub fn on(self, text: &str, intent: ClassifiedIntent) -> Self {
        self.script.lock().unwrap().insert(text.to_string(), intent);
        self
    }
}

#[async_trait]
impl IntentExtractor for ScriptedExtractor {
    async fn classify(&self, text: &str) -> Result<ClassifiedIntent, ExtractError> {
        self.script
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .ok_or_else(|| ExtractError(format!("unscripted message `{text}`")))
    }
}

/// Always fails, for exercising the collaborator-failure path.
pub struct FailingExtractor;

#[async_trait]
impl IntentExtractor for FailingExtractor {
    async fn classify(&self, _text: &str) -> Result<ClassifiedIntent, ExtractError> {
        Err(ExtractError("nlu service unreachable".to_string()))
    }
}
