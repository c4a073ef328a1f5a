//! Marketplace operations: nearby-farmer discovery, sell-offer creation,
//! buy-offer matching with atomic reservation, and average-price lookup.
//! All operations are stateless request/response; durable state lives behind
//! the store ports.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::geo::format_distance;
use crate::domain::offer::{NewOffer, Quantity};
use crate::domain::user::{User, UserRole};
use crate::errors::EngineError;
use crate::intent::IntentSlots;
use crate::ports::{ConversationStore, MarketStore, Notifier, ReservationRequest};
use crate::reply;

/// Default discovery radius around the caller's registered point, in meters.
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 2_000.0;

pub struct MarketplaceEngine {
    users: Arc<dyn ConversationStore>,
    market: Arc<dyn MarketStore>,
    notifier: Arc<dyn Notifier>,
    search_radius_m: f64,
}

impl MarketplaceEngine {
    pub fn new(
        users: Arc<dyn ConversationStore>,
        market: Arc<dyn MarketStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { users, market, notifier, search_radius_m: DEFAULT_SEARCH_RADIUS_M }
    }

    pub fn with_search_radius(mut self, radius_m: f64) -> Self {
        self.search_radius_m = radius_m;
        self
    }

    /// Numbered list of farmers within the search radius, nearest first.
    /// The counter starts at 1 and only advances for entries that pass the
    /// filter; the caller itself and non-farmers never appear.
    pub async fn farmers_nearby(&self, user: &User) -> Result<String, EngineError> {
        // Onboarding guarantees a location; a missing one here is a caller
        // ordering defect and gets a graceful reply, not a crash.
        let Some(point) = user.location else {
            return Ok(reply::location_missing().to_string());
        };

        let nearby = self.users.find_near(point, self.search_radius_m).await?;

        let mut lines = Vec::new();
        for entry in nearby {
            if entry.user.id == user.id || entry.user.role != Some(UserRole::Farmer) {
                continue;
            }
            lines.push(format!(
                "{}. {} ({})",
                lines.len() + 1,
                entry.user.display_name(),
                format_distance(entry.distance_m)
            ));
        }

        if lines.is_empty() {
            return Ok(reply::no_farmers_nearby().to_string());
        }
        Ok(format!("Farmers near you:\n{}", lines.join("\n")))
    }

    /// Creates a standing sell listing for a farmer.
    pub async fn sell(&self, user: &User, slots: &IntentSlots) -> Result<String, EngineError> {
        if user.role != Some(UserRole::Farmer) {
            return Ok(reply::sell_requires_farmer().to_string());
        }

        let Some((product_name, price, quantity)) = trade_slots(slots) else {
            return Ok(reply::offer_details_missing().to_string());
        };

        let product = self.market.find_or_create_product(&product_name).await?;
        let listing = NewOffer::listed(user.id.clone(), product.id, price, quantity)?;
        let offer = self.market.create_offer(listing).await?;

        info!(
            event_name = "market.offer.listed",
            seller = %user.id,
            offer_id = %offer.id.0,
            product = %product_name,
            normalized_price = %offer.normalized_price,
            "sell offer created"
        );
        Ok(reply::offer_listed(quantity, &product_name, price))
    }

    /// Matches a bid against standing offers and atomically reserves the
    /// requested quantity from the winner. Inventory commits first; the
    /// seller notification afterwards is best-effort and never rolls the
    /// reservation back.
    pub async fn buy(&self, user: &User, slots: &IntentSlots) -> Result<String, EngineError> {
        let Some((product_name, price, quantity)) = trade_slots(slots) else {
            return Ok(reply::bid_details_missing().to_string());
        };

        let product = self.market.find_or_create_product(&product_name).await?;
        let request = ReservationRequest {
            product: product.id,
            kind: quantity.kind(),
            requested: quantity.amount(),
            bid_normalized_price: price / quantity.amount(),
        };

        let Some(reservation) = self.market.reserve_if_available(request).await? else {
            return Ok(reply::no_matching_offer(&product_name));
        };

        info!(
            event_name = "market.offer.reserved",
            buyer = %user.id,
            seller = %reservation.seller.id,
            offer_id = %reservation.offer.id.0,
            product = %product_name,
            "reservation committed"
        );

        let notice = reply::sale_notice(user.display_name(), quantity, &product_name, price);
        if let Err(error) = self.notifier.send(&reservation.seller.id, &notice).await {
            // The reservation is already committed; log and move on.
            warn!(
                event_name = "market.notify.failed",
                seller = %reservation.seller.id,
                offer_id = %reservation.offer.id.0,
                error = %error,
                "seller notification failed after reservation commit"
            );
        }

        Ok(reply::purchase_confirmed(reservation.seller.display_name(), &product_name, price))
    }

    /// Mean normalized price across all offers of a product, two decimals.
    pub async fn market_price(&self, slots: &IntentSlots) -> Result<String, EngineError> {
        let Some(product_name) = slots.product.as_deref().map(str::trim).filter(|p| !p.is_empty())
        else {
            return Ok(reply::price_product_missing().to_string());
        };

        let product = self.market.find_or_create_product(product_name).await?;
        match self.market.average_normalized_price(&product.id).await? {
            Some(average) => Ok(reply::average_price(product_name, average)),
            None => Ok(reply::no_offers_for_product(product_name)),
        }
    }
}

/// Extracts the (product, price, quantity) triple shared by sell and buy.
/// Requires a non-empty product, a positive price, and exactly one positive
/// quantity kind; anything else is "not provided" and yields `None`, which
/// the callers answer with a validation reply.
fn trade_slots(slots: &IntentSlots) -> Option<(String, Decimal, Quantity)> {
    let product = slots.product.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
    let price = slots.price.filter(|p| *p > Decimal::ZERO)?;

    let quantity = match (slots.mass_grams, slots.units) {
        (Some(mass), None) if mass > Decimal::ZERO => Quantity::Mass(mass),
        (None, Some(units)) if units > 0 => Quantity::Units(units),
        _ => return None,
    };

    Some((product.to_string(), price, quantity))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use crate::domain::geo::GeoPoint;
    use crate::domain::user::{User, UserId, UserRole};
    use crate::intent::IntentSlots;
    use crate::ports::NotifyError;
    use crate::testing::{FlakyNotifier, MemoryStore, RecordingNotifier};

    use super::{trade_slots, MarketplaceEngine};

    fn active_user(id: &str, name: &str, role: UserRole, location: Option<GeoPoint>) -> User {
        User {
            id: UserId(id.to_string()),
            name: Some(name.to_string()),
            location,
            role: Some(role),
            action: None,
            requirements: Vec::new(),
        }
    }

    fn engine_over(store: Arc<MemoryStore>) -> MarketplaceEngine {
        MarketplaceEngine::new(store.clone(), store, Arc::new(RecordingNotifier::default()))
    }

    fn sell_slots(product: &str, price: i64, mass: Option<i64>, units: Option<u64>) -> IntentSlots {
        IntentSlots {
            product: Some(product.to_string()),
            price: Some(Decimal::from(price)),
            mass_grams: mass.map(Decimal::from),
            units,
            ..IntentSlots::default()
        }
    }

    #[test]
    fn trade_slots_requires_exactly_one_quantity_kind() {
        let both = sell_slots("tomato", 10, Some(500), Some(4));
        let neither = sell_slots("tomato", 10, None, None);
        let mass_only = sell_slots("tomato", 10, Some(500), None);

        assert_eq!(trade_slots(&both), None);
        assert_eq!(trade_slots(&neither), None);
        assert!(trade_slots(&mass_only).is_some());
    }

    #[test]
    fn trade_slots_requires_positive_price_and_product() {
        let free = sell_slots("tomato", 0, Some(500), None);
        let nameless = IntentSlots {
            price: Some(Decimal::from(10)),
            mass_grams: Some(Decimal::from(500)),
            ..IntentSlots::default()
        };

        assert_eq!(trade_slots(&free), None);
        assert_eq!(trade_slots(&nameless), None);
    }

    #[tokio::test]
    async fn sell_refuses_non_farmers() {
        let engine = engine_over(Arc::new(MemoryStore::default()));
        let buyer = active_user("U3", "Bola", UserRole::Consumer, None);

        let text = engine.sell(&buyer, &sell_slots("tomato", 10, Some(500), None)).await.unwrap();

        assert!(text.contains("Only registered farmers"));
    }

    #[tokio::test]
    async fn sell_lists_an_offer_with_normalized_price() {
        let store = Arc::new(MemoryStore::default());
        let engine = engine_over(store.clone());
        let farmer = active_user("U2", "Kofi", UserRole::Farmer, None);

        let text = engine.sell(&farmer, &sell_slots("tomato", 10, Some(500), None)).await.unwrap();

        assert!(text.contains("500 g of tomato"));
        let offers = store.offers();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].normalized_price, Decimal::new(2, 2)); // 10 / 500
        assert_eq!(offers[0].remaining.amount(), Decimal::from(500));
    }

    #[tokio::test]
    async fn buy_reports_when_no_offer_qualifies() {
        let engine = engine_over(Arc::new(MemoryStore::default()));
        let buyer = active_user("U3", "Bola", UserRole::Consumer, None);

        let text = engine.buy(&buyer, &sell_slots("tomato", 6, Some(200), None)).await.unwrap();

        assert!(text.contains("couldn't find an offer"));
    }

    #[tokio::test]
    async fn buy_reserves_notifies_seller_and_confirms() {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = MarketplaceEngine::new(store.clone(), store.clone(), notifier.clone());

        let farmer = active_user("U2", "Kofi", UserRole::Farmer, None);
        store.insert(farmer.clone());
        engine.sell(&farmer, &sell_slots("tomato", 10, Some(500), None)).await.unwrap();

        let buyer = active_user("U3", "Bola", UserRole::Consumer, None);
        // implied bid 6/200 = 0.03 > offer's 0.02, qualifies
        let text = engine.buy(&buyer, &sell_slots("tomato", 6, Some(200), None)).await.unwrap();

        assert!(text.contains("Kofi"), "confirmation names the seller: {text}");
        assert!(text.contains("$6.00"));
        assert_eq!(store.offers()[0].remaining.amount(), Decimal::from(300));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, UserId("U2".to_string()));
        assert!(sent[0].1.contains("Bola"));
    }

    #[tokio::test]
    async fn notify_failure_does_not_roll_back_the_reservation() {
        let store = Arc::new(MemoryStore::default());
        let engine = MarketplaceEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(FlakyNotifier(NotifyError("chat transport down".to_string()))),
        );

        let farmer = active_user("U2", "Kofi", UserRole::Farmer, None);
        store.insert(farmer.clone());
        engine.sell(&farmer, &sell_slots("tomato", 10, Some(500), None)).await.unwrap();

        let buyer = active_user("U3", "Bola", UserRole::Consumer, None);
        let result = engine.buy(&buyer, &sell_slots("tomato", 6, Some(200), None)).await;

        assert!(result.is_ok(), "notify failure must not surface as an error");
        assert_eq!(store.offers()[0].remaining.amount(), Decimal::from(300));
    }

    #[tokio::test]
    async fn buy_never_matches_across_quantity_kinds() {
        let store = Arc::new(MemoryStore::default());
        let engine = engine_over(store.clone());

        let farmer = active_user("U2", "Kofi", UserRole::Farmer, None);
        store.insert(farmer.clone());
        engine.sell(&farmer, &sell_slots("melon", 12, None, Some(10))).await.unwrap();

        let buyer = active_user("U3", "Bola", UserRole::Consumer, None);
        let text = engine.buy(&buyer, &sell_slots("melon", 6, Some(200), None)).await.unwrap();

        assert!(text.contains("couldn't find an offer"));
    }

    #[tokio::test]
    async fn farmers_nearby_excludes_caller_and_non_farmers_and_numbers_from_one() {
        let store = Arc::new(MemoryStore::default());
        let engine = engine_over(store.clone());

        let here = GeoPoint::new(6.5000, 3.4000);
        let caller = active_user("U1", "Ada", UserRole::Farmer, Some(here));
        store.insert(caller.clone());
        store.insert(active_user("U2", "Kofi", UserRole::Farmer, Some(GeoPoint::new(6.5010, 3.4000))));
        store.insert(active_user("U3", "Bola", UserRole::Consumer, Some(GeoPoint::new(6.5005, 3.4000))));
        store.insert(active_user("U4", "Chi", UserRole::Farmer, Some(GeoPoint::new(6.5100, 3.4000))));

        let text = engine.farmers_nearby(&caller).await.unwrap();

        assert!(!text.contains("Ada"), "caller must not list itself: {text}");
        assert!(!text.contains("Bola"), "consumers are filtered out: {text}");
        assert!(text.contains("1. Kofi"), "nearest farmer is numbered 1: {text}");
        assert!(text.contains("2. Chi"), "counter only advances for kept entries: {text}");
    }

    #[tokio::test]
    async fn farmers_nearby_without_location_is_a_graceful_reply() {
        let engine = engine_over(Arc::new(MemoryStore::default()));
        let caller = active_user("U1", "Ada", UserRole::Consumer, None);

        let text = engine.farmers_nearby(&caller).await.unwrap();

        assert!(text.contains("don't have a location"));
    }

    #[tokio::test]
    async fn market_price_reports_rounded_average_or_no_offers() {
        let store = Arc::new(MemoryStore::default());
        let engine = engine_over(store.clone());
        let farmer = active_user("U2", "Kofi", UserRole::Farmer, None);
        store.insert(farmer.clone());

        let ask = IntentSlots { product: Some("tomato".to_string()), ..IntentSlots::default() };

        let empty = engine.market_price(&ask).await.unwrap();
        assert!(empty.contains("no offers"), "got {empty}");

        engine.sell(&farmer, &sell_slots("tomato", 10, Some(500), None)).await.unwrap();
        engine.sell(&farmer, &sell_slots("tomato", 20, Some(500), None)).await.unwrap();

        let text = engine.market_price(&ask).await.unwrap();
        // mean of 0.02 and 0.04
        assert!(text.contains("$0.03"), "got {text}");
    }
}
