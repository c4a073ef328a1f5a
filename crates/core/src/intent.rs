use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::geo::GeoPoint;

/// Supported conversational intents as an explicit sum type. The NLU service
/// speaks in slugs; everything after the parse boundary matches on this enum
/// so an unhandled intent is a compile-time gap, not a silent fallthrough.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    Greeting,
    GiveName,
    GiveLocation,
    ChooseFarmer,
    ChooseConsumer,
    FarmersNearby,
    Sell,
    Buy,
    MarketPrice,
    Unknown(String),
}

impl IntentKind {
    /// Maps an NLU slug to an intent, tolerating the slug synonyms the
    /// service is known to produce for the same intent.
    pub fn from_slug(slug: &str) -> Self {
        match slug {
            "greetings" | "greeting" | "hello" => Self::Greeting,
            "get_name" => Self::GiveName,
            "get_location" => Self::GiveLocation,
            "get_type_farmer" => Self::ChooseFarmer,
            "get_type_buyer" => Self::ChooseConsumer,
            "farmers_nearby" | "farmers-nearby" | "list_farmers" => Self::FarmersNearby,
            "sell_products" | "sell_product" | "sell_offer" | "sell" => Self::Sell,
            "buy_products" | "buy_product" | "buy_offer" | "buy" => Self::Buy,
            "market_prices" | "market_price" | "ask_price" => Self::MarketPrice,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The slug echoed back in the fallback reply.
    pub fn slug(&self) -> &str {
        match self {
            Self::Greeting => "greetings",
            Self::GiveName => "get_name",
            Self::GiveLocation => "get_location",
            Self::ChooseFarmer => "get_type_farmer",
            Self::ChooseConsumer => "get_type_buyer",
            Self::FarmersNearby => "farmers_nearby",
            Self::Sell => "sell_products",
            Self::Buy => "buy_products",
            Self::MarketPrice => "market_prices",
            Self::Unknown(slug) => slug,
        }
    }
}

/// Typed slots extracted alongside the intent. Absence is always `None`;
/// the extraction boundary maps literal-zero wire values to `None` as well,
/// so "not provided" has exactly one representation in the core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentSlots {
    pub name: Option<String>,
    pub location: Option<GeoPoint>,
    pub address: Option<String>,
    pub product: Option<String>,
    pub mass_grams: Option<Decimal>,
    pub units: Option<u64>,
    pub price: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub kind: IntentKind,
    pub slots: IntentSlots,
}

impl ClassifiedIntent {
    pub fn bare(kind: IntentKind) -> Self {
        Self { kind, slots: IntentSlots::default() }
    }
}
