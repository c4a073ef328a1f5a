//! Every user-facing message template lives here, so the conversational
//! surface can be reviewed (and translated) in one place. Functions return
//! plain text; the transport layer decides how to render it.

use rust_decimal::Decimal;

use crate::domain::offer::Quantity;
use crate::domain::user::{User, UserRole};

pub fn welcome() -> &'static str {
    "Hi, welcome to the Sokoni market platform! I will help you buy and sell \
     fresh produce. First things first: what is your name?"
}

pub fn ask_name_again() -> &'static str {
    "Sorry, I didn't catch your name. What should I call you?"
}

pub fn ask_location(name: &str) -> String {
    format!("Nice to meet you, {name}! Where are you located? Name your village, town or address.")
}

pub fn ask_location_again() -> &'static str {
    "I couldn't place that. Please tell me where you are located, for example a town or address."
}

pub fn ask_role() -> &'static str {
    "Got it. Are you a farmer selling produce, or are you here to buy?"
}

pub fn ask_role_again() -> &'static str {
    "Please tell me whether you are a farmer or a buyer."
}

pub fn welcome_farmer(name: &str) -> String {
    format!(
        "Welcome aboard, {name}! You are registered as a farmer. \
         Tell me what you want to sell, for example: \"I sell 500 grams of tomatoes for $10\"."
    )
}

pub fn welcome_consumer(name: &str) -> String {
    format!(
        "Welcome aboard, {name}! You are registered as a buyer. \
         Ask me for nearby farmers or make a bid, for example: \
         \"I want 200 grams of tomatoes for $6\"."
    )
}

/// Closing message for the defensive empty-queue-while-onboarding case.
pub fn onboarding_complete(name: &str) -> String {
    format!("You are all set, {name}. Welcome to the market!")
}

pub fn greeting(user: &User) -> String {
    let name = user.display_name();
    match user.role {
        Some(UserRole::Farmer) => format!(
            "Hello {name}! Ready to sell? Tell me your produce, quantity and price."
        ),
        Some(UserRole::Consumer) => format!(
            "Hello {name}! Looking for produce? Ask for farmers nearby or make a bid."
        ),
        None => format!("Hello {name}!"),
    }
}

/// Explicit fallback for recognized-but-unsupported intents; a reply, not an
/// error.
pub fn not_yet_supported(name: &str, slug: &str) -> String {
    format!("Sorry {name}, I understood \"{slug}\" but I can't help with that yet.")
}

/// The only text an end user sees for a system error.
pub fn apology() -> &'static str {
    "Sorry, something went wrong on our side. Please try again in a moment."
}

pub fn location_missing() -> &'static str {
    "I don't have a location for you yet, so I can't look for farmers nearby."
}

pub fn no_farmers_nearby() -> &'static str {
    "I couldn't find any farmers near you right now. Try again later!"
}

pub fn sell_requires_farmer() -> &'static str {
    "Only registered farmers can list produce for sale."
}

pub fn offer_details_missing() -> &'static str {
    "To list an offer I need the produce, a price, and either a mass or a \
     number of units, for example: \"I sell 500 grams of tomatoes for $10\"."
}

pub fn bid_details_missing() -> &'static str {
    "To look for a deal I need the produce, your price, and either a mass or \
     a number of units, for example: \"I want 200 grams of tomatoes for $6\"."
}

pub fn offer_listed(quantity: Quantity, product: &str, price: Decimal) -> String {
    match quantity {
        Quantity::Mass(grams) => format!(
            "Your offer is on the market: {grams} g of {product} for {}.",
            money(price)
        ),
        Quantity::Units(count) => format!(
            "Your offer is on the market: {count} units of {product} for {}.",
            money(price)
        ),
    }
}

pub fn no_matching_offer(product: &str) -> String {
    format!("I couldn't find an offer for {product} that fits your bid right now.")
}

pub fn purchase_confirmed(seller: &str, product: &str, price: Decimal) -> String {
    format!("Deal! You bought {product} from {seller} for {}. Enjoy!", money(price))
}

/// Sent to the seller after a reservation has been committed.
pub fn sale_notice(buyer: &str, quantity: Quantity, product: &str, price: Decimal) -> String {
    let amount = match quantity {
        Quantity::Mass(grams) => format!("{grams} g"),
        Quantity::Units(count) => format!("{count} units"),
    };
    format!("Good news! {buyer} just bought {amount} of your {product} for {}.", money(price))
}

pub fn price_product_missing() -> &'static str {
    "Which produce are you asking about? For example: \"What do tomatoes cost?\"."
}

pub fn no_offers_for_product(product: &str) -> String {
    format!("There are no offers for {product} on the market yet.")
}

pub fn average_price(product: &str, normalized: Decimal) -> String {
    format!("The average price for {product} is {} per unit.", money(normalized.round_dp(2)))
}

fn money(value: Decimal) -> String {
    format!("${:.2}", value)
}
