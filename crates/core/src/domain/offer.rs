use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferId(pub String);

/// Discriminant of the two quantity units an offer can be expressed in.
/// Offers and bids only ever match within the same kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    Mass,
    Units,
}

impl QuantityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mass => "mass",
            Self::Units => "units",
        }
    }
}

impl std::str::FromStr for QuantityKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "mass" => Ok(Self::Mass),
            "units" => Ok(Self::Units),
            other => Err(format!("unknown quantity kind `{other}`")),
        }
    }
}

/// Quantity in exactly one of two units: continuous mass in grams, or a
/// discrete unit count.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Quantity {
    Mass(Decimal),
    Units(u64),
}

impl Quantity {
    pub fn kind(&self) -> QuantityKind {
        match self {
            Self::Mass(_) => QuantityKind::Mass,
            Self::Units(_) => QuantityKind::Units,
        }
    }

    /// Numeric amount regardless of kind, used for price normalization and
    /// reservation arithmetic.
    pub fn amount(&self) -> Decimal {
        match self {
            Self::Mass(grams) => *grams,
            Self::Units(count) => Decimal::from(*count),
        }
    }

    pub fn is_positive(&self) -> bool {
        self.amount() > Decimal::ZERO
    }
}

/// A standing sell listing. `normalized_price` is fixed at creation time and
/// deliberately not recomputed as `remaining` is reduced by reservations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub product: ProductId,
    pub seller: UserId,
    pub price: Decimal,
    pub remaining: Quantity,
    pub normalized_price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Input for offer creation; the store assigns the id and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOffer {
    pub seller: UserId,
    pub product: ProductId,
    pub price: Decimal,
    pub quantity: Quantity,
    pub normalized_price: Decimal,
}

impl NewOffer {
    /// Builds a listing with `normalized_price = price / quantity`.
    /// Quantity must be positive; callers validate before reaching here.
    pub fn listed(
        seller: UserId,
        product: ProductId,
        price: Decimal,
        quantity: Quantity,
    ) -> Result<Self, DomainError> {
        if !quantity.is_positive() {
            return Err(DomainError::InvariantViolation(
                "offer quantity must be positive".to_string(),
            ));
        }
        if price <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(
                "offer price must be positive".to_string(),
            ));
        }

        let normalized_price = price / quantity.amount();
        Ok(Self { seller, product, price, quantity, normalized_price })
    }
}
