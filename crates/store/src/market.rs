use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use sokoni_core::domain::offer::{NewOffer, Offer, OfferId, Quantity, QuantityKind};
use sokoni_core::domain::product::{Product, ProductId};
use sokoni_core::domain::user::UserId;
use sokoni_core::ports::{MarketStore, Reservation, ReservationRequest, StoreError};

use crate::users::{db_error, decode_user_row};
use crate::DbPool;

/// SQLite-backed product catalog and offer book. Money and mass are stored
/// as REAL; decimals are converted at this boundary only.
pub struct SqlMarketStore {
    pool: DbPool,
}

impl SqlMarketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketStore for SqlMarketStore {
    async fn find_or_create_product(&self, name: &str) -> Result<Product, StoreError> {
        // INSERT OR IGNORE keeps this race-free under the unique name index.
        sqlx::query("INSERT OR IGNORE INTO products (id, name) VALUES (?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        let row = sqlx::query("SELECT id, name FROM products WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(Product {
            id: ProductId(row.try_get("id").map_err(db_error)?),
            name: row.try_get("name").map_err(db_error)?,
        })
    }

    async fn create_offer(&self, offer: NewOffer) -> Result<Offer, StoreError> {
        let id = OfferId(Uuid::new_v4().to_string());
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO offers
                 (id, product_id, seller_id, price, kind, remaining, normalized_price, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(&offer.product.0)
        .bind(&offer.seller.0)
        .bind(to_real(offer.price)?)
        .bind(offer.quantity.kind().as_str())
        .bind(to_real(offer.quantity.amount())?)
        .bind(to_real(offer.normalized_price)?)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(Offer {
            id,
            product: offer.product,
            seller: offer.seller,
            price: offer.price,
            remaining: offer.quantity,
            normalized_price: offer.normalized_price,
            created_at,
        })
    }

    async fn reserve_if_available(
        &self,
        request: ReservationRequest,
    ) -> Result<Option<Reservation>, StoreError> {
        let requested = to_real(request.requested)?;
        let bid = to_real(request.bid_normalized_price)?;

        // One conditional statement: pick the cheapest qualifying offer and
        // decrement it in the same step, so two concurrent buyers can never
        // jointly oversell one offer. Remaining must stay strictly positive
        // and the offer's normalized price must be strictly below the bid.
        let row = sqlx::query(
            "UPDATE offers
             SET remaining = remaining - ?
             WHERE id = (
                 SELECT id FROM offers
                 WHERE product_id = ?
                   AND kind = ?
                   AND remaining > ?
                   AND normalized_price < ?
                 ORDER BY normalized_price ASC, created_at ASC, id ASC
                 LIMIT 1
             )
             AND remaining > ?
             RETURNING id, product_id, seller_id, price, kind, remaining,
                       normalized_price, created_at",
        )
        .bind(requested)
        .bind(&request.product.0)
        .bind(request.kind.as_str())
        .bind(requested)
        .bind(bid)
        .bind(requested)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let offer = decode_offer_row(&row)?;

        let seller_row = sqlx::query(
            "SELECT id, name, lat, lng, role, action, requirements FROM users WHERE id = ?",
        )
        .bind(&offer.seller.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(seller_row) = seller_row else {
            return Err(StoreError::Decode(format!(
                "offer `{}` references missing seller `{}`",
                offer.id.0, offer.seller
            )));
        };
        let seller = decode_user_row(&seller_row)?;

        Ok(Some(Reservation { offer, seller }))
    }

    async fn average_normalized_price(
        &self,
        product: &ProductId,
    ) -> Result<Option<Decimal>, StoreError> {
        let average: Option<f64> =
            sqlx::query_scalar("SELECT AVG(normalized_price) FROM offers WHERE product_id = ?")
                .bind(&product.0)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        average.map(from_real).transpose()
    }
}

fn decode_offer_row(row: &SqliteRow) -> Result<Offer, StoreError> {
    let id: String = row.try_get("id").map_err(db_error)?;
    let kind_raw: String = row.try_get("kind").map_err(db_error)?;
    let kind = kind_raw.parse::<QuantityKind>().map_err(StoreError::Decode)?;
    let remaining_raw: f64 = row.try_get("remaining").map_err(db_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_error)?;

    let remaining = decode_quantity(kind, remaining_raw)?;

    Ok(Offer {
        id: OfferId(id),
        product: ProductId(row.try_get("product_id").map_err(db_error)?),
        seller: UserId(row.try_get("seller_id").map_err(db_error)?),
        price: from_real(row.try_get("price").map_err(db_error)?)?,
        remaining,
        normalized_price: from_real(row.try_get("normalized_price").map_err(db_error)?)?,
        created_at,
    })
}

fn decode_quantity(kind: QuantityKind, amount: f64) -> Result<Quantity, StoreError> {
    match kind {
        QuantityKind::Mass => Ok(Quantity::Mass(from_real(amount)?)),
        QuantityKind::Units => {
            let count = from_real(amount)?
                .to_u64()
                .ok_or_else(|| StoreError::Decode(format!("unit count `{amount}` out of range")))?;
            Ok(Quantity::Units(count))
        }
    }
}

fn to_real(value: Decimal) -> Result<f64, StoreError> {
    value
        .to_f64()
        .ok_or_else(|| StoreError::Decode(format!("decimal `{value}` is not representable")))
}

fn from_real(value: f64) -> Result<Decimal, StoreError> {
    Decimal::from_f64_retain(value)
        .ok_or_else(|| StoreError::Decode(format!("real `{value}` is not a valid decimal")))
}
