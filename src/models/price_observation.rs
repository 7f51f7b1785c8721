use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One timestamped price reading for a tracked item. Observations are
/// append-only; the newest one per item is the item's current price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceObservation {
    pub id: String,
    pub item_id: String,
    pub price: Decimal,
    /// Assigned at insertion time; non-decreasing per item.
    pub observed_at: DateTime<Utc>,
}
