use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::generate_id;

/// A monitored product. Created through the store's thin create layer and
/// read-only from the scrape pipeline's perspective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedItem {
    pub id: String,
    pub name: String,
    /// Source page URL; unique across items.
    pub url: String,
    pub target_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrackedItem {
    pub name: String,
    pub url: String,
    pub target_price: Decimal,
}

impl TrackedItem {
    pub fn new(new_item: NewTrackedItem) -> Self {
        Self {
            id: generate_id(),
            name: new_item.name,
            url: new_item.url,
            target_price: new_item.target_price,
        }
    }
}
