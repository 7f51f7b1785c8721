use uuid::Uuid;

pub mod price_observation;
pub mod tracked_item;

// Re-exports for convenience
pub use price_observation::*;
pub use tracked_item::*;

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
