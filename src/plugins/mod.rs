pub mod manager;
pub mod notifiers;
pub mod providers;
pub mod traits;

pub use manager::ProviderRegistry;
pub use traits::{NotificationChannel, PriceProvider};
