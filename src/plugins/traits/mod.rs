pub mod notifier;
pub mod provider;

pub use notifier::NotificationChannel;
pub use provider::PriceProvider;
