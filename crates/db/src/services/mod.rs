pub mod clock;
pub mod error;
pub mod generator;
pub mod notifier;
pub mod otp;
pub mod pg_store;
pub mod store;
