pub mod broker;
pub mod channel;
pub mod correlation;
pub mod error;
pub mod flags;
pub mod record;
