pub mod lead;
pub mod interaction;
pub mod pipeline;
pub mod journey;
pub mod referral;
pub mod outbox;
pub mod touchpoint;
