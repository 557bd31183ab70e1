pub mod admin;
pub mod crm;
pub mod pipeline;
pub mod referrals;
pub mod touchpoints;
