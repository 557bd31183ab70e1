pub mod collaborators;
pub mod identity_service;
pub mod interaction_service;
pub mod journey_service;
pub mod outbox_service;
pub mod pipeline_service;
pub mod referral_service;
pub mod touchpoint_service;
