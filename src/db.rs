pub mod lead_repo;
pub use lead_repo::{LeadRepository, LeadStore};
pub mod interaction_repo;
pub use interaction_repo::{InteractionRepository, InteractionStore};
pub mod pipeline_repo;
pub use pipeline_repo::{PipelineRepository, PipelineStore};
pub mod journey_repo;
pub use journey_repo::{JourneyRepository, JourneySourceStore};
pub mod referral_repo;
pub use referral_repo::{ReferralRepository, ReferralStore};
pub mod outbox_repo;
pub use outbox_repo::{OutboxRepository, OutboxStore};

pub mod memory;
pub use memory::InMemoryStore;
