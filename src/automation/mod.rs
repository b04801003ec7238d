mod repository;
mod types;
mod update;

pub use repository::AutomationRepository;
pub use types::{
    AutomationConfig, BusinessMetadata, DisableReason, DisabledState, Frequency, PostingConfig,
    ReplyConfig, SchedulePolicy,
};
pub use update::{ConfigUpdate, PostingUpdate, ReplyUpdate, parse_slot};
