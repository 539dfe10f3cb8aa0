pub mod like_domain_service;
pub mod match_detector;
pub mod message_channel;
pub mod profile_domain_service;
pub mod thread_domain_service;

pub use like_domain_service::LikeDomainService;
pub use match_detector::MatchDetector;
pub use message_channel::MessageChannel;
pub use profile_domain_service::ProfileDomainService;
pub use thread_domain_service::{ThreadRegistry, collapse_duplicate_pairs};
