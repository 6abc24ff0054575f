pub mod publication;
pub mod slug;

pub use publication::{PublicationClock, VersionStatus};
