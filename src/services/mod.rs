pub mod page_tree;
pub mod resolver;
pub mod scheduling;
pub mod versions;

pub use page_tree::{PageTreeService, UpdatePage};
pub use resolver::InheritanceResolver;
pub use scheduling::{BatchReport, SchedulingService, SweepError, SweepReport};
pub use versions::VersionService;
