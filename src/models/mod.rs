pub mod page;
pub mod resolved;
pub mod schedule;
pub mod version;

pub use page::{CreatePage, CreatedPage, Page, PageId, SlugConflictMode};
pub use resolved::{InheritedFrom, ResolveView, ResolvedPage, SlotResolution, WidgetView};
pub use schedule::PublicationSchedule;
pub use version::{PageVersion, VersionDraft, VersionId, Widget};
