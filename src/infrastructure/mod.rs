pub mod cache;
pub mod registry;
pub mod store;
pub mod tree_cache;

pub use registry::{InMemoryRegistry, LayoutDef, LayoutRegistry, SlotDef, ThemeDef, WidgetTypeRegistry};
pub use store::{NewPageRow, PageStore, SqlitePageStore};
pub use tree_cache::{CacheStats, TreeCache};
