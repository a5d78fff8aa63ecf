//! 浏览层：标签存储、导航控制器、内容承载面（HTTP 探测 / Headless Chrome / Mock）

pub mod mock;
pub mod navigation;
pub mod surface;
pub mod tabs;

#[cfg(feature = "browser")]
pub mod chrome;

pub use mock::{MockSurface, SurfaceCall};
pub use navigation::{normalize, LoadOutcome, LoadRequest, NavigationController};
pub use surface::{ContentSurface, HttpSurface, PageInfo};
pub use tabs::{LoadState, Tab, TabId, TabStore};

#[cfg(feature = "browser")]
pub use chrome::ChromeSurface;
