pub mod chat;
pub mod errors;
pub mod events;
pub mod history;
pub mod image;
pub mod session;
pub mod workspace;

pub use errors::{ErrorSurface, WorkspaceError};
pub use history::{HistoryEntry, HistoryStore, Snapshot};
pub use image::ImageHandle;
pub use workspace::{
    BaseSource, GenerationPlan, ImageRole, LayoutMode, MobilePanel, OnboardingStep,
    PanelVisibility, WorkspaceAction, WorkspaceState, WorkspaceView,
};
