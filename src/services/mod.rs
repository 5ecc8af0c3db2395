pub mod assistant_service;
pub mod count_service;
pub mod error;
pub mod inventory_service;
pub mod labels;
pub mod reconciliation;
pub mod spreadsheet;
pub mod user_service;

pub use assistant_service::{AssistantConfig, AssistantError, AssistantService};
pub use count_service::CountService;
pub use error::{InventoryError, InventoryResult};
pub use inventory_service::{InventoryService, InventoryStats};
pub use user_service::UserService;
