pub mod auth;
pub mod coordinator;
pub mod history;
pub mod scorer;

pub use auth::{AuthError, AuthService};
pub use coordinator::{PredictionCoordinator, PredictionError};
pub use history::{HistoryQueryService, HistorySummary};
pub use scorer::ScorerHandle;
