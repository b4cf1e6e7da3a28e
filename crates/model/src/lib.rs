pub mod budget;
pub mod env;
mod event;
mod result;

pub use budget::{BudgetClock, DeadlineBudget};
pub use event::{Properties, ProvisioningEvent, RequestKind};
pub use result::{EffectiveCommand, OperationResult, OperationStatus, PollOutcome};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
