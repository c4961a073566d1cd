//! 核心编排层：状态与补丁、错误分类、持久化后端、超步协调器

pub mod coordinator;
pub mod durable;
pub mod error;
pub mod state;

pub use coordinator::{DurableCoordinator, Heartbeat, PhaseEvent, RetryPolicy};
pub use durable::{DurableBackend, InMemoryDurable};
pub use error::InvestigationError;
pub use state::{
    Entity, EntityType, InvestigationState, Phase, Priority, QualityReview, QuestionStatus,
    ResearchQuestion, Source, SourceType, StateDiff,
};
