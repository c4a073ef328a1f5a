pub mod engine;
pub mod states;

pub use engine::ConversationMachine;
pub use states::{evaluate_step, ProfileUpdate, StepOutcome};
