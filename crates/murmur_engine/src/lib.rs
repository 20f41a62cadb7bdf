pub mod context;
pub mod generation;
pub mod orchestrator;
pub mod typo;

pub use generation::{
    complete_with_fallback, ContextEntry, EntryRole, GenBackend, GenError, OpenAiCompatClient,
};
pub use orchestrator::Orchestrator;
pub use typo::{ImperfectionInjector, TypoOutcome};
