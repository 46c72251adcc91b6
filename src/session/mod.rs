//! Session lifecycle: stages, the pure reducer, and the orchestrator that
//! sequences remote calls around it.

pub mod model;
pub mod orchestrator;
pub mod reducer;
pub mod report;
pub mod stage;

pub use model::{REFINEMENT_BUDGET, ReportContext, ReportSection, Session};
pub use orchestrator::{
    OrchestratorDeps, RefinementOutcome, Reply, SessionOrchestrator, StageChange,
};
pub use reducer::{SessionEvent, reduce};
pub use report::{ExportFormat, export_file_name, render, render_text};
pub use stage::Stage;
