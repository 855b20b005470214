//! Pipeline orchestrator (§4.5): loads a declarative [`desc::PipelineDesc`],
//! resolves its modules through a [`registry::Registry`], and runs its
//! steps — fusing the first two when both declare streaming I/O.
pub mod builtins;
pub mod desc;
pub mod orchestrator;
pub mod registry;

pub use builtins::register_builtins;
pub use desc::{load_pipelines, parse_pipelines, prepare_parameters, PipelineDesc, PipelineModule, PipelineStep};
pub use orchestrator::run;
pub use registry::{DataType, Module, ModuleFactory, Registry};
