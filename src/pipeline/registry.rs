//! Module registry (§4.5, §6): a global-at-startup name → factory map the
//! orchestrator resolves pipeline module references through. Grounded in
//! `original_source/src-core/core/pipeline.cpp`'s `modules_registry` and
//! `module.h`'s `ProcessingModule` interface, and in §9's design note
//! preferring a capability-set trait over class inheritance.
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Whether a module's input/output side is file-backed or a byte stream.
/// The fusion check (§4.5) looks for a module pair whose adjoining side is
/// [`DataType::Stream`] on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    File,
    Stream,
}

/// The capability set every pipeline module exposes (§9: "a block is
/// anything exposing `{init, start, work, stop, input_types,
/// output_types}`" generalized from DSP blocks to whole processing
/// modules).
pub trait Module: Send {
    /// Registry id, e.g. `"dvbs2_demod"`.
    fn id(&self) -> &str;

    /// Data types this module can accept/produce, in preference order.
    /// The fusion check only needs to know whether [`DataType::Stream`] is
    /// among them.
    fn input_types(&self) -> &[DataType];
    fn output_types(&self) -> &[DataType];

    /// Select which declared type to actually use for this run.
    fn set_input_type(&mut self, t: DataType);
    fn set_output_type(&mut self, t: DataType);

    /// Allocate resources (FIR taps, LDPC matrices, file handles). Called
    /// once before `process`.
    fn init(&mut self) -> Result<()>;

    /// Run to completion against whatever I/O was configured via
    /// `set_input_type`/`set_output_type` and, for the streaming case,
    /// [`crate::pipeline::orchestrator::attach_streaming_io`].
    fn process(&mut self) -> Result<()>;

    /// Output file paths produced by a `File`-typed run. Empty for a
    /// module that only ever produced a stream.
    fn outputs(&self) -> Vec<String>;

    /// Wire a shared ring buffer as this module's input, for the fused
    /// FILE→STREAM/STREAM→FILE path. Only meaningful when
    /// `input_types()` includes [`DataType::Stream`].
    fn attach_input_ring(&mut self, _ring: crate::stream::RingBufferReader) {}

    /// Wire a shared ring buffer as this module's output, for the fused
    /// path. Only meaningful when `output_types()` includes
    /// [`DataType::Stream`].
    fn attach_output_ring(&mut self, _ring: crate::stream::RingBufferWriter) {}
}

/// `(input_path, output_directory, parameters) -> Module` — mirrors
/// `modules_registry[name](input, output, params)` in the original source.
pub type ModuleFactory = Box<dyn Fn(&str, &str, &serde_json::Value) -> Box<dyn Module> + Send + Sync>;

/// Process-wide module name → factory map (§9 "Module registry as global
/// state"), populated by the host before any pipeline is loaded or run.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, ModuleFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module factory under `id`, overwriting any previous
    /// registration for the same id.
    pub fn register(&mut self, id: impl Into<String>, factory: ModuleFactory) {
        self.factories.insert(id.into(), factory);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Instantiate the module registered as `id`, or a configuration error
    /// if it isn't registered.
    pub fn create(
        &self,
        id: &str,
        input_path: &str,
        output_dir: &str,
        parameters: &serde_json::Value,
    ) -> Result<Box<dyn Module>> {
        self.factories
            .get(id)
            .map(|f| f(input_path, output_dir, parameters))
            .ok_or_else(|| Error::config(format!("module '{id}' is not registered")))
    }
}
