//! General-purpose DSP primitives (§4.2): the shared-rate front end every
//! pipeline flavor (DVB-S2, CADU-framed links) is built from before the
//! signal-specific receiver chain takes over.
pub mod agc;
pub mod correct_iq;
pub mod fft_block;
pub mod file_source_sink;
pub mod fir;
pub mod firdes;
pub mod freq_shift;
pub mod quadrature_demod;
pub mod rational_resampler;
pub mod splitter;
pub mod symbol_sync;

pub use agc::Agc;
pub use correct_iq::CorrectIq;
pub use fft_block::FftBlock;
pub use file_source_sink::{FileSink, FileSource};
pub use fir::FirFilter;
pub use freq_shift::FreqShift;
pub use quadrature_demod::QuadratureDemod;
pub use rational_resampler::RationalResampler;
pub use splitter::Splitter;
pub use symbol_sync::SymbolSync;
