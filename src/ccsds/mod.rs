//! CCSDS CADU deframer (§4.4): a bit-level sync-word state machine that
//! recovers fixed-length Channel Access Data Units from a continuous
//! stream of soft or hard bits, the frame-oriented counterpart to the
//! DVB-S2 physical-layer chain in [`crate::dvbs2`] (§2's second pipeline
//! path, for frame-oriented links like LRPT/HRPT).
pub mod block;
pub mod deframer;

pub use block::CaduDeframerBlock;
pub use deframer::{CaduDeframer, DeframerState, ASM, ASM_INV, CADU_DATA_BITS, CADU_SIZE};
