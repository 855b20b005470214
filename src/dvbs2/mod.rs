//! DVB-S2 physical-layer receiver (§4.3): SOF correlation, pilot-aware
//! carrier tracking, soft de-mapping, LDPC/BCH FEC, and baseband-frame
//! descrambling.
pub mod bch;
pub mod demap;
pub mod descrambler;
pub mod ldpc;
pub mod pll;
pub mod pls;
pub mod sof;

pub use bch::BchDecoder;
pub use demap::Demapper;
pub use descrambler::descramble;
pub use ldpc::{LdpcCode, LdpcDecoder};
pub use pll::Pll;
pub use pls::{Constellation, FrameSize, Modcod};
pub use sof::{SofCorrelator, SOF_PLS_LEN};
