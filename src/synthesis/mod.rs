//! Speech synthesis job supplier
//!
//! The relay never synthesizes audio itself. It hands text to an external
//! long-running job and polls that job until it reports completion. The
//! [`JobSupplier`] trait is that seam:
//!
//! - [`GoogleLongAudioSynthesizer`]: Google Cloud Text-to-Speech long-audio API
//!
//! Tests substitute scripted in-memory suppliers.

mod google;
mod traits;

pub use google::GoogleLongAudioSynthesizer;
pub use traits::{JobStatus, JobSupplier};
