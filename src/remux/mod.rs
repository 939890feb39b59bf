//! Remux sessions
//!
//! One ffmpeg subprocess per viewing session, publishing a rolling HLS
//! manifest into its own directory under the HLS root.

pub mod args;
pub mod manager;
pub mod session;

pub use args::VideoPlan;
pub use manager::{SessionManager, SessionRequest};
pub use session::StreamKind;
