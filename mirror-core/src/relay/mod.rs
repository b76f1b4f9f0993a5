//! Frame relay: the single-slot broker between capture and display.
//!
//! | Module    | Purpose                                        |
//! |-----------|------------------------------------------------|
//! | `buffer`  | Latest-wins single-slot frame buffer           |
//! | `session` | Session-scoped state and the accept/reject rule |
//! | `broker`  | Session owner that pushes frames to the target |

pub mod broker;
pub mod buffer;
pub mod session;

pub use broker::Broker;
pub use buffer::RelayBuffer;
pub use session::{RejectReason, RelaySession, SubmitOutcome};
