//! Agent-to-agent knowledge handoff.
//!
//! A packet moves through `pending -> applied` or `pending -> rejected`.
//! Creation freezes the selected item ids and deep snapshots of the items;
//! later store changes never reach a created packet. Applying copies the
//! snapshots into the receiving agent's private lane.

pub mod apply;
pub mod error;
pub mod packet;
pub mod select;
pub mod store;

pub use apply::{apply_handoff_packet, HandoffApplyOutcome, HandoffTarget};
pub use error::{HandoffError, HandoffResult};
pub use packet::{HandoffDraft, HandoffPacket, HandoffStatus};
pub use select::{briefing_lines, select_handoff_items, HandoffSelection};
pub use store::HandoffStore;
