//! Slot ownership: who holds a (category, area, country) slot, how new
//! listings enter it, and whether content may be served right now.

mod gate;
mod lifecycle;
mod resolver;

pub use gate::{ContentDecision, LiveGate};
pub use lifecycle::{ListingDraft, OnboardError, OnboardReceipt, SlotLifecycle};
pub use resolver::{EntitlementResolver, Holder, QueryMode, ResolveError, SlotState};
