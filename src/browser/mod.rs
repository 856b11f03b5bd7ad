pub mod interaction;
pub mod selectors;
pub mod session;

pub use interaction::{IconKey, MessageStatus, UIInteractionService};
pub use selectors::{Selector, SelectorFamilies, SelectorFamily, SelectorKind};
pub use session::{BrowserSession, ElementHandle};
