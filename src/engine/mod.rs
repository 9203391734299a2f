//! Thread view engine: transcript state, the send pipeline, and the reply
//! notifier that runs after a send comes back without an inline answer.

pub(crate) mod context;
pub mod events;
pub mod poller;
mod push;
pub mod send;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use events::{EventBus, ViewEvent};
pub use poller::{ConversationPoller, PollPolicy, PollState, STILL_WORKING_TEXT};
pub use send::{Composer, SendOutcome, CONNECTION_ERROR_TEXT, SEND_FAILED_TEXT};
pub use view::{needs_polling, ThreadView, ViewSettings};
