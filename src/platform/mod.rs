pub mod events;
pub mod input;

pub use events::{Event, EventId, EventKind, EventQueue};
pub use input::{translate, UiInput};
