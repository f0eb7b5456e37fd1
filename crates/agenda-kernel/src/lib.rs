//! Pure conversational logic: no I/O, no clocks read implicitly. Callers pass
//! the current time in so every rule here is deterministic under test.

pub mod access;
pub mod command;
pub mod dates;
pub mod paging;
pub mod reminder;
pub mod retry;
pub mod search;
pub mod session;

pub use access::{authorize, Access, ManageRight};
pub use command::{Command, ManageAction, MenuCommand};
pub use dates::{display_name, format_thai_date, format_thai_naive, local_offset, parse_user_date};
pub use paging::{paginate, Page};
pub use reminder::ReminderWindow;
pub use retry::{Backoff, FailureClass, RetryPolicy};
pub use search::split_terms;
pub use session::{
    ContactDraft, EditDraft, EventDraft, Flow, Listing, ListingContext, SearchScope, SessionState,
    Step,
};
