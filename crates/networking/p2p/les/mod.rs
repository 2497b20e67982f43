pub mod error;
pub mod handlers;
pub mod message;
pub mod session;
pub mod status;
pub mod task;

pub use error::{LesError, ValidationError};
pub use message::{LES_CAPABILITY, LES_PROTOCOL_LENGTH, LES_PROTOCOL_VERSION, LesMessage};
pub use session::{Handler, LesSession, PendingRequests, Requester};
pub use task::{PeerEvent, Task};
