pub mod error;
pub mod message;
pub mod server;
pub mod session;

pub use error::WireError;
pub use message::{MAX_MESSAGE_SIZE, Message, OP_MSG};
pub use server::{Server, ServerHandle};
pub use session::Session;
