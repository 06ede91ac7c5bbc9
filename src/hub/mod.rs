//! Hub: one process between the terminal and every tab renderer
//!
//! [`manager`] holds the state machine, [`transport`] the sockets and timers
//! that drive it.

pub mod dimensions;
pub mod manager;
pub mod protocol;
pub mod tab;
pub mod transport;

pub use dimensions::HubDimensions;
pub use manager::Hub;
pub use protocol::{Command, MessageSender, ProtocolError};
pub use tab::Tab;
pub use transport::{run_hub, RemoteBrowser};
