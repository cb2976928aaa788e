// Control connection wire format shared by client and server
pub mod command;
pub mod reader;
pub mod reply;

pub use command::Command;
pub use reader::{read_control_line, ReplyReader};
pub use reply::{Reply, ReplyClass};
