//! Miscellaneous common structs used throughout the library.

mod hint_cache;
mod id;
pub mod messages;
mod node;
mod ring;
mod routing_table;
mod status;

pub use hint_cache::*;
pub use id::*;
pub use messages::*;
pub use node::*;
pub use ring::*;
pub use routing_table::*;
pub use status::*;
