//! Miscellaneous common structs used throughout the library.

mod closest_nodes;
mod id;
mod immutable;
mod item;
pub mod messages;
mod mutable;
mod node;
mod routing_table;

pub use closest_nodes::*;
pub use id::*;
pub use immutable::*;
pub use item::*;
pub use messages::*;
pub use mutable::*;
pub use node::*;
pub use routing_table::*;
