//! Drops: the units of data and computation in a graph.

mod app;
mod checksum;
mod io;
mod object;
mod registry;
mod utils;

pub use app::{AppContext, AppFactory, Application};
pub use io::{ChunkReader, DataIo, FileIo, MemoryIo, NullIo};
pub use object::{
    DEFAULT_CHUNK_SIZE, DropEnv, DropObject, DropReader, DropRef, DropSnapshot, Payload,
};
pub use registry::{DropClass, DropClassRegistry};
pub use utils::{
    DropWaiter, all_drop_contents, copy_drop_contents, downstream_drops, upstream_drops,
};
