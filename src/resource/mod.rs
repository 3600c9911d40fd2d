//! Component F — the high-level resources built on top of a resource
//! guard (§4.E): a single-unit [`Resource`], a counted [`Store`], a
//! two-sided [`Buffer`], a FIFO [`ObjectQueue`], and a [`Condition`]
//! variable. Each embeds a [`base::ResourceBase`] header and one or
//! more [`crate::guard::Guard`]s; none of them touch the scheduler or
//! coroutine layer directly — they all bottom out in `Guard::wait`/
//! `Guard::signal`.

pub mod base;
pub mod buffer;
pub mod condition;
pub mod queue;
pub mod single;
pub mod store;

pub use base::{Reprio, ResourceBase, Scram};
pub use buffer::Buffer;
pub use condition::Condition;
pub use queue::ObjectQueue;
pub use single::Resource;
pub use store::Store;
