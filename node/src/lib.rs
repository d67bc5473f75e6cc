pub mod control;
pub mod handle;
pub mod policy;
pub mod replication;


pub use policy::{FollowPolicy, Policies, Scope, SeedingPolicy, Visibility};
