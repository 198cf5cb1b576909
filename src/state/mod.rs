//! Per-key state management.
//!
//! - `mutation` - staged field mutations and update-expression rendering
//! - `manager` - the buffered client for one state item
//! - `factory` - registry handing out one manager per composite key

mod factory;
mod manager;
mod mutation;

pub use factory::StateManagerFactory;
pub use manager::StateManager;
pub use mutation::{
    field_placeholder, value_placeholder, Clause, Mutation, PendingMutations, UpdateExpression,
};
