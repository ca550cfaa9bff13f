//! Core abstractions for the todo agent: the todo entity, its repository
//! contract, and the language-model seam used by the dispatcher.

pub mod agent;
pub mod todos;
