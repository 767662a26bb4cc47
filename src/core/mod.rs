//! Core gateway functionality: data model, collaborator contracts,
//! registries and the acquisition engine.

pub mod cloud;
pub mod devices;
pub mod queue;
pub mod sensors;
pub mod transport;
pub mod types;
