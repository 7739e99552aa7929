//! streampool-bus — message-bus driven deployment commands.
//!
//! An alternative front door to the HTTP API: operators (or upstream
//! monitors) publish `{action: create|delete|terminate}` JSON commands to
//! a topic, and the worker translates them into deployment-layer calls.
//! Messages are consumed with peek-lock semantics: a message is deleted
//! only after its command was dispatched successfully, so a transient
//! dispatch failure leads to redelivery rather than a lost command.

pub mod command;
pub mod error;
pub mod provider;
pub mod worker;

pub use command::BusCommand;
pub use error::{BusError, BusResult};
pub use provider::{BusProvider, InMemoryBus, LockedMessage};
pub use worker::{BusWorker, Polled};
