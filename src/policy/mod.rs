//! Policy: persisted rule models, scope resolution, daily counters and admin checks.

pub mod admin;
pub mod counters;
pub mod model;
pub mod pattern;
pub mod resolver;

pub use admin::AdminAuthorizer;
pub use counters::CounterStore;
pub use resolver::PolicyResolver;
