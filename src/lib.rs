pub mod analysis;
pub mod collaborators;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod notifier;
pub mod reading;
pub mod scheduler;
pub mod semantic;
pub mod sensor;
pub mod stages;
pub mod store;
pub mod thresholds;

#[cfg(test)]
pub(crate) mod test_support;
