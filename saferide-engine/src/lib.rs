pub mod dispatch;
pub mod relay;
pub mod service;

pub use service::{AlertService, CreateAlertRequest};

#[cfg(test)]
pub(crate) mod testutil;
