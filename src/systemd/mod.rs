// Systemd integration module

pub mod bus;
pub mod client;
pub mod control;
pub mod controller;
pub mod models;
mod poller;
mod relay;
pub mod resilience;


pub use bus::{BusConnector, SystemdBus};
pub use client::{DbusBus, DbusConnector};
pub use control::validate_unit_name;
pub use controller::{Notifiers, Systemd};
pub use models::{
    ConnectionState, JobMode, Msg, PropertyValue, Service, ServiceScope, ServiceStatus, UnitCheck,
    UnitFileChange, UnitStatus,
};
pub use resilience::Backoff;
