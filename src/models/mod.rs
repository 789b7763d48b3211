//! Job-shop domain models.
//!
//! Provides the data types for job-shop problems and their solutions.
//!
//! # Domain Mappings
//!
//! | u-jobshop | Manufacturing | Healthcare | Logistics |
//! |-----------|--------------|------------|-----------|
//! | Job | Order | Patient Case | Shipment |
//! | Operation | Routing Step | Procedure | Transport Leg |
//! | Machine | Machine/Cell | Room | Dock/Truck |
//! | Schedule | Production Plan | OR Schedule | Route Plan |

pub mod generate;
mod instance;
mod jsplib;
mod schedule;

pub use instance::{Instance, InstanceData, MachineId, Operation, OperationId};
pub use schedule::{Schedule, ScheduledOperation, Violation, ViolationType};
