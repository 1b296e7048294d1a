//! Domain model: payments, their status taxonomy, and the ports the
//! application layer talks through.

pub mod card;
pub mod payment;
pub mod ports;
pub mod status;
