//! The HMRC MTD submission gateway.

pub mod gateway;
pub mod responses;

pub use gateway::{MtdGateway, MtdGatewayBuilder};
