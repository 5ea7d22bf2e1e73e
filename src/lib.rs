pub mod comparator;
pub mod configuration;
pub mod dispatch;
pub mod error_handling;
pub mod generator;
pub mod packet_model;
pub mod recorder;
pub mod test_case;
